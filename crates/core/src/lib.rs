//! Shared types for keylock.
//!
//! - [`KeySpec`] / [`KeyDescriptor`]: a printf-style key template plus a
//!   default TTL, and the rules for resolving a concrete key from it.
//! - [`KeyRegistry`]: named descriptors, loadable from configuration.
//! - [`Codec`]: the value boundary; [`JsonCodec`] is the default.
//! - [`BatchGet`] / [`BatchSet`]: entries of batched cache operations.
//! - [`LockHandle`]: what a protected call receives while it holds a lock.

pub mod batch;
pub mod codec;
pub mod error;
pub mod handle;
pub mod key;
pub mod registry;
pub mod ttl;

pub use batch::{BatchGet, BatchSet};
pub use codec::{Codec, JsonCodec};
pub use error::{CodecError, KeyError};
pub use handle::{LockHandle, generate_owner_token};
pub use key::{Expiry, KeyDescriptor, KeySpec, NO_EXPIRY, render_template};
pub use registry::KeyRegistry;
pub use ttl::jittered_ttl_millis;
