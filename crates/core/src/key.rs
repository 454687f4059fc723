use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// TTL value (in milliseconds) meaning the key never expires.
pub const NO_EXPIRY: u64 = 0;

/// Expiration applied when a value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expiry {
    /// The key is written without a TTL.
    Never,
    /// The key expires after the given duration.
    After(Duration),
}

impl Expiry {
    /// Build an expiry from a millisecond TTL where [`NO_EXPIRY`] means "never".
    #[must_use]
    pub fn from_millis(ttl_millis: u64) -> Self {
        if ttl_millis == NO_EXPIRY {
            Self::Never
        } else {
            Self::After(Duration::from_millis(ttl_millis))
        }
    }

    /// The TTL in milliseconds, [`NO_EXPIRY`] for [`Expiry::Never`].
    #[must_use]
    pub fn as_millis(&self) -> u64 {
        match self {
            Self::Never => NO_EXPIRY,
            Self::After(d) => u64::try_from(d.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// A class of cache or lock entries: a key template plus a default TTL.
///
/// Application code usually implements this on an enum so every namespace it
/// writes to is declared in one place:
///
/// ```
/// use keylock_core::KeySpec;
///
/// #[derive(Debug)]
/// enum OrderKeys {
///     Detail,
///     Lock,
/// }
///
/// impl KeySpec for OrderKeys {
///     fn template(&self) -> &str {
///         match self {
///             Self::Detail => "order:%s:detail",
///             Self::Lock => "order:%s:lock",
///         }
///     }
///
///     fn ttl_millis(&self) -> u64 {
///         match self {
///             Self::Detail => 60_000,
///             Self::Lock => 1_000,
///         }
///     }
/// }
///
/// assert_eq!(OrderKeys::Lock.resolve(&["42"]).unwrap(), "order:42:lock");
/// ```
pub trait KeySpec: fmt::Debug + Send + Sync {
    /// The printf-style template (`%s`, `%d`, `%%`).
    fn template(&self) -> &str;

    /// Default TTL in milliseconds; [`NO_EXPIRY`] means never expire.
    fn ttl_millis(&self) -> u64;

    /// Whether entries of this class are written without a TTL.
    fn never_expires(&self) -> bool {
        self.ttl_millis() == NO_EXPIRY
    }

    /// The default TTL as an [`Expiry`].
    fn expiry(&self) -> Expiry {
        Expiry::from_millis(self.ttl_millis())
    }

    /// Resolve the concrete key for the given positional parameters.
    fn resolve(&self, params: &[&str]) -> Result<String, KeyError> {
        render_template(self.template(), params)
    }
}

/// Immutable [`KeySpec`] value, typically loaded from configuration or kept
/// in a [`KeyRegistry`](crate::registry::KeyRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyDescriptor {
    template: String,
    #[serde(default)]
    ttl_millis: u64,
}

impl KeyDescriptor {
    /// Create a descriptor with a default TTL in milliseconds.
    #[must_use]
    pub fn new(template: impl Into<String>, ttl_millis: u64) -> Self {
        Self {
            template: template.into(),
            ttl_millis,
        }
    }

    /// Create a descriptor whose entries never expire.
    #[must_use]
    pub fn persistent(template: impl Into<String>) -> Self {
        Self::new(template, NO_EXPIRY)
    }
}

impl KeySpec for KeyDescriptor {
    fn template(&self) -> &str {
        &self.template
    }

    fn ttl_millis(&self) -> u64 {
        self.ttl_millis
    }
}

impl fmt::Display for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Substitute `params` into a printf-style `template`.
///
/// With no parameters the template is returned verbatim, so static keys may
/// contain a literal `%`. Otherwise every `%s` / `%d` consumes exactly one
/// parameter in order, `%%` emits a literal `%`, and the placeholder count must
/// match the parameter count.
pub fn render_template(template: &str, params: &[&str]) -> Result<String, KeyError> {
    if params.is_empty() {
        return Ok(template.to_owned());
    }

    let capacity = template.len() + params.iter().map(|p| p.len()).sum::<usize>();
    let mut out = String::with_capacity(capacity);
    let mut supplied = params.iter();
    let mut expected = 0usize;
    let mut chars = template.char_indices();

    while let Some((offset, c)) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, '%')) => out.push('%'),
            Some((_, conversion @ ('s' | 'd'))) => {
                expected += 1;
                // Keep scanning past the last parameter so the mismatch error
                // reports the full placeholder count.
                let Some(param) = supplied.next() else {
                    continue;
                };
                if conversion == 'd' && param.parse::<i64>().is_err() {
                    return Err(KeyError::NotAnInteger {
                        position: expected,
                        value: (*param).to_owned(),
                    });
                }
                out.push_str(param);
            }
            Some((_, conversion)) => {
                return Err(KeyError::UnsupportedConversion { conversion, offset });
            }
            None => return Err(KeyError::DanglingPercent { offset }),
        }
    }

    if expected != params.len() {
        return Err(KeyError::ArgumentCount {
            expected,
            supplied: params.len(),
        });
    }
    Ok(out)
}
