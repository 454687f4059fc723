use crate::error::KeyError;
use crate::key::KeySpec;

fn resolve_owned(key: &dyn KeySpec, params: &[String]) -> Result<String, KeyError> {
    let params: Vec<&str> = params.iter().map(String::as_str).collect();
    key.resolve(&params)
}

/// One key to fetch in a batched read.
#[derive(Debug, Clone)]
pub struct BatchGet<'a> {
    pub key: &'a dyn KeySpec,
    pub params: Vec<String>,
}

impl<'a> BatchGet<'a> {
    pub fn new(key: &'a dyn KeySpec) -> Self {
        Self {
            key,
            params: Vec::new(),
        }
    }

    /// Set the positional template parameters.
    #[must_use]
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn resolve(&self) -> Result<String, KeyError> {
        resolve_owned(self.key, &self.params)
    }
}

/// One write in a pipelined batch.
#[derive(Debug, Clone)]
pub struct BatchSet<'a, T> {
    pub key: &'a dyn KeySpec,
    pub value: T,
    pub params: Vec<String>,
    /// Replaces the descriptor TTL when set. `0` means no expiry, negative
    /// values cause the entry to be skipped.
    pub ttl_override: Option<i64>,
}

impl<'a, T> BatchSet<'a, T> {
    pub fn new(key: &'a dyn KeySpec, value: T) -> Self {
        Self {
            key,
            value,
            params: Vec::new(),
            ttl_override: None,
        }
    }

    /// Set the positional template parameters.
    #[must_use]
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Override the descriptor TTL for this entry.
    #[must_use]
    pub fn ttl_millis(mut self, ttl_millis: i64) -> Self {
        self.ttl_override = Some(ttl_millis);
        self
    }

    /// The override if present, else the descriptor's default TTL.
    pub fn effective_ttl_millis(&self) -> i64 {
        self.ttl_override
            .unwrap_or_else(|| i64::try_from(self.key.ttl_millis()).unwrap_or(i64::MAX))
    }

    pub fn resolve(&self) -> Result<String, KeyError> {
        resolve_owned(self.key, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyDescriptor;

    #[test]
    fn batch_get_resolves_params() {
        let d = KeyDescriptor::new("user:%s", 10);
        let op = BatchGet::new(&d).params(["bob"]);
        assert_eq!(op.resolve().unwrap(), "user:bob");
    }

    #[test]
    fn batch_get_without_params_uses_template() {
        let d = KeyDescriptor::persistent("flags");
        assert_eq!(BatchGet::new(&d).resolve().unwrap(), "flags");
    }

    #[test]
    fn batch_set_ttl_override_wins() {
        let d = KeyDescriptor::new("user:%s", 5000);
        let op = BatchSet::new(&d, 1).params(["a"]);
        assert_eq!(op.effective_ttl_millis(), 5000);

        let op = op.ttl_millis(0);
        assert_eq!(op.effective_ttl_millis(), 0);
    }

    #[test]
    fn batch_set_reports_key_errors() {
        let d = KeyDescriptor::new("user:%s:%s", 5000);
        let op = BatchSet::new(&d, "v").params(["only-one"]);
        assert!(matches!(op.resolve(), Err(KeyError::ArgumentCount { .. })));
    }
}
