/// Whether a request reads or mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Read,
    Mutation,
}

/// Flattened request parameters: query string followed by form body.
/// Keys may repeat.
#[derive(Debug, Clone)]
pub struct RequestParams {
    verb: Verb,
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    pub fn new(verb: Verb, pairs: Vec<(String, String)>) -> Self {
        Self { verb, pairs }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Non-blank value of `key`.
    pub fn get_non_blank(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }
}
