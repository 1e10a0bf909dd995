use serde::{Deserialize, Serialize};

/// Caller identity and administrative scope, extracted from request headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    /// Highest role level the caller may see; `None` means unrestricted.
    pub acl_type: Option<i32>,
    /// Organization code prefixes the caller administers; empty means unrestricted.
    pub acl_code_prefixes: Vec<String>,
    pub session_id: Option<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            acl_type: None,
            acl_code_prefixes: Vec::new(),
            session_id: None,
        }
    }

    pub fn with_acl_type(mut self, acl_type: i32) -> Self {
        self.acl_type = Some(acl_type);
        self
    }

    pub fn with_acl_code_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.acl_code_prefixes = prefixes;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Create a system user context for internal operations
    pub fn system() -> Self {
        Self::new("system")
    }

    /// Create a default user context for development/testing
    pub fn default_user() -> Self {
        Self::new("dev-user")
    }

    /// Key the duplicate-submission guard is scoped by.
    pub fn session_key(&self) -> &str {
        self.session_id.as_deref().unwrap_or(&self.user_id)
    }

    pub fn is_scope_restricted(&self) -> bool {
        !self.acl_code_prefixes.is_empty()
    }

    pub fn covers_acl_code(&self, code: &str) -> bool {
        !self.is_scope_restricted()
            || self
                .acl_code_prefixes
                .iter()
                .any(|prefix| code.starts_with(prefix.as_str()))
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::default_user()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acl_code_coverage() {
        let user = UserContext::new("u").with_acl_code_prefixes(vec!["D10".into()]);
        assert!(user.covers_acl_code("D1010"));
        assert!(!user.covers_acl_code("D20"));
        assert!(UserContext::default_user().covers_acl_code("anything"));
    }

    #[test]
    fn session_key_falls_back_to_user() {
        assert_eq!(UserContext::new("u1").session_key(), "u1");
        assert_eq!(UserContext::new("u1").with_session("s9").session_key(), "s9");
    }
}
