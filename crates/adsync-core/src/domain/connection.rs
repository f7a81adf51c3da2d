//! Directory credentials
//!
//! [`ConnectionDetails`] is built fresh for every connection attempt and is
//! moved into the session it authenticates, so credentials are dropped
//! together with that session.

use std::fmt;

/// Credentials for one directory connection attempt
///
/// Deliberately not `Clone`, `Serialize` or `Deserialize`.
pub struct ConnectionDetails {
    username: String,
    password: String,
}

impl ConnectionDetails {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Qualifies a bare account name with the configured suffix
    ///
    /// Names that are already a UPN (`user@domain`), a down-level logon
    /// name (`DOMAIN\user`) or a DN (`CN=...`) are left untouched.
    #[must_use]
    pub fn with_account_suffix(mut self, suffix: Option<&str>) -> Self {
        if let Some(suffix) = suffix.map(str::trim).filter(|s| !s.is_empty()) {
            let qualified = self.username.contains('@')
                || self.username.contains('\\')
                || self.username.contains('=');
            if !qualified {
                let suffix = suffix.trim_start_matches('@');
                self.username = format!("{}@{}", self.username, suffix);
            }
        }
        self
    }
}

impl fmt::Debug for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDetails")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
