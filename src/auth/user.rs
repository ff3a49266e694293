use serde::{Deserialize, Serialize};

/// Level of assurance reached by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthenticationLevel {
    NotAuthenticated,
    OneFactor,
    TwoFactor,
}

impl Default for AuthenticationLevel {
    fn default() -> Self {
        AuthenticationLevel::NotAuthenticated
    }
}

/// Attributes of a user as returned by a user provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub username: String,
    pub display_name: String,
    pub groups: Vec<String>,
    pub emails: Vec<String>,
}

impl UserDetails {
    /// Creates details with only a username, used as display name
    pub fn new(username: String) -> Self {
        Self {
            display_name: username.clone(),
            username,
            groups: Vec::new(),
            emails: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_emails(mut self, emails: Vec<String>) -> Self {
        self.emails = emails;
        self
    }

    /// Primary email, if any
    pub fn email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }
}
