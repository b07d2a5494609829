//! The user attached to a request.
//!
//! Authentication itself happens in the host application; reports only need
//! to know who is asking, whether they are signed in, and which groups they
//! belong to (template editors are identified by group membership).

use serde::{Deserialize, Serialize};

/// The user making a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUser {
    /// Primary key of the user, `None` for anonymous users.
    pub id: Option<i64>,
    /// The user's unique username.
    pub username: String,
    /// The user's first name.
    pub first_name: String,
    /// The user's last name.
    pub last_name: String,
    /// Whether this user has all permissions.
    pub is_superuser: bool,
    /// Group names this user belongs to.
    pub groups: Vec<String>,
}

impl RequestUser {
    /// Returns the anonymous user.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Creates an authenticated user.
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            username: username.into(),
            ..Self::default()
        }
    }

    /// Sets first and last name.
    #[must_use]
    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    /// Adds a group membership.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Marks the user as a superuser.
    #[must_use]
    pub const fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    /// Returns `true` for signed-in users.
    pub const fn is_authenticated(&self) -> bool {
        self.id.is_some()
    }

    /// Returns `"first last"`, trimmed.
    ///
    /// ```
    /// use flex_report_http::RequestUser;
    ///
    /// assert_eq!(RequestUser::new(1, "ann").with_name("Ann", "Lee").get_full_name(), "Ann Lee");
    /// assert_eq!(RequestUser::new(1, "ann").get_full_name(), "");
    /// ```
    pub fn get_full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Returns `true` if the user belongs to `group`.
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}
