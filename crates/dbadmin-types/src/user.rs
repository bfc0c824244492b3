//! User types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application user record stored in the `users` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub age: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub age: Option<i32>,
}

impl NewUser {
    /// Returns the name of the first required field that is blank.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.name.trim().is_empty() {
            Some("name")
        } else if self.email.trim().is_empty() {
            Some("email")
        } else {
            None
        }
    }
}

/// User update request. Absent fields keep their stored values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
}

impl User {
    /// Overwrite every field present in `patch`.
    pub fn apply(&mut self, patch: UserPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(age) = patch.age {
            self.age = Some(age);
        }
    }
}

/// Query string for `GET /users`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub name: Option<String>,
}
