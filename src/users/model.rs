use bson::DateTime;
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const USERS_COLLECTION: &str = "users";

/// A registered user, stored in the `users` collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
    pub name: String,
    pub email: String,
}

impl User {
    #[must_use]
    pub fn new(name: &str, email: &str) -> Self {
        Self { name: name.to_string(), email: email.to_string(), ..Self::default() }
    }
}

crate::impl_model!(User, USERS_COLLECTION);
