use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::{Document, ObjectId};

/// User document as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: ObjectId,
    pub name: String,
    pub surnames: String,
    pub email: String,
    pub password_hash: String, // argon2 PHC string, never plaintext
    #[serde(default)]
    pub claims: Vec<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Document for User {
    const COLLECTION: &'static str = "users";
    const UNIQUE_FIELDS: &'static [&'static str] = &["email"];

    fn id(&self) -> ObjectId {
        self.id
    }
}
