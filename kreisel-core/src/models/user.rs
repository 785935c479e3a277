use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered borrower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserInput {
    pub full_name: String,
    pub email: String,
}

impl User {
    pub fn new(input: CreateUserInput, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: input.full_name,
            email: input.email,
            created_at: now,
        }
    }
}
