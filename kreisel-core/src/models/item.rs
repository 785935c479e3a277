use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A piece of equipment in the lending pool.
///
/// `available` mirrors the absence of an open rental and is only flipped by
/// the rental lifecycle. `average_rating` and `review_count` are rewritten by
/// the rating aggregator after every review; an item without reviews carries
/// `0.0` and `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub available: bool,
    pub average_rating: f64,
    pub review_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for adding an item to the pool. New items start out available and unrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemInput {
    pub name: String,
    pub description: Option<String>,
}

impl Item {
    pub fn new(input: CreateItemInput, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            available: true,
            average_rating: 0.0,
            review_count: 0,
            created_at: now,
        }
    }
}
