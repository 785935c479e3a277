use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A rating left for a returned rental.
///
/// `item_id` and `user_id` are copied from the rental so reviews can be
/// listed per item without a join. Reviews are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub rental_id: Uuid,
    pub item_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Answer to "may this user review this rental?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEligibility {
    pub can_review: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_review_id: Option<Uuid>,
}

/// Input for reviewing a rental.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReviewInput {
    pub rental_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
}
