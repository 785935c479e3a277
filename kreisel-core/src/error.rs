use rusqlite::ffi;
use serde::Serialize;
use thiserror::Error;

use crate::policy::{MAX_ACTIVE_RENTALS, MAX_RENTAL_DAYS};

/// Failures raised by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule held by the store rejected the write.
    #[error("uniqueness violation: {0}")]
    Conflict(String),
    /// Another writer holds the database; the transaction may be retried.
    #[error("database busy: {0}")]
    Busy(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let extended_code = err.sqlite_error().map(|e| e.extended_code);
        match extended_code {
            Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
                StoreError::Conflict(err.to_string())
            }
            _ => match err.sqlite_error_code() {
                Some(rusqlite::ErrorCode::DatabaseBusy)
                | Some(rusqlite::ErrorCode::DatabaseLocked) => StoreError::Busy(err.to_string()),
                _ => StoreError::Sqlite(err),
            },
        }
    }
}

/// Every way a lending operation can be refused.
///
/// Each variant carries a fixed, user-facing message. Callers branch on the
/// variant (or on [`LendingError::kind`]) rather than on the text.
#[derive(Debug, Error)]
pub enum LendingError {
    #[error("User not found")]
    UserNotFound,
    #[error("Item not found")]
    ItemNotFound,
    #[error("Rental not found")]
    RentalNotFound,
    #[error("Item is not available")]
    ItemUnavailable,
    #[error("Item is already rented")]
    AlreadyRented,
    #[error("Maximum number of active rentals ({limit}) reached")]
    RentalLimitExceeded { limit: i64 },
    #[error("End date is required")]
    MissingEndDate,
    #[error("End date must not be in the past")]
    EndDateInPast,
    #[error("Rental must last at least 1 day")]
    EndDateNotFuture,
    #[error("End date must be at most {max_days} days in the future")]
    EndDateTooFar { max_days: u64 },
    #[error("Extension already used")]
    AlreadyExtended,
    #[error("Rental has already been returned")]
    AlreadyReturned,
    #[error("This rental doesn't belong to you")]
    NotYourRental,
    #[error("Item must be returned before reviewing")]
    ItemNotReturned,
    #[error("You have already reviewed this rental")]
    AlreadyReviewed,
    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i32),
    #[error("Storage stayed busy after {attempts} attempts")]
    Conflict { attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LendingError {
    pub fn rental_limit() -> Self {
        Self::RentalLimitExceeded {
            limit: MAX_ACTIVE_RENTALS,
        }
    }

    pub fn end_date_too_far() -> Self {
        Self::EndDateTooFar {
            max_days: MAX_RENTAL_DAYS,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UserNotFound | Self::ItemNotFound | Self::RentalNotFound => ErrorKind::NotFound,
            Self::ItemUnavailable | Self::AlreadyRented => ErrorKind::Unavailable,
            Self::RentalLimitExceeded { .. } => ErrorKind::LimitExceeded,
            Self::MissingEndDate
            | Self::EndDateInPast
            | Self::EndDateNotFuture
            | Self::EndDateTooFar { .. } => ErrorKind::InvalidDateRange,
            Self::AlreadyExtended => ErrorKind::AlreadyExtended,
            Self::AlreadyReturned => ErrorKind::AlreadyReturned,
            Self::NotYourRental => ErrorKind::NotYourRental,
            Self::ItemNotReturned => ErrorKind::ItemNotReturned,
            Self::AlreadyReviewed => ErrorKind::AlreadyReviewed,
            Self::InvalidRating(_) => ErrorKind::InvalidRating,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Store(StoreError::Busy(_)) => ErrorKind::Conflict,
            Self::Store(_) => ErrorKind::Storage,
        }
    }

    /// Whether retrying the whole transaction might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(StoreError::Busy(_)))
    }
}

/// Coarse grouping of [`LendingError`] for callers that map errors onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unavailable,
    LimitExceeded,
    InvalidDateRange,
    AlreadyExtended,
    AlreadyReturned,
    NotYourRental,
    ItemNotReturned,
    AlreadyReviewed,
    InvalidRating,
    Conflict,
    Storage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_message_names_the_limit() {
        assert_eq!(
            LendingError::rental_limit().to_string(),
            "Maximum number of active rentals (5) reached"
        );
    }

    #[test]
    fn date_failures_share_a_kind() {
        for err in [
            LendingError::MissingEndDate,
            LendingError::EndDateInPast,
            LendingError::EndDateNotFuture,
            LendingError::end_date_too_far(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidDateRange);
        }
    }

    #[test]
    fn past_and_same_day_end_dates_read_differently() {
        assert_eq!(
            LendingError::EndDateInPast.to_string(),
            "End date must not be in the past"
        );
        assert_eq!(
            LendingError::EndDateNotFuture.to_string(),
            "Rental must last at least 1 day"
        );
    }

    #[test]
    fn busy_store_errors_are_retryable() {
        let busy = LendingError::from(StoreError::Busy("locked".into()));
        assert!(busy.is_retryable());
        assert_eq!(busy.kind(), ErrorKind::Conflict);
        assert!(!LendingError::from(StoreError::Conflict("dup".into())).is_retryable());
    }

    #[test]
    fn invalid_rating_reports_the_value() {
        assert_eq!(
            LendingError::InvalidRating(7).to_string(),
            "Rating must be between 1 and 5, got 7"
        );
    }
}
