//! Lending rules that do not depend on stored state.

use chrono::{Days, NaiveDate};

use crate::error::LendingError;

/// Upper bound on a user's simultaneously open rentals.
pub const MAX_ACTIVE_RENTALS: i64 = 5;
/// Furthest an initial end date may lie after the rental date.
pub const MAX_RENTAL_DAYS: u64 = 90;
/// Days added by the single allowed extension.
pub const EXTENSION_DAYS: u64 = 30;
pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

/// Checks a requested end date against `today`.
///
/// A same-day end date is rejected: the shortest loan is one day.
pub fn validate_end_date(today: NaiveDate, end_date: Option<NaiveDate>) -> Result<NaiveDate, LendingError> {
    let end_date = end_date.ok_or(LendingError::MissingEndDate)?;
    if end_date < today {
        return Err(LendingError::EndDateInPast);
    }
    if end_date == today {
        return Err(LendingError::EndDateNotFuture);
    }
    if end_date > today + Days::new(MAX_RENTAL_DAYS) {
        return Err(LendingError::end_date_too_far());
    }
    Ok(end_date)
}

pub fn extended_end_date(end_date: NaiveDate) -> NaiveDate {
    end_date + Days::new(EXTENSION_DAYS)
}

pub fn validate_rating(rating: i32) -> Result<i32, LendingError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(rating)
    } else {
        Err(LendingError::InvalidRating(rating))
    }
}
