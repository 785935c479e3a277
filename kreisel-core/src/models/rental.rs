use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single loan of an item to a user.
///
/// A rental is *active* while `return_date` is `None`. The only mutations after
/// creation are one extension (`end_date`, `extended`) and the return
/// (`return_date`); once returned, a rental never changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub rental_date: NaiveDate,
    pub end_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub extended: bool,
}

impl Rental {
    /// Opens a new, unextended rental starting on `rental_date`.
    pub fn open(user_id: Uuid, item_id: Uuid, rental_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            item_id,
            rental_date,
            end_date,
            return_date: None,
            extended: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.return_date.is_none()
    }

    /// Status as observed on `today`.
    pub fn status_on(&self, today: NaiveDate) -> RentalStatus {
        if self.return_date.is_some() {
            RentalStatus::Returned
        } else if self.end_date < today {
            RentalStatus::Overdue
        } else {
            RentalStatus::Active
        }
    }
}

/// Read-time label for a rental.
///
/// - `Active`: Not returned and still within its end date
/// - `Overdue`: Not returned and past its end date
/// - `Returned`: Returned, regardless of the end date
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RentalStatus {
    Active,
    Overdue,
    Returned,
}

impl RentalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Overdue => "OVERDUE",
            Self::Returned => "RETURNED",
        }
    }
}

/// A rental together with its status on the day it was read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalView {
    #[serde(flatten)]
    pub rental: Rental,
    pub status: RentalStatus,
}

/// Which of a user's rentals to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RentalFilter {
    #[default]
    All,
    Active,
    History,
}

impl RentalFilter {
    pub fn matches(&self, rental: &Rental) -> bool {
        match self {
            Self::All => true,
            Self::Active => rental.is_active(),
            Self::History => !rental.is_active(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rental_ending(end_date: NaiveDate) -> Rental {
        Rental::open(Uuid::new_v4(), Uuid::new_v4(), date(2025, 3, 1), end_date)
    }

    #[test]
    fn unreturned_rental_within_end_date_is_active() {
        let rental = rental_ending(date(2025, 3, 10));
        assert_eq!(rental.status_on(date(2025, 3, 10)), RentalStatus::Active);
    }

    #[test]
    fn unreturned_rental_past_end_date_is_overdue() {
        let rental = rental_ending(date(2025, 3, 9));
        assert_eq!(rental.status_on(date(2025, 3, 10)), RentalStatus::Overdue);
    }

    #[test]
    fn returned_rental_ignores_end_date() {
        let mut rental = rental_ending(date(2025, 3, 9));
        rental.return_date = Some(date(2025, 3, 10));
        assert_eq!(rental.status_on(date(2025, 3, 10)), RentalStatus::Returned);
        assert_eq!(rental.status_on(date(2030, 1, 1)), RentalStatus::Returned);
    }

    #[test]
    fn status_serializes_in_upper_case() {
        let json = serde_json::to_string(&RentalStatus::Overdue).unwrap();
        assert_eq!(json, "\"OVERDUE\"");
        assert_eq!(RentalStatus::Returned.as_str(), "RETURNED");
    }

    #[test]
    fn filter_splits_active_and_history() {
        let active = rental_ending(date(2025, 3, 9));
        let mut returned = rental_ending(date(2025, 3, 9));
        returned.return_date = Some(date(2025, 3, 5));

        assert!(RentalFilter::Active.matches(&active));
        assert!(!RentalFilter::Active.matches(&returned));
        assert!(RentalFilter::History.matches(&returned));
        assert!(RentalFilter::All.matches(&active) && RentalFilter::All.matches(&returned));
    }
}
