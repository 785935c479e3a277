//! Gatekeeping for reviews: only the borrower, only after the return, only once.

use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{LendingError, StoreError};
use crate::models::*;
use crate::policy;
use crate::rating;
use crate::store::{Storage, Store};

/// Why a rental cannot be reviewed, in the order the rules are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ineligible {
    RentalNotFound,
    NotYourRental,
    NotReturned,
    AlreadyReviewed(Uuid),
}

impl Ineligible {
    fn reason(&self) -> &'static str {
        match self {
            Self::RentalNotFound => "Rental not found",
            Self::NotYourRental => "This rental doesn't belong to you",
            Self::NotReturned => "You need to return the item before reviewing",
            Self::AlreadyReviewed(_) => "You have already reviewed this rental",
        }
    }

    fn into_error(self) -> LendingError {
        match self {
            Self::RentalNotFound => LendingError::RentalNotFound,
            Self::NotYourRental => LendingError::NotYourRental,
            Self::NotReturned => LendingError::ItemNotReturned,
            Self::AlreadyReviewed(_) => LendingError::AlreadyReviewed,
        }
    }
}

const ELIGIBLE_REASON: &str = "You can review this rental";

/// Evaluates the eligibility rules, short-circuiting on the first that fails.
fn evaluate(
    store: &dyn Store,
    rental_id: Uuid,
    user_id: Uuid,
) -> Result<Result<Rental, Ineligible>, StoreError> {
    let Some(rental) = store.rental_by_id(rental_id)? else {
        return Ok(Err(Ineligible::RentalNotFound));
    };
    if rental.user_id != user_id {
        return Ok(Err(Ineligible::NotYourRental));
    }
    if rental.is_active() {
        return Ok(Err(Ineligible::NotReturned));
    }
    if let Some(existing) = store.review_by_rental_id(rental_id)? {
        return Ok(Err(Ineligible::AlreadyReviewed(existing.id)));
    }
    Ok(Ok(rental))
}

pub struct ReviewEligibilityEngine<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for ReviewEligibilityEngine<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: Storage> ReviewEligibilityEngine<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Read-only: reports whether `user_id` may review `rental_id` and why not.
    pub fn check_eligibility(
        &self,
        rental_id: Uuid,
        user_id: Uuid,
    ) -> Result<ReviewEligibility, LendingError> {
        let outcome = self
            .storage
            .read(|store| Ok(evaluate(store, rental_id, user_id)?))?;

        let eligibility = match outcome {
            Ok(_) => ReviewEligibility {
                can_review: true,
                reason: ELIGIBLE_REASON.to_string(),
                existing_review_id: None,
            },
            Err(ineligible) => ReviewEligibility {
                can_review: false,
                reason: ineligible.reason().to_string(),
                existing_review_id: match ineligible {
                    Ineligible::AlreadyReviewed(id) => Some(id),
                    _ => None,
                },
            },
        };
        tracing::debug!(%rental_id, %user_id, can_review = eligibility.can_review, "Eligibility checked");
        Ok(eligibility)
    }

    /// Writes the review and refreshes the item's rating aggregate in the
    /// same unit of work.
    pub fn create_review(&self, input: CreateReviewInput) -> Result<Review, LendingError> {
        let CreateReviewInput {
            rental_id,
            user_id,
            rating,
            comment,
        } = input;
        let now = self.clock.now();

        let result = policy::validate_rating(rating).and_then(|rating| {
            self.storage.atomically(|store| {
                let rental = evaluate(store, rental_id, user_id)?.map_err(Ineligible::into_error)?;
                let user = store
                    .user_by_id(user_id)?
                    .ok_or(LendingError::UserNotFound)?;

                let review = Review {
                    id: Uuid::new_v4(),
                    rental_id: rental.id,
                    item_id: rental.item_id,
                    user_id: user.id,
                    rating,
                    comment: comment.clone(),
                    created_at: now,
                };
                store.save_review(&review).map_err(|e| match e {
                    StoreError::Conflict(_) => LendingError::AlreadyReviewed,
                    other => other.into(),
                })?;

                rating::recompute_in(store, rental.item_id)?;
                Ok(review)
            })
        });

        match &result {
            Ok(review) => tracing::info!(
                review_id = %review.id,
                %rental_id,
                item_id = %review.item_id,
                rating = review.rating,
                "Review created"
            ),
            Err(e) => tracing::warn!(%rental_id, %user_id, kind = ?e.kind(), "Review refused: {}", e),
        }
        result
    }

    /// Reviews of an item, newest first.
    pub fn reviews_for_item(&self, item_id: Uuid) -> Result<Vec<Review>, LendingError> {
        self.storage.read(|store| Ok(store.reviews_by_item_id(item_id)?))
    }

    /// Mean rating of an item, `None` if it has never been reviewed.
    pub fn average_rating_for_item(&self, item_id: Uuid) -> Result<Option<f64>, LendingError> {
        self.storage.read(|store| Ok(store.average_rating_for_item(item_id)?))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Days, NaiveDate};

    use super::*;
    use crate::clock::FixedClock;
    use crate::rentals::RentalLifecycleManager;
    use crate::store::MemoryStorage;

    struct Fixture {
        storage: Arc<MemoryStorage>,
        rentals: RentalLifecycleManager<MemoryStorage>,
        reviews: ReviewEligibilityEngine<MemoryStorage>,
        user: User,
        item: Item,
    }

    fn fixture() -> Fixture {
        let today = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::on(today));
        let user = storage
            .create_user(
                CreateUserInput {
                    full_name: "Grace".into(),
                    email: "grace@example.org".into(),
                },
                clock.as_ref(),
            )
            .unwrap();
        let item = storage
            .create_item(
                CreateItemInput {
                    name: "Camera".into(),
                    description: Some("Mirrorless".into()),
                },
                clock.as_ref(),
            )
            .unwrap();
        Fixture {
            rentals: RentalLifecycleManager::new(storage.clone(), clock.clone()),
            reviews: ReviewEligibilityEngine::new(storage.clone(), clock),
            storage,
            user,
            item,
        }
    }

    fn returned_rental(f: &Fixture) -> Rental {
        let today = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let rental = f
            .rentals
            .rent_item(f.user.id, f.item.id, Some(today + Days::new(3)))
            .unwrap();
        f.rentals.return_rental(rental.id).unwrap()
    }

    fn review(f: &Fixture, rental_id: Uuid, rating: i32) -> Result<Review, LendingError> {
        f.reviews.create_review(CreateReviewInput {
            rental_id,
            user_id: f.user.id,
            rating,
            comment: "fine".into(),
        })
    }

    #[test]
    fn eligibility_reasons_in_rule_order() {
        let f = fixture();

        let missing = f.reviews.check_eligibility(Uuid::new_v4(), f.user.id).unwrap();
        assert!(!missing.can_review);
        assert_eq!(missing.reason, "Rental not found");

        let today = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let active = f
            .rentals
            .rent_item(f.user.id, f.item.id, Some(today + Days::new(3)))
            .unwrap();

        let stranger = f.reviews.check_eligibility(active.id, Uuid::new_v4()).unwrap();
        assert_eq!(stranger.reason, "This rental doesn't belong to you");

        let not_returned = f.reviews.check_eligibility(active.id, f.user.id).unwrap();
        assert!(!not_returned.can_review);
        assert_eq!(not_returned.reason, "You need to return the item before reviewing");

        f.rentals.return_rental(active.id).unwrap();
        let eligible = f.reviews.check_eligibility(active.id, f.user.id).unwrap();
        assert!(eligible.can_review);
        assert_eq!(eligible.reason, "You can review this rental");
        assert_eq!(eligible.existing_review_id, None);
    }

    #[test]
    fn second_review_is_refused_and_reported() {
        let f = fixture();
        let rental = returned_rental(&f);

        let first = review(&f, rental.id, 4).unwrap();
        let err = review(&f, rental.id, 2).unwrap_err();
        assert!(matches!(err, LendingError::AlreadyReviewed));

        let eligibility = f.reviews.check_eligibility(rental.id, f.user.id).unwrap();
        assert!(!eligibility.can_review);
        assert_eq!(eligibility.existing_review_id, Some(first.id));

        let item = f.storage.item(f.item.id).unwrap().unwrap();
        assert_eq!(item.review_count, 1);
        assert_eq!(item.average_rating, 4.0);
    }

    #[test]
    fn create_review_maps_rules_to_errors() {
        let f = fixture();
        assert!(matches!(
            review(&f, Uuid::new_v4(), 3).unwrap_err(),
            LendingError::RentalNotFound
        ));

        let today = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let active = f
            .rentals
            .rent_item(f.user.id, f.item.id, Some(today + Days::new(3)))
            .unwrap();
        let err = review(&f, active.id, 3).unwrap_err();
        assert!(matches!(err, LendingError::ItemNotReturned));
        assert_eq!(err.to_string(), "Item must be returned before reviewing");

        f.rentals.return_rental(active.id).unwrap();
        let err = f
            .reviews
            .create_review(CreateReviewInput {
                rental_id: active.id,
                user_id: Uuid::new_v4(),
                rating: 3,
                comment: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, LendingError::NotYourRental));
    }

    #[test]
    fn out_of_range_rating_writes_nothing() {
        let f = fixture();
        let rental = returned_rental(&f);

        for rating in [0, 6, -1] {
            assert!(matches!(
                review(&f, rental.id, rating).unwrap_err(),
                LendingError::InvalidRating(r) if r == rating
            ));
        }
        assert!(f.reviews.check_eligibility(rental.id, f.user.id).unwrap().can_review);
        assert!(f.reviews.reviews_for_item(f.item.id).unwrap().is_empty());
    }

    #[test]
    fn deleted_reviewer_is_user_not_found() {
        let f = fixture();
        let today = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let ghost = Uuid::new_v4();
        let mut rental = Rental::open(ghost, f.item.id, today - Days::new(5), today);
        rental.return_date = Some(today);
        f.storage.insert_rental_unchecked(rental.clone());

        let err = f
            .reviews
            .create_review(CreateReviewInput {
                rental_id: rental.id,
                user_id: ghost,
                rating: 5,
                comment: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, LendingError::UserNotFound));
    }

    #[test]
    fn review_updates_item_aggregate() {
        let f = fixture();
        let first = returned_rental(&f);
        review(&f, first.id, 5).unwrap();
        let second = returned_rental(&f);
        review(&f, second.id, 2).unwrap();

        let item = f.storage.item(f.item.id).unwrap().unwrap();
        assert_eq!(item.review_count, 2);
        assert_eq!(item.average_rating, 3.5);
        assert_eq!(f.reviews.average_rating_for_item(f.item.id).unwrap(), Some(3.5));
        assert_eq!(f.reviews.reviews_for_item(f.item.id).unwrap().len(), 2);
    }
}
