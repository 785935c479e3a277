//! Keeps an item's average rating and review count in step with its reviews.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::LendingError;
use crate::models::Item;
use crate::store::{Storage, Store};

pub struct RatingAggregator<S> {
    storage: Arc<S>,
}

impl<S: Storage> RatingAggregator<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Recomputes the aggregate in its own unit of work.
    pub fn recompute(&self, item_id: Uuid) -> Result<Item, LendingError> {
        self.storage
            .atomically(|store| recompute_in(store, item_id))
    }
}

/// Recomputes the aggregate inside an existing unit of work.
///
/// The mean comes from the store and falls back to `0.0` when the item has
/// no reviews; the count is a full recount rather than an increment.
pub fn recompute_in(store: &dyn Store, item_id: Uuid) -> Result<Item, LendingError> {
    let mut item = store
        .item_by_id(item_id)?
        .ok_or(LendingError::ItemNotFound)?;

    item.average_rating = store.average_rating_for_item(item_id)?.unwrap_or(0.0);
    item.review_count = store.reviews_by_item_id(item_id)?.len() as i64;
    store.save_item(&item)?;

    tracing::debug!(
        %item_id,
        average_rating = item.average_rating,
        review_count = item.review_count,
        "Item rating recomputed"
    );
    Ok(item)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::clock::FixedClock;
    use crate::models::*;
    use crate::store::MemoryStorage;

    fn review_for(item: &Item, rating: i32) -> Review {
        Review {
            id: Uuid::new_v4(),
            rental_id: Uuid::new_v4(),
            item_id: item.id,
            user_id: Uuid::new_v4(),
            rating,
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    fn setup() -> (Arc<MemoryStorage>, Item) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2025, 1, 20).unwrap());
        let item = storage
            .create_item(
                CreateItemInput {
                    name: "Snowboard".into(),
                    description: None,
                },
                &clock,
            )
            .unwrap();
        (storage, item)
    }

    #[test]
    fn no_reviews_writes_zero_not_stale_values() {
        let (storage, mut item) = setup();
        item.average_rating = 3.5;
        item.review_count = 2;
        storage.insert_item_unchecked(item.clone());

        let updated = RatingAggregator::new(storage.clone())
            .recompute(item.id)
            .unwrap();

        assert_eq!(updated.average_rating, 0.0);
        assert_eq!(updated.review_count, 0);
        assert_eq!(storage.item(item.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn mean_and_count_follow_reviews() {
        let (storage, item) = setup();
        storage
            .atomically(|store| {
                for rating in [5, 4, 2] {
                    store.save_review(&review_for(&item, rating))?;
                }
                Ok(())
            })
            .unwrap();

        let updated = RatingAggregator::new(storage).recompute(item.id).unwrap();

        assert!((updated.average_rating - 11.0 / 3.0).abs() < 1e-9);
        assert_eq!(updated.review_count, 3);
    }

    #[test]
    fn unknown_item_is_not_found() {
        let (storage, _) = setup();
        let err = RatingAggregator::new(storage)
            .recompute(Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, LendingError::ItemNotFound));
    }
}
