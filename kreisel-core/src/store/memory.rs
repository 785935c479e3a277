use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::*;

/// A [`Storage`] kept entirely in process memory.
///
/// Units of work run against a copy of the state under one lock and replace
/// it on success, so a failed operation leaves nothing behind. The same
/// uniqueness rules as the SQLite schema are enforced on save.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

#[derive(Debug, Clone, Default)]
struct State {
    users: HashMap<Uuid, User>,
    items: HashMap<Uuid, Item>,
    rentals: HashMap<Uuid, Rental>,
    reviews: HashMap<Uuid, Review>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a rental as-is, skipping every rule. Lets tests build states
    /// the engines would never produce.
    pub fn insert_rental_unchecked(&self, rental: Rental) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.rentals.insert(rental.id, rental);
    }

    /// Writes an item as-is, including its derived fields.
    pub fn insert_item_unchecked(&self, item: Item) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.items.insert(item.id, item);
    }
}

impl Storage for MemoryStorage {
    fn atomically<T, F>(&self, mut op: F) -> Result<T, LendingError>
    where
        F: FnMut(&dyn Store) -> Result<T, LendingError>,
    {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = MemoryTx {
            state: RefCell::new(state.clone()),
        };
        let value = op(&tx)?;
        *state = tx.state.into_inner();
        Ok(value)
    }
}

struct MemoryTx {
    state: RefCell<State>,
}

fn sorted_rentals<'a>(rentals: impl Iterator<Item = &'a Rental>) -> Vec<Rental> {
    let mut rentals: Vec<Rental> = rentals.cloned().collect();
    rentals.sort_by(|a, b| b.rental_date.cmp(&a.rental_date).then(a.id.cmp(&b.id)));
    rentals
}

impl UserStore for MemoryTx {
    fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.borrow().users.get(&id).cloned())
    }

    fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state
            .users
            .values()
            .any(|u| u.email == user.email && u.id != user.id)
        {
            return Err(StoreError::Conflict(format!("email {} taken", user.email)));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }
}

impl ItemStore for MemoryTx {
    fn item_by_id(&self, id: Uuid) -> Result<Option<Item>, StoreError> {
        Ok(self.state.borrow().items.get(&id).cloned())
    }

    fn all_items(&self) -> Result<Vec<Item>, StoreError> {
        let mut items: Vec<Item> = self.state.borrow().items.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    fn save_item(&self, item: &Item) -> Result<(), StoreError> {
        self.state.borrow_mut().items.insert(item.id, item.clone());
        Ok(())
    }
}

impl RentalStore for MemoryTx {
    fn rental_by_id(&self, id: Uuid) -> Result<Option<Rental>, StoreError> {
        Ok(self.state.borrow().rentals.get(&id).cloned())
    }

    fn all_rentals(&self) -> Result<Vec<Rental>, StoreError> {
        Ok(sorted_rentals(self.state.borrow().rentals.values()))
    }

    fn rentals_by_user(&self, user_id: Uuid) -> Result<Vec<Rental>, StoreError> {
        let state = self.state.borrow();
        Ok(sorted_rentals(
            state.rentals.values().filter(|r| r.user_id == user_id),
        ))
    }

    fn save_rental(&self, rental: &Rental) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if rental.is_active()
            && state
                .rentals
                .values()
                .any(|r| r.item_id == rental.item_id && r.is_active() && r.id != rental.id)
        {
            return Err(StoreError::Conflict(format!(
                "item {} already has an open rental",
                rental.item_id
            )));
        }
        state.rentals.insert(rental.id, rental.clone());
        Ok(())
    }

    fn active_count_by_user(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let count = self
            .state
            .borrow()
            .rentals
            .values()
            .filter(|r| r.user_id == user_id && r.is_active())
            .count();
        Ok(count as i64)
    }

    fn active_by_item(&self, item_id: Uuid) -> Result<Option<Rental>, StoreError> {
        Ok(self
            .state
            .borrow()
            .rentals
            .values()
            .find(|r| r.item_id == item_id && r.is_active())
            .cloned())
    }
}

impl ReviewStore for MemoryTx {
    fn review_by_rental_id(&self, rental_id: Uuid) -> Result<Option<Review>, StoreError> {
        Ok(self
            .state
            .borrow()
            .reviews
            .values()
            .find(|r| r.rental_id == rental_id)
            .cloned())
    }

    fn reviews_by_item_id(&self, item_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let mut reviews: Vec<Review> = self
            .state
            .borrow()
            .reviews
            .values()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    fn save_review(&self, review: &Review) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state.reviews.values().any(|r| r.rental_id == review.rental_id) {
            return Err(StoreError::Conflict(format!(
                "rental {} already reviewed",
                review.rental_id
            )));
        }
        state.reviews.insert(review.id, review.clone());
        Ok(())
    }

    fn average_rating_for_item(&self, item_id: Uuid) -> Result<Option<f64>, StoreError> {
        let state = self.state.borrow();
        let ratings: Vec<i32> = state
            .reviews
            .values()
            .filter(|r| r.item_id == item_id)
            .map(|r| r.rating)
            .collect();
        if ratings.is_empty() {
            return Ok(None);
        }
        let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
        Ok(Some(sum as f64 / ratings.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::clock::{Clock, FixedClock};

    fn clock() -> FixedClock {
        FixedClock::on(NaiveDate::from_ymd_opt(2025, 4, 30).unwrap())
    }

    fn seeded() -> (MemoryStorage, User, Item) {
        let storage = MemoryStorage::new();
        let clock = clock();
        let user = storage
            .create_user(
                CreateUserInput {
                    full_name: "Ada".into(),
                    email: "ada@example.org".into(),
                },
                &clock,
            )
            .unwrap();
        let item = storage
            .create_item(
                CreateItemInput {
                    name: "Tent".into(),
                    description: None,
                },
                &clock,
            )
            .unwrap();
        (storage, user, item)
    }

    #[test]
    fn creation_timestamps_come_from_the_clock() {
        let (storage, user, item) = seeded();
        let now = clock().now();
        assert_eq!(user.created_at, now);
        assert_eq!(item.created_at, now);
        assert_eq!(storage.user(user.id).unwrap().unwrap().created_at, now);
        assert_eq!(storage.item(item.id).unwrap().unwrap().created_at, now);
    }

    fn rental(user: &User, item: &Item) -> Rental {
        let day = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        Rental::open(user.id, item.id, day, day.succ_opt().unwrap())
    }

    #[test]
    fn failed_unit_of_work_leaves_no_writes() {
        let (storage, user, item) = seeded();
        let result: Result<(), LendingError> = storage.atomically(|store| {
            store.save_rental(&rental(&user, &item))?;
            Err(LendingError::AlreadyRented)
        });

        assert!(result.is_err());
        let count = storage
            .atomically(|store| Ok(store.active_count_by_user(user.id)?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn second_open_rental_for_item_conflicts() {
        let (storage, user, item) = seeded();
        let result: Result<(), LendingError> = storage.atomically(|store| {
            store.save_rental(&rental(&user, &item))?;
            store.save_rental(&rental(&user, &item))?;
            Ok(())
        });

        assert!(matches!(
            result,
            Err(LendingError::Store(StoreError::Conflict(_)))
        ));
    }

    #[test]
    fn average_is_none_without_reviews() {
        let (storage, _, item) = seeded();
        let average = storage
            .atomically(|store| Ok(store.average_rating_for_item(item.id)?))
            .unwrap();
        assert_eq!(average, None);
    }
}
