//! Persistence contracts consumed by the lending engines.
//!
//! Engines never hold a store across calls. Each operation asks a [`Storage`]
//! for one atomic unit of work and receives a [`Store`] handle that is only
//! valid inside it; everything written through that handle commits together
//! or not at all.

mod memory;

use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{LendingError, StoreError};
use crate::models::*;

pub use memory::MemoryStorage;

pub trait UserStore {
    fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    fn save_user(&self, user: &User) -> Result<(), StoreError>;
}

pub trait ItemStore {
    fn item_by_id(&self, id: Uuid) -> Result<Option<Item>, StoreError>;
    fn all_items(&self) -> Result<Vec<Item>, StoreError>;
    fn save_item(&self, item: &Item) -> Result<(), StoreError>;
}

pub trait RentalStore {
    fn rental_by_id(&self, id: Uuid) -> Result<Option<Rental>, StoreError>;
    fn all_rentals(&self) -> Result<Vec<Rental>, StoreError>;
    fn rentals_by_user(&self, user_id: Uuid) -> Result<Vec<Rental>, StoreError>;
    /// Inserts or updates a rental. Inserting a second open rental for an
    /// item fails with [`StoreError::Conflict`].
    fn save_rental(&self, rental: &Rental) -> Result<(), StoreError>;
    fn active_count_by_user(&self, user_id: Uuid) -> Result<i64, StoreError>;
    fn active_by_item(&self, item_id: Uuid) -> Result<Option<Rental>, StoreError>;
}

pub trait ReviewStore {
    fn review_by_rental_id(&self, rental_id: Uuid) -> Result<Option<Review>, StoreError>;
    fn reviews_by_item_id(&self, item_id: Uuid) -> Result<Vec<Review>, StoreError>;
    /// Inserts a review. A second review for the same rental fails with
    /// [`StoreError::Conflict`].
    fn save_review(&self, review: &Review) -> Result<(), StoreError>;
    /// Mean rating over the item's reviews, `None` when it has none.
    fn average_rating_for_item(&self, item_id: Uuid) -> Result<Option<f64>, StoreError>;
}

/// All four collections, as seen from inside one unit of work.
pub trait Store: UserStore + ItemStore + RentalStore + ReviewStore {}

impl<T: UserStore + ItemStore + RentalStore + ReviewStore> Store for T {}

/// Hands out atomic units of work over the collections.
pub trait Storage: Send + Sync {
    /// Runs `op` against a consistent view of the store and commits its
    /// writes only if it returns `Ok`. Concurrent units of work touching the
    /// same rows are serialized. `op` may be invoked more than once when the
    /// backend asks for a retry, so it must not have side effects outside
    /// the store.
    fn atomically<T, F>(&self, op: F) -> Result<T, LendingError>
    where
        F: FnMut(&dyn Store) -> Result<T, LendingError>;

    /// Runs a read-only `op`. Must not be used for writes: backends are free
    /// to skip the write lock here.
    fn read<T, F>(&self, op: F) -> Result<T, LendingError>
    where
        F: FnMut(&dyn Store) -> Result<T, LendingError>,
    {
        self.atomically(op)
    }

    fn create_user(&self, input: CreateUserInput, clock: &dyn Clock) -> Result<User, LendingError> {
        let user = User::new(input, clock.now());
        self.atomically(|store| {
            store.save_user(&user)?;
            Ok(user.clone())
        })
    }

    fn user(&self, id: Uuid) -> Result<Option<User>, LendingError> {
        self.read(|store| Ok(store.user_by_id(id)?))
    }

    fn create_item(&self, input: CreateItemInput, clock: &dyn Clock) -> Result<Item, LendingError> {
        let item = Item::new(input, clock.now());
        self.atomically(|store| {
            store.save_item(&item)?;
            Ok(item.clone())
        })
    }

    fn item(&self, id: Uuid) -> Result<Option<Item>, LendingError> {
        self.read(|store| Ok(store.item_by_id(id)?))
    }

    fn all_items(&self) -> Result<Vec<Item>, LendingError> {
        self.read(|store| Ok(store.all_items()?))
    }
}
