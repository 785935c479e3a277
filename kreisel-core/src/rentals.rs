//! Borrow, extend and return.
//!
//! ```text
//! rent_item ──▶ ACTIVE ──extend_rental──▶ ACTIVE (extended) ──return_rental──▶ RETURNED
//!                  └────────────────────return_rental──────────────────────────┘
//! ```
//!
//! `OVERDUE` is a read-time label for an active rental past its end date, not
//! a state. Item availability is flipped in the same unit of work that opens
//! or closes the rental, so the flag and the open rental never disagree.

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{LendingError, StoreError};
use crate::models::*;
use crate::policy::{self, MAX_ACTIVE_RENTALS};
use crate::store::Storage;

pub struct RentalLifecycleManager<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for RentalLifecycleManager<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: Storage> RentalLifecycleManager<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Lends `item_id` to `user_id` from today until `end_date`.
    ///
    /// Checks run in a fixed order and the first failure wins: user, item,
    /// availability, the user's open-rental limit, the end date, and finally
    /// the item's open rentals, in case the availability flag has drifted.
    pub fn rent_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        end_date: Option<NaiveDate>,
    ) -> Result<Rental, LendingError> {
        let today = self.clock.today();

        let result = self.storage.atomically(|store| {
            store
                .user_by_id(user_id)?
                .ok_or(LendingError::UserNotFound)?;
            let mut item = store
                .item_by_id(item_id)?
                .ok_or(LendingError::ItemNotFound)?;

            if !item.available {
                return Err(LendingError::ItemUnavailable);
            }
            if store.active_count_by_user(user_id)? >= MAX_ACTIVE_RENTALS {
                return Err(LendingError::rental_limit());
            }
            let end_date = policy::validate_end_date(today, end_date)?;
            if store.active_by_item(item_id)?.is_some() {
                return Err(LendingError::AlreadyRented);
            }

            let rental = Rental::open(user_id, item_id, today, end_date);
            store.save_rental(&rental).map_err(|e| match e {
                StoreError::Conflict(_) => LendingError::AlreadyRented,
                other => other.into(),
            })?;

            item.available = false;
            store.save_item(&item)?;

            Ok(rental)
        });

        match &result {
            Ok(rental) => tracing::info!(
                rental_id = %rental.id,
                %user_id,
                %item_id,
                end_date = %rental.end_date,
                "Item rented"
            ),
            Err(e) => tracing::warn!(%user_id, %item_id, kind = ?e.kind(), "Rental refused: {}", e),
        }
        result
    }

    /// Pushes the end date back once. The new end date is not checked
    /// against the initial booking horizon.
    pub fn extend_rental(&self, rental_id: Uuid) -> Result<Rental, LendingError> {
        let result = self.storage.atomically(|store| {
            let mut rental = store
                .rental_by_id(rental_id)?
                .ok_or(LendingError::RentalNotFound)?;

            if !rental.is_active() {
                return Err(LendingError::AlreadyReturned);
            }
            if rental.extended {
                return Err(LendingError::AlreadyExtended);
            }

            rental.end_date = policy::extended_end_date(rental.end_date);
            rental.extended = true;
            store.save_rental(&rental)?;

            Ok(rental)
        });

        match &result {
            Ok(rental) => tracing::info!(%rental_id, end_date = %rental.end_date, "Rental extended"),
            Err(e) => tracing::warn!(%rental_id, kind = ?e.kind(), "Extension refused: {}", e),
        }
        result
    }

    /// Closes the rental today and puts the item back into the pool.
    pub fn return_rental(&self, rental_id: Uuid) -> Result<Rental, LendingError> {
        let today = self.clock.today();

        let result = self.storage.atomically(|store| {
            let mut rental = store
                .rental_by_id(rental_id)?
                .ok_or(LendingError::RentalNotFound)?;

            if !rental.is_active() {
                return Err(LendingError::AlreadyReturned);
            }

            rental.return_date = Some(today);
            store.save_rental(&rental)?;

            let mut item = store
                .item_by_id(rental.item_id)?
                .ok_or(LendingError::ItemNotFound)?;
            item.available = true;
            store.save_item(&item)?;

            Ok(rental)
        });

        match &result {
            Ok(rental) => tracing::info!(%rental_id, item_id = %rental.item_id, "Rental returned"),
            Err(e) => tracing::warn!(%rental_id, kind = ?e.kind(), "Return refused: {}", e),
        }
        result
    }

    // ============================================================
    // Queries
    // ============================================================

    pub fn rental(&self, rental_id: Uuid) -> Result<Option<Rental>, LendingError> {
        self.storage.read(|store| Ok(store.rental_by_id(rental_id)?))
    }

    pub fn all_rentals(&self) -> Result<Vec<Rental>, LendingError> {
        self.storage.read(|store| Ok(store.all_rentals()?))
    }

    /// A user's rentals, newest first.
    pub fn rentals_for_user(
        &self,
        user_id: Uuid,
        filter: RentalFilter,
    ) -> Result<Vec<Rental>, LendingError> {
        tracing::debug!(%user_id, ?filter, "Listing rentals");
        let rentals = self
            .storage
            .read(|store| Ok(store.rentals_by_user(user_id)?))?;
        Ok(rentals.into_iter().filter(|r| filter.matches(r)).collect())
    }

    pub fn active_rentals_for_user(&self, user_id: Uuid) -> Result<Vec<Rental>, LendingError> {
        self.rentals_for_user(user_id, RentalFilter::Active)
    }

    pub fn rental_history_for_user(&self, user_id: Uuid) -> Result<Vec<Rental>, LendingError> {
        self.rentals_for_user(user_id, RentalFilter::History)
    }

    pub fn active_rental_for_item(&self, item_id: Uuid) -> Result<Option<Rental>, LendingError> {
        self.storage.read(|store| Ok(store.active_by_item(item_id)?))
    }

    /// Attaches today's status to a rental.
    pub fn view(&self, rental: Rental) -> RentalView {
        let status = rental.status_on(self.clock.today());
        RentalView { rental, status }
    }
}
