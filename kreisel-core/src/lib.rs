//! Lending core for Kreisel: who may borrow what, for how long, and who may
//! review it afterwards.
//!
//! The three engines are [`RentalLifecycleManager`], [`ReviewEligibilityEngine`]
//! and [`RatingAggregator`]. They are generic over a [`Storage`] backend;
//! [`db::Database`] is the SQLite one, [`MemoryStorage`] the in-process one.

pub mod clock;
pub mod db;
pub mod error;
pub mod models;
pub mod policy;
pub mod rating;
pub mod rentals;
pub mod reviews;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ErrorKind, LendingError, StoreError};
pub use rating::RatingAggregator;
pub use rentals::RentalLifecycleManager;
pub use reviews::ReviewEligibilityEngine;
pub use store::{MemoryStorage, Storage, Store};
