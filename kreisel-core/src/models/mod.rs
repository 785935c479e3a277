//! Domain models for Kreisel.
//!
//! # Core Concepts
//!
//! - [`User`]: A registered borrower. Only looked up by the lending engines.
//! - [`Item`]: A pooled piece of equipment. Its availability flag and rating
//!   aggregate are derived state, owned by the engines rather than by callers.
//! - [`Rental`]: One loan of one item to one user. Its [`RentalStatus`] is
//!   computed from the dates on read and never stored.
//! - [`Review`]: A rating left after a rental is returned, at most one per rental.

mod item;
mod rental;
mod review;
mod user;

pub use item::*;
pub use rental::*;
pub use review::*;
pub use user::*;
