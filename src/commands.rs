//! Command surface of the `kreisel` binary.
//!
//! Each command maps onto one engine call and yields a JSON document for
//! stdout, so the binary stays scriptable.

use std::sync::Arc;

use chrono::NaiveDate;
use clap::Subcommand;
use kreisel_core::db::Database;
use kreisel_core::models::*;
use kreisel_core::{
    Clock, ErrorKind, LendingError, RentalLifecycleManager, ReviewEligibilityEngine, Storage,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Lending(#[from] LendingError),
    #[error("Failed to render output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CommandError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Lending(e) => Some(e.kind()),
            Self::Json(_) => None,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register or look up users
    #[command(subcommand)]
    User(UserCommand),
    /// Add or look up items in the pool
    #[command(subcommand)]
    Item(ItemCommand),
    /// Borrow an item until the given date (YYYY-MM-DD)
    Rent {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        item: Uuid,
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    /// Extend a rental by 30 days (once)
    Extend { rental: Uuid },
    /// Return a rental today
    Return { rental: Uuid },
    /// Show one rental with its current status
    Rental { rental: Uuid },
    /// List rentals, optionally for one user
    Rentals {
        #[arg(long)]
        user: Option<Uuid>,
        /// Only rentals that have not been returned
        #[arg(long, conflicts_with = "history")]
        active: bool,
        /// Only returned rentals
        #[arg(long)]
        history: bool,
    },
    /// Check whether a user may review a rental
    Eligibility {
        #[arg(long)]
        rental: Uuid,
        #[arg(long)]
        user: Uuid,
    },
    /// Review a returned rental
    Review {
        #[arg(long)]
        rental: Uuid,
        #[arg(long)]
        user: Uuid,
        /// 1 to 5
        #[arg(long, allow_hyphen_values = true)]
        rating: i32,
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// List reviews of an item
    Reviews {
        #[arg(long)]
        item: Uuid,
    },
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    Show { id: Uuid },
}

#[derive(Debug, Subcommand)]
pub enum ItemCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Show { id: Uuid },
    List,
}

#[derive(Debug, Serialize)]
struct ItemReviews {
    item_id: Uuid,
    average_rating: Option<f64>,
    reviews: Vec<Review>,
}

pub struct App {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    rentals: RentalLifecycleManager<Database>,
    reviews: ReviewEligibilityEngine<Database>,
}

impl App {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        let db = Arc::new(db);
        Self {
            rentals: RentalLifecycleManager::new(db.clone(), clock.clone()),
            reviews: ReviewEligibilityEngine::new(db.clone(), clock.clone()),
            db,
            clock,
        }
    }

    pub fn execute(&self, command: Command) -> Result<Value, CommandError> {
        let value = match command {
            Command::User(UserCommand::Add { name, email }) => {
                let input = CreateUserInput {
                    full_name: name,
                    email,
                };
                serde_json::to_value(self.db.create_user(input, self.clock.as_ref())?)?
            }
            Command::User(UserCommand::Show { id }) => {
                let user = self.db.user(id)?.ok_or(LendingError::UserNotFound)?;
                serde_json::to_value(user)?
            }
            Command::Item(ItemCommand::Add { name, description }) => {
                let input = CreateItemInput { name, description };
                serde_json::to_value(self.db.create_item(input, self.clock.as_ref())?)?
            }
            Command::Item(ItemCommand::Show { id }) => {
                let item = self.db.item(id)?.ok_or(LendingError::ItemNotFound)?;
                serde_json::to_value(item)?
            }
            Command::Item(ItemCommand::List) => serde_json::to_value(self.db.all_items()?)?,
            Command::Rent { user, item, until } => {
                let rental = self.rentals.rent_item(user, item, until)?;
                serde_json::to_value(self.rentals.view(rental))?
            }
            Command::Extend { rental } => {
                let rental = self.rentals.extend_rental(rental)?;
                serde_json::to_value(self.rentals.view(rental))?
            }
            Command::Return { rental } => {
                let rental = self.rentals.return_rental(rental)?;
                serde_json::to_value(self.rentals.view(rental))?
            }
            Command::Rental { rental } => {
                let rental = self
                    .rentals
                    .rental(rental)?
                    .ok_or(LendingError::RentalNotFound)?;
                serde_json::to_value(self.rentals.view(rental))?
            }
            Command::Rentals {
                user,
                active,
                history,
            } => {
                let filter = match (active, history) {
                    (true, _) => RentalFilter::Active,
                    (_, true) => RentalFilter::History,
                    _ => RentalFilter::All,
                };
                let rentals = match user {
                    Some(user_id) => self.rentals.rentals_for_user(user_id, filter)?,
                    None => self
                        .rentals
                        .all_rentals()?
                        .into_iter()
                        .filter(|r| filter.matches(r))
                        .collect(),
                };
                let views: Vec<RentalView> =
                    rentals.into_iter().map(|r| self.rentals.view(r)).collect();
                serde_json::to_value(views)?
            }
            Command::Eligibility { rental, user } => {
                serde_json::to_value(self.reviews.check_eligibility(rental, user)?)?
            }
            Command::Review {
                rental,
                user,
                rating,
                comment,
            } => serde_json::to_value(self.reviews.create_review(CreateReviewInput {
                rental_id: rental,
                user_id: user,
                rating,
                comment,
            })?)?,
            Command::Reviews { item } => serde_json::to_value(ItemReviews {
                item_id: item,
                average_rating: self.reviews.average_rating_for_item(item)?,
                reviews: self.reviews.reviews_for_item(item)?,
            })?,
        };
        Ok(value)
    }
}
