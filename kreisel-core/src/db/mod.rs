mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::error::{LendingError, StoreError};
use crate::models::*;
use crate::store::{ItemStore, RentalStore, ReviewStore, Storage, Store, UserStore};

/// Attempts per unit of work before a busy database is reported as a conflict.
const MAX_TX_ATTEMPTS: u32 = 3;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DATE_FORMAT: &str = "%Y-%m-%d";

const USER_COLUMNS: &str = "id, full_name, email, created_at";
const ITEM_COLUMNS: &str = "id, name, description, available, average_rating, review_count, created_at";
const RENTAL_COLUMNS: &str = "id, user_id, item_id, rental_date, end_date, return_date, extended";
const REVIEW_COLUMNS: &str = "id, rental_id, item_id, user_id, rating, comment, created_at";

/// SQLite-backed [`Storage`].
///
/// Every unit of work runs in a `BEGIN IMMEDIATE` transaction, so the
/// write lock is taken before the first read and check-then-act sequences
/// cannot interleave, within this process or across processes sharing the
/// file. Read-only queries use a deferred transaction and do not wait for
/// writers on other connections.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::configure(conn)
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories_data_path()?;
        Self::open(dirs)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        schema::run_migrations(&conn)
    }

    /// Runs `op` in a transaction of the given kind, retrying while the
    /// database reports busy.
    fn run<T, F>(&self, behavior: TransactionBehavior, mut op: F) -> Result<T, LendingError>
    where
        F: FnMut(&dyn Store) -> Result<T, LendingError>,
    {
        let mut attempt = 1;
        loop {
            match self.try_once(behavior, &mut op) {
                Err(err) if err.is_retryable() => {
                    if attempt >= MAX_TX_ATTEMPTS {
                        tracing::warn!("Giving up after {} busy attempts: {}", attempt, err);
                        return Err(LendingError::Conflict { attempts: attempt });
                    }
                    tracing::debug!("Database busy on attempt {}, retrying", attempt);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn try_once<T, F>(&self, behavior: TransactionBehavior, op: &mut F) -> Result<T, LendingError>
    where
        F: FnMut(&dyn Store) -> Result<T, LendingError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn
            .transaction_with_behavior(behavior)
            .map_err(StoreError::from)?;
        // Dropping `tx` on the error path rolls back.
        let value = op(&SqliteStore { conn: &tx })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl Storage for Database {
    fn atomically<T, F>(&self, op: F) -> Result<T, LendingError>
    where
        F: FnMut(&dyn Store) -> Result<T, LendingError>,
    {
        self.run(TransactionBehavior::Immediate, op)
    }

    /// Deferred transaction: readers share the file with an open writer.
    fn read<T, F>(&self, op: F) -> Result<T, LendingError>
    where
        F: FnMut(&dyn Store) -> Result<T, LendingError>,
    {
        self.run(TransactionBehavior::Deferred, op)
    }
}

fn directories_data_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "kreisel")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("kreisel.db"))
}

/// One open transaction, viewed through the store contracts.
struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl UserStore for SqliteStore<'_> {
    fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
                [id.to_string()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO users (id, full_name, email, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name, email = excluded.email",
            (
                user.id.to_string(),
                &user.full_name,
                &user.email,
                user.created_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }
}

impl ItemStore for SqliteStore<'_> {
    fn item_by_id(&self, id: Uuid) -> Result<Option<Item>, StoreError> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"),
                [id.to_string()],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    fn all_items(&self) -> Result<Vec<Item>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY name"))?;
        let items = stmt
            .query_map([], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn save_item(&self, item: &Item) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO items (id, name, description, available, average_rating, review_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                available = excluded.available,
                average_rating = excluded.average_rating,
                review_count = excluded.review_count",
            (
                item.id.to_string(),
                &item.name,
                &item.description,
                if item.available { 1 } else { 0 },
                item.average_rating,
                item.review_count,
                item.created_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }
}

impl RentalStore for SqliteStore<'_> {
    fn rental_by_id(&self, id: Uuid) -> Result<Option<Rental>, StoreError> {
        let rental = self
            .conn
            .query_row(
                &format!("SELECT {RENTAL_COLUMNS} FROM rentals WHERE id = ?"),
                [id.to_string()],
                rental_from_row,
            )
            .optional()?;
        Ok(rental)
    }

    fn all_rentals(&self) -> Result<Vec<Rental>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals ORDER BY rental_date DESC, id"
        ))?;
        let rentals = stmt
            .query_map([], rental_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rentals)
    }

    fn rentals_by_user(&self, user_id: Uuid) -> Result<Vec<Rental>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals WHERE user_id = ? ORDER BY rental_date DESC, id"
        ))?;
        let rentals = stmt
            .query_map([user_id.to_string()], rental_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rentals)
    }

    fn save_rental(&self, rental: &Rental) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO rentals (id, user_id, item_id, rental_date, end_date, return_date, extended)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                end_date = excluded.end_date,
                return_date = excluded.return_date,
                extended = excluded.extended",
            (
                rental.id.to_string(),
                rental.user_id.to_string(),
                rental.item_id.to_string(),
                format_date(rental.rental_date),
                format_date(rental.end_date),
                rental.return_date.map(format_date),
                if rental.extended { 1 } else { 0 },
            ),
        )?;
        Ok(())
    }

    fn active_count_by_user(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM rentals WHERE user_id = ? AND return_date IS NULL",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn active_by_item(&self, item_id: Uuid) -> Result<Option<Rental>, StoreError> {
        let rental = self
            .conn
            .query_row(
                &format!(
                    "SELECT {RENTAL_COLUMNS} FROM rentals WHERE item_id = ? AND return_date IS NULL"
                ),
                [item_id.to_string()],
                rental_from_row,
            )
            .optional()?;
        Ok(rental)
    }
}

impl ReviewStore for SqliteStore<'_> {
    fn review_by_rental_id(&self, rental_id: Uuid) -> Result<Option<Review>, StoreError> {
        let review = self
            .conn
            .query_row(
                &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE rental_id = ?"),
                [rental_id.to_string()],
                review_from_row,
            )
            .optional()?;
        Ok(review)
    }

    fn reviews_by_item_id(&self, item_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE item_id = ? ORDER BY created_at DESC"
        ))?;
        let reviews = stmt
            .query_map([item_id.to_string()], review_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    fn save_review(&self, review: &Review) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO reviews (id, rental_id, item_id, user_id, rating, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                review.id.to_string(),
                review.rental_id.to_string(),
                review.item_id.to_string(),
                review.user_id.to_string(),
                review.rating,
                &review.comment,
                review.created_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    fn average_rating_for_item(&self, item_id: Uuid) -> Result<Option<f64>, StoreError> {
        let average = self.conn.query_row(
            "SELECT AVG(rating) FROM reviews WHERE item_id = ?",
            [item_id.to_string()],
            |row| row.get::<_, Option<f64>>(0),
        )?;
        Ok(average)
    }
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(row, 0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        created_at: parse_datetime(row, 3)?,
    })
}

fn item_from_row(row: &Row) -> rusqlite::Result<Item> {
    Ok(Item {
        id: parse_uuid(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        available: row.get::<_, i32>(3)? != 0,
        average_rating: row.get(4)?,
        review_count: row.get(5)?,
        created_at: parse_datetime(row, 6)?,
    })
}

fn rental_from_row(row: &Row) -> rusqlite::Result<Rental> {
    Ok(Rental {
        id: parse_uuid(row, 0)?,
        user_id: parse_uuid(row, 1)?,
        item_id: parse_uuid(row, 2)?,
        rental_date: parse_date(row, 3)?,
        end_date: parse_date(row, 4)?,
        return_date: match row.get::<_, Option<String>>(5)? {
            Some(_) => Some(parse_date(row, 5)?),
            None => None,
        },
        extended: row.get::<_, i32>(6)? != 0,
    })
}

fn review_from_row(row: &Row) -> rusqlite::Result<Review> {
    Ok(Review {
        id: parse_uuid(row, 0)?,
        rental_id: parse_uuid(row, 1)?,
        item_id: parse_uuid(row, 2)?,
        user_id: parse_uuid(row, 3)?,
        rating: row.get(4)?,
        comment: row.get(5)?,
        created_at: parse_datetime(row, 6)?,
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

fn parse_date(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn parse_datetime(row: &Row, idx: usize) -> rusqlite::Result<chrono::DateTime<Utc>> {
    let s: String = row.get(idx)?;
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}
