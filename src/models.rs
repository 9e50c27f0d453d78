//! # Database models
//!
//! Data structures that map to the project's SQLite schema via **Diesel**.
//!
//! The booking side (`hotels`, `countries`, `bookings`) is the external data
//! store the index is built from; the pipeline only ever reads it through the
//! join in [`crate::documents::generate_booking_documents`]. The
//! `query_history` table is written by the query engine, one row per processed
//! question.
//!
//! ## Diesel expectations
//!
//! This module assumes the tables defined in `crate::schema` exist. Fresh
//! databases can be initialized with [`init_db`], which issues the
//! `CREATE TABLE IF NOT EXISTS` statements for all four tables.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use std::error::Error;

/// A hotel (name plus type, `"City"` or `"Resort"`).
///
/// ### Table
/// - `hotels`
#[derive(Queryable, Insertable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::hotels)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Hotel {
    /// Auto-increment primary key (set by the DB on insert).
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub name: String,
    pub hotel_type: String,
}

/// A guest's country of origin.
///
/// ### Table
/// - `countries`
#[derive(Queryable, Insertable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::countries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Country {
    /// Auto-increment primary key (set by the DB on insert).
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub name: String,
}

/// One booking row, referencing its [`Hotel`] and [`Country`].
///
/// ### Table
/// - `bookings`
#[derive(Queryable, Associations, Insertable, Selectable, Debug, Clone)]
#[diesel(belongs_to(Hotel))]
#[diesel(belongs_to(Country))]
#[diesel(table_name = crate::schema::bookings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Booking {
    /// Auto-increment primary key (set by the DB on insert).
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub hotel_id: i32,
    pub country_id: i32,
    pub is_canceled: bool,
    /// Days between booking and arrival.
    pub lead_time: i32,
    pub arrival_date: chrono::NaiveDate,
    pub departure_date: Option<chrono::NaiveDate>,
    /// Average daily rate.
    pub adr: f64,
    pub total_nights: i32,
}

/// One logged question/answer/latency triple.
///
/// Rows are written exactly once per processed query, success or failure, and
/// never mutated afterwards. The timestamp is assigned by the database at
/// insert time.
///
/// ### Table
/// - `query_history`
#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::query_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QueryHistory {
    pub id: i32,
    pub query_text: String,
    pub response_text: String,
    pub timestamp: NaiveDateTime,
    pub execution_time_ms: f64,
}

/// Insertable form of [`QueryHistory`]; `id` and `timestamp` are assigned by
/// the database.
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::query_history)]
pub struct NewQueryHistory {
    pub query_text: String,
    pub response_text: String,
    pub execution_time_ms: f64,
}

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS hotels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        hotel_type TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS countries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS bookings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        hotel_id INTEGER NOT NULL REFERENCES hotels(id),
        country_id INTEGER NOT NULL REFERENCES countries(id),
        is_canceled BOOLEAN NOT NULL DEFAULT 0,
        lead_time INTEGER NOT NULL,
        arrival_date DATE NOT NULL,
        departure_date DATE,
        adr DOUBLE NOT NULL,
        total_nights INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS query_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        query_text TEXT NOT NULL,
        response_text TEXT NOT NULL,
        timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        execution_time_ms DOUBLE NOT NULL
    )",
];

/// Create all tables if they do not exist yet.
///
/// # Errors
/// Propagates the first DDL statement that fails.
pub fn init_db(conn: &mut SqliteConnection) -> Result<(), Box<dyn Error>> {
    for statement in DDL {
        diesel::sql_query(*statement).execute(conn)?;
    }
    Ok(())
}
