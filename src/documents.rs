//! # Document generator
//!
//! Converts booking rows (joined with their hotel and country) into the
//! canonical text + metadata representation the vector store indexes.
//!
//! Each booking becomes one [`Document`]: a human-readable text block the
//! embedder turns into a vector, plus the same facts as typed
//! [`MetadataValue`] fields for exact-match filtering at query time.
//! Documents are created once at index-build time and are immutable
//! afterwards; rebuilding the index means regenerating them from the
//! database.

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use tracing::info;

use crate::schema::{bookings, countries, hotels};

/// A typed metadata value attached to a document.
///
/// Deliberately a closed, tagged enum rather than a free-form JSON value so
/// the document list can round-trip through bincode and filter comparison is
/// plain `PartialEq`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl MetadataValue {
    /// Parse a CLI-supplied literal into the closest typed value.
    ///
    /// `true`/`false` become booleans, then integers, then floats; anything
    /// else stays a string. `"PRT"` parses as `Str("PRT")`, `"3"` as
    /// `Int(3)`.
    pub fn parse_literal(raw: &str) -> MetadataValue {
        if raw.eq_ignore_ascii_case("true") {
            return MetadataValue::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return MetadataValue::Bool(false);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return MetadataValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return MetadataValue::Float(f);
        }
        MetadataValue::Str(raw.to_string())
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

/// Exact-match filter applied after ranking; see
/// [`crate::vector_store::VectorStore::query`] for the asymmetric semantics.
pub type MetadataFilter = HashMap<String, MetadataValue>;

/// Canonical representation of one booking: the unit indexed and retrieved.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    /// Stable unique id (the booking's database id).
    pub id: String,
    /// Human-readable rendering of the booking, fed to the embedder.
    pub text: String,
    /// The same facts as typed fields, for exact-match filtering.
    pub metadata: MetadataFilter,
}

/// One row of the bookings ⨝ hotels ⨝ countries join: the full read
/// contract this crate has with the booking data store.
#[derive(Queryable, Debug, Clone)]
pub struct BookingRecord {
    pub id: i32,
    pub arrival_date: NaiveDate,
    pub departure_date: Option<NaiveDate>,
    pub lead_time: i32,
    pub is_canceled: bool,
    pub adr: f64,
    pub total_nights: i32,
    pub hotel_name: String,
    pub hotel_type: String,
    pub country_name: String,
}

/// Render one joined booking row into a [`Document`].
///
/// The text block and the metadata carry the same facts; total revenue is
/// derived as `adr × total_nights`.
pub fn booking_document(record: &BookingRecord) -> Document {
    let revenue = record.adr * record.total_nights as f64;
    let departure = record
        .departure_date
        .map(|d| d.format("%Y-%m-%d").to_string());

    let text = format!(
        "Booking ID: {}\n\
         Hotel: {}\n\
         Hotel Type: {}\n\
         Country: {}\n\
         Arrival Date: {}\n\
         Departure Date: {}\n\
         Lead Time: {} days\n\
         Total Nights: {}\n\
         Average Daily Rate: ${:.2}\n\
         Total Revenue: ${:.2}\n\
         Status: {}",
        record.id,
        record.hotel_name,
        record.hotel_type,
        record.country_name,
        record.arrival_date.format("%Y-%m-%d"),
        departure.as_deref().unwrap_or("unknown"),
        record.lead_time,
        record.total_nights,
        record.adr,
        revenue,
        if record.is_canceled {
            "Canceled"
        } else {
            "Confirmed"
        },
    );

    let mut metadata = HashMap::new();
    metadata.insert("id".to_string(), MetadataValue::Int(record.id as i64));
    metadata.insert(
        "hotel_name".to_string(),
        MetadataValue::Str(record.hotel_name.clone()),
    );
    metadata.insert(
        "hotel_type".to_string(),
        MetadataValue::Str(record.hotel_type.clone()),
    );
    metadata.insert(
        "country".to_string(),
        MetadataValue::Str(record.country_name.clone()),
    );
    metadata.insert(
        "arrival_date".to_string(),
        MetadataValue::Str(record.arrival_date.format("%Y-%m-%d").to_string()),
    );
    metadata.insert(
        "departure_date".to_string(),
        departure.map_or(MetadataValue::Null, MetadataValue::Str),
    );
    metadata.insert(
        "lead_time".to_string(),
        MetadataValue::Int(record.lead_time as i64),
    );
    metadata.insert(
        "total_nights".to_string(),
        MetadataValue::Int(record.total_nights as i64),
    );
    metadata.insert("adr".to_string(), MetadataValue::Float(record.adr));
    metadata.insert("revenue".to_string(), MetadataValue::Float(revenue));
    metadata.insert(
        "is_canceled".to_string(),
        MetadataValue::Bool(record.is_canceled),
    );

    Document {
        id: record.id.to_string(),
        text,
        metadata,
    }
}

/// Generate one [`Document`] per booking from the database.
///
/// Batch read used by the offline `build-index` job; bookings missing their
/// hotel or country row are excluded by the inner joins.
///
/// # Errors
/// Propagates Diesel query errors.
pub fn generate_booking_documents(
    conn: &mut SqliteConnection,
) -> Result<Vec<Document>, Box<dyn Error>> {
    let rows: Vec<BookingRecord> = bookings::table
        .inner_join(hotels::table)
        .inner_join(countries::table)
        .select((
            bookings::id,
            bookings::arrival_date,
            bookings::departure_date,
            bookings::lead_time,
            bookings::is_canceled,
            bookings::adr,
            bookings::total_nights,
            hotels::name,
            hotels::hotel_type,
            countries::name,
        ))
        .order(bookings::id.asc())
        .load(conn)?;

    let documents: Vec<Document> = rows.iter().map(booking_document).collect();
    info!("generated {} booking documents", documents.len());
    Ok(documents)
}
