//! Command-line interface definitions (`clap`) plus the `key=value` filter
//! parsing the `ask` command uses.

use clap::{Parser, Subcommand};
use std::error::Error;

use crate::documents::{MetadataFilter, MetadataValue};

/// Parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Ask a question about the booking dataset.
    #[clap(name = "ask", alias = "a")]
    Ask {
        /// The question to be asked.
        question: String,

        /// Metadata filters as `key=value` pairs, e.g. `-f country=PRT`.
        /// A candidate is dropped only when the key is present in its
        /// metadata with a different value.
        #[arg(name = "filter", short = 'f', long = "filter")]
        filters: Vec<String>,
    },

    /// Build (or extend) the vector index from the bookings database.
    #[clap(name = "build-index", alias = "b")]
    BuildIndex,

    /// Show recently answered questions.
    #[clap(name = "history", alias = "h")]
    History {
        /// Maximum number of entries to show.
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: i64,
    },

    /// Create the default configuration file and database tables.
    Init,
}

/// Parse `key=value` pairs into a typed metadata filter.
///
/// Values parse as booleans, then integers, then floats, falling back to
/// strings (`country=PRT` → `Str("PRT")`, `lead_time=30` → `Int(30)`).
pub fn parse_filters(pairs: &[String]) -> Result<MetadataFilter, Box<dyn Error>> {
    let mut filters = MetadataFilter::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("invalid filter '{pair}', expected key=value"))?;
        filters.insert(
            key.trim().to_string(),
            MetadataValue::parse_literal(value.trim()),
        );
    }
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters() {
        let filters = parse_filters(&[
            "country=PRT".to_string(),
            "lead_time=30".to_string(),
            "is_canceled=false".to_string(),
        ])
        .unwrap();
        assert_eq!(
            filters.get("country"),
            Some(&MetadataValue::Str("PRT".to_string()))
        );
        assert_eq!(filters.get("lead_time"), Some(&MetadataValue::Int(30)));
        assert_eq!(filters.get("is_canceled"), Some(&MetadataValue::Bool(false)));
    }

    #[test]
    fn test_parse_filters_rejects_missing_separator() {
        assert!(parse_filters(&["countryPRT".to_string()]).is_err());
    }
}
