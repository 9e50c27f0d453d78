//! This module provides functionality for loading and handling the
//! application's configuration.
//!
//! It defines the `ConciergeConfig` struct, which holds the configuration
//! parameters, and a `load_config` function to load the configuration from a
//! YAML file.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use concierge::config::{ConciergeConfig, load_config};
//!
//! let config: ConciergeConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::{error::Error, fs};
use tracing::debug;

/// Represents the application's configuration.
///
/// This struct holds everything needed to run the pipeline: the
/// OpenAI-compatible endpoint used for grounded generation, the token budgets,
/// the SQLite database holding bookings and query history, and the directory
/// where the vector store keeps its persisted artifacts.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct ConciergeConfig {
    /// The API key used to authenticate requests to the generation endpoint.
    pub api_key: String,

    /// The base URL of the OpenAI-compatible API.
    pub api_base: String,

    /// The name of the generation model to request.
    pub model: String,

    /// Maximum number of tokens the model may generate for one answer.
    pub max_answer_tokens: u16,

    /// Token budget for the retrieved context embedded in the prompt.
    pub context_max_tokens: usize,

    /// SQLite database URL (bookings + query history).
    pub db_url: String,

    /// Directory holding the persisted vector store artifacts.
    pub data_dir: String,

    /// Collection name used to derive the artifact file names.
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Embedding dimensionality (384 for MiniLM-L6).
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
}

fn default_collection_name() -> String {
    "hotel_bookings".to_string()
}

fn default_embedding_dim() -> usize {
    384
}

/// Loads the application's configuration from a YAML file.
///
/// # Parameters
///
/// - `file`: The path to the YAML configuration file.
///
/// # Returns
///
/// - `Ok(ConciergeConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or
///   parsing the YAML.
pub fn load_config(file: &str) -> Result<ConciergeConfig, Box<dyn Error>> {
    debug!("loading config from {file}");
    let content = fs::read_to_string(file)?;
    let config: ConciergeConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Open a SQLite connection, panicking with a readable message on failure.
///
/// Startup paths use this directly; best-effort paths (history logging)
/// establish their own fallible connection instead.
pub fn establish_connection(db_url: &str) -> SqliteConnection {
    SqliteConnection::establish(db_url).unwrap_or_else(|_| panic!("Error connecting to {}", db_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
api_key: "example_api_key"
api_base: "http://example.com/v1"
model: "example_model"
max_answer_tokens: 512
context_max_tokens: 2048
db_url: "concierge.db"
data_dir: "/tmp/concierge/embeddings"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path().to_str().unwrap());

        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.api_key, "example_api_key");
        assert_eq!(config.api_base, "http://example.com/v1");
        assert_eq!(config.model, "example_model");
        assert_eq!(config.max_answer_tokens, 512);
        assert_eq!(config.context_max_tokens, 2048);
        assert_eq!(config.db_url, "concierge.db");
        // Defaults kick in for fields the file omits.
        assert_eq!(config.collection_name, "hotel_bookings");
        assert_eq!(config.embedding_dim, 384);
    }

    #[test]
    fn test_load_config_invalid_file() {
        let config = load_config("non/existent/path");
        assert!(config.is_err());
    }

    #[test]
    fn test_load_config_invalid_format() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"invalid: config: format"#).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap());
        assert!(config.is_err());
    }
}
