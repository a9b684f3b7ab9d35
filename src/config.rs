//! Connection settings from the environment (and an optional `.env` file)

use clap::Args;
use std::env;
use std::time::Duration;

pub const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_DB_NAME: &str = "library_db";
pub const DEFAULT_COLLECTION: &str = "books";

/// Cap on how long the client waits to find a reachable server
pub const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub server_selection_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_MONGO_URI.to_string(),
            database: DEFAULT_DB_NAME.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            server_selection_timeout: SERVER_SELECTION_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Read `MONGO_URI`, `DB_NAME` and `COLLECTION`, loading `.env` first.
    /// Unset or empty variables fall back to the defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            uri: get("MONGO_URI", DEFAULT_MONGO_URI),
            database: get("DB_NAME", DEFAULT_DB_NAME),
            collection: get("COLLECTION", DEFAULT_COLLECTION),
            server_selection_timeout: SERVER_SELECTION_TIMEOUT,
        }
    }

    /// Command-line values win over the environment.
    pub fn with_overrides(
        mut self,
        uri: Option<String>,
        database: Option<String>,
        collection: Option<String>,
    ) -> Self {
        if let Some(uri) = uri {
            self.uri = uri;
        }
        if let Some(database) = database {
            self.database = database;
        }
        if let Some(collection) = collection {
            self.collection = collection;
        }
        self
    }

    /// The URI with `serverSelectionTimeoutMS` appended unless already set.
    pub fn connection_uri(&self) -> String {
        with_server_selection_timeout(&self.uri, self.server_selection_timeout)
    }
}

/// Connection flags shared by the binaries
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// MongoDB connection string (overrides MONGO_URI)
    #[arg(long, value_name = "URI")]
    pub mongo_uri: Option<String>,

    /// Database name (overrides DB_NAME)
    #[arg(long, value_name = "NAME")]
    pub db: Option<String>,

    /// Collection name (overrides COLLECTION)
    #[arg(long, value_name = "NAME")]
    pub collection: Option<String>,
}

impl ConnectionArgs {
    pub fn resolve(&self) -> StoreConfig {
        StoreConfig::from_env().with_overrides(
            self.mongo_uri.clone(),
            self.db.clone(),
            self.collection.clone(),
        )
    }
}

fn with_server_selection_timeout(uri: &str, timeout: Duration) -> String {
    if uri.to_ascii_lowercase().contains("serverselectiontimeoutms=") {
        return uri.to_string();
    }
    let option = format!("serverSelectionTimeoutMS={}", timeout.as_millis());

    let after_scheme = uri.find("://").map_or(0, |i| i + 3);
    let rest = &uri[after_scheme..];
    if rest.contains('?') {
        let sep = if uri.ends_with('?') || uri.ends_with('&') { "" } else { "&" };
        format!("{}{}{}", uri, sep, option)
    } else if rest.contains('/') {
        format!("{}?{}", uri, option)
    } else {
        format!("{}/?{}", uri, option)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset_or_blank() {
        let vars: HashMap<&str, &str> = [("DB_NAME", "  ")].into_iter().collect();
        let config = StoreConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_environment_values() {
        let vars: HashMap<&str, &str> = [
            ("MONGO_URI", "mongodb://db.internal:27018"),
            ("DB_NAME", "catalog"),
            ("COLLECTION", "works"),
        ]
        .into_iter()
        .collect();
        let config = StoreConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.uri, "mongodb://db.internal:27018");
        assert_eq!(config.database, "catalog");
        assert_eq!(config.collection, "works");

        let config = config.with_overrides(None, Some("other".to_string()), None);
        assert_eq!(config.database, "other");
        assert_eq!(config.collection, "works");
    }

    #[test]
    fn test_timeout_appended_to_uri() {
        let t = Duration::from_secs(5);
        assert_eq!(
            with_server_selection_timeout("mongodb://localhost:27017", t),
            "mongodb://localhost:27017/?serverSelectionTimeoutMS=5000"
        );
        assert_eq!(
            with_server_selection_timeout("mongodb://h/db", t),
            "mongodb://h/db?serverSelectionTimeoutMS=5000"
        );
        assert_eq!(
            with_server_selection_timeout("mongodb+srv://h/?retryWrites=true", t),
            "mongodb+srv://h/?retryWrites=true&serverSelectionTimeoutMS=5000"
        );
        assert_eq!(
            with_server_selection_timeout("mongodb://h/?serverSelectionTimeoutMS=100", t),
            "mongodb://h/?serverSelectionTimeoutMS=100"
        );
    }
}
