pub mod loader;
pub mod schema;

use std::path::PathBuf;

pub use loader::{default_config_path, load_config, load_config_from_str, load_or_default};
pub use schema::{Config, LogConfig, LogFormat};

use crate::db::{default_database_path, Database};
use crate::error::{ConfigError, LingoError};
use crate::store::TranslationStore;

impl Config {
    /// The configured database path, or `~/.lingo/data/lingo.db`.
    pub fn resolved_database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => default_database_path().ok_or(ConfigError::NoDatabasePath),
        }
    }

    /// Opens the database and builds a store with this config's retry
    /// policies and attempt ceiling.
    pub fn open_store(&self) -> Result<TranslationStore, LingoError> {
        let path = self.resolved_database_path()?;
        let db = Database::open(&path, self.busy_timeout())?;
        Ok(TranslationStore::new(db)
            .with_retry_policies(self.write_retry, self.list_retry)
            .with_max_attempts(self.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_store_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: Some(dir.path().join("nested").join("lingo.db")),
            ..Config::default()
        };

        let store = config.open_store().unwrap();
        let created = store.create("你好。", "text").unwrap();
        assert_eq!(store.get(&created.id).unwrap().input_text, "你好。");
        assert!(dir.path().join("nested").join("lingo.db").exists());
    }
}
