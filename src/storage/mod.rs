//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::interfaces::repository::Result;
use crate::interfaces::Repository;

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryRepository;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepository;

/// Initialize storage based on configuration.
///
/// SQLite connections are retried with backoff; the schema is created if
/// missing.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn Repository>> {
    match config.storage_type {
        StorageType::Memory => {
            info!(storage_type = "memory", "Storage configured");
            Ok(Arc::new(MemoryRepository::new()))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let sqlite = &config.sqlite;
            info!(storage_type = "sqlite", path = %sqlite.path, "Storage configured");

            if sqlite.path != ":memory:" {
                if let Some(parent) = std::path::Path::new(&sqlite.path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            crate::interfaces::StorageError::Unavailable(format!(
                                "cannot create {}: {}",
                                parent.display(),
                                e
                            ))
                        })?;
                    }
                }
            }

            let repository = crate::utils::bootstrap::connect_with_retry(
                "sqlite",
                &sqlite.path,
                || SqliteRepository::connect(sqlite),
            )
            .await?;
            repository.init().await?;
            Ok(Arc::new(repository))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => Err(crate::interfaces::StorageError::Unavailable(
            "SQLite storage requested but the 'sqlite' feature is not enabled".to_string(),
        )),
    }
}
