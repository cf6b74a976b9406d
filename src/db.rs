// src/db.rs
use crate::{
    config::{Config, StoreBackend},
    store::{FirebaseStore, KvStore, SqliteStore, StoreResult},
};
use std::sync::Arc;

/// Liga ao armazenamento escolhido em `STORE_BACKEND`.
pub async fn connect_store(config: &Config) -> StoreResult<Arc<dyn KvStore>> {
    match config.backend {
        StoreBackend::Firebase => {
            tracing::info!("Ligando à Firebase Realtime Database: {}", config.database_url);
            let store = FirebaseStore::new(&config.database_url, config.service_account.clone())?;
            Ok(Arc::new(store))
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::connect(&config.database_url).await?;
            Ok(Arc::new(store))
        }
    }
}
