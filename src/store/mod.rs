// src/store/mod.rs
//! Cliente do armazenamento chave-valor hierárquico (Realtime Database).
//!
//! Toda a aplicação fala com o armazenamento através do trait [`KvStore`];
//! o backend concreto é escolhido no arranque (`STORE_BACKEND`).

pub mod firebase;
pub mod sqlite;
pub mod tree;
pub mod watch;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::{Map, Value};
use thiserror::Error;

pub use firebase::FirebaseStore;
pub use sqlite::SqliteStore;
pub use watch::{StoreEvent, StoreEventKind};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Erro na base de dados local: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Erro de migração da base de dados local: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Erro de rede: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Resposta inesperada do armazenamento ({0}): {1}")]
    Status(u16, String),

    #[error("JSON inválido no armazenamento: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Falha de autenticação no armazenamento: {0}")]
    Auth(String),

    #[error("Caminho inválido: {0}")]
    InvalidPath(String),
}

pub type StoreResult<T = ()> = Result<T, StoreError>;

/// Fluxo de eventos de uma subscrição (`watch`). Termina quando é largado.
pub type StoreWatch = BoxStream<'static, StoreEvent>;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Nome curto do backend (para logs e health).
    fn backend(&self) -> &'static str;

    /// Leitura pontual ou de sub-árvore. `None` se o caminho não existir.
    async fn read(&self, path: &str) -> StoreResult<Option<Value>>;

    /// Sobrescreve o valor no caminho (`null` apaga).
    async fn write(&self, path: &str, value: Value) -> StoreResult;

    /// Merge parcial: cada chave do mapa substitui o filho correspondente.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> StoreResult;

    /// Apaga o caminho e tudo o que estiver abaixo.
    async fn delete(&self, path: &str) -> StoreResult;

    /// Acrescenta um filho com chave gerada e devolve essa chave.
    async fn push(&self, path: &str, value: Value) -> StoreResult<String>;

    /// Escreve apenas se o caminho estiver vazio. `false` se já existia valor.
    async fn put_if_absent(&self, path: &str, value: Value) -> StoreResult<bool>;

    /// Subscreve alterações num caminho (value / child_added / child_changed / child_removed).
    fn watch(&self, path: &str) -> StoreWatch;

    /// Sonda leve usada pelo health check.
    async fn ping(&self) -> StoreResult {
        self.read("_health").await.map(|_| ())
    }
}

/// Alfabeto das chaves geradas por `push`, ordenado em ASCII.
const PUSH_CHARS: &[u8] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Gera uma chave de 20 caracteres ordenável cronologicamente:
/// 8 caracteres de timestamp (ms) seguidos de 12 aleatórios.
pub fn push_key() -> String {
    let mut millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut time_part = [0u8; 8];
    for slot in time_part.iter_mut().rev() {
        *slot = PUSH_CHARS[(millis % 64) as usize];
        millis /= 64;
    }
    let random = uuid::Uuid::new_v4();
    let random_part = random
        .as_bytes()
        .iter()
        .take(12)
        .map(|b| PUSH_CHARS[(*b % 64) as usize]);
    time_part.iter().copied().chain(random_part).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keys_are_valid_and_unique() {
        let a = push_key();
        let b = push_key();
        assert_eq!(a.len(), 20);
        assert!(tree::is_valid_key(&a));
        assert_ne!(a, b);
    }
}
