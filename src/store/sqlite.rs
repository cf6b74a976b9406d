// src/store/sqlite.rs
//! Backend local sobre SQLite: uma tabela `nodes` com as folhas achatadas da árvore.
//! Usado em desenvolvimento (`STORE_BACKEND=sqlite`) e nos testes (`sqlite::memory:`).

use super::{push_key, tree, watch, KvStore, StoreResult, StoreWatch};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    // Serializa as escritas deste processo (e o put_if_absent).
    write_lock: Arc<Mutex<()>>,
    // Caminhos alterados, para os `watch` ativos.
    changes: broadcast::Sender<String>,
}

impl SqliteStore {
    /// Liga ao ficheiro (ou memória) indicado e corre as migrações.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        tracing::info!("Ligando à base de dados local: {}", database_url);

        let in_memory = database_url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // Cada ligação a ":memory:" teria a sua própria base, por isso só uma.
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        tracing::info!("Executando migrações da base de dados local...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Migrações concluídas.");

        Ok(Self::from_pool(pool))
    }

    /// Base em memória, usada pelos testes.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            changes,
        }
    }

    fn notify(&self, path: &str) {
        // Sem subscritores o envio falha, o que é normal.
        let _ = self.changes.send(path.to_string());
    }

    async fn read_path(&self, path: &str) -> StoreResult<Option<Value>> {
        let rows: Vec<(String, String)> = if path.is_empty() {
            sqlx::query_as("SELECT path, value FROM nodes ORDER BY path")
                .fetch_all(&self.pool)
                .await?
        } else {
            let prefix = format!("{}/", path);
            sqlx::query_as(
                r#"
                SELECT path, value FROM nodes
                WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2
                ORDER BY path
                "#,
            )
            .bind(path)
            .bind(&prefix)
            .fetch_all(&self.pool)
            .await?
        };

        let mut leaves = Vec::with_capacity(rows.len());
        for (row_path, raw) in rows {
            let rel = if path.is_empty() {
                row_path
            } else if row_path == path {
                String::new()
            } else {
                row_path[path.len() + 1..].to_string()
            };
            leaves.push((rel, serde_json::from_str(&raw)?));
        }
        Ok(tree::unflatten(leaves))
    }

    async fn exists_in(tx: &mut Transaction<'_, Sqlite>, path: &str) -> StoreResult<bool> {
        let prefix = format!("{}/", path);
        let found: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM nodes WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2 LIMIT 1",
        )
        .bind(path)
        .bind(&prefix)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(found.is_some())
    }

    /// Substitui a sub-árvore em `path` dentro de uma transação.
    async fn replace_in(tx: &mut Transaction<'_, Sqlite>, path: &str, value: Option<Value>) -> StoreResult {
        if path.is_empty() {
            sqlx::query("DELETE FROM nodes").execute(&mut **tx).await?;
        } else {
            let prefix = format!("{}/", path);
            sqlx::query("DELETE FROM nodes WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2")
                .bind(path)
                .bind(&prefix)
                .execute(&mut **tx)
                .await?;
        }

        let Some(value) = value.and_then(tree::prune) else {
            return Ok(());
        };

        // Um escalar num ancestral deixaria de fazer sentido: é removido.
        for ancestor in tree::ancestors(path) {
            sqlx::query("DELETE FROM nodes WHERE path = ?1")
                .bind(&ancestor)
                .execute(&mut **tx)
                .await?;
        }

        let mut leaves = Vec::new();
        tree::flatten(path, &value, &mut leaves);
        for (leaf_path, raw) in leaves {
            sqlx::query("INSERT INTO nodes (path, value) VALUES (?1, ?2)")
                .bind(&leaf_path)
                .bind(&raw)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn read(&self, path: &str) -> StoreResult<Option<Value>> {
        let path = tree::normalize_path(path)?;
        self.read_path(&path).await
    }

    async fn write(&self, path: &str, value: Value) -> StoreResult {
        let path = tree::normalize_path(path)?;
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        Self::replace_in(&mut tx, &path, Some(value)).await?;
        tx.commit().await?;
        self.notify(&path);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> StoreResult {
        let path = tree::normalize_path(path)?;
        // Chaves do merge podem ser caminhos ("a/b"), como na API REST.
        let mut targets = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            targets.push((tree::normalize_path(&tree::join(&path, &key))?, value));
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        for (target, value) in targets {
            Self::replace_in(&mut tx, &target, Some(value)).await?;
        }
        tx.commit().await?;
        self.notify(&path);
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult {
        let path = tree::normalize_path(path)?;
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        Self::replace_in(&mut tx, &path, None).await?;
        tx.commit().await?;
        self.notify(&path);
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        let key = push_key();
        self.write(&tree::join(path, &key), value).await?;
        Ok(key)
    }

    async fn put_if_absent(&self, path: &str, value: Value) -> StoreResult<bool> {
        let path = tree::normalize_path(path)?;
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        if Self::exists_in(&mut tx, &path).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        Self::replace_in(&mut tx, &path, Some(value)).await?;
        tx.commit().await?;
        self.notify(&path);
        Ok(true)
    }

    fn watch(&self, path: &str) -> StoreWatch {
        let store = self.clone();
        let path = path.trim_matches('/').to_string();
        // Subscreve antes da leitura inicial para não perder alterações.
        let mut rx = self.changes.subscribe();

        Box::pin(async_stream::stream! {
            let mut snapshot = match store.read(&path).await {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!("Watch em '{}' falhou na leitura inicial: {}", path, e);
                    return;
                }
            };
            for event in watch::initial_events(&path, snapshot.as_ref()) {
                yield event;
            }

            loop {
                match rx.recv().await {
                    Ok(changed) if !tree::overlaps(&path, &changed) => continue,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Watch em '{}' perdeu {} notificações; relendo.", path, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let current = match store.read(&path).await {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!("Watch em '{}' não conseguiu reler: {}", path, e);
                        continue;
                    }
                };
                for event in watch::diff_events(&path, snapshot.as_ref(), current.as_ref()) {
                    yield event;
                }
                snapshot = current;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreEventKind;
    use futures_util::StreamExt;
    use serde_json::json;

    async fn store() -> SqliteStore {
        SqliteStore::in_memory().await.expect("store em memória")
    }

    #[tokio::test]
    async fn write_then_read_subtree_and_leaf() {
        let store = store().await;
        store
            .write("students/s1", json!({"name": "Ana", "meta": {"age": 20}}))
            .await
            .unwrap();

        assert_eq!(
            store.read("students").await.unwrap(),
            Some(json!({"s1": {"name": "Ana", "meta": {"age": 20}}}))
        );
        assert_eq!(store.read("students/s1/name").await.unwrap(), Some(json!("Ana")));
        assert_eq!(store.read("students/s2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_overwrites_and_update_merges() {
        let store = store().await;
        store.write("c/1", json!({"a": 1, "b": 2})).await.unwrap();
        store.write("c/1", json!({"a": 3})).await.unwrap();
        assert_eq!(store.read("c/1").await.unwrap(), Some(json!({"a": 3})));

        let patch = json!({"b": 4, "nested/x": true}).as_object().unwrap().clone();
        store.update("c/1", patch).await.unwrap();
        assert_eq!(
            store.read("c/1").await.unwrap(),
            Some(json!({"a": 3, "b": 4, "nested": {"x": true}}))
        );
    }

    #[tokio::test]
    async fn null_and_delete_remove_values() {
        let store = store().await;
        store.write("x/y", json!({"k": 1})).await.unwrap();
        store
            .update("x/y", json!({"k": null}).as_object().unwrap().clone())
            .await
            .unwrap();
        assert_eq!(store.read("x").await.unwrap(), None);

        store.write("x/z", json!(1)).await.unwrap();
        store.delete("x").await.unwrap();
        assert_eq!(store.read("x/z").await.unwrap(), None);
    }

    #[tokio::test]
    async fn writing_below_a_scalar_replaces_it() {
        let store = store().await;
        store.write("a", json!("escalar")).await.unwrap();
        store.write("a/b", json!(1)).await.unwrap();
        assert_eq!(store.read("a").await.unwrap(), Some(json!({"b": 1})));
    }

    #[tokio::test]
    async fn push_generates_distinct_keys() {
        let store = store().await;
        let k1 = store.push("log", json!({"n": 1})).await.unwrap();
        let k2 = store.push("log", json!({"n": 2})).await.unwrap();
        assert_ne!(k1, k2);
        let all = store.read("log").await.unwrap().unwrap();
        assert_eq!(all.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn put_if_absent_only_writes_once() {
        let store = store().await;
        assert!(store.put_if_absent("s/1/att/S1", json!({"n": 1})).await.unwrap());
        assert!(!store.put_if_absent("s/1/att/S1", json!({"n": 2})).await.unwrap());
        assert_eq!(store.read("s/1/att/S1/n").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn arrays_come_back_as_index_keyed_objects() {
        let store = store().await;
        store.write("arr", json!(["a", "b"])).await.unwrap();
        assert_eq!(store.read("arr").await.unwrap(), Some(json!({"0": "a", "1": "b"})));
    }

    #[tokio::test]
    async fn invalid_paths_are_rejected() {
        let store = store().await;
        assert!(store.write("bad.path", json!(1)).await.is_err());
    }

    #[tokio::test]
    async fn watch_emits_initial_and_child_events() {
        let store = store().await;
        store.write("enrollments/e1", json!({"status": "active"})).await.unwrap();

        let mut events = store.watch("enrollments");
        let first = events.next().await.unwrap();
        assert_eq!(first.kind, StoreEventKind::ChildAdded);
        assert_eq!(first.key.as_deref(), Some("e1"));
        assert_eq!(events.next().await.unwrap().kind, StoreEventKind::ValueChanged);

        store.write("enrollments/e2", json!({"status": "active"})).await.unwrap();
        let added = events.next().await.unwrap();
        assert_eq!(added.kind, StoreEventKind::ChildAdded);
        assert_eq!(added.key.as_deref(), Some("e2"));

        // Alterações noutros caminhos não chegam a esta subscrição.
        store.write("students/s1", json!({"name": "Ana"})).await.unwrap();
        store.delete("enrollments/e1").await.unwrap();
        let _value = events.next().await.unwrap();
        let removed = events.next().await.unwrap();
        assert_eq!(removed.kind, StoreEventKind::ChildRemoved);
        assert_eq!(removed.key.as_deref(), Some("e1"));
    }
}
