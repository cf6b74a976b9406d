// src/services/records.rs
//! Operações genéricas sobre registos planos `<coleção>/<id>`, usadas pelos repositórios.

use crate::{
    error::{AppError, AppResult},
    store::{tree, KvStore},
};
use chrono::{SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// Hora atual em ISO 8601 com milissegundos (`2025-01-01T10:00:00.000Z`).
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Valida um ID vindo da URL antes de o usar como segmento de caminho.
pub fn record_path(collection: &str, id: &str) -> AppResult<String> {
    if !tree::is_valid_key(id) {
        return Err(AppError::Validation(format!("ID inválido: '{}'", id)));
    }
    Ok(format!("{}/{}", collection, id))
}

/// Texto obrigatório: presente e não vazio depois de `trim`.
pub fn required(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} é obrigatório", field)))
}

/// Lê e converte um registo; `None` se não existir.
pub async fn fetch<T: DeserializeOwned>(store: &dyn KvStore, path: &str) -> AppResult<Option<T>> {
    let Some(value) = store.read(path).await? else {
        return Ok(None);
    };
    let record = serde_json::from_value(value).map_err(|e| {
        tracing::error!("Registo ilegível em '{}': {}", path, e);
        AppError::Internal
    })?;
    Ok(Some(record))
}

/// Lê todos os filhos de uma coleção. Entradas ilegíveis são ignoradas (com aviso).
/// O `id` de cada registo é preenchido com a chave, se vier vazio.
pub async fn fetch_all<T: DeserializeOwned>(store: &dyn KvStore, collection: &str) -> AppResult<Vec<T>> {
    let Some(Value::Object(children)) = store.read(collection).await? else {
        return Ok(Vec::new());
    };

    let mut records = Vec::with_capacity(children.len());
    for (key, mut value) in children {
        if let Value::Object(fields) = &mut value {
            let missing_id = fields.get("id").and_then(Value::as_str).map_or(true, str::is_empty);
            if missing_id {
                fields.insert("id".to_string(), Value::String(key.clone()));
            }
        }
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Registo '{}/{}' ignorado: {}", collection, key, e),
        }
    }
    Ok(records)
}

/// Lê todos os filhos como JSON cru, acrescentando a chave em `key`.
pub async fn fetch_keyed(store: &dyn KvStore, collection: &str) -> AppResult<Vec<Value>> {
    let Some(Value::Object(children)) = store.read(collection).await? else {
        return Ok(Vec::new());
    };
    Ok(children
        .into_iter()
        .map(|(key, value)| match value {
            Value::Object(mut fields) => {
                fields.insert("key".to_string(), Value::String(key));
                Value::Object(fields)
            }
            other => serde_json::json!({ "key": key, "value": other }),
        })
        .collect())
}

/// Grava um registo novo (sobrescreve o caminho).
pub async fn insert<T: Serialize>(store: &dyn KvStore, path: &str, record: &T) -> AppResult<()> {
    let value = serde_json::to_value(record).map_err(|e| {
        tracing::error!("Erro ao serializar registo para '{}': {:?}", path, e);
        AppError::Internal
    })?;
    store.write(path, value).await?;
    Ok(())
}

/// Merge raso de `patch` sobre o registo existente, com `updatedAt` renovado.
/// Devolve `None` se o registo não existir.
pub async fn merge<T, P>(store: &dyn KvStore, path: &str, patch: &P) -> AppResult<Option<T>>
where
    T: DeserializeOwned,
    P: Serialize,
{
    let Some(Value::Object(mut current)) = store.read(path).await? else {
        return Ok(None);
    };

    let mut fields: Map<String, Value> = match serde_json::to_value(patch) {
        Ok(Value::Object(fields)) => fields,
        _ => Map::new(),
    };
    // Campos geridos pelo servidor não se alteram por aqui.
    fields.remove("id");
    fields.remove("createdAt");
    fields.insert("updatedAt".to_string(), Value::String(now_iso()));

    store.update(path, fields.clone()).await?;

    for (key, value) in fields {
        current.insert(key, value);
    }
    let merged = serde_json::from_value(Value::Object(current)).map_err(|e| {
        tracing::error!("Registo ilegível após merge em '{}': {}", path, e);
        AppError::Internal
    })?;
    Ok(Some(merged))
}

/// Apaga um registo; `false` se não existia.
pub async fn remove(store: &dyn KvStore, path: &str) -> AppResult<bool> {
    if store.read(path).await?.is_none() {
        return Ok(false);
    }
    store.delete(path).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required(Some("  Ana ".into()), "name").unwrap(), "Ana");
        assert!(matches!(required(Some("  ".into()), "name"), Err(AppError::Validation(_))));
        assert!(required(None, "name").is_err());
    }

    #[test]
    fn record_path_rejects_path_tricks() {
        assert_eq!(record_path("students", "abc").unwrap(), "students/abc");
        assert!(record_path("students", "a/b").is_err());
        assert!(record_path("students", "").is_err());
    }

    #[test]
    fn now_iso_looks_like_js_iso_string() {
        let now = now_iso();
        assert!(now.ends_with('Z'));
        assert_eq!(now.len(), "2025-01-01T10:00:00.000Z".len());
    }
}
