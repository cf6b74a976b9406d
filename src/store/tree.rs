// src/store/tree.rs
//! Regras de caminhos e árvores JSON partilhadas pelos backends.
//!
//! O armazenamento segue a semântica da Realtime Database: `null`, objetos vazios
//! e arrays vazios equivalem a ausência, e arrays são guardados como filhos com
//! chaves numéricas ("0", "1", ...).

use super::StoreError;
use serde_json::{Map, Value};

/// Caracteres que a Realtime Database não aceita em chaves.
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']', '/'];

/// Valida uma chave isolada (um segmento de caminho).
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.chars().any(|c| FORBIDDEN_KEY_CHARS.contains(&c) || c.is_control())
}

/// Normaliza um caminho ("/a//b/" -> "a/b") e valida cada segmento.
/// A raiz é representada pela string vazia.
pub fn normalize_path(path: &str) -> Result<String, StoreError> {
    let mut segments = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !is_valid_key(segment) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

/// Junta um caminho base com um caminho relativo.
pub fn join(base: &str, child: &str) -> String {
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, child),
    }
}

/// Ancestrais estritos de um caminho normalizado ("a/b/c" -> ["a", "a/b"]).
pub fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut acc = String::new();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        acc = join(&acc, segment);
        out.push(acc.clone());
    }
    out
}

/// `true` se `other` é o próprio `path`, um descendente ou um ancestral dele.
pub fn overlaps(path: &str, other: &str) -> bool {
    is_within(other, path) || is_within(path, other)
}

/// `true` se `path` é igual a `root` ou está abaixo dele.
pub fn is_within(path: &str, root: &str) -> bool {
    root.is_empty() || path == root || path.starts_with(&format!("{}/", root))
}

/// Remove nulls e contentores vazios; converte arrays em objetos com chaves numéricas.
/// Devolve `None` quando o valor inteiro equivale a ausência.
pub fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            let map: Map<String, Value> = items
                .into_iter()
                .enumerate()
                .filter_map(|(i, v)| prune(v).map(|v| (i.to_string(), v)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        Value::Object(fields) => {
            let map: Map<String, Value> = fields
                .into_iter()
                .filter_map(|(k, v)| prune(v).map(|v| (k, v)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        scalar => Some(scalar),
    }
}

/// Achata um valor (já podado) em folhas `(caminho, json)`.
pub fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(fields) => {
            for (key, child) in fields {
                flatten(&join(prefix, key), child, out);
            }
        }
        scalar => out.push((prefix.to_string(), scalar.to_string())),
    }
}

/// Lê o valor num caminho relativo dentro de uma árvore.
pub fn get_at<'a>(root: &'a Value, rel: &str) -> Option<&'a Value> {
    rel.split('/')
        .filter(|s| !s.is_empty())
        .try_fold(root, |node, key| node.as_object()?.get(key))
}

/// Substitui (ou remove, com `None`) o valor num caminho relativo da árvore.
/// Contentores que ficam vazios são podados, como na base de dados real.
pub fn set_at(root: &mut Option<Value>, rel: &str, value: Option<Value>) {
    let segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
    let value = value.and_then(prune);
    *root = set_segments(root.take(), &segments, value);
}

fn set_segments(node: Option<Value>, segments: &[&str], value: Option<Value>) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return value;
    };
    let mut map = match node {
        Some(Value::Object(map)) => map,
        // Um escalar no caminho é substituído por um objeto.
        _ => Map::new(),
    };
    let child = map.remove(*head);
    if let Some(new_child) = set_segments(child, rest, value) {
        map.insert(head.to_string(), new_child);
    }
    (!map.is_empty()).then_some(Value::Object(map))
}

/// Reconstrói a árvore a partir de folhas relativas (caminho vazio = o próprio nó).
pub fn unflatten(leaves: Vec<(String, Value)>) -> Option<Value> {
    let mut root: Option<Value> = None;
    for (rel, value) in leaves {
        if rel.is_empty() {
            return Some(value);
        }
        let segments: Vec<&str> = rel.split('/').collect();
        root = insert_leaf(root, &segments, value);
    }
    root
}

fn insert_leaf(node: Option<Value>, segments: &[&str], value: Value) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value);
    };
    let mut map = match node {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let child = map.remove(*head);
    if let Some(new_child) = insert_leaf(child, rest, value) {
        map.insert(head.to_string(), new_child);
    }
    Some(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_strips_slashes_and_rejects_bad_keys() {
        assert_eq!(normalize_path("/sessions//abc/").unwrap(), "sessions/abc");
        assert_eq!(normalize_path("").unwrap(), "");
        assert!(normalize_path("sessions/a.b").is_err());
        assert!(normalize_path("sessions/$x").is_err());
    }

    #[test]
    fn ancestors_and_overlap() {
        assert_eq!(ancestors("a/b/c"), vec!["a".to_string(), "a/b".to_string()]);
        assert!(ancestors("a").is_empty());
        assert!(overlaps("sessions", "sessions/x/attendees/S1"));
        assert!(overlaps("sessions/x", "sessions"));
        assert!(!overlaps("sessions", "students/1"));
        assert!(!overlaps("sessions", "sessions-old"));
    }

    #[test]
    fn prune_drops_empty_containers_and_keys_arrays_by_index() {
        let value = json!({"a": null, "b": [], "c": {}, "d": ["x", null, "z"], "e": 1});
        assert_eq!(prune(value), Some(json!({"d": {"0": "x", "2": "z"}, "e": 1})));
        assert_eq!(prune(json!({"a": {"b": null}})), None);
    }

    #[test]
    fn flatten_then_unflatten_restores_tree() {
        let value = json!({"name": "Ana", "contact": {"email": "a@x", "phone": "1"}});
        let mut leaves = Vec::new();
        flatten("", &value, &mut leaves);
        let parsed = leaves
            .into_iter()
            .map(|(p, v)| (p, serde_json::from_str(&v).unwrap()))
            .collect();
        assert_eq!(unflatten(parsed), Some(value));
    }

    #[test]
    fn set_at_replaces_and_prunes() {
        let mut root = Some(json!({"a": {"b": 1, "c": 2}}));
        set_at(&mut root, "a/b", None);
        assert_eq!(root, Some(json!({"a": {"c": 2}})));
        set_at(&mut root, "a/c", None);
        assert_eq!(root, None);
        set_at(&mut root, "x/y", Some(json!("v")));
        assert_eq!(get_at(root.as_ref().unwrap(), "x/y"), Some(&json!("v")));
    }
}
