// src/store/watch.rs
//! Eventos de subscrição e o cálculo de diferenças entre snapshots.

use super::tree;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreEventKind {
    ValueChanged,
    ChildAdded,
    ChildChanged,
    ChildRemoved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreEvent {
    pub kind: StoreEventKind,
    /// Caminho subscrito.
    pub path: String,
    /// Chave do filho (ausente em `ValueChanged`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Valor novo (ou o último conhecido, em `ChildRemoved`).
    pub value: Option<Value>,
}

impl StoreEvent {
    fn child(kind: StoreEventKind, path: &str, key: &str, value: Option<Value>) -> Self {
        Self {
            kind,
            path: path.to_string(),
            key: Some(key.to_string()),
            value,
        }
    }

    fn value(path: &str, value: Option<Value>) -> Self {
        Self {
            kind: StoreEventKind::ValueChanged,
            path: path.to_string(),
            key: None,
            value,
        }
    }
}

fn children(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value.and_then(Value::as_object)
}

/// Eventos entregues logo a seguir a subscrever: um `ChildAdded` por filho
/// existente e depois o `ValueChanged` com o snapshot completo.
pub fn initial_events(path: &str, snapshot: Option<&Value>) -> Vec<StoreEvent> {
    let mut events: Vec<StoreEvent> = children(snapshot)
        .into_iter()
        .flatten()
        .map(|(key, child)| StoreEvent::child(StoreEventKind::ChildAdded, path, key, Some(child.clone())))
        .collect();
    events.push(StoreEvent::value(path, snapshot.cloned()));
    events
}

/// Eventos entre dois snapshots do mesmo caminho. Vazio se nada mudou.
pub fn diff_events(path: &str, old: Option<&Value>, new: Option<&Value>) -> Vec<StoreEvent> {
    if old == new {
        return Vec::new();
    }
    let empty = Map::new();
    let old_children = children(old).unwrap_or(&empty);
    let new_children = children(new).unwrap_or(&empty);

    let mut events = Vec::new();
    for (key, before) in old_children {
        if !new_children.contains_key(key) {
            events.push(StoreEvent::child(StoreEventKind::ChildRemoved, path, key, Some(before.clone())));
        }
    }
    for (key, after) in new_children {
        match old_children.get(key) {
            None => events.push(StoreEvent::child(StoreEventKind::ChildAdded, path, key, Some(after.clone()))),
            Some(before) if before != after => {
                events.push(StoreEvent::child(StoreEventKind::ChildChanged, path, key, Some(after.clone())))
            }
            Some(_) => {}
        }
    }
    events.push(StoreEvent::value(path, new.cloned()));
    events
}

/// Aplica um evento `put` do streaming REST ao snapshot local.
pub fn apply_put(snapshot: &mut Option<Value>, rel: &str, data: Value) {
    tree::set_at(snapshot, rel, Some(data));
}

/// Aplica um evento `patch` do streaming REST (merge de filhos) ao snapshot local.
pub fn apply_patch(snapshot: &mut Option<Value>, rel: &str, data: Map<String, Value>) {
    for (key, value) in data {
        tree::set_at(snapshot, &tree::join(rel.trim_matches('/'), &key), Some(value));
    }
}

/// Parser incremental de `text/event-stream` (apenas os campos `event` e `data`).
#[derive(Debug, Default)]
pub struct SseParser {
    /// Bytes ainda sem '\n'; só linhas completas são descodificadas (UTF-8 pode vir partido).
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    /// Alimenta bytes recebidos; devolve os eventos completos `(nome, dados)`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<(String, String)> {
        self.buffer.extend_from_slice(chunk);
        let mut complete = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&bytes);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if self.event.is_some() || !self.data.is_empty() {
                    let name = self.event.take().unwrap_or_else(|| "message".to_string());
                    complete.push((name, self.data.join("\n")));
                    self.data.clear();
                }
            } else if let Some(rest) = line.strip_prefix("event:") {
                self.event = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data.push(rest.trim_start().to_string());
            }
            // comentários (":") e outros campos são ignorados
        }
        complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initial_events_list_children_then_value() {
        let snapshot = json!({"a": 1, "b": 2});
        let events = initial_events("x", Some(&snapshot));
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, StoreEventKind::ChildAdded);
        assert_eq!(events[2].kind, StoreEventKind::ValueChanged);
    }

    #[test]
    fn diff_reports_added_changed_removed() {
        let old = json!({"a": 1, "b": 2});
        let new = json!({"b": 3, "c": 4});
        let events = diff_events("x", Some(&old), Some(&new));
        let kinds: Vec<_> = events.iter().map(|e| (e.kind, e.key.clone())).collect();
        assert!(kinds.contains(&(StoreEventKind::ChildRemoved, Some("a".into()))));
        assert!(kinds.contains(&(StoreEventKind::ChildChanged, Some("b".into()))));
        assert!(kinds.contains(&(StoreEventKind::ChildAdded, Some("c".into()))));
        assert_eq!(events.last().unwrap().kind, StoreEventKind::ValueChanged);
        assert!(diff_events("x", Some(&new), Some(&new)).is_empty());
    }

    #[test]
    fn put_and_patch_update_snapshot() {
        let mut snapshot = None;
        apply_put(&mut snapshot, "/", json!({"a": {"n": 1}}));
        apply_patch(&mut snapshot, "/a", json!({"m": 2}).as_object().unwrap().clone());
        assert_eq!(snapshot, Some(json!({"a": {"n": 1, "m": 2}})));
        apply_put(&mut snapshot, "/a", Value::Null);
        assert_eq!(snapshot, None);
    }

    #[test]
    fn sse_parser_handles_split_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"event: put\ndata: {\"path\":").is_empty());
        let events = parser.feed(b"\"/\",\"data\":1}\n\nevent: keep-alive\ndata: null\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "put");
        assert_eq!(events[0].1, "{\"path\":\"/\",\"data\":1}");
        assert_eq!(events[1].0, "keep-alive");
    }

    #[test]
    fn sse_parser_keeps_multibyte_chars_split_across_chunks() {
        let payload = "event: put\ndata: {\"path\":\"/\",\"data\":\"Ingeniería\"}\n\n".as_bytes();
        // Corta a meio dos dois bytes de 'í'.
        let split = payload.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut parser = SseParser::default();
        assert!(parser.feed(&payload[..split]).is_empty());
        let events = parser.feed(&payload[split..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, "{\"path\":\"/\",\"data\":\"Ingeniería\"}");
        assert!(!events[0].1.contains('\u{FFFD}'));
    }
}
