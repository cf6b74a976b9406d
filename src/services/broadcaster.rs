// src/services/broadcaster.rs
//! Registo de clientes ligados ao stream SSE (/api/events) e envio de eventos a todos.

use futures_util::Stream;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Mensagens em espera por cliente; um cliente mais lento do que isto perde eventos.
const CLIENT_BUFFER: usize = 32;

/// Evento com nome, enviado como `event: <name>` / `data: <json>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveEvent {
    pub name: &'static str,
    pub data: Value,
}

impl LiveEvent {
    pub fn new(name: &'static str, data: impl Serialize) -> Self {
        let data = serde_json::to_value(data).unwrap_or_else(|e| {
            tracing::error!("Erro ao serializar evento '{}': {:?}", name, e);
            Value::Null
        });
        Self { name, data }
    }
}

type ClientTx = mpsc::Sender<LiveEvent>;

#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    // ID da ligação -> canal para enviar mensagens a esse cliente
    clients: Arc<Mutex<HashMap<Uuid, ClientTx>>>,
}

impl Broadcaster {
    /// Regista um novo cliente. O cliente sai do registo quando a `Subscription` é largada.
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let total = {
            let mut clients = self.lock();
            clients.insert(id, tx);
            clients.len()
        };
        tracing::info!("🔌 Novo cliente SSE: {} ({} ligados)", id, total);
        Subscription {
            id,
            rx,
            registry: self.clone(),
        }
    }

    /// Envia o evento a TODOS os clientes ligados. Não bloqueia: clientes cheios perdem o evento.
    pub fn publish(&self, event: LiveEvent) -> usize {
        let clients = self.lock();
        let mut delivered = 0;
        for (id, tx) in clients.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Cliente SSE {} atrasado; evento '{}' descartado.", id, event.name)
                }
                // Fechado: o Drop da Subscription trata da remoção.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        tracing::debug!("-> Evento '{}' enviado a {} clientes.", event.name, delivered);
        delivered
    }

    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, id: &Uuid) {
        if self.lock().remove(id).is_some() {
            tracing::info!("🔌 Cliente SSE {} desligado.", id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, ClientTx>> {
        // Um pânico com o lock na mão não deixa o mapa inconsistente.
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ligação de um cliente. Largar (ou `close`) remove-a do registo.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<LiveEvent>,
    registry: Broadcaster,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.rx.recv().await
    }

    pub fn close(self) {}

    /// Stream de eventos; a subscrição vive enquanto o stream viver.
    pub fn into_stream(mut self) -> impl Stream<Item = LiveEvent> {
        async_stream::stream! {
            while let Some(event) = self.recv().await {
                yield event;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let broadcaster = Broadcaster::default();
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        let delivered = broadcaster.publish(LiveEvent::new("students", json!([{"name": "Ana"}])));
        assert_eq!(delivered, 2);
        assert_eq!(a.recv().await.unwrap().name, "students");
        assert_eq!(b.recv().await.unwrap().data, json!([{"name": "Ana"}]));
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters_client() {
        let broadcaster = Broadcaster::default();
        let first = broadcaster.subscribe();
        let second = broadcaster.subscribe();
        assert_eq!(broadcaster.client_count(), 2);

        first.close();
        drop(second);
        assert_eq!(broadcaster.client_count(), 0);
        assert_eq!(broadcaster.publish(LiveEvent::new("students", json!([]))), 0);
    }

    #[tokio::test]
    async fn late_subscribers_get_no_replay() {
        let broadcaster = Broadcaster::default();
        broadcaster.publish(LiveEvent::new("students", json!([])));
        let mut late = broadcaster.subscribe();
        broadcaster.publish(LiveEvent::new("session", json!({"n": 1})));
        assert_eq!(late.recv().await.unwrap().name, "session");
    }
}
