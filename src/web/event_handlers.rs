// src/web/event_handlers.rs
use crate::services::broadcaster::Broadcaster;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{stream, Stream, StreamExt};
use serde_json::json;
use std::{convert::Infallible, time::Duration};

// GET /api/events
pub async fn events_stream(State(broadcaster): State<Broadcaster>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = broadcaster.subscribe();
    let hello = Event::default()
        .event("connected")
        .data(json!({ "clientId": subscription.id() }).to_string());

    let updates = subscription.into_stream().filter_map(|live| async move {
        match Event::default().event(live.name).json_data(&live.data) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::warn!("Evento SSE '{}' não serializado: {}", live.name, e);
                None
            }
        }
    });

    Sse::new(stream::once(async move { Ok(hello) }).chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
