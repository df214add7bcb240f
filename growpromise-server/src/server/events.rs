use std::convert::Infallible;

use axum::Extension;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::StreamExt;
use futures::stream::Stream;
use growpromise_shared::api::ServerEvent;
use growpromise_shared::auth::Role;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, trace};

use super::{AppState, auth::AuthCtx};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// In-process fan-out of domain events. The engine publishes here after a
/// successful transition; SSE subscribers (UIs, notification bridges)
/// consume. Delivery is best-effort: lagging subscribers drop events.
#[derive(Clone)]
pub struct EventsHub {
    tx: tokio::sync::broadcast::Sender<ServerEvent>,
}

impl Default for EventsHub {
    fn default() -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl EventsHub {
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ServerEvent) {
        trace!(?event, "publishing domain event");
        // Send only fails when there are no subscribers; that is fine.
        let _ = self.tx.send(event);
    }
}

/// `GET /events`: stream domain events as SSE. Guardians see everything;
/// dependents only events about themselves.
pub async fn sse_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let claims = auth.claims;
    let own_dependent = match claims.role {
        Role::Guardian => None,
        Role::Dependent => claims.dependent_id.clone(),
    };
    debug!(username = %claims.sub, role = ?claims.role, "SSE subscriber attached");

    let rx = state.events.subscribe();
    let shutdown = state.shutdown_token();
    let stream = BroadcastStream::new(rx)
        .filter_map(move |item| {
            let own = own_dependent.clone();
            async move {
                match item {
                    Ok(event) => {
                        if let Some(dep) = &own
                            && event.dependent_id() != dep
                        {
                            return None;
                        }
                        match Event::default().json_data(&event) {
                            Ok(ev) => Some(Ok(ev)),
                            Err(e) => {
                                tracing::warn!(error=%e, "SSE: failed to encode event");
                                None
                            }
                        }
                    }
                    Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                        tracing::warn!(missed = n, "SSE subscriber lagged; events dropped");
                        None
                    }
                }
            }
        })
        .take_until(shutdown.cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::default())
}
