//! The invocation context handed to hooks, presenters and the dispatcher.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::error::ApiError;
use crate::state::StateManager;

// ─────────────────────────────────────────────────────────────────────────────
// Responder
// ─────────────────────────────────────────────────────────────────────────────

/// Completion signal shared with the transport.
///
/// Direct handlers and custom presenters finalize the response through a
/// `Responder` instead of returning a value. A response can be sent only once;
/// later attempts are refused and logged.
#[derive(Debug, Clone)]
pub struct Responder {
    body: Arc<Mutex<Option<Value>>>,
    finished: Arc<watch::Sender<bool>>,
}

impl Default for Responder {
    fn default() -> Self {
        Self::new()
    }
}

impl Responder {
    /// Creates an unfinished responder.
    #[must_use]
    pub fn new() -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            body: Arc::new(Mutex::new(None)),
            finished: Arc::new(finished),
        }
    }

    /// Sends `body` and finishes the response.
    ///
    /// Returns `false`, leaving the first body in place, when the response was
    /// already finished.
    pub fn send(&self, body: Value) -> bool {
        let mut body = Some(body);
        // The body is stored while the channel is locked, so a concurrent
        // send or finish observes either nothing or both.
        let sent = self.finished.send_if_modified(|finished| {
            if *finished {
                return false;
            }
            *self.body.lock() = body.take();
            *finished = true;
            true
        });
        if !sent {
            tracing::warn!("response already finished, ignoring second send");
        }
        sent
    }

    /// Finishes the response without a body. No-op when already finished.
    pub fn finish(&self) {
        self.finished
            .send_if_modified(|finished| !core::mem::replace(finished, true));
    }

    /// Whether the response is finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// The body sent, if any.
    #[must_use]
    pub fn body(&self) -> Option<Value> {
        self.body.lock().clone()
    }

    /// Resolves once the response is finished.
    pub async fn finished(&self) {
        let mut receiver = self.finished.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|finished| *finished).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a single invocation reads and writes.
///
/// The transport builds a context from the request, hands it to the
/// dispatcher and turns `result` or `error` into its response afterwards.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Raw named arguments.
    pub args: Map<String, Value>,
    /// Free-form metadata; `args` is inserted with the formatted arguments
    /// before the business function runs.
    pub options: Map<String, Value>,
    /// The presented result, once the method succeeded.
    pub result: Option<Value>,
    /// The error, once the invocation failed.
    pub error: Option<ApiError>,
    /// Lifecycle state of this invocation.
    pub state: StateManager,
    /// Completion signal shared with the transport.
    pub responder: Responder,
}

impl Context {
    /// Creates a context for the given raw arguments.
    #[must_use]
    pub fn new(args: Map<String, Value>) -> Self {
        Self {
            args,
            ..Self::default()
        }
    }

    /// Creates a context from a JSON object; anything else yields no arguments.
    #[must_use]
    pub fn from_json(args: Value) -> Self {
        match args {
            Value::Object(map) => Self::new(map),
            _ => Self::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    /// Uses a responder owned by the transport.
    #[must_use]
    pub fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = responder;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn second_send_is_refused() {
        let responder = Responder::new();
        assert!(!responder.is_finished());
        assert!(responder.send(json!({"ok": true})));
        assert!(!responder.send(json!({"ok": false})));
        assert_eq!(responder.body(), Some(json!({"ok": true})));
    }

    #[test]
    fn racing_senders_deliver_one_body() {
        let responder = Responder::new();
        let winners: Vec<i64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let responder = responder.clone();
                    scope.spawn(move || responder.send(json!(i)).then_some(i))
                })
                .collect();
            handles.into_iter().filter_map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(winners.len(), 1);
        assert_eq!(responder.body(), Some(json!(winners[0])));
    }

    #[test]
    fn send_after_finish_is_refused() {
        let responder = Responder::new();
        responder.finish();
        assert!(!responder.send(json!("late")));
        assert_eq!(responder.body(), None);
    }

    #[tokio::test]
    async fn finished_resolves_after_send() {
        let responder = Responder::new();
        let remote = responder.clone();
        let waiter = tokio::spawn(async move { remote.finished().await });
        responder.finish();
        waiter.await.unwrap();
        assert!(responder.is_finished());
        assert_eq!(responder.body(), None);
    }

    #[test]
    fn context_from_json() {
        let ctx = Context::from_json(json!({"id": "42"}));
        assert_eq!(ctx.args.get("id"), Some(&json!("42")));
        assert!(Context::from_json(json!([1])).args.is_empty());
    }
}
