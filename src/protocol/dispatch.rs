//! Delivery of classified frames to registered handlers.
//!
//! Each handler slot holds at most one handler. Registering again replaces
//! the previous handler; the last registration wins.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::trace;

use crate::protocol::frame::{classify, Classified};

/// Handler for structured (JSON) frames.
pub type JsonHandler = Arc<dyn Fn(&Value) + Send + Sync>;
/// Handler for free-text frames.
pub type RawHandler = Arc<dyn Fn(&str) + Send + Sync>;
/// Handler for the `(type, payload)` view of structured frames.
pub type TypedPairHandler = Arc<dyn Fn(Option<&str>, &Value) + Send + Sync>;

/// Which handlers ran for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    /// The structured handler ran.
    pub structured: bool,
    /// The typed-pair handler ran.
    pub typed_pair: bool,
    /// The raw handler ran.
    pub raw: bool,
}

impl Delivery {
    /// Check if any handler ran.
    pub fn is_delivered(&self) -> bool {
        self.structured || self.typed_pair || self.raw
    }
}

/// Split a structured document into its `(type, payload)` view.
///
/// `type` is the document's `type` member; a string is used as-is, any other
/// non-null value is rendered as compact JSON. `payload` is the `payload`
/// member when present. Without one it is the whole document if there is no
/// `type`, or an empty object if there is. Documents that are not objects
/// have no `type` and are their own payload.
pub fn typed_pair(doc: &Value) -> (Option<String>, Value) {
    let Some(object) = doc.as_object() else {
        return (None, doc.clone());
    };

    let kind = match object.get("type") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    let payload = match object.get("payload") {
        Some(payload) => payload.clone(),
        None if kind.is_none() => doc.clone(),
        None => Value::Object(Map::new()),
    };

    (kind, payload)
}

/// Holds the handlers of one link and routes frames to them.
#[derive(Default)]
pub struct Dispatcher {
    json: RwLock<Option<JsonHandler>>,
    raw: RwLock<Option<RawHandler>>,
    typed_pair: RwLock<Option<TypedPairHandler>>,
}

impl Dispatcher {
    /// Create a dispatcher with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the structured handler, replacing any previous one.
    pub fn set_json_handler<F>(&self, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        *self.json.write() = Some(Arc::new(handler));
    }

    /// Register the raw-text handler, replacing any previous one.
    pub fn set_raw_handler<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.raw.write() = Some(Arc::new(handler));
    }

    /// Register the typed-pair handler, replacing any previous one.
    pub fn set_typed_pair_handler<F>(&self, handler: F)
    where
        F: Fn(Option<&str>, &Value) + Send + Sync + 'static,
    {
        *self.typed_pair.write() = Some(Arc::new(handler));
    }

    /// Remove every handler.
    pub fn clear_handlers(&self) {
        *self.json.write() = None;
        *self.raw.write() = None;
        *self.typed_pair.write() = None;
    }

    /// Deliver one frame to exactly the handler matching its class.
    ///
    /// A structured frame goes only to the structured handler and a text
    /// frame only to the raw handler. Missing handlers drop the frame.
    pub fn dispatch(&self, frame: &[u8]) -> Delivery {
        let mut delivery = Delivery::default();

        match classify(frame) {
            Classified::Empty => {}
            Classified::Structured(doc) => {
                delivery.structured = self.call_json(&doc);
            }
            Classified::Raw(text) => {
                delivery.raw = self.call_raw(&text);
            }
        }

        if !delivery.is_delivered() {
            trace!("Frame of {} bytes not delivered", frame.len());
        }

        delivery
    }

    /// Deliver one frame the way the central receive pipeline does.
    ///
    /// A structured frame goes to the structured handler and, in addition,
    /// to the typed-pair handler. If neither is registered it falls back to
    /// the raw handler with the trimmed text. Text frames go to the raw
    /// handler.
    pub fn dispatch_with_fallback(&self, frame: &[u8]) -> Delivery {
        let mut delivery = Delivery::default();

        match classify(frame) {
            Classified::Empty => {}
            Classified::Structured(doc) => {
                delivery.structured = self.call_json(&doc);

                let handler = self.typed_pair.read().clone();
                if let Some(handler) = handler {
                    let (kind, payload) = typed_pair(&doc);
                    handler(kind.as_deref(), &payload);
                    delivery.typed_pair = true;
                }

                if !delivery.is_delivered() {
                    let text = String::from_utf8_lossy(frame);
                    delivery.raw = self.call_raw(text.trim());
                }
            }
            Classified::Raw(text) => {
                delivery.raw = self.call_raw(&text);
            }
        }

        delivery
    }

    fn call_json(&self, doc: &Value) -> bool {
        // Clone out of the lock so the handler may re-register.
        let handler = self.json.read().clone();
        match handler {
            Some(handler) => {
                handler(doc);
                true
            }
            None => false,
        }
    }

    fn call_raw(&self, text: &str) -> bool {
        let handler = self.raw.read().clone();
        match handler {
            Some(handler) => {
                handler(text);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("json", &self.json.read().is_some())
            .field("raw", &self.raw.read().is_some())
            .field("typed_pair", &self.typed_pair.read().is_some())
            .finish()
    }
}
