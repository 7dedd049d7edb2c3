//! JSON envelope exchanged with the studio.
//!
//! Outbound requests carry `request-type` and a `message-id`; the studio
//! answers with the same `message-id` and a `status`. Push notifications
//! carry `update-type` instead. Parameters sit at the top level or at dot
//! paths (`mixer.muted`).

use std::borrow::Cow;

use serde_json::{Map, Value};

pub const REQUEST_TYPE: &str = "request-type";
pub const UPDATE_TYPE: &str = "update-type";
pub const MESSAGE_ID: &str = "message-id";
pub const STATUS: &str = "status";
pub const STATUS_OK: &str = "ok";

/// Topics too chatty to ever show up in frame logs.
const FRAME_LOG_BLACKLIST: &[&str] = &["audiomixer.vus", "MediaProgressNotify"];

/// Logged frames are cut to this many characters.
pub const FRAME_LOG_LIMIT: usize = 150;

/// An outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    request_type: String,
    body: Map<String, Value>,
}

impl Request {
    pub fn new(request_type: impl Into<String>) -> Self {
        let request_type = request_type.into();
        let mut body = Map::new();
        body.insert(REQUEST_TYPE.to_string(), Value::from(request_type.clone()));
        Self { request_type, body }
    }

    /// Builder form of [`Request::set`].
    pub fn with(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.set(path, value);
        self
    }

    /// Write a parameter at a dot path.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        set_path(&mut self.body, path, value.into());
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        get_in_map(&self.body, path)
    }

    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    pub fn message_id(&self) -> Option<&str> {
        self.body.get(MESSAGE_ID).and_then(Value::as_str)
    }

    pub fn set_message_id(&mut self, id: &str) {
        self.body
            .insert(MESSAGE_ID.to_string(), Value::from(id.to_string()));
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.body)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}

/// A reply to a correlated request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response(Value);

impl Response {
    pub fn message_id(&self) -> Option<&str> {
        self.0.get(MESSAGE_ID).and_then(Value::as_str)
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get(STATUS).and_then(Value::as_str)
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Some(STATUS_OK)
    }

    /// Present when the reply also names a push topic.
    pub fn update_type(&self) -> Option<&str> {
        self.0.get(UPDATE_TYPE).and_then(Value::as_str)
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.0, path)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// An unsolicited state-change push.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification(Value);

impl Notification {
    pub fn topic(&self) -> &str {
        self.0.get(UPDATE_TYPE).and_then(Value::as_str).unwrap_or("")
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.0, path)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(Response),
    Notification(Notification),
    Unrecognized(Value),
}

impl Inbound {
    /// A response needs both `message-id` and `status`; a notification
    /// needs `update-type`. Anything else is unrecognized.
    pub fn classify(value: Value) -> Self {
        let has_str = |key: &str| value.get(key).is_some_and(Value::is_string);
        if has_str(MESSAGE_ID) && has_str(STATUS) {
            Inbound::Response(Response(value))
        } else if has_str(UPDATE_TYPE) {
            Inbound::Notification(Notification(value))
        } else {
            Inbound::Unrecognized(value)
        }
    }
}

impl From<Response> for Notification {
    fn from(r: Response) -> Self {
        Notification(r.0)
    }
}

/// Read the value at a dot path (`mixer.muted`).
///
/// A literal key containing dots wins over descending into objects.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => get_in_map(map, path),
        _ => None,
    }
}

fn get_in_map<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(v) = map.get(path) {
        return Some(v);
    }
    let (head, rest) = path.split_once('.')?;
    get_path(map.get(head)?, rest)
}

/// Write a value at a dot path, creating intermediate objects.
///
/// A non-object value in the way is replaced.
pub fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Whether a raw frame may be written to the frame log.
pub fn should_log_frame(text: &str) -> bool {
    !FRAME_LOG_BLACKLIST.iter().any(|topic| text.contains(topic))
}

/// Cut a frame to [`FRAME_LOG_LIMIT`] characters for logging.
pub fn trim_frame(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(FRAME_LOG_LIMIT) {
        Some((idx, _)) => Cow::Owned(format!("{}...", &text[..idx])),
        None => Cow::Borrowed(text),
    }
}
