//! Display targets supplied by the UI layer.
//!
//! The client never creates UI elements. Callers hand in something that can
//! show text and carry attributes (an image's `src`, a link's `href`) and
//! the client writes into it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

/// A UI element the client can write into.
pub trait DisplayTarget: Send + Sync {
    /// Text currently shown.
    fn text(&self) -> String;
    fn set_text(&self, text: &str);
    fn set_attr(&self, name: &str, value: &str);
}

#[derive(Debug, Default)]
struct TargetState {
    text: String,
    attrs: HashMap<String, String>,
    writes: usize,
}

/// An in-memory [`DisplayTarget`] that remembers what was written to it.
#[derive(Debug, Default)]
pub struct TextTarget {
    state: Mutex<TargetState>,
}

impl TextTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// A target already showing `text`.
    pub fn with_text(text: &str) -> Self {
        let target = Self::default();
        target.lock().text = text.to_string();
        target
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.lock().attrs.get(name).cloned()
    }

    /// How many times the target was written to.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, TargetState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DisplayTarget for TextTarget {
    fn text(&self) -> String {
        self.lock().text.clone()
    }

    fn set_text(&self, text: &str) {
        let mut state = self.lock();
        state.text = text.to_string();
        state.writes += 1;
    }

    fn set_attr(&self, name: &str, value: &str) {
        let mut state = self.lock();
        state.attrs.insert(name.to_string(), value.to_string());
        state.writes += 1;
    }
}

/// Render a JSON value the way it should appear as element text.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Whether a field is worth showing: null, `false`, zero and empty strings
/// are not.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
