//! Payload shape checks for in-room messages.

use serde_json::Value;

/// The payload type a message name expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Anything, including a missing payload.
    Any,
    /// A JSON number.
    Number,
    String,
    Bool,
    /// A JSON array holding at least `min_len` elements.
    Array { min_len: usize },
}

impl PayloadShape {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Bool => value.is_boolean(),
            Self::Array { min_len } => value
                .as_array()
                .is_some_and(|items| items.len() >= *min_len),
        }
    }
}
