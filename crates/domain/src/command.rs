//! Command traits and the untyped request envelope.

use common::CorrelationId;
use serde::{Deserialize, Serialize};

/// Trait for commands that can be dispatched to exactly one handler.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the current state doesn't allow the action.
pub trait Command: std::fmt::Debug + Send + Sync + 'static {
    /// Returns the command type name used for handler lookup.
    fn name(&self) -> &'static str;

    /// Returns the correlation ID carried through to resulting events.
    fn correlation_id(&self) -> &CorrelationId;
}

/// A concrete command type with a fixed name.
pub trait NamedCommand {
    const NAME: &'static str;
}

/// Untyped command request: `{"type": <string>, "args": {...}}`.
///
/// This is the JSON body local clients send; each domain decodes it into
/// its own typed command enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl CommandRequest {
    pub fn new(kind: impl Into<String>, args: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }

    /// Parses a request from its JSON body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Decodes the arguments into a typed command.
    pub fn decode_args<T: serde::de::DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_and_args() {
        let request =
            CommandRequest::from_slice(br#"{"type": "DeletePortfolio", "args": {"id": "p1"}}"#)
                .unwrap();
        assert_eq!(request.kind, "DeletePortfolio");
        assert_eq!(request.args["id"], "p1");
    }

    #[test]
    fn args_default_to_empty() {
        let request = CommandRequest::from_slice(br#"{"type": "Ping"}"#).unwrap();
        assert!(request.args.is_empty());
    }
}
