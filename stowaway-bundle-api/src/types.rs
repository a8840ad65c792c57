//! Lifecycle event and resource types shared by the core and bundles

use serde::{Deserialize, Serialize};

/// A host-originated lifecycle event targeting one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The component is being created
    Create {
        #[serde(default)]
        args: serde_json::Value,
    },
    /// The component should start
    Start,
    /// The component should stop
    Stop,
    /// The component is being destroyed
    Destroy,
    /// The host requests a state transition
    Transition { state: String },
    /// Deliver a message (receivers, bound services)
    Deliver {
        action: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl LifecycleEvent {
    /// Short name of the event kind, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Destroy => "destroy",
            Self::Transition { .. } => "transition",
            Self::Deliver { .. } => "deliver",
        }
    }
}

/// What an entry point returns to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EventOutcome {
    /// Event handled, nothing to return
    #[default]
    Handled,
    /// Event handled with a reply value
    Reply(serde_json::Value),
}

/// Payload of a bundle or host resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceValue {
    Text(String),
    Binary(Vec<u8>),
}

impl ResourceValue {
    /// The text payload, if this is a text resource
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Raw bytes of the payload
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
