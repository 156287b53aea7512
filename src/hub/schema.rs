use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, MessageId};

use super::HubError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Music command waiting for a process with a free voice slot.
    MusicDispatch,
    /// Any other command.
    GenericDispatch,
    Proceed,
    NoCapacity,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::MusicDispatch => "music-dispatch",
            Topic::GenericDispatch => "generic-dispatch",
            Topic::Proceed => "proceed",
            Topic::NoCapacity => "no-capacity",
        }
    }
}

/// How the hub settled a pending command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Proceed,
    NoCapacity,
}

/// Published by the process that received a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub topic: Topic,
    pub correlation_id: MessageId,
    pub origin_process_id: String,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_channel_id: Option<ChannelId>,
    pub args: Vec<String>,
}

impl DispatchRequest {
    pub fn encode(&self) -> Result<Bytes, HubError> {
        Ok(serde_json::to_vec(self)?.into())
    }
}

/// Sent by the hub to settle one dispatch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubResolution {
    pub topic: Topic,
    pub correlation_id: MessageId,
    pub addressed_process_id: String,
}

impl HubResolution {
    pub fn decode(payload: &[u8]) -> Result<Self, HubError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> Result<Bytes, HubError> {
        Ok(serde_json::to_vec(self)?.into())
    }

    pub fn resolution(&self) -> Option<Resolution> {
        match self.topic {
            Topic::Proceed => Some(Resolution::Proceed),
            Topic::NoCapacity => Some(Resolution::NoCapacity),
            Topic::MusicDispatch | Topic::GenericDispatch => None,
        }
    }

    pub fn is_addressed_to(&self, process_id: &str) -> bool {
        self.addressed_process_id == process_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dispatch_request_uses_camel_case_fields() {
        let request = DispatchRequest {
            topic: Topic::MusicDispatch,
            correlation_id: MessageId::new(42),
            origin_process_id: "proc-a".to_string(),
            guild_id: GuildId::new(1),
            channel_id: ChannelId::new(2),
            voice_channel_id: None,
            args: vec!["never".to_string(), "gonna".to_string()],
        };

        let value: serde_json::Value = serde_json::from_slice(&request.encode().unwrap()).unwrap();

        assert_eq!(value["topic"], "music-dispatch");
        assert_eq!(value["originProcessId"], "proc-a");
        assert!(value.get("correlationId").is_some());
        assert!(value.get("voiceChannelId").is_none());
        assert_eq!(value["args"][1], "gonna");
    }

    #[test]
    fn decodes_hub_resolution() {
        let payload = br#"{"topic":"no-capacity","correlationId":"42","addressedProcessId":"proc-a"}"#;

        let resolution = HubResolution::decode(payload).unwrap();

        assert_eq!(resolution.correlation_id, MessageId::new(42));
        assert_eq!(resolution.resolution(), Some(Resolution::NoCapacity));
        assert!(resolution.is_addressed_to("proc-a"));
        assert!(!resolution.is_addressed_to("proc-b"));
    }

    #[test]
    fn dispatch_topics_are_not_resolutions() {
        let resolution = HubResolution {
            topic: Topic::GenericDispatch,
            correlation_id: MessageId::new(1),
            addressed_process_id: "p".to_string(),
        };

        assert_eq!(resolution.resolution(), None);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            HubResolution::decode(b"not json"),
            Err(HubError::Serialization(_))
        ));
    }
}
