use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which durable store holds the conversation registry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Json,
    Sqlite,
    Memory,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage '{other}' (expected json, sqlite or memory)")),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// User configuration for the chat core
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Model bound at startup; falls back to the catalog default
    pub default_model_id: Option<String>,
    /// Derive a title from the first message once the first answer completes
    pub auto_title: bool,
    /// Cancel the outgoing conversation's request when the selection moves away
    pub cancel_on_switch: bool,
    /// Cap on requests outstanding across all conversations
    pub max_concurrent_requests: Option<usize>,
    pub storage: StorageKind,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            default_model_id: None,
            auto_title: true,
            cancel_on_switch: true,
            max_concurrent_requests: None,
            storage: StorageKind::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: ChatSettings =
            serde_json::from_str(r#"{"storage": "sqlite", "auto_title": false}"#).unwrap();
        assert_eq!(settings.storage, StorageKind::Sqlite);
        assert!(!settings.auto_title);
        assert!(settings.cancel_on_switch);
        assert!(settings.max_concurrent_requests.is_none());
    }

    #[test]
    fn test_storage_kind_parses_case_insensitively() {
        assert_eq!("SQLite".parse::<StorageKind>().unwrap(), StorageKind::Sqlite);
        assert_eq!(StorageKind::Memory.to_string(), "memory");
        assert!("redis".parse::<StorageKind>().is_err());
    }
}
