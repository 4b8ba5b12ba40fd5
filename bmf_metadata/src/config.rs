use crate::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Format of the model and prior artifacts
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SerializedType {
    /// Fast, binary format
    Bincode,
    /// Slow, human-readable format
    #[default]
    Yaml,
    Json,
}

impl SerializedType {
    /// File extension of artifacts in this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Bincode => "bincode",
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }
}

impl FromStr for SerializedType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bincode" => Ok(Self::Bincode),
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(Self::Err::SerializedTypeInvalid(String::from(s))),
        }
    }
}

impl std::fmt::Display for SerializedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}
