//! Configuration for the remote assistant

use std::time::Duration;

/// Model used when `SYNTHOS_MODEL` is unset
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Environment variables checked for the access credential, in order
const CREDENTIAL_VARS: &[&str] = &["API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Configuration consumed by the assistant client and session controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantConfig {
    /// Access credential; `None` leaves the assistant unconfigured
    pub api_key: Option<String>,
    /// Gateway base URL (e.g., `http://169.254.169.254/gateway/llm`)
    pub gateway: Option<String>,
    /// Model ID
    pub model: String,
    /// Idle timeout while waiting on a turn stream; `None` waits forever
    pub stream_timeout: Option<Duration>,
    /// Replacement persona instructions
    pub system_prompt: Option<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            gateway: None,
            model: DEFAULT_MODEL.to_string(),
            stream_timeout: None,
            system_prompt: None,
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = CREDENTIAL_VARS.iter().find_map(|name| get(*name));
        let stream_timeout = get("SYNTHOS_STREAM_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            api_key,
            gateway: get("LLM_GATEWAY"),
            model: get("SYNTHOS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            stream_timeout,
            system_prompt: get("SYNTHOS_SYSTEM_PROMPT"),
        }
    }

    /// A credential is available, either directly or through the gateway
    pub fn has_credential(&self) -> bool {
        self.gateway.is_some() || self.api_key.is_some()
    }
}
