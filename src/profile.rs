//! Assistant persona and canned copy
//!
//! The behavioral profile is fixed when a session opens and applies to
//! every turn of that session.

/// Persona instructions sent as the system instruction of every session
const SYNTHOS_INSTRUCTIONS: &str = "You are Synthos, an advanced AI assistant for SynthosLab. You are professional, creative, and concise. The agency specializes in Web Development, Design, and AI Automation. Your tone is futuristic and helpful. Do not provide code unless explicitly asked. Focus on explaining value and services.";

/// First assistant turn shown when the widget opens
pub const GREETING: &str =
    "Hello! I'm Synthos, your AI assistant. How can I help you elevate your brand today?";

/// Text that replaces an assistant turn whose stream failed
pub const FALLBACK_MESSAGE: &str =
    "I apologize, but I'm having trouble connecting to the network right now.";

/// Instruction/persona configuration bound to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorProfile {
    pub instructions: String,
}

impl BehaviorProfile {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    /// Use `instructions` when present and non-blank, else the default persona
    pub fn with_override(instructions: Option<&str>) -> Self {
        match instructions.map(str::trim) {
            Some(text) if !text.is_empty() => Self::new(text),
            _ => Self::default(),
        }
    }
}

impl Default for BehaviorProfile {
    fn default() -> Self {
        Self::new(SYNTHOS_INSTRUCTIONS)
    }
}
