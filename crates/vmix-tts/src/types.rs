//! Wire types of the ElevenLabs-compatible API.

use serde::{Deserialize, Serialize};

/// A voice offered by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VoicesResponse {
    pub voices: Vec<Voice>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SpeechRequest<'a> {
    pub text: &'a str,
    pub model_id: &'a str,
}
