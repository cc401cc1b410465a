//! Model registry.
//!
//! An ordered, process-wide list of the language models offered in the model
//! picker. Each entry names the provider that serves it and the session
//! credential it needs.

use serde::Serialize;

/// An external provider that needs a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Xai,
    /// Brave Search (used by the `brave_search` tool, not for chat models)
    Brave,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Gemini,
        Provider::OpenAi,
        Provider::Xai,
        Provider::Brave,
    ];

    /// Stable lowercase identifier.
    pub fn id(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::Xai => "xai",
            Provider::Brave => "brave",
        }
    }

    /// Name shown in user-facing messages, e.g. `GEMINI`.
    pub fn display_name(&self) -> String {
        self.id().to_uppercase()
    }

    /// Name of the credential field for this provider.
    pub fn key_name(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini_api_key",
            Provider::OpenAi => "openai_api_key",
            Provider::Xai => "xai_api_key",
            Provider::Brave => "brave_api_key",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// One entry in the model picker.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSpec {
    /// Human-readable label (the lookup key)
    pub label: &'static str,
    /// Provider that serves the model
    pub provider: Provider,
    /// Provider-qualified identifier, e.g. `openai/gpt-4o-mini`
    pub id: &'static str,
    /// Credential this model requires
    pub key_name: &'static str,
}

impl ModelSpec {
    /// Model name as sent on the wire (the part after the provider prefix).
    pub fn api_model(&self) -> &'static str {
        match self.id.split_once('/') {
            Some((_, model)) => model,
            None => self.id,
        }
    }
}

static MODELS: [ModelSpec; 4] = [
    ModelSpec {
        label: "Gemini 2.0 Flash Lite",
        provider: Provider::Gemini,
        id: "gemini/gemini-2.0-flash-lite",
        key_name: "gemini_api_key",
    },
    ModelSpec {
        label: "Gemini 2.5 Pro Exp",
        provider: Provider::Gemini,
        id: "gemini/gemini-2.5-pro-exp-03-25",
        key_name: "gemini_api_key",
    },
    ModelSpec {
        label: "OpenAI GPT-4o Mini",
        provider: Provider::OpenAi,
        id: "openai/gpt-4o-mini",
        key_name: "openai_api_key",
    },
    ModelSpec {
        label: "XAI Grok-2",
        provider: Provider::Xai,
        id: "xai/grok-2-latest",
        key_name: "xai_api_key",
    },
];

/// All models, in picker order.
pub fn all_models() -> &'static [ModelSpec] {
    &MODELS
}

/// The model selected when the user has not picked one.
pub fn default_model() -> &'static ModelSpec {
    &MODELS[0]
}

/// Look up a model by its label.
pub fn find_model(label: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|m| m.label == label)
}
