//! Catalog entries describing what can be generated.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::MediaKind;

/// A generation offering: one model exposed through one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Service {
    pub id: String,

    /// Model name understood by the provider adapter
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Provider name (see [`crate::Provider`])
    pub provider: String,

    pub kind: MediaKind,

    /// Credits charged for one single-shot generation
    pub cost_per_generation: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl Service {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        kind: MediaKind,
        cost_per_generation: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            provider: provider.into(),
            kind,
            cost_per_generation,
            examples: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
