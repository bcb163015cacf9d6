use serde::{Deserialize, Serialize};

/// One selectable backend model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Provider-qualified identifier, e.g. `openai/gpt-4o`
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Whether this model accepts image attachments
    #[serde(default)]
    pub multimodal: bool,
    #[serde(default)]
    pub is_reasoning: bool,
    #[serde(default)]
    pub is_coder: bool,
    #[serde(default)]
    pub is_image_generator: bool,
    #[serde(default)]
    pub is_primary: bool,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            multimodal: false,
            is_reasoning: false,
            is_coder: false,
            is_image_generator: false,
            is_primary: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn multimodal(mut self) -> Self {
        self.multimodal = true;
        self
    }

    pub fn reasoning(mut self) -> Self {
        self.is_reasoning = true;
        self
    }

    pub fn coder(mut self) -> Self {
        self.is_coder = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Provider prefix of the id (`openai` for `openai/gpt-4o`)
    pub fn provider(&self) -> &str {
        self.id.split('/').next().unwrap_or(&self.id)
    }
}

/// Human-facing name for a provider prefix
pub fn provider_display_name(provider: &str) -> &str {
    match provider {
        "openai" => "OpenAI",
        "z-ai" => "Z.AI",
        "moonshotai" => "Moonshot AI",
        "mistralai" => "Mistral AI",
        "deepseek" => "DeepSeek",
        "qwen" => "Qwen",
        "google" => "Google",
        "meta-llama" => "Meta",
        other => other,
    }
}

/// Models grouped under one provider, in catalog order
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderGroup<'a> {
    pub provider: &'a str,
    pub display_name: &'a str,
    pub models: Vec<&'a ModelInfo>,
}

/// The injected list of available models
#[derive(Clone, Debug, Default)]
pub struct ModelCatalog {
    models: Vec<ModelInfo>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelInfo>) -> Self {
        Self { models }
    }

    /// Catalog used when no `models.json` is configured
    pub fn builtin() -> Self {
        Self::new(vec![
            ModelInfo::new("openai/gpt-4o", "GPT-4o")
                .description("OpenAI flagship with vision")
                .multimodal()
                .primary(),
            ModelInfo::new("openai/gpt-4o-mini", "GPT-4o mini")
                .description("Fast, inexpensive multimodal model")
                .multimodal(),
            ModelInfo::new("z-ai/glm-4.5", "GLM 4.5").description("General purpose model from Z.AI"),
            ModelInfo::new("moonshotai/kimi-k2", "Kimi K2")
                .description("Long-context mixture-of-experts model"),
            ModelInfo::new("mistralai/mistral-large", "Mistral Large")
                .description("Mistral's top-tier model"),
            ModelInfo::new("deepseek/deepseek-chat", "DeepSeek V3")
                .description("General chat model")
                .primary(),
            ModelInfo::new("deepseek/deepseek-r1", "DeepSeek R1")
                .description("Open reasoning model")
                .reasoning(),
            ModelInfo::new("qwen/qwen-2.5-coder-32b-instruct", "Qwen2.5 Coder 32B")
                .description("Code generation and repair")
                .coder(),
            ModelInfo::new("google/gemini-2.0-flash-001", "Gemini 2.0 Flash")
                .description("Fast multimodal model from Google")
                .multimodal(),
            ModelInfo::new("meta-llama/llama-3.3-70b-instruct", "Llama 3.3 70B")
                .description("Meta's open instruction-tuned model"),
        ])
    }

    pub fn get_model(&self, id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get_model(id).is_some()
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Whether attachments may be sent to `id`; unknown models never accept them
    pub fn supports_attachments(&self, id: &str) -> bool {
        self.get_model(id).is_some_and(|m| m.multimodal)
    }

    /// First primary model, else the first model
    pub fn default_model(&self) -> Option<&ModelInfo> {
        self.models
            .iter()
            .find(|m| m.is_primary)
            .or_else(|| self.models.first())
    }

    /// Group models by provider, keeping first-seen provider order
    pub fn models_by_provider(&self) -> Vec<ProviderGroup<'_>> {
        let mut groups: Vec<ProviderGroup<'_>> = Vec::new();
        for model in &self.models {
            let provider = model.provider();
            match groups.iter_mut().find(|g| g.provider == provider) {
                Some(group) => group.models.push(model),
                None => groups.push(ProviderGroup {
                    provider,
                    display_name: provider_display_name(provider),
                    models: vec![model],
                }),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_prefix() {
        let model = ModelInfo::new("meta-llama/llama-3.3-70b-instruct", "Llama");
        assert_eq!(model.provider(), "meta-llama");
        assert_eq!(provider_display_name(model.provider()), "Meta");
        assert_eq!(ModelInfo::new("local", "Local").provider(), "local");
        assert_eq!(provider_display_name("acme"), "acme");
    }

    #[test]
    fn test_models_by_provider_keeps_order() {
        let catalog = ModelCatalog::new(vec![
            ModelInfo::new("openai/a", "A"),
            ModelInfo::new("google/b", "B"),
            ModelInfo::new("openai/c", "C"),
        ]);
        let groups = catalog.models_by_provider();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].provider, "openai");
        assert_eq!(groups[0].display_name, "OpenAI");
        let ids: Vec<&str> = groups[0].models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["openai/a", "openai/c"]);
        assert_eq!(groups[1].models.len(), 1);
    }

    #[test]
    fn test_supports_attachments_reads_multimodal() {
        let catalog = ModelCatalog::builtin();
        assert!(catalog.supports_attachments("openai/gpt-4o"));
        assert!(!catalog.supports_attachments("deepseek/deepseek-r1"));
        assert!(!catalog.supports_attachments("unknown/model"));
    }

    #[test]
    fn test_default_model_prefers_primary() {
        let catalog = ModelCatalog::new(vec![
            ModelInfo::new("x/one", "One"),
            ModelInfo::new("x/two", "Two").primary(),
        ]);
        assert_eq!(catalog.default_model().unwrap().id, "x/two");
        assert!(ModelCatalog::default().default_model().is_none());
    }

    #[test]
    fn test_model_info_deserializes_with_defaults() {
        let model: ModelInfo =
            serde_json::from_str(r#"{"id": "openai/gpt-4o", "name": "GPT-4o", "multimodal": true}"#)
                .unwrap();
        assert!(model.multimodal);
        assert!(!model.is_primary);
        assert!(model.description.is_empty());
    }
}
