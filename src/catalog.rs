// src/catalog.rs
use crate::session::{Tool, ToolRatings};

/// `suggested_tool` value the backend uses when it answered from a web search
/// rather than proposing a tool.
pub const WEB_SEARCH_KEY: &str = "websearch";

/// Resolves backend tool keys to the descriptors shown to the user.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<Tool>,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new(builtin_tools())
    }
}

impl ToolCatalog {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self { tools }
    }

    pub fn get(&self, key: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.key == key)
    }

    /// Tools to attach to an assistant reply for `suggested_tool`.
    /// Web search and unknown keys yield nothing.
    pub fn suggest(&self, suggested_tool: Option<&str>) -> Option<Vec<Tool>> {
        let key = suggested_tool?.trim();
        if key.is_empty() || key.eq_ignore_ascii_case(WEB_SEARCH_KEY) || key.eq_ignore_ascii_case("web_search") {
            return None;
        }
        match self.get(key) {
            Some(tool) => Some(vec![tool.clone()]),
            None => {
                log::warn!("Backend suggested unknown tool '{}'", key);
                None
            }
        }
    }
}

fn builtin_tools() -> Vec<Tool> {
    vec![
        Tool {
            key: "brain_tumor".to_string(),
            name: "Brain tumor classifier".to_string(),
            description: "Classifies a brain MRI as no tumor, meningioma, glioma or pituitary tumor".to_string(),
            input_type: "image/*".to_string(),
            ratings: ToolRatings {
                stars: 4.5,
                downloads: 12_400,
                accuracy: 0.94,
                last_update: "2024-11-02".to_string(),
                verified: Some(true),
            },
        },
        Tool {
            key: "alzheimer_mri".to_string(),
            name: "MRI Alzheimer predictor".to_string(),
            description: "Upload MRI scan to predict Alzheimer's probability".to_string(),
            input_type: "image/*".to_string(),
            ratings: ToolRatings {
                stars: 4.2,
                downloads: 8_310,
                accuracy: 0.89,
                last_update: "2024-09-15".to_string(),
                verified: Some(true),
            },
        },
        Tool {
            key: "speech_cognitive".to_string(),
            name: "Brain damage analyzer".to_string(),
            description: "Analyze speech patterns for cognitive assessment".to_string(),
            input_type: "audio/*".to_string(),
            ratings: ToolRatings {
                stars: 3.8,
                downloads: 2_045,
                accuracy: 0.81,
                last_update: "2024-06-30".to_string(),
                verified: None,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn known_key_yields_single_tool() {
        let catalog = ToolCatalog::default();
        let tools = catalog.suggest(Some("brain_tumor")).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].input_type, "image/*");
    }

    #[test]
    fn web_search_and_unknown_keys_yield_nothing() {
        let catalog = ToolCatalog::default();
        assert_eq!(catalog.suggest(Some("websearch")), None);
        assert_eq!(catalog.suggest(Some("web_search")), None);
        assert_eq!(catalog.suggest(Some("crystal_ball")), None);
        assert_eq!(catalog.suggest(Some("  ")), None);
        assert_eq!(catalog.suggest(None), None);
    }
}
