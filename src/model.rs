use crate::error::ConfigError;
use crate::settings::Settings;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MenuItem {
    pub id: String,
    pub title: String,
    // Optional explicit kind (submenu|action|command|leaf); must agree with the other fields
    #[serde(default)]
    pub kind: Option<String>,
    // Static hierarchical children (nested submenus)
    #[serde(default)]
    pub children: Option<Vec<MenuItem>>,
    // Tool id: without `command` the node expands to the tool's commands from `tools`
    #[serde(default)]
    pub tool: Option<String>,
    // Command template, e.g. "nmap -T4 -F {target}"
    #[serde(default)]
    pub command: Option<String>,
    // Leaf widget: "results" or "text"
    #[serde(default)]
    pub widget: Option<String>,
    // Text leaf: inline content
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_header")]
    pub header: String,
    // tool id -> command id -> template; order is the menu order
    #[serde(default)]
    pub tools: Map<String, JsonValue>,
    pub menu: Vec<MenuItem>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            header: default_header(),
            tools: Map::new(),
            menu: vec![],
        }
    }
}

fn default_header() -> String {
    "Pen-Deck".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub id: String,
    pub template: String,
}

impl AppConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        serde_json::from_value(settings.value().clone())
            .map_err(|e| ConfigError::Schema(e.to_string()))
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.contains_key(tool)
    }

    pub fn tool_commands(&self, tool: &str) -> Result<Vec<ToolCommand>, ConfigError> {
        let Some(entries) = self.tools.get(tool).and_then(|v| v.as_object()) else {
            return Ok(Vec::new());
        };
        entries
            .iter()
            .map(|(id, v)| {
                v.as_str()
                    .map(|t| ToolCommand {
                        id: id.clone(),
                        template: t.to_string(),
                    })
                    .ok_or_else(|| ConfigError::InvalidToolEntry {
                        tool: tool.to_string(),
                        command: id.clone(),
                    })
            })
            .collect()
    }
}

/// "quick_scan" -> "Quick Scan"
pub fn title_from_id(id: &str) -> String {
    id.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
