// Project configuration document (`config.json`)

use serde::Deserialize;
use serde_json::Value;

use crate::dashboard::ParseError;

/// Descriptive fields only; everything else in the file is ignored
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    pub name: Option<String>,
    pub tools: Option<Vec<Value>>,
    pub tool_count: Option<u64>,
}

pub fn parse_config_document(text: &str) -> Result<ConfigDocument, ParseError> {
    Ok(serde_json::from_str(text)?)
}

impl ConfigDocument {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    /// Explicit `tool_count`, else the length of `tools`
    pub fn tool_count(&self) -> Option<u64> {
        self.tool_count.or_else(|| self.tools.as_ref().map(|tools| tools.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_count_from_list() {
        let doc = parse_config_document(r#"{"name": "Inventory bot", "tools": [{"name": "a"}, "b"], "model": "x"}"#).unwrap();
        assert_eq!(doc.name(), Some("Inventory bot"));
        assert_eq!(doc.tool_count(), Some(2));
    }

    #[test]
    fn test_explicit_tool_count_wins() {
        let doc = parse_config_document(r#"{"tools": ["a"], "tool_count": 9}"#).unwrap();
        assert_eq!(doc.tool_count(), Some(9));
    }

    #[test]
    fn test_empty_document() {
        let doc = parse_config_document("{}").unwrap();
        assert_eq!(doc.name(), None);
        assert_eq!(doc.tool_count(), None);

        let blank = parse_config_document(r#"{"name": "  "}"#).unwrap();
        assert_eq!(blank.name(), None);
    }
}
