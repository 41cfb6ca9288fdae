//! Languages supported by the translation service

use serde::{Deserialize, Serialize};

/// A selectable source or target language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Sylheti,
    Bengali,
    English,
}

impl Language {
    /// Wire name used by the remote service
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Sylheti => "sylheti",
            Language::Bengali => "bengali",
            Language::English => "english",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_serde() {
        for lang in [Language::Sylheti, Language::Bengali, Language::English] {
            let json = serde_json::to_string(&lang).unwrap();
            assert_eq!(json, format!("\"{}\"", lang.as_str()));
        }
    }
}
