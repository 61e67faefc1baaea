//! Codec configuration.
//!
//! Every field has a default, so a host application can embed a partial
//! `codec` section in its own config file and deserialize it with serde.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::charset::Charset;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Decode 404 responses as empty instead of parsing their body.
    pub dismiss_404: bool,
    /// Charset label used when a response declares no usable charset.
    pub default_charset: String,
    /// Reject JSON properties that the target object schema does not declare.
    pub fail_on_unknown_properties: bool,
    /// Indent encoded request bodies.
    pub pretty_print: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            dismiss_404: true,
            default_charset: "UTF-8".to_string(),
            fail_on_unknown_properties: false,
            pretty_print: false,
        }
    }
}

impl CodecConfig {
    /// The resolved `default_charset`, or UTF-8 when the label is unknown.
    pub fn resolved_charset(&self) -> Charset {
        Charset::for_label(&self.default_charset).unwrap_or_else(|| {
            warn!(
                charset = %self.default_charset,
                "unknown default charset, using UTF-8"
            );
            Charset::utf8()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let config: CodecConfig =
            serde_json::from_str(r#"{"dismiss_404":false,"pretty_print":true}"#).unwrap();
        assert!(!config.dismiss_404);
        assert!(config.pretty_print);
        assert_eq!(config.default_charset, "UTF-8");
        assert!(!config.fail_on_unknown_properties);
    }

    #[test]
    fn default_charset_resolves_or_falls_back() {
        let mut config = CodecConfig {
            default_charset: "latin1".to_string(),
            ..CodecConfig::default()
        };
        assert_eq!(config.resolved_charset(), Charset::Latin1);
        config.default_charset = "not-a-charset".to_string();
        assert_eq!(config.resolved_charset(), Charset::utf8());
    }
}
