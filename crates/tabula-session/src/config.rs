//! Context configuration.

use serde::{Deserialize, Serialize};
use tabula_core::{Error, Result};
use tabula_query::{AliasStyle, Dialect};

/// Configuration for a [`DataContext`](crate::DataContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Text in front of every generated table alias.
    pub alias_prefix: String,
    /// Zero-padded digit count of generated table aliases.
    pub alias_width: usize,
    /// Whether delete runs validation rules first.
    pub validate_on_delete: bool,
    /// Log the rendered SQL of every request at trace level.
    pub trace_sql: bool,
    /// Dialect used when rendering SQL for tracing.
    pub dialect: Dialect,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            alias_prefix: "table".to_string(),
            alias_width: 3,
            validate_on_delete: true,
            trace_sql: false,
            dialect: Dialect::SqlServer,
        }
    }
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.alias_prefix = prefix.into();
        self
    }

    pub fn alias_width(mut self, width: usize) -> Self {
        self.alias_width = width;
        self
    }

    pub fn validate_on_delete(mut self, value: bool) -> Self {
        self.validate_on_delete = value;
        self
    }

    pub fn trace_sql(mut self, value: bool) -> Self {
        self.trace_sql = value;
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn alias_style(&self) -> AliasStyle {
        AliasStyle::new(self.alias_prefix.clone(), self.alias_width)
    }

    /// Check that generated aliases are usable identifiers.
    pub fn validate(&self) -> Result<()> {
        let mut chars = self.alias_prefix.chars();
        let leading_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !leading_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::Config(format!(
                "alias prefix '{}' is not a plain identifier",
                self.alias_prefix
            )));
        }
        if self.alias_width == 0 {
            return Err(Error::Config("alias width must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Load from JSON. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid context configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}
