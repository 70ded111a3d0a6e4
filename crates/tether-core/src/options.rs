//! Context configuration

use serde::Deserialize;

/// Errors loading context options
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    /// Malformed TOML or unknown keys
    #[error("invalid context options: {0}")]
    Parse(#[from] toml::de::Error),

    /// Limit of zero would reject every call
    #[error("max_call_depth must be at least 1")]
    ZeroCallDepth,
}

/// Options for creating a [`Context`](crate::Context)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextOptions {
    /// Name used in log events
    pub name: String,
    /// Maximum number of nested calls (None = unbounded)
    pub max_call_depth: Option<usize>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            max_call_depth: None,
        }
    }
}

impl ContextOptions {
    /// Options with no limits
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Set the context name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Cap the nesting of calls
    pub fn with_call_depth_limit(mut self, limit: usize) -> Self {
        self.max_call_depth = Some(limit);
        self
    }

    /// Parse options from TOML; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, OptionsError> {
        let options: ContextOptions = toml::from_str(source)?;
        if options.max_call_depth == Some(0) {
            return Err(OptionsError::ZeroCallDepth);
        }
        Ok(options)
    }
}
