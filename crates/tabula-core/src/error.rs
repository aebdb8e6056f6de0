//! Error types.
//!
//! Structural errors abort the current operation and travel through
//! [`Result`]. Validation failures are not errors: they accumulate on the
//! instance in an [`Errors`] collection.

use serde::{Deserialize, Serialize};

/// The primary error type for all Tabula operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Mutation attempted on a read-only, deleted or otherwise locked instance.
    #[error("{entity} is not editable: {reason}")]
    NotEditable { entity: String, reason: String },

    /// Read of a field that was not loaded on a read-only instance.
    #[error("field '{field}' was not retrieved for read-only {entity}")]
    FieldNotRetrieved { entity: String, field: String },

    /// A dotted path does not resolve against the schema.
    #[error("path '{path}' does not resolve on {entity}")]
    UnknownPath { entity: String, path: String },

    /// Entity type not present in the registry.
    #[error("entity '{0}' is not registered")]
    UnknownEntity(String),

    /// Value or instance of the wrong type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// A different descriptor is already registered under this name.
    #[error("entity '{0}' is already registered with a different descriptor")]
    DuplicateEntity(String),

    /// Invalid schema declaration.
    #[error("schema error: {0}")]
    Schema(String),

    /// A backend row could not be converted into an instance.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Failure reported by the relational backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`Error::NotEditable`].
    pub fn not_editable(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::NotEditable {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::UnknownPath`].
    pub fn unknown_path(entity: impl Into<String>, path: impl Into<String>) -> Self {
        Error::UnknownPath {
            entity: entity.into(),
            path: path.into(),
        }
    }
}

/// Result type alias for Tabula operations.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Validation errors
// ============================================================================

/// A single failed validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field the rule is attached to.
    pub field: String,
    /// Human readable message.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation failures accumulated on an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Errors {
    errors: Vec<ValidationError>,
}

impl Errors {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Failures recorded against one field.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.errors.iter().filter(move |e| e.field == field)
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
