use thiserror::Error;

use crate::types::EntityKind;

/// Failure to rebuild an entity from its file contents.
///
/// Decoding is best-effort: malformed entries of multi-valued fields are
/// dropped silently, so this error is only produced when a field the entity
/// cannot exist without is missing or unreadable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{kind} file is missing required key '{key}'")]
    MissingField { kind: EntityKind, key: &'static str },

    #[error("{kind} file has an invalid value for '{key}': {value}")]
    InvalidField {
        kind: EntityKind,
        key: &'static str,
        value: String,
    },
}
