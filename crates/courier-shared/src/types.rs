use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{MESSAGE_EXTENSION, READ_SET_EXTENSION, USER_EXTENSION};

/// Kinds of entity files that live in the exchange directory.
///
/// Ordered for ingestion: users before the messages that reference them,
/// read-sets last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    Message,
    ReadSet,
}

impl EntityKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::User => USER_EXTENSION,
            Self::Message => MESSAGE_EXTENSION,
            Self::ReadSet => READ_SET_EXTENSION,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            USER_EXTENSION => Some(Self::User),
            MESSAGE_EXTENSION => Some(Self::Message),
            READ_SET_EXTENSION => Some(Self::ReadSet),
            _ => None,
        }
    }

    /// Classify a path by its extension. Hidden files are never entities,
    /// which keeps in-flight `.<name>.tmp` writes out of the picture.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.starts_with('.') {
            return None;
        }
        Self::from_extension(path.extension()?.to_str()?)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Message => "message",
            Self::ReadSet => "read-set",
        };
        f.write_str(name)
    }
}
