//! Entity <-> file conversion.
//!
//! Each entity is written to its own file named `<uuid>.<extension>`, so
//! distinct entities never collide and rewriting an entity replaces its own
//! file. Decoding is best-effort: a bad entry in a multi-valued field is
//! dropped, only a missing or unreadable required field fails the decode.

use std::path::Path;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use crate::error::DecodeError;
use crate::models::{Message, ReadSet, User};
use crate::properties::Properties;
use crate::text::is_valid_tag;
use crate::types::EntityKind;

/// A type that can be stored as one file in the exchange directory.
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Stable identity, also used as the file stem.
    fn id(&self) -> Uuid;

    fn to_properties(&self) -> Properties;

    /// `file_stem` is the stem of the file being decoded, when known.
    fn from_properties(props: &Properties, file_stem: Option<&str>) -> Result<Self, DecodeError>;
}

pub fn encode<E: Entity>(entity: &E) -> Vec<u8> {
    entity.to_properties().to_string().into_bytes()
}

pub fn decode<E: Entity>(bytes: &[u8]) -> Result<E, DecodeError> {
    let text = String::from_utf8_lossy(bytes);
    E::from_properties(&Properties::parse(&text), None)
}

/// Decode a file's contents, using its name as a fallback identity source.
pub fn decode_file<E: Entity>(path: &Path, bytes: &[u8]) -> Result<E, DecodeError> {
    let text = String::from_utf8_lossy(bytes);
    let stem = path.file_stem().and_then(|s| s.to_str());
    E::from_properties(&Properties::parse(&text), stem)
}

pub fn file_name<E: Entity>(entity: &E) -> String {
    file_name_for(E::KIND, entity.id())
}

pub fn file_name_for(kind: EntityKind, id: Uuid) -> String {
    format!("{}.{}", id, kind.extension())
}

/// Identity encoded in an entity file name.
pub fn id_from_path(path: &Path) -> Option<Uuid> {
    let stem = path.file_stem()?.to_str()?;
    Uuid::parse_str(stem).ok()
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

const KEY_ID: &str = "id";
const KEY_TAG: &str = "tag";
const KEY_PASSWORD: &str = "password";
const KEY_NAME: &str = "name";
const KEY_AVATAR: &str = "avatarPath";
const KEY_FOLLOWS: &str = "follows";

const KEY_SENDER: &str = "senderTag";
const KEY_TEXT: &str = "text";
const KEY_DATE: &str = "date";

const KEY_OWNER: &str = "user";
const KEY_READ: &str = "message";

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.set(KEY_ID, self.id.to_string());
        props.set(KEY_TAG, self.tag.as_str());
        props.set(KEY_PASSWORD, self.password.as_str());
        props.set(KEY_NAME, self.name.as_str());
        if let Some(ref avatar) = self.avatar_path {
            props.set(KEY_AVATAR, avatar.as_str());
        }
        props.set_list(KEY_FOLLOWS, self.follows.iter().cloned());
        props
    }

    fn from_properties(props: &Properties, file_stem: Option<&str>) -> Result<Self, DecodeError> {
        let id = required_uuid(props, KEY_ID, Self::KIND, file_stem)?;
        let tag = required(props, KEY_TAG, Self::KIND)?;
        if !is_valid_tag(tag) {
            return Err(invalid(Self::KIND, KEY_TAG, tag));
        }

        let follows = props
            .list(KEY_FOLLOWS)
            .into_iter()
            .filter(|t| is_valid_tag(t))
            .map(str::to_string)
            .collect();

        Ok(Self {
            id,
            tag: tag.to_string(),
            name: props.get(KEY_NAME).unwrap_or(tag).to_string(),
            password: props.get(KEY_PASSWORD).unwrap_or_default().to_string(),
            avatar_path: props
                .get(KEY_AVATAR)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            follows,
        })
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

impl Entity for Message {
    const KIND: EntityKind = EntityKind::Message;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.set(KEY_ID, self.id.to_string());
        props.set(KEY_SENDER, self.sender_tag.as_str());
        props.set(KEY_TEXT, self.text.as_str());
        props.set(KEY_DATE, self.emitted_at.timestamp_millis().to_string());
        props
    }

    fn from_properties(props: &Properties, file_stem: Option<&str>) -> Result<Self, DecodeError> {
        let id = required_uuid(props, KEY_ID, Self::KIND, file_stem)?;
        let sender_tag = required(props, KEY_SENDER, Self::KIND)?;
        let text = required(props, KEY_TEXT, Self::KIND)?;
        let raw_date = required(props, KEY_DATE, Self::KIND)?;

        let emitted_at = raw_date
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| invalid(Self::KIND, KEY_DATE, raw_date))?;

        Ok(Self {
            id,
            sender_tag: sender_tag.to_string(),
            text: text.to_string(),
            emitted_at,
        })
    }
}

// ---------------------------------------------------------------------------
// ReadSet
// ---------------------------------------------------------------------------

impl Entity for ReadSet {
    const KIND: EntityKind = EntityKind::ReadSet;

    fn id(&self) -> Uuid {
        self.user_id
    }

    fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.set(KEY_OWNER, self.user_id.to_string());
        props.set_list(KEY_READ, self.message_ids.iter().map(Uuid::to_string));
        props
    }

    fn from_properties(props: &Properties, file_stem: Option<&str>) -> Result<Self, DecodeError> {
        let user_id = required_uuid(props, KEY_OWNER, Self::KIND, file_stem)?;

        let message_ids = props
            .list(KEY_READ)
            .into_iter()
            .filter_map(|raw| Uuid::parse_str(raw.trim()).ok())
            .collect();

        Ok(Self {
            user_id,
            message_ids,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn required<'a>(
    props: &'a Properties,
    key: &'static str,
    kind: EntityKind,
) -> Result<&'a str, DecodeError> {
    props
        .get(key)
        .ok_or(DecodeError::MissingField { kind, key })
}

/// Read a UUID field, falling back to the file stem when the key is absent.
fn required_uuid(
    props: &Properties,
    key: &'static str,
    kind: EntityKind,
    file_stem: Option<&str>,
) -> Result<Uuid, DecodeError> {
    let raw = props
        .get(key)
        .or(file_stem)
        .ok_or(DecodeError::MissingField { kind, key })?;
    Uuid::parse_str(raw.trim()).map_err(|_| invalid(kind, key, raw))
}

fn invalid(kind: EntityKind, key: &'static str, value: &str) -> DecodeError {
    DecodeError::InvalidField {
        kind,
        key,
        value: value.to_string(),
    }
}
