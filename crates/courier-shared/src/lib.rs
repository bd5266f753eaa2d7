//! # courier-shared
//!
//! Domain types and the on-disk file format shared by every Courier crate.

pub mod codec;
pub mod constants;
pub mod error;
pub mod models;
pub mod properties;
pub mod text;
pub mod types;

pub use codec::Entity;
pub use error::DecodeError;
pub use models::{Message, Notification, ReadSet, User};
pub use properties::Properties;
pub use types::EntityKind;
