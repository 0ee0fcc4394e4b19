//! Error taxonomy, result alias, and small shared types (spec §3, §7).

pub mod error;
pub mod types;

pub use error::{CoreError, ExternalError, InputError, Result, SecurityError, StateError, SystemError};
pub use types::{clamp, now, MetaValue, Timestamp};
