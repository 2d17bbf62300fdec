//! Shared types for the MQTT → MongoDB bridge: the record model,
//! destination routing, and the traits stores and sources implement.

pub mod error;
pub mod record;
pub mod source;
pub mod storage;
pub mod util;

pub use error::{ErrorKind, PluginError};
pub use record::{
    COLL_NAME_FIELD, DB_NAME_FIELD, Destination, Document, InboundMessage,
    RAW_PAYLOAD_FIELD, RECEIVED_AT_FIELD, Record, is_valid_name, stamp_received_at,
};
pub use source::MessageSource;
pub use storage::DocumentStore;
pub use util::{iso_millis, now};
