//! Cassette data model and persistence
//!
//! A cassette is the ordered sequence of recorded interactions for one
//! fixture, persisted as a single JSON document.

mod encoding;
mod record;
mod store;

pub use encoding::{charset_from_content_type, decode_body, encode_body, encoding_for_charset, encoding_id, UTF_8_ID};
pub use record::{Cassette, Interaction, StoredRequest, StoredResponse};
pub use store::CassetteStore;
