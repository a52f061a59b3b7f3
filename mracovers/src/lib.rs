//! Cover-art store.
//!
//! Input adapters hand over raw artwork bytes ([`mramodel::CoverArtPayload`]);
//! the store persists them in a disk cache and exposes each entry behind an
//! internal HTTP URL that URL-based renderers can fetch.

mod cache;
mod routes;

pub use cache::{CoverError, CoverHandle, CoverStore};
pub use routes::cover_routes;
