//! JSON-lines protocol: one `Request` per line in, one envelope per line out.

mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use error::{bad_json, ErrorCode};
pub use router::handle_request;
pub use types::{AppState, Request};
