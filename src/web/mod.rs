//! HTTP daemon serving the latest digest.

pub mod router;
pub mod server;
pub mod state;

pub use router::create_router;
pub use server::WebServer;
pub use state::{DigestState, SharedDigest, PLACEHOLDER_BODY};
