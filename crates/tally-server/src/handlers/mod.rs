//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod analytics;
pub mod datasets;
pub mod session;
pub mod status;

// Re-export all handlers for use in router
pub use analytics::*;
pub use datasets::*;
pub use session::*;
pub use status::*;
