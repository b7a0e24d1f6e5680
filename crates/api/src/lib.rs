// API crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Ateljé Form API server
//!
//! HTTP surface of the settlement core: payment creation and cancellation,
//! the provider callback endpoint, the UI status poller's endpoint, and the
//! job trigger.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
