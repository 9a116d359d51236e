//! # REST API Components
//!
//! HTTP routing, request/response shaping and error mapping for the secrets
//! broker. Handlers hold no business logic: they resolve a [`SecretTarget`]
//! or call a service and shape the result.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod target;

pub use error::ApiError;
pub use routes::{build_router, ApiState};
pub use server::start_api_server;
pub use target::SecretTarget;
