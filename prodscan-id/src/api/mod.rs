//! HTTP API handlers for prodscan-id
//!
//! - `POST /upload` - identify products in an image, streamed as NDJSON
//! - `GET /health` - liveness and diagnostics

pub mod health;
pub mod upload;

pub use health::health_routes;
pub use upload::upload_routes;
