//! HTTP API handlers
//!
//! REST endpoints for the capture pipeline input surfaces plus an SSE
//! stream carrying the pipeline's result events.

pub mod capture;
pub mod health;
pub mod sse;

pub use capture::capture_routes;
pub use health::health_routes;
pub use sse::pipeline_event_stream;
