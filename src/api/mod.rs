//! API Module
//!
//! HTTP handlers and routing for the caching proxy.
//!
//! # Endpoints
//! - `GET /fetch/*path` - Upstream JSON served through the cache
//! - `DELETE /cache/:key` - Invalidate a key
//! - `DELETE /cache` - Clear the cache
//! - `POST /invalidate` - Invalidate keys matching a pattern
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
