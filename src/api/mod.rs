//! API Module
//!
//! HTTP handlers and routing for the cache REST facade.
//!
//! # Endpoints
//! - `PUT /set` - Store a value
//! - `GET /get/:key` - Retrieve a value by key
//! - `GET /exists/:key` - Existence check
//! - `DELETE /del/:key` - Delete a key
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
