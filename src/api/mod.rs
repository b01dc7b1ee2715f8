//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set`, `PUT /add` - Store a JSON value
//! - `GET /get/:key`, `POST /get_many` - Retrieve values
//! - `DELETE /del/:key`, `DELETE /clear` - Remove values
//! - `GET /has/:key` - Existence check
//! - `GET /stats`, `GET /health` - Operational endpoints

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
