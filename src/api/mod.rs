//! HTTP surface - routes, handlers, and multipart form parsing

pub mod handlers;
pub mod multipart;
pub mod routes;

pub use routes::create_router;
