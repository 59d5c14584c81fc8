//! HTTP surface (spec.md §6): route handlers, the request-boundary extractors
//! they share, and the `IntoResponse` mapping from domain errors to wire
//! responses. `startup::app()` wires `routes::*` into the `Router`.

pub mod error;
pub mod extractors;
pub mod routes;

pub use error::ApiError;
