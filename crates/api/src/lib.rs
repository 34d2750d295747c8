//! HTTP host for the chat notification dispatcher.
//!
//! The event source POSTs one request per created message document; the handler runs the
//! dispatcher and always answers `200` with what happened, so deliveries are never retried.

pub mod middleware;
pub mod routes;
pub mod state;
