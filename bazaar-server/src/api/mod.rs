//! HTTP and WebSocket handlers.
//!
//! - [`broadcasting`]: `POST /broadcasting/auth`
//! - [`ws`]: `GET /app`, the channel transport
//! - [`service`]: signed publishing under `/api/v1/service`

pub mod broadcasting;
pub mod extractors;
pub mod service;
pub mod ws;
