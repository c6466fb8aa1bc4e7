//! Palisade demonstration server library.
//!
//! Validates every inbound request against an OpenAPI document and hands
//! valid ones to a small set of handlers. The main entry point is the
//! `palisade` binary; the pieces live here so they can be tested without a
//! socket.

pub mod app;
pub mod handlers;
pub mod response;

pub use app::{App, LoadError, SPEC_ROUTE};
