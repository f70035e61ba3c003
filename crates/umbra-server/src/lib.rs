//! # umbra-server
//!
//! HTTP server library for umbra.
//!
//! This library provides the API handlers, logging setup and the wiring
//! that starts the proximity monitor.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
