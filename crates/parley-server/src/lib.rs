//! Parley Server Library
//!
//! This crate provides the HTTP server for Parley: the version store, the
//! history paginator, generation stream sessions and the handlers that expose
//! them.

pub mod auth;
pub mod config;
pub mod generation;
pub mod http;
pub mod metrics;
pub mod repo;
pub mod service;
pub mod state;
pub mod stream;

pub use config::Config;
pub use state::AppState;
