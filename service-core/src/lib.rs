//! Shared HTTP plumbing for the school platform: the error type every handler
//! returns, base settings, request middleware and tracing setup.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
