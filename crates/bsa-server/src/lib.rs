//! BSA Server - HTTP transport for the Deterministic State Authority
//!
//! Provides:
//! - The `/api/v1` routes over a shared [`bsa_core::StateAuthority`]
//! - Server assembly with the background reconciliation loop
//! - A typed HTTP client
//! - Logging setup for the `bsa` binary

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod api;
pub mod client;
pub mod server;
pub mod telemetry;

pub use api::{routes, ProposeAccepted, StateQuery};
pub use client::{BsaClient, ClientError};
pub use server::{bind, run, BoundServer, ServeError, ServerConfig};
