//! The control-plane RPC surface: wire types, the deployment service behind
//! them, and the HTTP transport that exposes it.

pub mod server;
pub mod service;
pub mod types;
