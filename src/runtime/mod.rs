//! Process runtime: startup wiring and the health/metrics HTTP server.

pub mod initialization;
pub mod server;
