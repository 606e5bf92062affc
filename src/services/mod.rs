//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own classification, fan-out, and ingest logic so route
//! handlers can stay focused on socket and HTTP plumbing.

pub mod classifier;
pub mod fanout;
pub mod fleet;
pub mod ingest;
