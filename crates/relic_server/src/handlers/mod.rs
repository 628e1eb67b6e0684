//! HTTP request handlers.

/// Admin backup endpoints.
pub mod backup;
/// Liveness and version endpoints.
pub mod health;
