//! JSON bodies returned by the HTTP endpoints (serde ready).

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    /// Active conversion provider ("builtin" or "command").
    pub converter: &'static str,
}

/// Failure body for clients that send `Accept: application/json`.
#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: &'static str,
    pub message: String,
}
