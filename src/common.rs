use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{BirdsNestError, Result};

// Helper method to format bytes in human-readable form
pub fn bytes2hr(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Current wall clock time in nanoseconds since the unix epoch.
pub fn now_nanos() -> Result<i64> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BirdsNestError::TimeError(e.to_string()))?
        .as_nanos();
    i64::try_from(nanos)
        .map_err(|_| BirdsNestError::TimeError("clock overflow".to_string()))
}
