//! Correlation ID generation for request tracing.

use uuid::Uuid;

/// Generate a new correlation ID (UUID v4). Carried only on the tracing span
/// — the proxy stays wire-transparent and never injects it into headers.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
