//! Metric names and recording helpers.
//!
//! Recording goes through the `metrics` facade and is a no-op until the
//! server installs an exporter.

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "agora_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "agora_connections_active";
    pub const CLIENTS_REGISTERED: &str = "agora_clients_registered";
    pub const MESSAGES_TOTAL: &str = "agora_messages_total";
    pub const MESSAGES_BYTES: &str = "agora_messages_bytes";
    pub const SLOW_CONSUMERS_DROPPED: &str = "agora_slow_consumers_dropped_total";
    pub const ERRORS_TOTAL: &str = "agora_errors_total";
}

/// Record a message.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Update the registered client count.
pub fn set_registered_clients(count: usize) {
    gauge!(names::CLIENTS_REGISTERED).set(count as f64);
}

/// Record a client dropped for not draining its queue.
pub fn record_slow_consumer() {
    counter!(names::SLOW_CONSUMERS_DROPPED).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}
