//! Small shared helpers.

use rand::Rng;
use std::time::Duration;

/// Milliseconds in `d`, rounded up so a pending wait never reports as 0.
pub(crate) fn duration_to_millis_ceil(d: Duration) -> u64 {
    let millis = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    if d.subsec_nanos() % 1_000_000 > 0 {
        millis.saturating_add(1)
    } else {
        millis
    }
}

/// Short alphanumeric id used to correlate log lines of one request.
pub(crate) fn generate_trace_id() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_to_millis_ceil() {
        assert_eq!(duration_to_millis_ceil(Duration::from_millis(5)), 5);
        assert_eq!(duration_to_millis_ceil(Duration::from_micros(5_001)), 6);
        assert_eq!(duration_to_millis_ceil(Duration::from_nanos(1)), 1);
        assert_eq!(duration_to_millis_ceil(Duration::ZERO), 0);
    }

    #[test]
    fn test_trace_id_shape() {
        let id = generate_trace_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
