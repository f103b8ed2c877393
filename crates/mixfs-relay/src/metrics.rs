//! Counters recorded by the relay.

/// Event counters.
pub mod counters {
    /// Increment the received-datagrams counter.
    pub fn datagrams_received_total() {
        metrics::counter!("mixfs_relay_datagrams_received_total").increment(1);
    }

    /// Record a datagram dropped on receipt with the given reason label.
    pub fn datagrams_dropped_total(reason: &'static str) {
        metrics::counter!("mixfs_relay_datagrams_dropped_total", "reason" => reason).increment(1);
    }

    /// Record forwarded datagrams by kind (`real` or `decoy`).
    pub fn forwarded_total(kind: &'static str, count: u64) {
        metrics::counter!("mixfs_relay_forwarded_total", "kind" => kind).increment(count);
    }

    /// Increment the failed-sends counter.
    pub fn send_failures_total() {
        metrics::counter!("mixfs_relay_send_failures_total").increment(1);
    }
}

/// Histograms.
pub mod histograms {
    /// Record the number of real jobs in a flushed batch.
    #[allow(clippy::cast_precision_loss)]
    pub fn batch_size(jobs: usize) {
        metrics::histogram!("mixfs_relay_batch_size").record(jobs as f64);
    }
}
