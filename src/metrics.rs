use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing worker activity.
#[derive(Default)]
pub struct IngestMetrics {
    messages_received: AtomicU64,
    acknowledged: AtomicU64,
    rejected_permanent: AtomicU64,
    requeued: AtomicU64,
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivery taken off the queue.
    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acknowledged message.
    pub fn record_acknowledged(&self) {
        self.acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message rejected without requeue.
    pub fn record_rejected(&self) {
        self.rejected_permanent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message returned to the queue.
    pub fn record_requeued(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an indexed document and the number of chunks written for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            rejected_permanent: self.rejected_permanent.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of worker counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Deliveries taken off the queue since startup.
    pub messages_received: u64,
    /// Messages acknowledged after successful ingestion.
    pub acknowledged: u64,
    /// Messages rejected without requeue.
    pub rejected_permanent: u64,
    /// Messages returned to the queue for another attempt.
    pub requeued: u64,
    /// Documents indexed since startup.
    pub documents_indexed: u64,
    /// Total chunks written across all indexed documents.
    pub chunks_indexed: u64,
}
