//! Extraction counters for observability

use crate::media_type::MediaType;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Succeeded,
    Failed,
    /// No processing warranted by the resource's roles.
    Skipped,
}

/// Counters shared by every extraction call of one extractor.
#[derive(Default)]
pub struct ExtractionMetrics {
    pub total_extractions: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
    pub total_latency_ms: AtomicU64,

    // Per detected media type
    pub image_count: AtomicU64,
    pub audio_count: AtomicU64,
    pub video_count: AtomicU64,
    pub text_count: AtomicU64,
    pub three_d_count: AtomicU64,
    pub unknown_count: AtomicU64,
}

impl ExtractionMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_extraction(&self, outcome: ExtractionOutcome, latency_ms: u64) {
        self.total_extractions.fetch_add(1, Ordering::Relaxed);

        match outcome {
            ExtractionOutcome::Succeeded => self.succeeded.fetch_add(1, Ordering::Relaxed),
            ExtractionOutcome::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            ExtractionOutcome::Skipped => self.skipped.fetch_add(1, Ordering::Relaxed),
        };

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    /// Count a resource by its detected media type.
    pub fn record_media_type(&self, media_type: MediaType) {
        let counter = match media_type {
            MediaType::Image => &self.image_count,
            MediaType::Audio => &self.audio_count,
            MediaType::Video => &self.video_count,
            MediaType::Text => &self.text_count,
            MediaType::ThreeD => &self.three_d_count,
            MediaType::Unknown => &self.unknown_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_extractions.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_extractions: total,
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed,
            skipped: self.skipped.load(Ordering::Relaxed),
            error_rate: if total > 0 { failed as f64 / total as f64 } else { 0.0 },
            avg_latency_ms: if total > 0 { total_latency / total } else { 0 },
            media_types: MediaTypeMetrics {
                image: self.image_count.load(Ordering::Relaxed),
                audio: self.audio_count.load(Ordering::Relaxed),
                video: self.video_count.load(Ordering::Relaxed),
                text: self.text_count.load(Ordering::Relaxed),
                three_d: self.three_d_count.load(Ordering::Relaxed),
                unknown: self.unknown_count.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_extractions: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub error_rate: f64,
    pub avg_latency_ms: u64,
    pub media_types: MediaTypeMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTypeMetrics {
    pub image: u64,
    pub audio: u64,
    pub video: u64,
    pub text: u64,
    pub three_d: u64,
    pub unknown: u64,
}

/// Timer for tracking operation latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
