//! Time-indexed compression history for the visualizer
//!
//! Converts [`CompressionPacket`]s (indexed in samples) into points indexed in
//! seconds, grouped into segments. A new segment starts whenever processing
//! resumes, so a bypass gap is never drawn as a continuous line. Only the most
//! recent [`DynamicRangeProcessorHistory::MAX_TIME_SECONDS`] are kept.

use crate::domain::telemetry::CompressionPacket;
use tracing::trace;

/// One point of the history curve
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistoryPoint {
    /// Seconds since the first packet of the session
    pub time: f32,
    pub target: f32,
    pub actual: f32,
}

pub type Segment = Vec<HistoryPoint>;

#[derive(Debug, Clone)]
pub struct DynamicRangeProcessorHistory {
    sample_rate: f64,
    max_time_seconds: f32,
    begin_new_segment: bool,
    segments: Vec<Segment>,
    first_sample_index: Option<i64>,
}

impl DynamicRangeProcessorHistory {
    pub const MAX_TIME_SECONDS: f32 = 10.0;

    pub fn new(sample_rate: f64) -> Self {
        Self::with_max_time(sample_rate, Self::MAX_TIME_SECONDS)
    }

    pub fn with_max_time(sample_rate: f64, max_time_seconds: f32) -> Self {
        Self {
            sample_rate,
            max_time_seconds,
            begin_new_segment: true,
            segments: Vec::new(),
            first_sample_index: None,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Append packets, oldest first. Returns how many became points.
    pub fn push(&mut self, packets: &[CompressionPacket]) -> usize {
        let Some(first) = packets.first() else {
            return 0;
        };
        let origin = *self
            .first_sample_index
            .get_or_insert(first.index_of_first_sample);

        let mut accepted = 0;
        for packet in packets {
            let time = ((packet.index_of_first_sample - origin) as f64 / self.sample_rate) as f32;

            if self.begin_new_segment || self.segments.is_empty() {
                self.segments.push(Segment::new());
                self.begin_new_segment = false;
            }

            let Some(segment) = self.segments.last_mut() else {
                continue;
            };
            if segment.last().is_some_and(|last| time <= last.time) {
                trace!(time, "Dropping out-of-order history packet");
                continue;
            }

            segment.push(HistoryPoint {
                time,
                target: packet.target_compression_db,
                actual: packet.actual_compression_db,
            });
            accepted += 1;
        }

        self.trim();
        accepted
    }

    /// Make the next pushed packet start a new segment
    pub fn begin_new_segment(&mut self) {
        self.begin_new_segment = true;
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Time of the newest point, if any
    pub fn latest_time(&self) -> Option<f32> {
        self.segments
            .iter()
            .rev()
            .find_map(|segment| segment.last().map(|point| point.time))
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(Vec::is_empty)
    }

    fn trim(&mut self) {
        let Some(latest) = self.latest_time() else {
            return;
        };
        let oldest_allowed = latest - self.max_time_seconds;

        for segment in &mut self.segments {
            let stale = segment.partition_point(|point| point.time < oldest_allowed);
            segment.drain(..stale);
        }
        self.segments.retain(|segment| !segment.is_empty());
    }
}

/// Vertical range, in dB, of the gain-reduction ruler for a given maximum
/// compression
pub fn db_range(max_compression_db: f32) -> f32 {
    const MIN_RANGE: f32 = 3.0;
    MIN_RANGE.max(max_compression_db / 2.0)
}
