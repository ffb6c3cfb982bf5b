//! Ordered accumulation of records plus per-chunk diagnostics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use cerebro_core::record::Record;
use cerebro_ingest::Chunk;

use crate::retry::Recovery;

/// Final state of a chunk as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Parsed cleanly.
    Succeeded,
    /// Truncated; leading records salvaged by repair.
    Partial,
    /// Abandoned after the last attempt.
    Exhausted,
    /// Not finished because the run was cancelled or timed out.
    Cancelled,
}

/// Diagnostics for one chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub label: String,
    pub first_page: usize,
    pub last_page: usize,
    pub blank_pages: usize,
    pub status: ChunkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<Recovery>,
    pub attempts: u32,
    pub records: usize,
    pub dropped_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChunkReport {
    pub fn new(chunk: &Chunk, status: ChunkStatus) -> Self {
        Self {
            label: chunk.label.clone(),
            first_page: chunk.first_page,
            last_page: chunk.last_page,
            blank_pages: chunk.blank_pages,
            status,
            recovery: None,
            attempts: 0,
            records: 0,
            dropped_records: 0,
            error: None,
        }
    }

    pub fn page_count(&self) -> usize {
        self.last_page - self.first_page + 1
    }

    /// Pages with text. Blank pages are already counted as empty.
    pub fn content_pages(&self) -> usize {
        self.page_count().saturating_sub(self.blank_pages)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_pages: usize,
    /// Pages with no extractable text. Windows made only of such pages are
    /// never sent and have no chunk report.
    pub empty_pages: usize,
    /// Pages never analyzed because the run stopped early.
    pub unprocessed_pages: usize,
    pub chunks_total: usize,
    pub chunks_succeeded: usize,
    pub chunks_partial: usize,
    pub chunks_exhausted: usize,
    pub chunks_cancelled: usize,
    pub records_recovered: usize,
    pub records_dropped: usize,
    pub cancelled: bool,
}

/// Everything extracted from one document.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    pub run_id: Uuid,
    pub document: String,
    pub processed_at: DateTime<Utc>,
    pub records: Vec<Record>,
    pub summary: Summary,
    pub chunks: Vec<ChunkReport>,
}

/// Owns the result set while a document is processed. Records are appended
/// in chunk order and numbered on insertion.
#[derive(Debug)]
pub struct Consolidator {
    result: ResultSet,
}

impl Consolidator {
    pub fn new(document: &str, total_pages: usize, empty_pages: usize) -> Self {
        Self {
            result: ResultSet {
                run_id: Uuid::new_v4(),
                document: document.to_string(),
                processed_at: Utc::now(),
                records: Vec::new(),
                summary: Summary {
                    total_pages,
                    empty_pages,
                    ..Summary::default()
                },
                chunks: Vec::new(),
            },
        }
    }

    /// Record a finalized chunk and append its records, renumbering them
    /// after everything already accumulated.
    pub fn push_chunk(&mut self, mut report: ChunkReport, records: Vec<Record>) {
        let summary = &mut self.result.summary;
        summary.chunks_total += 1;
        match report.status {
            ChunkStatus::Succeeded => summary.chunks_succeeded += 1,
            ChunkStatus::Partial => summary.chunks_partial += 1,
            ChunkStatus::Exhausted => summary.chunks_exhausted += 1,
            ChunkStatus::Cancelled => {
                summary.chunks_cancelled += 1;
                summary.unprocessed_pages += report.content_pages();
            }
        }
        summary.records_dropped += report.dropped_records;
        summary.records_recovered += records.len();
        report.records = records.len();

        let start = self.result.records.len() as u32;
        self.result
            .records
            .extend(records.into_iter().enumerate().map(|(i, mut record)| {
                record.sequence = start + i as u32 + 1;
                record
            }));
        self.result.chunks.push(report);
    }

    /// Account for pages the run never reached.
    pub fn mark_cancelled(&mut self, remaining_pages: usize) {
        self.result.summary.cancelled = true;
        self.result.summary.unprocessed_pages += remaining_pages;
    }

    pub fn finish(self) -> ResultSet {
        self.result
    }
}
