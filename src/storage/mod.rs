//! Storage layer - optional audit trail of finished transcripts.

mod jsonl;

pub use jsonl::{AuditRecord, TranscriptAudit};
