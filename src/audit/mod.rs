//! Audit layer: the append-only decision ledger and integrity reports.
//!
//! The ledger is event-sourced. Appends are serialized behind one lock and
//! receive gap-free sequence numbers; when a data directory is configured each
//! entry is committed to redb before it becomes visible in memory. Nothing is
//! ever updated or removed.

pub mod record;
pub mod report;

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::disambiguation::DisambiguationDecision;
use crate::error::LedgerError;
use crate::store::DurableLog;

pub use record::{AuditRecord, ConflictAcknowledgement, LedgerEntry, LedgerEvent, ViolationOverride};
pub use report::{IntegrityReport, ReportBuilder};

/// Current time in seconds since the UNIX epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Ordered, append-only ledger of audit events.
#[derive(Debug, Default)]
pub struct AuditLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    durable: Option<DurableLog>,
}

impl AuditLedger {
    /// A memory-only ledger.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a durable ledger in `data_dir`, replaying entries written earlier.
    pub fn open(data_dir: &Path) -> Result<Self, LedgerError> {
        let log = DurableLog::open(data_dir)?;
        let mut entries = Vec::new();
        for (seq, bytes) in log.load_all()? {
            let entry: LedgerEntry =
                bincode::deserialize(&bytes).map_err(|e| LedgerError::Serialization {
                    message: format!("ledger entry {seq}: {e}"),
                })?;
            entries.push(entry);
        }
        tracing::info!(
            path = %data_dir.display(),
            entries = entries.len(),
            "opened audit ledger"
        );
        Ok(Self {
            entries: Mutex::new(entries),
            durable: Some(log),
        })
    }

    /// Append an event, returning its sequence number.
    pub fn append(&self, event: LedgerEvent) -> Result<u64, LedgerError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let seq = entries.len() as u64 + 1;
        let entry = LedgerEntry {
            seq,
            recorded_at: unix_now(),
            event,
        };
        if let Some(log) = &self.durable {
            let bytes = bincode::serialize(&entry).map_err(|e| LedgerError::Serialization {
                message: format!("failed to serialize ledger entry: {e}"),
            })?;
            log.append(seq, &bytes)?;
        }
        tracing::trace!(seq, kind = entry.event.kind(), "ledger append");
        entries.push(entry);
        Ok(seq)
    }

    /// Snapshot of all entries in order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All disambiguation decisions in order.
    pub fn decisions(&self) -> Vec<DisambiguationDecision> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e.event {
                LedgerEvent::Disambiguation(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    /// Normalized names whose conflicts have been acknowledged.
    pub fn acknowledged_names(&self) -> std::collections::HashSet<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e.event {
                LedgerEvent::ConflictAcknowledged(a) => Some(a.name),
                _ => None,
            })
            .collect()
    }

    /// Highest violation id named by an override entry, 0 if none.
    pub fn last_overridden_violation(&self) -> u64 {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter_map(|e| match &e.event {
                LedgerEvent::ViolationOverride(o) => Some(o.violation_id),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Flat records for export.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.entries().iter().map(AuditRecord::from).collect()
    }

    /// Write every record as one JSON object per line.
    pub fn export_jsonl<W: Write>(&self, mut out: W) -> Result<usize, LedgerError> {
        let records = self.records();
        for record in &records {
            let line = serde_json::to_string(record).map_err(|e| LedgerError::Serialization {
                message: format!("failed to encode audit record: {e}"),
            })?;
            writeln!(out, "{line}").map_err(|source| LedgerError::Io { source })?;
        }
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::OverrideInfo;

    fn ack(name: &str) -> LedgerEvent {
        LedgerEvent::ConflictAcknowledged(ConflictAcknowledgement {
            name: name.into(),
            info: OverrideInfo {
                actor: "curator".into(),
                reason: "distinct entities".into(),
                timestamp: 1,
            },
        })
    }

    #[test]
    fn sequence_numbers_are_gap_free() {
        let ledger = AuditLedger::in_memory();
        assert_eq!(ledger.append(ack("a")).unwrap(), 1);
        assert_eq!(ledger.append(ack("b")).unwrap(), 2);
        let seqs: Vec<u64> = ledger.entries().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn concurrent_appends_are_serialized() {
        use std::sync::Arc;
        let ledger = Arc::new(AuditLedger::in_memory());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.append(ack(&format!("n{i}"))).unwrap())
            })
            .collect();
        let mut seqs: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=32).collect::<Vec<_>>());
    }

    #[test]
    fn durable_ledger_replays_after_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let ledger = AuditLedger::open(dir.path()).unwrap();
            ledger.append(ack("jaguar")).unwrap();
        }
        let ledger = AuditLedger::open(dir.path()).unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(ledger.acknowledged_names().contains("jaguar"));
        assert_eq!(ledger.append(ack("puma")).unwrap(), 2);
    }

    #[test]
    fn export_writes_one_line_per_record() {
        let ledger = AuditLedger::in_memory();
        ledger.append(ack("a")).unwrap();
        ledger.append(ack("b")).unwrap();
        let mut buf = Vec::new();
        assert_eq!(ledger.export_jsonl(&mut buf).unwrap(), 2);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"kind\":\"conflict-ack\""));
    }
}
