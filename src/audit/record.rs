//! Ledger events and the flat audit record exported to compliance tooling.

use serde::{Deserialize, Serialize};

use crate::disambiguation::DisambiguationDecision;
use crate::graph::RelationshipCandidate;
use crate::guardrails::{OverrideInfo, Severity};

/// An override applied to a registered compliance violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationOverride {
    pub violation_id: u64,
    pub candidate: RelationshipCandidate,
    /// Severity at detection time; overrides never change it.
    pub severity: Severity,
    /// Reason at detection time.
    pub original_reason: String,
    pub info: OverrideInfo,
}

/// A human acknowledgement that same-name entities with incompatible types
/// are correctly kept apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictAcknowledgement {
    /// Normalized entity name.
    pub name: String,
    pub info: OverrideInfo,
}

/// One event in the append-only ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Disambiguation(DisambiguationDecision),
    ViolationOverride(ViolationOverride),
    ConflictAcknowledged(ConflictAcknowledgement),
}

impl LedgerEvent {
    /// Short tag naming the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Disambiguation(_) => "disambiguation",
            Self::ViolationOverride(_) => "override",
            Self::ConflictAcknowledged(_) => "conflict-ack",
        }
    }
}

/// A sequenced ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 1-based, gap-free, in append order.
    pub seq: u64,
    /// Append time (seconds since UNIX epoch).
    pub recorded_at: u64,
    pub event: LedgerEvent,
}

/// Flat record shape shared by every event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub seq: u64,
    pub timestamp: u64,
    pub kind: String,
    pub entity_name: String,
    pub resolved_uri: String,
    pub method: String,
    pub confidence: f32,
    /// `uri (Type)` for each conflicting candidate considered.
    pub conflicts: Vec<String>,
    pub reason: String,
    pub degraded: bool,
    pub actor: Option<String>,
}

impl From<&LedgerEntry> for AuditRecord {
    fn from(entry: &LedgerEntry) -> Self {
        let kind = entry.event.kind().to_string();
        match &entry.event {
            LedgerEvent::Disambiguation(d) => Self {
                seq: entry.seq,
                timestamp: d.timestamp,
                kind,
                entity_name: d.mention.name.clone(),
                resolved_uri: d.resolved_uri.clone(),
                method: d.method.to_string(),
                confidence: d.confidence,
                conflicts: d
                    .conflicts
                    .iter()
                    .map(|c| format!("{} ({})", c.uri, c.entity_type))
                    .collect(),
                reason: d.reason.clone(),
                degraded: d.degraded,
                actor: None,
            },
            LedgerEvent::ViolationOverride(o) => Self {
                seq: entry.seq,
                timestamp: o.info.timestamp,
                kind,
                entity_name: o.candidate.to_string(),
                resolved_uri: o.candidate.source.clone(),
                method: "override".into(),
                confidence: 1.0,
                conflicts: vec![],
                reason: format!(
                    "{} (overrode {} violation #{}: {})",
                    o.info.reason, o.severity, o.violation_id, o.original_reason
                ),
                degraded: false,
                actor: Some(o.info.actor.clone()),
            },
            LedgerEvent::ConflictAcknowledged(a) => Self {
                seq: entry.seq,
                timestamp: a.info.timestamp,
                kind,
                entity_name: a.name.clone(),
                resolved_uri: String::new(),
                method: "conflict-ack".into(),
                confidence: 1.0,
                conflicts: vec![],
                reason: a.info.reason.clone(),
                degraded: false,
                actor: Some(a.info.actor.clone()),
            },
        }
    }
}
