//! Registry of recorded compliance violations and their overrides.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::audit::{AuditLedger, LedgerEvent, ViolationOverride, unix_now};
use crate::error::{ComplianceError, OntoGuardResult};
use crate::graph::RelationshipCandidate;

use super::{Finding, OverrideInfo, Severity};

/// A recorded compliance violation.
///
/// Severity and reason are fixed at detection; an override only sets the
/// flag and attaches its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub id: u64,
    pub candidate: RelationshipCandidate,
    pub severity: Severity,
    pub reason: String,
    pub source_type: String,
    pub target_type: String,
    pub detected_at: u64,
    pub overridden: bool,
    pub override_info: Option<OverrideInfo>,
}

/// Thread-safe store of violations, keyed by id.
#[derive(Debug, Default)]
pub struct ViolationRegistry {
    next_id: AtomicU64,
    violations: Mutex<BTreeMap<u64, Violation>>,
}

impl ViolationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose ids continue after `last_id`, so new violations never
    /// reuse an id already named in the ledger.
    pub fn starting_after(last_id: u64) -> Self {
        Self {
            next_id: AtomicU64::new(last_id),
            ..Self::default()
        }
    }

    /// Record the findings for a candidate, returning the new violation ids.
    pub fn register(&self, candidate: &RelationshipCandidate, findings: &[Finding]) -> Vec<u64> {
        let mut map = self
            .violations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        findings
            .iter()
            .map(|finding| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                map.insert(
                    id,
                    Violation {
                        id,
                        candidate: candidate.clone(),
                        severity: finding.severity,
                        reason: finding.reason.clone(),
                        source_type: finding.source_type.clone(),
                        target_type: finding.target_type.clone(),
                        detected_at: unix_now(),
                        overridden: false,
                        override_info: None,
                    },
                );
                tracing::debug!(id, severity = %finding.severity, candidate = %candidate, "violation recorded");
                id
            })
            .collect()
    }

    /// Override a violation.
    ///
    /// The ledger entry is written first and the violation is only marked once
    /// that succeeds, all under the registry lock, so no reader ever sees an
    /// override without its audit record.
    pub fn override_violation(
        &self,
        id: u64,
        reason: &str,
        actor: &str,
        ledger: &AuditLedger,
    ) -> OntoGuardResult<Violation> {
        let mut map = self
            .violations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let violation = map
            .get_mut(&id)
            .ok_or(ComplianceError::ViolationNotFound { id })?;
        if let Some(existing) = &violation.override_info {
            return Err(ComplianceError::AlreadyOverridden {
                id,
                actor: existing.actor.clone(),
            }
            .into());
        }

        let info = OverrideInfo {
            actor: actor.to_string(),
            reason: reason.to_string(),
            timestamp: unix_now(),
        };
        ledger.append(LedgerEvent::ViolationOverride(ViolationOverride {
            violation_id: id,
            candidate: violation.candidate.clone(),
            severity: violation.severity,
            original_reason: violation.reason.clone(),
            info: info.clone(),
        }))?;

        violation.overridden = true;
        violation.override_info = Some(info);
        tracing::info!(id, actor, severity = %violation.severity, "violation overridden");
        Ok(violation.clone())
    }

    pub fn get(&self, id: u64) -> Option<Violation> {
        self.violations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
    }

    /// All violations in id order.
    pub fn violations(&self) -> Vec<Violation> {
        self.violations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Violations not yet overridden.
    pub fn open_violations(&self) -> Vec<Violation> {
        self.violations()
            .into_iter()
            .filter(|v| !v.overridden)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.violations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
