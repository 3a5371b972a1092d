//! Periodic integrity reports: structured record plus narrative.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::graph::spectral::SpectralReport;
use crate::guardrails::{Severity, Violation};
use crate::quality::MineScore;

use super::unix_now;

/// Violation counts for the report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub total: usize,
    pub open: usize,
    pub overridden: usize,
    /// Open violations per severity.
    pub open_by_severity: BTreeMap<Severity, usize>,
}

impl ComplianceSummary {
    pub fn from_violations(violations: &[Violation]) -> Self {
        let mut open_by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let mut overridden = 0;
        for v in violations {
            if v.overridden {
                overridden += 1;
            } else {
                *open_by_severity.entry(v.severity).or_default() += 1;
            }
        }
        Self {
            total: violations.len(),
            open: violations.len() - overridden,
            overridden,
            open_by_severity,
        }
    }
}

/// Integrity report over one graph snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub generated_at: u64,
    pub spectral: Option<SpectralReport>,
    pub quality: Option<MineScore>,
    pub compliance: ComplianceSummary,
    pub ledger_entries: usize,
    pub narrative: String,
}

impl IntegrityReport {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, LedgerError> {
        serde_json::to_string_pretty(self).map_err(|e| LedgerError::Serialization {
            message: format!("failed to encode integrity report: {e}"),
        })
    }
}

/// Assembles an [`IntegrityReport`] from the parts that were computed.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    spectral: Option<SpectralReport>,
    quality: Option<MineScore>,
    compliance: ComplianceSummary,
    ledger_entries: usize,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spectral(mut self, report: SpectralReport) -> Self {
        self.spectral = Some(report);
        self
    }

    pub fn quality(mut self, score: MineScore) -> Self {
        self.quality = Some(score);
        self
    }

    pub fn violations(mut self, violations: &[Violation]) -> Self {
        self.compliance = ComplianceSummary::from_violations(violations);
        self
    }

    pub fn ledger_entries(mut self, entries: usize) -> Self {
        self.ledger_entries = entries;
        self
    }

    pub fn build(self) -> IntegrityReport {
        let mut paragraphs = Vec::new();

        match &self.spectral {
            Some(spectral) => {
                let mut text = spectral.narrative.clone();
                for rec in &spectral.recommendations {
                    text.push_str("\n  - ");
                    text.push_str(rec);
                }
                paragraphs.push(format!("Structure: {text}"));
            }
            None => paragraphs.push("Structure: not analyzed.".to_string()),
        }

        match &self.quality {
            Some(q) => {
                let mut text = format!(
                    "Quality: grade {} (total {:.3}; retention {:.3}, clustering {:.3}, connectivity {:.3}).",
                    q.grade, q.total, q.retention, q.clustering, q.connectivity
                );
                for note in &q.notes {
                    text.push_str(&format!("\n  - {note}"));
                }
                for p in &q.jaguar_problems {
                    text.push_str(&format!(
                        "\n  - unresolved name \"{}\": {} across {}",
                        p.name,
                        p.types.join(" / "),
                        p.uris.join(", ")
                    ));
                }
                paragraphs.push(text);
            }
            None => paragraphs.push("Quality: not evaluated.".to_string()),
        }

        let c = &self.compliance;
        let critical = c.open_by_severity.get(&Severity::Critical).copied().unwrap_or(0);
        let mut compliance = format!(
            "Compliance: {} violation(s), {} open, {} overridden.",
            c.total, c.open, c.overridden
        );
        if critical > 0 {
            compliance.push_str(&format!(
                " {critical} open critical violation(s) need review before their edges can be committed."
            ));
        }
        paragraphs.push(compliance);
        paragraphs.push(format!("Audit ledger: {} entries.", self.ledger_entries));

        IntegrityReport {
            generated_at: unix_now(),
            spectral: self.spectral,
            quality: self.quality,
            compliance: self.compliance,
            ledger_entries: self.ledger_entries,
            narrative: paragraphs.join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RelationshipCandidate;
    use crate::guardrails::OverrideInfo;

    fn violation(id: u64, severity: Severity, overridden: bool) -> Violation {
        Violation {
            id,
            candidate: RelationshipCandidate::new("kg://a", "kg://b", "TREATS"),
            severity,
            reason: "test".into(),
            source_type: "A".into(),
            target_type: "B".into(),
            detected_at: 0,
            overridden,
            override_info: overridden.then(|| OverrideInfo {
                actor: "alice".into(),
                reason: "ok".into(),
                timestamp: 0,
            }),
        }
    }

    #[test]
    fn summary_counts_open_and_overridden() {
        let s = ComplianceSummary::from_violations(&[
            violation(1, Severity::Critical, false),
            violation(2, Severity::Critical, true),
            violation(3, Severity::Low, false),
        ]);
        assert_eq!(s.total, 3);
        assert_eq!(s.open, 2);
        assert_eq!(s.overridden, 1);
        assert_eq!(s.open_by_severity[&Severity::Critical], 1);
    }

    #[test]
    fn narrative_mentions_missing_parts_and_criticals() {
        let report = ReportBuilder::new()
            .violations(&[violation(1, Severity::Critical, false)])
            .ledger_entries(4)
            .build();
        assert!(report.narrative.contains("Structure: not analyzed."));
        assert!(report.narrative.contains("1 open critical"));
        assert!(report.narrative.contains("4 entries"));
        let json = report.to_json().unwrap();
        assert!(json.contains("\"ledger_entries\": 4"));
    }
}
