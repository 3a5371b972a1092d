//! End-to-end tests for the ontoguard engine.
//!
//! These drive the public facade from mention ingestion through compliance,
//! overrides and reporting, checking that disambiguation, guardrails, the
//! ledger and the batch analyzers agree with each other.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use ontoguard::audit::LedgerEvent;
use ontoguard::config::EngineConfig;
use ontoguard::disambiguation::{EntityMention, ResolutionMethod};
use ontoguard::embed::HashingEmbedder;
use ontoguard::engine::Engine;
use ontoguard::graph::RelationStatus;
use ontoguard::graph::spectral::RobustnessClass;
use ontoguard::guardrails::Severity;
use ontoguard::ontology::{ComplianceRule, OntologyHandle, TypeRuleSet};
use ontoguard::quality::SourceText;
use ontoguard::store::{GraphStore, MemGraphStore};

const ONTOLOGY: &str = r#"
[aliases]
drug = "Medication"
firm = "Company"

[hierarchy]
Organization = ["Company"]
Condition = ["Disease"]
Substance = ["Food"]

[[forbidden_merge]]
types = ["Animal", "Company"]
reason = "organisms are not legal entities"

[compliance.Medication]
allowed = ["Disease"]
forbidden = ["SoftwareBug"]

[context.Company]
expected_neighbors = ["Product"]
"#;

fn rules() -> TypeRuleSet {
    TypeRuleSet::from_toml_str(ONTOLOGY).unwrap()
}

fn test_engine() -> Engine {
    Engine::in_memory(EngineConfig::default(), rules()).unwrap()
}

#[test]
fn scenario_a_jaguar_mentions_never_share_a_uri() {
    let engine = test_engine();
    let animal = engine.ingest_mention(&EntityMention::new("Jaguar", "Animal")).unwrap();
    let company = engine.ingest_mention(&EntityMention::new("Jaguar", "Company")).unwrap();
    engine.ingest_mention(&EntityMention::new("Aspirin", "drug")).unwrap();
    engine.ingest_mention(&EntityMention::new("Headache", "Disease")).unwrap();

    assert_ne!(animal.uri(), company.uri());
    assert_eq!(animal.decision.method, ResolutionMethod::New);
    assert_eq!(company.decision.method, ResolutionMethod::UniqueUri);
    assert_eq!(company.decision.conflicts.len(), 1);
    assert!(!company.decision.conflicts[0].compatible);

    // One unresolved conflict among three distinct names.
    let score = engine.evaluate_quality(&[]).unwrap();
    assert_eq!(score.distinct_names, 3);
    assert_eq!(score.jaguar_problems.len(), 1);
    assert!((score.clustering - (1.0 - 1.0 / 3.0)).abs() < 1e-12);
}

#[test]
fn scenario_b_forbidden_target_is_critical() {
    let engine = test_engine();
    let drug = engine.ingest_mention(&EntityMention::new("Aspirin", "Medication")).unwrap();
    let bug = engine
        .ingest_mention(&EntityMention::new("Off-by-one", "SoftwareBug"))
        .unwrap();

    let out = engine.ingest_relationship(drug.uri(), bug.uri(), "CAUSES").unwrap();
    assert!(!out.report.is_compliant);
    assert_eq!(out.report.max_severity(), Some(Severity::Critical));
    assert_eq!(out.candidate.status, RelationStatus::Pending);

    let registered = engine.violations().get(out.violation_ids[0]).unwrap();
    assert_eq!(registered.severity, Severity::Critical);
    assert!(!registered.overridden);
}

#[test]
fn scenario_c_empty_corpus_flags_retention_unavailable() {
    let engine = test_engine();
    engine.ingest_mention(&EntityMention::new("Aspirin", "Medication")).unwrap();
    let score = engine.evaluate_quality(&[]).unwrap();
    assert_eq!(score.retention, 0.0);
    assert!(!score.retention_available);
    assert!(score.notes.iter().any(|n| n.contains("retention unavailable")));
    assert!((0.0..=1.0).contains(&score.total));
}

#[test]
fn scenario_d_complete_graph_is_robust() {
    let engine = test_engine();
    let uris: Vec<String> = (0..10)
        .map(|i| {
            engine
                .ingest_mention(&EntityMention::new(format!("Node {i}"), "Thing"))
                .unwrap()
                .uri()
                .to_string()
        })
        .collect();
    for i in 0..uris.len() {
        for j in i + 1..uris.len() {
            let out = engine.ingest_relationship(&uris[i], &uris[j], "LINKED_TO").unwrap();
            assert!(out.is_committed());
        }
    }

    let report = engine.analyze_structure().unwrap();
    let r = &report.result;
    assert_eq!(r.node_count, 10);
    assert_eq!(r.edge_count, 45);
    assert!((r.lambda1 - 9.0).abs() < 1e-6, "λ1 = {}", r.lambda1);
    assert!((r.lambda2 - 10.0).abs() < 1e-6, "λ2 = {}", r.lambda2);
    assert_eq!(r.class, RobustnessClass::Robust);
    assert!(report.recommendations.iter().any(|s| s == "No action."));
}

#[test]
fn override_commits_blocked_edge_and_is_audited() {
    let engine = test_engine();
    let drug = engine.ingest_mention(&EntityMention::new("Aspirin", "Medication")).unwrap();
    let bug = engine.ingest_mention(&EntityMention::new("Race", "SoftwareBug")).unwrap();
    let out = engine.ingest_relationship(drug.uri(), bug.uri(), "CAUSES").unwrap();
    let id = out.violation_ids[0];

    assert!(engine.store().get_neighbors(drug.uri()).unwrap().is_empty());
    engine.override_violation(id, "benchmark fixture", "qa-lead").unwrap();
    assert_eq!(engine.store().get_neighbors(drug.uri()).unwrap(), vec![bug.uri().to_string()]);

    let overrides: Vec<_> = engine
        .ledger()
        .entries()
        .into_iter()
        .filter_map(|e| match e.event {
            LedgerEvent::ViolationOverride(o) => Some(o),
            _ => None,
        })
        .collect();
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].violation_id, id);
    assert_eq!(overrides[0].severity, Severity::Critical);
    assert_eq!(overrides[0].info.actor, "qa-lead");
}

#[test]
fn aliases_resolve_to_the_same_entity() {
    let engine = test_engine();
    let a = engine.ingest_mention(&EntityMention::new("Acme", "Company")).unwrap();
    let b = engine.ingest_mention(&EntityMention::new("ACME", "firm")).unwrap();
    assert_eq!(a.uri(), b.uri());
    assert_eq!(b.decision.method, ResolutionMethod::ExactMerge);
    assert_eq!(b.decision.confidence, 1.0);
}

#[test]
fn parent_of_allowed_target_is_medium() {
    let engine = test_engine();
    let drug = engine.ingest_mention(&EntityMention::new("Ibuprofen", "Medication")).unwrap();
    let condition = engine.ingest_mention(&EntityMention::new("Pain", "Condition")).unwrap();
    let out = engine.ingest_relationship(drug.uri(), condition.uri(), "TREATS").unwrap();
    // Condition is the root of Disease but not itself allowed.
    assert_eq!(out.report.max_severity(), Some(Severity::Medium));
    assert!(out.is_committed());
}

#[test]
fn integrity_report_covers_every_subsystem() {
    let engine = test_engine();
    let drug = engine.ingest_mention(&EntityMention::new("Aspirin", "Medication")).unwrap();
    let disease = engine.ingest_mention(&EntityMention::new("Headache", "Disease")).unwrap();
    let bug = engine.ingest_mention(&EntityMention::new("Leak", "SoftwareBug")).unwrap();
    engine.ingest_relationship(drug.uri(), disease.uri(), "TREATS").unwrap();
    engine.ingest_relationship(drug.uri(), bug.uri(), "CAUSES").unwrap();

    let corpus = engine
        .text_pairs(&[SourceText {
            text: "Aspirin is a medication that treats headache.".into(),
            uris: vec![drug.uri().to_string()],
        }])
        .unwrap();
    let report = engine.integrity_report(&corpus).unwrap();

    let spectral = report.spectral.as_ref().unwrap();
    assert_eq!(spectral.result.component_count, 2);
    assert!(spectral.result.is_disconnected());
    assert_eq!(spectral.result.lambda2, 0.0);

    let quality = report.quality.as_ref().unwrap();
    assert!(quality.retention > 0.0);
    assert!((quality.connectivity - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(quality.clustering, 1.0);

    assert_eq!(report.compliance.open, 1);
    assert!(report.narrative.contains("1 open critical"));
    assert!(report.to_json().unwrap().contains("\"compliance\""));
}

#[test]
fn unloaded_ontology_fails_closed_on_merges() {
    let engine = Engine::new(
        EngineConfig::default(),
        OntologyHandle::empty(),
        Arc::new(MemGraphStore::new()),
        Arc::new(HashingEmbedder::default()),
    )
    .unwrap();
    let a = engine.ingest_mention(&EntityMention::new("Mercury", "Planet")).unwrap();
    let b = engine.ingest_mention(&EntityMention::new("Mercury", "Planet")).unwrap();
    assert_ne!(a.uri(), b.uri());
    assert_eq!(b.decision.method, ResolutionMethod::UniqueUri);
}

#[test]
fn storage_outage_degrades_but_never_merges_incompatible_types() {
    let store = Arc::new(MemGraphStore::new());
    let engine = Engine::new(
        EngineConfig {
            storage_timeout_ms: 50,
            ..Default::default()
        },
        OntologyHandle::new(rules()),
        store.clone(),
        Arc::new(HashingEmbedder::default()),
    )
    .unwrap();
    engine.ingest_mention(&EntityMention::new("Jaguar", "Animal")).unwrap();

    store.set_latency(Duration::from_millis(200));
    let r = engine.disambiguation().resolve(&EntityMention::new("Jaguar", "Company")).unwrap();
    assert!(r.decision.degraded);
    assert_eq!(r.decision.method, ResolutionMethod::UniqueUri);
    assert!(r.decision.conflicts.iter().any(|c| !c.compatible));
}

#[test]
fn concurrent_ingestion_keeps_incompatible_types_apart() {
    let engine = Arc::new(test_engine());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let ty = if i % 2 == 0 { "Animal" } else { "Company" };
                engine
                    .ingest_mention(&EntityMention::new("Jaguar", ty))
                    .unwrap()
                    .uri()
                    .to_string()
            })
        })
        .collect();
    let uris: Vec<(usize, String)> = handles
        .into_iter()
        .enumerate()
        .map(|(i, h)| (i, h.join().unwrap()))
        .collect();

    let animal: BTreeSet<&str> = uris.iter().filter(|(i, _)| i % 2 == 0).map(|(_, u)| u.as_str()).collect();
    let company: BTreeSet<&str> = uris.iter().filter(|(i, _)| i % 2 == 1).map(|(_, u)| u.as_str()).collect();
    assert!(animal.is_disjoint(&company));
    assert_eq!(animal.len(), 1);
    assert_eq!(company.len(), 1);
    assert_eq!(engine.ledger().len(), 16);
}

#[test]
fn reload_applies_new_compliance_rules() {
    let engine = test_engine();
    let drug = engine.ingest_mention(&EntityMention::new("Aspirin", "Medication")).unwrap();
    let food = engine.ingest_mention(&EntityMention::new("Coffee", "Food")).unwrap();
    let before = engine.ingest_relationship(drug.uri(), food.uri(), "INTERACTS_WITH").unwrap();
    assert_eq!(before.report.max_severity(), Some(Severity::High));

    let reloaded = TypeRuleSet::builder()
        .compliance(
            "Medication",
            ComplianceRule {
                allowed: BTreeSet::from(["Disease".to_string(), "Food".to_string()]),
                ..Default::default()
            },
        )
        .build();
    engine.reload_ontology(reloaded);
    let after = engine.ingest_relationship(drug.uri(), food.uri(), "INTERACTS_WITH").unwrap();
    assert!(after.report.is_compliant);
}
