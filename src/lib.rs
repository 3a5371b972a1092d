// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # ontoguard
//!
//! Ingestion guardrails for knowledge graphs: every entity mention and
//! relationship passes through ontology checks before it reaches storage.
//!
//! ## Architecture
//!
//! - **Ontology** (`ontology`): immutable type rules, compatibility checker,
//!   TOML loader and a hot-swappable handle
//! - **Disambiguation** (`disambiguation`): name → URI resolution that never
//!   merges incompatible types (the Jaguar Problem)
//! - **Guardrails** (`guardrails`): severity-graded relationship compliance
//!   and an overridable violation registry
//! - **Graph analysis** (`graph`): sparse Laplacian, Lanczos Fiedler value and
//!   robustness class
//! - **Quality** (`quality`): MINE score (retention, clustering, connectivity)
//! - **Audit** (`audit`): append-only decision ledger, redb-backed when durable,
//!   and the integrity report
//!
//! ## Library usage
//!
//! ```no_run
//! use ontoguard::config::EngineConfig;
//! use ontoguard::disambiguation::EntityMention;
//! use ontoguard::engine::Engine;
//! use ontoguard::ontology::TypeRuleSet;
//!
//! let rules = TypeRuleSet::builder()
//!     .forbid_merge("Animal", "Company", "organisms are not legal entities")
//!     .build();
//! let engine = Engine::in_memory(EngineConfig::default(), rules).unwrap();
//! let cat = engine.ingest_mention(&EntityMention::new("Jaguar", "Animal")).unwrap();
//! let car = engine.ingest_mention(&EntityMention::new("Jaguar", "Company")).unwrap();
//! assert_ne!(cat.uri(), car.uri());
//! ```

pub mod audit;
pub mod config;
pub mod deadline;
pub mod disambiguation;
pub mod embed;
pub mod engine;
pub mod error;
pub mod graph;
pub mod guardrails;
pub mod ontology;
pub mod quality;
pub mod store;
