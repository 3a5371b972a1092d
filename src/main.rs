//! ontoguard CLI: knowledge-graph ingestion guardrails.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Deserialize;

use ontoguard::config::EngineConfig;
use ontoguard::disambiguation::EntityMention;
use ontoguard::embed::HashingEmbedder;
use ontoguard::engine::Engine;
use ontoguard::guardrails::Guardrails;
use ontoguard::ontology::{OntologyHandle, TypeChecker, TypeRuleSet};
use ontoguard::quality::SourceText;
use ontoguard::store::MemGraphStore;

#[derive(Parser)]
#[command(name = "ontoguard", version, about = "Knowledge-graph ingestion guardrails")]
struct Cli {
    /// Ontology rules (TOML).
    #[arg(long, global = true)]
    ontology: Option<PathBuf>,

    /// Engine configuration (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the durable audit ledger (overrides the config).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether two types may share a URI.
    CheckTypes { type_a: String, type_b: String },

    /// Grade a relationship between two types against the compliance rules.
    Validate {
        source_type: String,
        relation: String,
        target_type: String,
    },

    /// Ingest mentions and relationships from a JSON-lines file.
    Ingest {
        /// One `{"mention": {...}}` or `{"relationship": {...}}` object per line.
        #[arg(long)]
        file: PathBuf,

        /// Source texts (JSON lines of `{"text": ..., "uris": [...]}`) for
        /// the retention score.
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Print the integrity report after ingestion.
        #[arg(long)]
        report: bool,

        /// Print the report as JSON instead of narrative text.
        #[arg(long)]
        json: bool,
    },

    /// Print the durable audit ledger as JSON lines.
    ExportAudit,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum IngestRecord {
    Mention(EntityMention),
    Relationship {
        source: String,
        target: String,
        relation: String,
    },
}

fn load_rules(path: Option<&Path>) -> Result<Option<TypeRuleSet>> {
    path.map(TypeRuleSet::from_path).transpose().into_diagnostic()
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_path(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }
    Ok(config)
}

fn read_lines<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).into_diagnostic()?;
    let mut items = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.into_diagnostic()?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line)
            .map_err(|e| miette::miette!("{}:{}: {e}", path.display(), lineno + 1))?;
        items.push(item);
    }
    Ok(items)
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let rules = load_rules(cli.ontology.as_deref())?;

    match &cli.command {
        Commands::CheckTypes { type_a, type_b } => {
            let checker = match rules {
                Some(rules) => TypeChecker::new(Arc::new(rules)),
                None => TypeChecker::unloaded(),
            };
            let c = checker.compatible(type_a, type_b);
            let verdict = if c.compatible { "compatible" } else { "incompatible" };
            println!("{} / {}: {verdict}", c.canonical_a, c.canonical_b);
            println!("  reason: {}", c.reason);
        }

        Commands::Validate {
            source_type,
            relation,
            target_type,
        } => {
            let config = load_config(&cli)?;
            let handle = rules.map(OntologyHandle::new).unwrap_or_default();
            let guardrails = Guardrails::new(handle, config.missing_rule_policy);
            let report = guardrails.validate(source_type, target_type, relation);
            if report.is_compliant {
                println!("{source_type} -[{relation}]-> {target_type}: compliant");
            } else {
                println!("{source_type} -[{relation}]-> {target_type}: non-compliant");
                for f in &report.violations {
                    println!("  [{}] {}", f.severity, f.reason);
                }
            }
        }

        Commands::Ingest {
            file,
            corpus,
            report,
            json,
        } => {
            let config = load_config(&cli)?;
            let engine = match rules {
                Some(rules) => Engine::in_memory(config, rules),
                None => Engine::new(
                    config,
                    OntologyHandle::empty(),
                    Arc::new(MemGraphStore::new()),
                    Arc::new(HashingEmbedder::default()),
                ),
            }
            .into_diagnostic()?;

            let records: Vec<IngestRecord> = read_lines(file)?;
            let (mut mentions, mut relationships, mut blocked) = (0usize, 0usize, 0usize);
            for record in &records {
                match record {
                    IngestRecord::Mention(mention) => {
                        let r = engine.ingest_mention(mention).into_diagnostic()?;
                        mentions += 1;
                        println!(
                            "{} [{}] -> {} ({}, confidence {:.2})",
                            mention.name,
                            r.decision.canonical_type,
                            r.uri(),
                            r.decision.method,
                            r.decision.confidence
                        );
                    }
                    IngestRecord::Relationship {
                        source,
                        target,
                        relation,
                    } => {
                        let out = engine
                            .ingest_relationship(source, target, relation)
                            .into_diagnostic()?;
                        relationships += 1;
                        if !out.is_committed() {
                            blocked += 1;
                        }
                        println!("{} [{}]", out.candidate, out.candidate.status);
                        for (id, f) in out.violation_ids.iter().zip(&out.report.violations) {
                            println!("  violation #{id} [{}] {}", f.severity, f.reason);
                        }
                    }
                }
            }
            println!(
                "Ingested {mentions} mention(s) and {relationships} relationship(s) from {}; {blocked} blocked.",
                file.display()
            );

            if *report {
                let sources: Vec<SourceText> = match corpus {
                    Some(path) => read_lines(path)?,
                    None => Vec::new(),
                };
                let pairs = engine.text_pairs(&sources).into_diagnostic()?;
                let report = engine.integrity_report(&pairs).into_diagnostic()?;
                if *json {
                    println!("{}", report.to_json().into_diagnostic()?);
                } else {
                    println!("\n{}", report.narrative);
                }
            }
        }

        Commands::ExportAudit => {
            let config = load_config(&cli)?;
            if config.data_dir.is_none() {
                miette::bail!("export-audit needs --data-dir or a config with data_dir");
            }
            let engine = Engine::new(
                config,
                rules.map(OntologyHandle::new).unwrap_or_default(),
                Arc::new(MemGraphStore::new()),
                Arc::new(HashingEmbedder::default()),
            )
            .into_diagnostic()?;
            let stdout = std::io::stdout();
            let count = engine.export_audit(stdout.lock()).into_diagnostic()?;
            tracing::info!(count, "exported audit records");
        }
    }

    Ok(())
}
