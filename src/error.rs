//! Rich diagnostic error types for the ontoguard engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers know exactly what went wrong
//! and how to fix it. Conditions that only degrade a result (missing context,
//! degenerate graphs, unavailable embeddings) are reported as result flags and
//! never appear here.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the ontoguard engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum OntoGuardError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compliance(#[from] ComplianceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Ontology errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum OntologyError {
    #[error("type conflict for \"{name}\": {existing_type} cannot merge with {new_type} ({reason})")]
    #[diagnostic(
        code(ontoguard::ontology::type_conflict),
        help(
            "The two types form a forbidden-merge pair in the ontology. \
             Do not merge these entities: create a distinct node for the new mention, \
             or reject the mention."
        )
    )]
    TypeConflict {
        name: String,
        existing_type: String,
        new_type: String,
        reason: String,
    },

    #[error("failed to read ontology file {path}: {source}")]
    #[diagnostic(
        code(ontoguard::ontology::io),
        help("Check that the ontology file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid ontology definition: {message}")]
    #[diagnostic(
        code(ontoguard::ontology::parse),
        help(
            "The ontology TOML is malformed. Expected sections: [aliases], [hierarchy], \
             [[forbidden_merge]], [compliance.<Type>] and [context.<Type>]."
        )
    )]
    Parse { message: String },
}

// ---------------------------------------------------------------------------
// Compliance errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ComplianceError {
    #[error("violation not found: {id}")]
    #[diagnostic(
        code(ontoguard::compliance::not_found),
        help("No registered violation has this id. List violations to find the right one.")
    )]
    ViolationNotFound { id: u64 },

    #[error("violation {id} was already overridden by {actor}")]
    #[diagnostic(
        code(ontoguard::compliance::already_overridden),
        help(
            "Overrides are applied once and never rewritten. \
             The original override remains in the audit ledger."
        )
    )]
    AlreadyOverridden { id: u64, actor: String },
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StorageError {
    #[error("graph storage unreachable: {message}")]
    #[diagnostic(
        code(ontoguard::storage::unreachable),
        help("The graph storage backend did not answer. Check the connection and retry.")
    )]
    Unreachable { message: String },

    #[error("graph storage call `{operation}` exceeded {timeout_ms} ms")]
    #[diagnostic(
        code(ontoguard::storage::timeout),
        help(
            "Raise `storage_timeout_ms` in the engine configuration, \
             or investigate why the backend is slow."
        )
    )]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("node not found: {uri}")]
    #[diagnostic(
        code(ontoguard::storage::node_not_found),
        help("Resolve both endpoint mentions before proposing a relationship between them.")
    )]
    NodeNotFound { uri: String },

    #[error("node already exists: {uri}")]
    #[diagnostic(
        code(ontoguard::storage::node_exists),
        help("Every minted URI must be unique. Re-run resolution to allocate a fresh suffix.")
    )]
    NodeExists { uri: String },
}

// ---------------------------------------------------------------------------
// Embedding errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EmbedError {
    #[error("cannot embed empty text")]
    #[diagnostic(
        code(ontoguard::embed::empty_text),
        help("Provide at least one non-whitespace token.")
    )]
    EmptyText,

    #[error("embeddings provider unavailable: {message}")]
    #[diagnostic(
        code(ontoguard::embed::unavailable),
        help("The retention score is marked unavailable for this run.")
    )]
    Unavailable { message: String },

    #[error("embeddings provider exceeded {timeout_ms} ms")]
    #[diagnostic(
        code(ontoguard::embed::timeout),
        help("Raise `embed_timeout_ms` in the engine configuration.")
    )]
    Timeout { timeout_ms: u64 },
}

// ---------------------------------------------------------------------------
// Ledger errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(ontoguard::ledger::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(ontoguard::ledger::redb),
        help(
            "The embedded ledger database encountered a transaction error. \
             If the problem persists, copy the data directory aside and file a bug report."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(ontoguard::ledger::serde),
        help(
            "Failed to serialize or deserialize a ledger entry. \
             The on-disk format may come from an incompatible version."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(ontoguard::engine::invalid_config),
        help("Check the EngineConfig fields. {message}")
    )]
    InvalidConfig { message: String },

    #[error("invalid input: {message}")]
    #[diagnostic(
        code(ontoguard::engine::invalid_input),
        help("Mentions need a non-empty name and type; relationships need a non-empty label.")
    )]
    InvalidInput { message: String },

    #[error("failed to parse configuration {path}: {message}")]
    #[diagnostic(
        code(ontoguard::engine::config_parse),
        help("The configuration file must be valid TOML matching EngineConfig.")
    )]
    ConfigParse { path: String, message: String },

    #[error("data directory error: {path}")]
    #[diagnostic(
        code(ontoguard::engine::data_dir),
        help(
            "The data directory could not be accessed. \
             Ensure the path exists and has read/write permissions."
        )
    )]
    DataDir { path: String },
}

/// Convenience alias for functions returning ontoguard results.
pub type OntoGuardResult<T> = std::result::Result<T, OntoGuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ontology_error_converts_to_top_level() {
        let err = OntologyError::TypeConflict {
            name: "Jaguar".into(),
            existing_type: "Animal".into(),
            new_type: "Company".into(),
            reason: "forbidden".into(),
        };
        let top: OntoGuardError = err.into();
        assert!(matches!(
            top,
            OntoGuardError::Ontology(OntologyError::TypeConflict { .. })
        ));
    }

    #[test]
    fn storage_error_converts_to_top_level() {
        let err = StorageError::Timeout {
            operation: "get_neighbors".into(),
            timeout_ms: 50,
        };
        let top: OntoGuardError = err.into();
        assert!(matches!(top, OntoGuardError::Storage(StorageError::Timeout { .. })));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = OntologyError::TypeConflict {
            name: "Jaguar".into(),
            existing_type: "Animal".into(),
            new_type: "Company".into(),
            reason: "Animal/Company are disjoint".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("Jaguar"));
        assert!(msg.contains("Animal"));
        assert!(msg.contains("Company"));
    }
}
