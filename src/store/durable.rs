//! ACID-durable append log backed by redb.
//!
//! Backs the audit ledger when a data directory is configured. Keys are
//! sequence numbers, so entries iterate back in append order. The log has
//! no update or delete operation.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::LedgerError;

/// Sequence number → serialized ledger entry.
const LOG_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("audit_log");

/// Append-only durable log.
pub struct DurableLog {
    db: Arc<Database>,
}

impl DurableLog {
    /// Open or create a log in the given directory.
    pub fn open(data_dir: &Path) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(data_dir).map_err(|source| LedgerError::Io { source })?;
        let db_path = data_dir.join("ontoguard-audit.redb");
        let db = Database::create(&db_path).map_err(|e| LedgerError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Create the table up front so read transactions never see it missing.
        let txn = db.begin_write().map_err(|e| LedgerError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        txn.open_table(LOG_TABLE).map_err(|e| LedgerError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        txn.commit().map_err(|e| LedgerError::Redb {
            message: format!("commit failed: {e}"),
        })?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Durably write one entry. Fails if the sequence number is already taken.
    pub fn append(&self, seq: u64, bytes: &[u8]) -> Result<(), LedgerError> {
        let txn = self.db.begin_write().map_err(|e| LedgerError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        {
            let mut table = txn.open_table(LOG_TABLE).map_err(|e| LedgerError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            let previous = table.insert(seq, bytes).map_err(|e| LedgerError::Redb {
                message: format!("insert failed: {e}"),
            })?;
            if previous.is_some() {
                return Err(LedgerError::Redb {
                    message: format!("sequence {seq} already written"),
                });
            }
        }
        txn.commit().map_err(|e| LedgerError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(())
    }

    /// Read every entry in sequence order.
    pub fn load_all(&self) -> Result<Vec<(u64, Vec<u8>)>, LedgerError> {
        let txn = self.db.begin_read().map_err(|e| LedgerError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(LOG_TABLE).map_err(|e| LedgerError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let iter = table.iter().map_err(|e| LedgerError::Redb {
            message: format!("iter failed: {e}"),
        })?;
        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| LedgerError::Redb {
                message: format!("read failed: {e}"),
            })?;
            out.push((key.value(), value.value().to_vec()));
        }
        Ok(out)
    }
}

impl std::fmt::Debug for DurableLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLog").finish()
    }
}
