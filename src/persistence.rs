//! Block storage for OrderChain
//!
//! Only mined blocks are stored. The pending block and its orders are derived
//! state and are rebuilt from the chain on startup.

use crate::blockchain::MinedBlock;
use crate::error::ChainError;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Abstraction for persistence backends.
pub trait Persistence: Send + Sync {
    /// Store the block at `height`, replacing whatever was there.
    fn save_block(&self, height: u64, block: &MinedBlock) -> Result<(), ChainError>;
    /// Replace the stored chain as a single unit.
    fn save_chain(&self, blocks: &[MinedBlock]) -> Result<(), ChainError>;
    /// Every stored block, lowest height first.
    fn load_chain(&self) -> Result<Vec<MinedBlock>, ChainError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    /// Database that lives only as long as this handle.
    pub fn open_in_memory() -> Result<Self, ChainError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, ChainError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                height INTEGER PRIMARY KEY,
                hash TEXT NOT NULL,
                prev_hash TEXT,
                client_id TEXT NOT NULL,
                nonce INTEGER NOT NULL,
                body TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create blocks table: {}", e)))?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn insert(conn: &Connection, height: u64, block: &MinedBlock) -> Result<(), ChainError> {
        let body = serde_json::to_string(block)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to serialize block: {}", e)))?;
        let height = i64::try_from(height)
            .map_err(|_| ChainError::DatabaseError(format!("Height {} out of range", height)))?;
        let nonce = i64::try_from(block.nonce)
            .map_err(|_| ChainError::DatabaseError(format!("Nonce {} out of range", block.nonce)))?;

        conn.execute(
            "INSERT OR REPLACE INTO blocks (height, hash, prev_hash, client_id, nonce, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                height,
                block.hash()?,
                block.body.prev_block_hash,
                block.client_id,
                nonce,
                body,
            ],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save block: {}", e)))?;
        Ok(())
    }

    pub fn save_block(&self, height: u64, block: &MinedBlock) -> Result<(), ChainError> {
        let conn = self.conn.lock().map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        Self::insert(&conn, height, block)
    }

    pub fn save_chain(&self, blocks: &[MinedBlock]) -> Result<(), ChainError> {
        let conn_guard = self.conn.lock().map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let tx = conn_guard.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        tx.execute("DELETE FROM blocks", [])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear blocks: {}", e)))?;
        for (height, block) in blocks.iter().enumerate() {
            Self::insert(&tx, height as u64, block)?;
        }

        tx.commit().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;
        Ok(())
    }

    pub fn load_chain(&self) -> Result<Vec<MinedBlock>, ChainError> {
        let conn_guard = self.conn.lock().map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let mut stmt = conn_guard
            .prepare("SELECT height, body FROM blocks ORDER BY height ASC")
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let height: i64 = row.get(0)?;
                let body: String = row.get(1)?;
                Ok((height, body))
            })
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for row in rows {
            let (height, body) =
                row.map_err(|e| ChainError::DatabaseError(format!("Failed to load block: {}", e)))?;
            if height != blocks.len() as i64 {
                return Err(ChainError::DatabaseError(format!(
                    "Missing block at height {}",
                    blocks.len()
                )));
            }
            let block: MinedBlock = serde_json::from_str(&body).map_err(|e| {
                ChainError::DatabaseError(format!("Failed to deserialize block {}: {}", height, e))
            })?;
            blocks.push(block);
        }

        Ok(blocks)
    }
}

impl Persistence for Database {
    fn save_block(&self, height: u64, block: &MinedBlock) -> Result<(), ChainError> {
        Database::save_block(self, height, block)
    }

    fn save_chain(&self, blocks: &[MinedBlock]) -> Result<(), ChainError> {
        Database::save_chain(self, blocks)
    }

    fn load_chain(&self) -> Result<Vec<MinedBlock>, ChainError> {
        Database::load_chain(self)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
///
/// Clones share storage, so a test can keep a handle after boxing one.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    pub blocks: Arc<Mutex<Vec<MinedBlock>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<MinedBlock>>, ChainError> {
        self.blocks
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))
    }
}

impl Persistence for InMemoryPersistence {
    fn save_block(&self, height: u64, block: &MinedBlock) -> Result<(), ChainError> {
        let mut blocks = self.lock()?;
        let height = height as usize;
        if height < blocks.len() {
            blocks[height] = block.clone();
            blocks.truncate(height + 1);
        } else if height == blocks.len() {
            blocks.push(block.clone());
        } else {
            return Err(ChainError::DatabaseError(format!("Missing block at height {}", blocks.len())));
        }
        Ok(())
    }

    fn save_chain(&self, blocks: &[MinedBlock]) -> Result<(), ChainError> {
        *self.lock()? = blocks.to_vec();
        Ok(())
    }

    fn load_chain(&self) -> Result<Vec<MinedBlock>, ChainError> {
        Ok(self.lock()?.clone())
    }
}
