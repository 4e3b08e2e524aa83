//! Sled-backed snapshot store keeping the payload and its digest.

use super::{MessageDiff, MessageStore, SnapshotMessage};
use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMessage {
    digest: String,
    object_class: Option<String>,
    captured_at: String,
    payload: String,
}

pub struct SledMessageStore {
    db: sled::Db,
}

impl SledMessageStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)
            .map_err(|e| StorageError::Database(format!("Failed to open sled database: {}", e)))?;
        Ok(Self { db })
    }

    fn get(&self, key: &str) -> Result<Option<StoredMessage>, StorageError> {
        match self
            .db
            .get(key.as_bytes())
            .map_err(|e| StorageError::Database(format!("Failed to read {}: {}", key, e)))?
        {
            Some(value) => bincode::deserialize(&value)
                .map(Some)
                .map_err(|e| StorageError::Serialization(format!("Failed to decode {}: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Payload currently stored under `key` (`<host>/<provider id>`).
    pub fn payload(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(key)?.map(|m| m.payload))
    }
}

impl MessageStore for SledMessageStore {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn store_message(&self, message: &SnapshotMessage) -> Result<(), StorageError> {
        let key = message.key();
        let record = StoredMessage {
            digest: message.digest(),
            object_class: message.object_class.clone(),
            captured_at: message.captured_at.clone(),
            payload: message.payload.clone(),
        };
        let value = bincode::serialize(&record)
            .map_err(|e| StorageError::Serialization(format!("Failed to encode {}: {}", key, e)))?;

        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| StorageError::Database(format!("Failed to store {}: {}", key, e)))?;
        self.db
            .flush()
            .map_err(|e| StorageError::Database(format!("Failed to flush: {}", e)))?;

        info!(key = %key, "Snapshot stored");
        Ok(())
    }

    fn diff_message(&self, message: &SnapshotMessage) -> Result<MessageDiff, StorageError> {
        let previous = self.get(&message.key())?.map(|m| m.digest);
        Ok(MessageDiff::between(previous, message.digest()))
    }
}
