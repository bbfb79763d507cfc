//! sled-backed record store
//!
//! Two trees: `files` maps record id to the bincode record, `shares` maps
//! share token to record id. Both are written in one transaction so a
//! token never points at a missing record.

use crate::error::{Error, Result};
use crate::metadata::record::{FileRecord, NewFileRecord};

use chrono::Utc;
use sled::transaction::{abort, ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

const FILES_TREE: &str = "files";
const SHARES_TREE: &str = "shares";

#[derive(Debug)]
pub struct RecordStore {
    db: sled::Db,
    files: sled::Tree,
    shares: sled::Tree,
}

impl RecordStore {
    /// Open (or create) a store on disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening record store at {:?}", path);
        Self::from_db(sled::open(path)?)
    }

    /// Store that lives only as long as the process
    pub fn temporary() -> Result<Self> {
        debug!("Opening temporary record store");
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let files = db.open_tree(FILES_TREE)?;
        let shares = db.open_tree(SHARES_TREE)?;
        Ok(RecordStore { db, files, shares })
    }

    /// Insert a record under a fresh id
    ///
    /// Fails with [`Error::ShareLinkTaken`] when the share token is already mapped.
    pub fn create(&self, new: NewFileRecord) -> Result<FileRecord> {
        let record = new.into_record(Uuid::new_v4().to_string(), Utc::now());
        let value = bincode::serialize(&record)?;
        let token = record.share_link.clone();

        let result = (&self.files, &self.shares).transaction(|(files, shares)| {
            if shares.get(token.as_bytes())?.is_some() {
                return abort(Error::ShareLinkTaken(token.clone()));
            }

            shares.insert(token.as_bytes(), record.id.as_bytes())?;
            files.insert(record.id.as_bytes(), value.as_slice())?;
            Ok::<_, ConflictableTransactionError<Error>>(())
        });

        match result {
            Ok(()) => {
                debug!(
                    "Stored record {} ({}) with share link {}",
                    record.id, record.file_name, token
                );
                Ok(record)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(Error::Database(e)),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<FileRecord>> {
        match self.files.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_share_link(&self, token: &str) -> Result<Option<FileRecord>> {
        match self.shares.get(token.as_bytes())? {
            Some(id) => {
                let id = String::from_utf8(id.to_vec())
                    .map_err(|e| Error::Deserialization(format!("share index entry: {}", e)))?;
                self.get(&id)
            }
            None => Ok(None),
        }
    }

    /// All records, newest first
    pub fn list(&self) -> Result<Vec<FileRecord>> {
        let mut records = self
            .files
            .iter()
            .values()
            .map(|value| {
                let value = value?;
                Ok(bincode::deserialize::<FileRecord>(&value)?)
            })
            .collect::<Result<Vec<_>>>()?;

        records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(records)
    }

    /// Remove a record and its share token
    pub fn delete(&self, id: &str) -> Result<Option<FileRecord>> {
        let record = match self.get(id)? {
            Some(record) => record,
            None => return Ok(None),
        };

        (&self.files, &self.shares)
            .transaction(|(files, shares)| {
                files.remove(record.id.as_bytes())?;
                shares.remove(record.share_link.as_bytes())?;
                Ok::<_, ConflictableTransactionError<Error>>(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => Error::Database(e),
            })?;

        debug!("Deleted record {}", record.id);
        Ok(Some(record))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}
