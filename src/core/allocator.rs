use crate::core::description::{self, Describe, Description, Pack, canonical_json};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const TABLE_FILE: &str = "db.json";
pub const DATA_DIR: &str = "data";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Record table at {} is malformed: {reason}", path.display())]
    MalformedTable { path: PathBuf, reason: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Description error: {0}")]
    Description(#[from] description::Error),
}

/// Maps descriptions to stable artifact paths.
pub trait Allocator: Send + Sync {
    fn allocate(&self, description: &Description) -> Result<PathBuf, Error>;

    fn allocate_pack(&self, pack: &Pack) -> Result<PathBuf, Error> {
        self.allocate(&pack.describe()?)
    }
}

/// One row of the record table
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRecord {
    pub id: u64,
    pub description: Description,
}

// Document-table layout: {"_default": {"<id>": <description>, ...}}
#[derive(Debug, Default, Serialize, Deserialize)]
struct Table {
    #[serde(rename = "_default", default)]
    documents: BTreeMap<String, Description>,
}

/// Allocator backed by an append-only JSON record table.
///
/// Structurally equal descriptions always receive the same id. Ids are
/// assigned in first-seen order starting at 1 and never change. The table is
/// re-read on every call, so records appended by another allocator over the
/// same root are picked up.
pub struct TableAllocator {
    root: PathBuf,
    lock: Mutex<()>,
}

impl TableAllocator {
    /// Open (or create) an allocation root
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        let data_dir = root.join(DATA_DIR);
        fs::create_dir_all(&data_dir).map_err(|source| Error::Io {
            path: data_dir,
            source,
        })?;

        tracing::debug!(root = %root.display(), "Opened allocation table");

        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self) -> PathBuf {
        self.root.join(TABLE_FILE)
    }

    /// Artifact path of the record with `id`
    pub fn path_for(&self, id: u64) -> PathBuf {
        self.root.join(DATA_DIR).join(format!("{}.json", id))
    }

    /// All records, ordered by id
    pub fn records(&self) -> Result<Vec<AllocationRecord>, Error> {
        let _guard = self.lock.lock();
        Ok(self.read_records()?.rows)
    }

    /// Id of an existing record equal to `description`, without inserting
    pub fn lookup(&self, description: &Description) -> Result<Option<u64>, Error> {
        let _guard = self.lock.lock();
        let key = canonical_json(description);
        Ok(self.read_records()?.index.get(&key).copied())
    }

    fn read_records(&self) -> Result<Records, Error> {
        let path = self.table_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Records::default()),
            Err(source) => return Err(Error::Io { path, source }),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Records::default());
        }

        let table: Table = serde_json::from_slice(&bytes).map_err(|err| Error::MalformedTable {
            path: path.clone(),
            reason: err.to_string(),
        })?;

        let mut rows = Vec::with_capacity(table.documents.len());
        for (id, description) in table.documents {
            let id: u64 = id.parse().map_err(|_| Error::MalformedTable {
                path: path.clone(),
                reason: format!("document id \"{}\" is not an integer", id),
            })?;
            rows.push(AllocationRecord { id, description });
        }
        rows.sort_by_key(|record| record.id);

        // Rows stay as read; should the table ever hold duplicates the lowest id wins lookups
        let mut index = HashMap::with_capacity(rows.len());
        for record in &rows {
            index
                .entry(canonical_json(&record.description))
                .or_insert(record.id);
        }

        Ok(Records { rows, index })
    }

    fn write_table(&self, rows: &[AllocationRecord]) -> Result<(), Error> {
        let table = Table {
            documents: rows
                .iter()
                .map(|record| (record.id.to_string(), record.description.clone()))
                .collect(),
        };

        let path = self.table_path();
        let staging = self
            .root
            .join(format!(".{}.{}.partial", TABLE_FILE, uuid::Uuid::new_v4()));

        fs::write(&staging, serde_json::to_vec(&table)?).map_err(|source| Error::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &path).map_err(|source| {
            let _ = fs::remove_file(&staging);
            Error::Io { path, source }
        })
    }
}

/// Table rows ordered by id, plus an index from canonical description to id
#[derive(Default)]
struct Records {
    rows: Vec<AllocationRecord>,
    index: HashMap<String, u64>,
}

impl Allocator for TableAllocator {
    fn allocate(&self, description: &Description) -> Result<PathBuf, Error> {
        let _guard = self.lock.lock();

        let Records { mut rows, index } = self.read_records()?;
        let key = canonical_json(description);

        if let Some(&id) = index.get(&key) {
            tracing::debug!(id, "Allocation found");
            return Ok(self.path_for(id));
        }

        let id = rows.last().map(|record| record.id).unwrap_or(0) + 1;
        rows.push(AllocationRecord {
            id,
            description: description.clone(),
        });
        self.write_table(&rows)?;

        tracing::debug!(id, "Allocation created");

        Ok(self.path_for(id))
    }
}
