//! Document store the service persists endpoints and credentials in.
//!
//! Documents are JSON values addressed by (namespace, kind, name). The
//! filesystem backend keeps the whole store in one snapshot file that is
//! rewritten on every save. Only one process may have the file open.
use crate::config::{Compression, StoreConfig};
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("malformed document {key}: {source}")]
    Document {
        key: String,
        source: serde_json::Error,
    },

    #[error("store {path} is in use by another process")]
    Locked { path: String, source: io::Error },

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

impl Key {
    pub fn new<N, K, M>(namespace: N, kind: K, name: M) -> Self
    where
        N: Into<String>,
        K: Into<String>,
        M: Into<String>,
    {
        Key {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &Key) -> Result<Option<Value>, StoreError>;
    /// Inserts or overwrites the document at `key`.
    async fn save(&self, key: &Key, data: Value) -> Result<(), StoreError>;
    /// All documents of `kind` in `namespace`, as (name, document) pairs.
    async fn query(&self, namespace: &str, kind: &str) -> Result<Vec<(String, Value)>, StoreError>;
}

/// Fetches the document at `key` and decodes it into `T`.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn Store,
    key: &Key,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => decode(key, value).map(Some),
        None => Ok(None),
    }
}

pub async fn save_typed<T: Serialize>(
    store: &dyn Store,
    key: &Key,
    data: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(data).map_err(|source| StoreError::Document {
        key: key.to_string(),
        source,
    })?;
    store.save(key, value).await
}

pub async fn query_typed<T: DeserializeOwned>(
    store: &dyn Store,
    namespace: &str,
    kind: &str,
) -> Result<Vec<(String, T)>, StoreError> {
    store
        .query(namespace, kind)
        .await?
        .into_iter()
        .map(|(name, value)| {
            let key = Key::new(namespace, kind, name.as_str());
            decode(&key, value).map(|doc| (name, doc))
        })
        .collect()
}

fn decode<T: DeserializeOwned>(key: &Key, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Document {
        key: key.to_string(),
        source,
    })
}

pub fn get_store(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config {
        StoreConfig::Memory => {
            tracing::warn!("using the in-memory store, nothing will survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::Filesystem {
            base_dir,
            filename,
            compression,
        } => Ok(Arc::new(FilesystemStore::open(
            base_dir,
            filename,
            *compression,
        )?)),
    }
}

type Documents = HashMap<Key, Value>;

fn query_documents(documents: &Documents, namespace: &str, kind: &str) -> Vec<(String, Value)> {
    documents
        .iter()
        .filter(|(key, _)| key.namespace == namespace && key.kind == kind)
        .map(|(key, value)| (key.name.clone(), value.clone()))
        .collect()
}

#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &Key) -> Result<Option<Value>, StoreError> {
        Ok(self.documents.read().get(key).cloned())
    }

    async fn save(&self, key: &Key, data: Value) -> Result<(), StoreError> {
        self.documents.write().insert(key.clone(), data);
        Ok(())
    }

    async fn query(&self, namespace: &str, kind: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(query_documents(&self.documents.read(), namespace, kind))
    }
}

/// On-disk layout of the snapshot file. Documents are kept as JSON text since
/// bincode cannot decode self-describing values.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Snapshot {
    documents: Vec<SnapshotDocument>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct SnapshotDocument {
    key: Key,
    json: String,
}

impl Snapshot {
    fn from_documents(documents: &Documents) -> Result<Self, StoreError> {
        let documents = documents
            .iter()
            .map(|(key, value)| {
                let json = serde_json::to_string(value).map_err(|source| StoreError::Document {
                    key: key.to_string(),
                    source,
                })?;
                Ok(SnapshotDocument {
                    key: key.clone(),
                    json,
                })
            })
            .collect::<Result<_, StoreError>>()?;
        Ok(Snapshot { documents })
    }

    fn into_documents(self) -> Result<Documents, StoreError> {
        self.documents
            .into_iter()
            .map(|doc| {
                let value = serde_json::from_str(&doc.json).map_err(|source| {
                    StoreError::Document {
                        key: doc.key.to_string(),
                        source,
                    }
                })?;
                Ok((doc.key, value))
            })
            .collect()
    }
}

struct Codec {
    compression: Compression,
    config: bincode::config::Configuration,
}

impl Codec {
    fn new(compression: Compression) -> Self {
        Codec {
            compression,
            // standard defaults to little-endian + varint
            config: bincode::config::standard(),
        }
    }

    fn write<W: Write>(&self, writer: &mut W, data: &Snapshot) -> Result<usize, StoreError> {
        match self.compression.zstd_level() {
            None => {
                let size = bincode::serde::encode_into_std_write(data, writer, self.config)?;
                writer.flush()?;
                Ok(size)
            }
            Some(level) => {
                let mut encoder = zstd::stream::write::Encoder::new(writer, level)?;
                let size = bincode::serde::encode_into_std_write(data, &mut encoder, self.config)?;
                encoder.finish()?;
                Ok(size)
            }
        }
    }

    fn read<R: Read>(&self, mut reader: R) -> Result<Snapshot, StoreError> {
        match self.compression.zstd_level() {
            None => Ok(bincode::serde::decode_from_std_read(
                &mut reader,
                self.config,
            )?),
            Some(_) => {
                let mut decoder = zstd::stream::read::Decoder::new(reader)?;
                Ok(bincode::serde::decode_from_std_read(
                    &mut decoder,
                    self.config,
                )?)
            }
        }
    }
}

pub struct FilesystemStore {
    path: PathBuf,
    codec: Arc<Codec>,
    /// Committed documents. Only updated after the snapshot holding them is on disk.
    documents: RwLock<Documents>,
    // Serializes saves so an older snapshot never lands after a newer one.
    write_lock: tokio::sync::Mutex<()>,
    // Exclusive lock on `<filename>.lock`, released when the store is dropped.
    _lock_file: File,
}

impl FilesystemStore {
    /// Opens the snapshot at `base_dir/filename`, starting empty if it does not exist yet.
    ///
    /// Fails with [`StoreError::Locked`] while another store holds the same file.
    pub fn open(base_dir: &str, filename: &str, compression: Compression) -> Result<Self, StoreError> {
        std::fs::create_dir_all(base_dir)?;
        let path = Path::new(base_dir).join(filename);
        let codec = Codec::new(compression);

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|source| StoreError::Locked {
                path: path.display().to_string(),
                source,
            })?;

        let documents = match File::open(&path) {
            Ok(file) => codec.read(io::BufReader::new(file))?.into_documents()?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Documents::new(),
            Err(err) => return Err(err.into()),
        };

        tracing::info!(path = %path.display(), documents = documents.len(), "opened filesystem store");

        Ok(FilesystemStore {
            path,
            codec: Arc::new(codec),
            documents: RwLock::new(documents),
            write_lock: tokio::sync::Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    async fn persist(&self, documents: &Documents) -> Result<(), StoreError> {
        let snapshot = Snapshot::from_documents(documents)?;
        let codec = self.codec.clone();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_snapshot(&codec, &path, &snapshot)).await??;
        Ok(())
    }
}

// Write to a sibling temp file and rename so readers never see a partial snapshot.
fn write_snapshot(codec: &Codec, path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("tmp");
    let file = File::create(&tmp_path)?;
    let mut writer = io::BufWriter::new(file);
    let size = codec.write(&mut writer, snapshot)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    std::fs::rename(&tmp_path, path)?;

    tracing::debug!(path = %path.display(), bytes = size, "stored snapshot");
    Ok(())
}

#[async_trait]
impl Store for FilesystemStore {
    async fn get(&self, key: &Key) -> Result<Option<Value>, StoreError> {
        Ok(self.documents.read().get(key).cloned())
    }

    async fn save(&self, key: &Key, data: Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut documents = self.documents.read().clone();
        documents.insert(key.clone(), data);

        self.persist(&documents).await?;
        *self.documents.write() = documents;
        Ok(())
    }

    async fn query(&self, namespace: &str, kind: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(query_documents(&self.documents.read(), namespace, kind))
    }
}
