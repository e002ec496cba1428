//! Grayline Artifact
//!
//! This crate provides the staged image storage trait and implementations for
//! Grayline. Every image lives under a [`StageKey`]: one of the three pipeline
//! stages (upload, working, processed) plus the run identifier.
//!
//! The [`Store`] trait defines the backend layer. Implementations handle the
//! actual storage (filesystem, memory) while the pipeline only deals in keys.
//!
//! Writes replace the whole object, so repeating a write or a copy with the
//! same input leaves the same bytes behind.

mod fs;
mod key;
mod memory;

pub use fs::FsStore;
pub use key::{Stage, StageKey};
pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// A boxed stream of bytes for staged data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Error type for staged storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// Nothing is stored under the requested key.
  #[error("not found: {0}")]
  NotFound(StageKey),

  /// The run identifier cannot be used as a storage key.
  #[error("invalid key '{0}': identifiers may only contain letters, digits, '-' and '_'")]
  InvalidKey(String),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Staged storage trait.
///
/// Implementations provide the actual storage backend. Keys are flat; no
/// directory semantics are assumed beyond lookup by key.
#[async_trait]
pub trait Store: Send + Sync {
  /// Retrieve the object under `key` as a stream.
  async fn get(&self, key: &StageKey) -> Result<ByteStream, Error>;

  /// Store a stream under `key`, replacing any previous object.
  ///
  /// The new object becomes visible only once fully written.
  async fn put(&self, key: &StageKey, data: ByteStream) -> Result<(), Error>;

  /// Delete the object under `key`.
  async fn delete(&self, key: &StageKey) -> Result<(), Error>;

  /// Check whether an object exists under `key`.
  async fn exists(&self, key: &StageKey) -> Result<bool, Error>;

  /// Read the whole object under `key` into memory.
  async fn read(&self, key: &StageKey) -> Result<Bytes, Error> {
    let mut stream = self.get(key).await?;
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
      buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
  }

  /// Store `data` under `key`, replacing any previous object.
  async fn write(&self, key: &StageKey, data: Bytes) -> Result<(), Error> {
    let stream = futures::stream::once(async move { Ok::<_, Error>(data) });
    self.put(key, Box::pin(stream)).await
  }

  /// Copy the object under `src` to `dst`, replacing any previous object.
  async fn copy(&self, src: &StageKey, dst: &StageKey) -> Result<(), Error> {
    let stream = self.get(src).await?;
    self.put(dst, stream).await
  }
}
