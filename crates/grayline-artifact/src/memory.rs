use std::collections::HashMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::{ByteStream, Error, StageKey, Store};

/// In-memory staged store.
///
/// Useful for tests and for embedding the pipeline without touching disk.
#[derive(Default)]
pub struct MemoryStore {
  objects: RwLock<HashMap<StageKey, Bytes>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of stored objects across all stages.
  pub async fn len(&self) -> usize {
    self.objects.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.objects.read().await.is_empty()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn get(&self, key: &StageKey) -> Result<ByteStream, Error> {
    let bytes = self.read(key).await?;
    Ok(Box::pin(futures::stream::once(async move {
      Ok::<_, Error>(bytes)
    })))
  }

  async fn put(&self, key: &StageKey, data: ByteStream) -> Result<(), Error> {
    let mut stream = data;
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
      buf.extend_from_slice(&chunk?);
    }

    // Insert only after the stream is fully drained.
    self
      .objects
      .write()
      .await
      .insert(key.clone(), buf.freeze());
    Ok(())
  }

  async fn delete(&self, key: &StageKey) -> Result<(), Error> {
    self
      .objects
      .write()
      .await
      .remove(key)
      .map(|_| ())
      .ok_or_else(|| Error::NotFound(key.clone()))
  }

  async fn exists(&self, key: &StageKey) -> Result<bool, Error> {
    Ok(self.objects.read().await.contains_key(key))
  }

  async fn read(&self, key: &StageKey) -> Result<Bytes, Error> {
    self
      .objects
      .read()
      .await
      .get(key)
      .cloned()
      .ok_or_else(|| Error::NotFound(key.clone()))
  }

  async fn write(&self, key: &StageKey, data: Bytes) -> Result<(), Error> {
    self.objects.write().await.insert(key.clone(), data);
    Ok(())
  }
}
