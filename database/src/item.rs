use crate::prelude::{DbKey, DbWriter, StoreError, DB};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// A cached DB item with concurrency support, holding a single typed value
/// under a fixed key (e.g. the current pruning point or the virtual state).
pub struct CachedDbItem<T> {
    db: Arc<DB>,
    key: Vec<u8>,
    cached_item: RwLock<Option<T>>,
}

impl<T> CachedDbItem<T> {
    pub fn new(db: Arc<DB>, key: Vec<u8>) -> Self {
        Self { db, key, cached_item: RwLock::new(None) }
    }

    pub fn read(&self) -> Result<T, StoreError>
    where
        T: Clone + DeserializeOwned,
    {
        if let Some(item) = self.cached_item.read().clone() {
            return Ok(item);
        }
        if let Some(slice) = self.db.get_pinned(&self.key)? {
            let item: T = bincode::deserialize(&slice)?;
            *self.cached_item.write() = Some(item.clone());
            Ok(item)
        } else {
            Err(StoreError::KeyNotFound(DbKey::prefix_only(&self.key)))
        }
    }

    pub fn write(&self, mut writer: impl DbWriter, item: &T) -> Result<(), StoreError>
    where
        T: Clone + Serialize,
    {
        *self.cached_item.write() = Some(item.clone());
        let bin_data = bincode::serialize(item)?;
        writer.put(&self.key, bin_data)?;
        Ok(())
    }

    pub fn update<F>(&self, mut writer: impl DbWriter, op: F) -> Result<T, StoreError>
    where
        T: Clone + Serialize + DeserializeOwned,
        F: Fn(T) -> T,
    {
        let mut guard = self.cached_item.write();
        let item = if let Some(item) = guard.clone() {
            item
        } else if let Some(slice) = self.db.get_pinned(&self.key)? {
            bincode::deserialize(&slice)?
        } else {
            return Err(StoreError::KeyNotFound(DbKey::prefix_only(&self.key)));
        };
        let item = op(item);
        *guard = Some(item.clone());
        writer.put(&self.key, bincode::serialize(&item)?)?;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::{create_temp_db, DirectDbWriter};

    #[test]
    fn test_item_read_write_update() {
        let (_guard, db) = create_temp_db();
        let item: CachedDbItem<u64> = CachedDbItem::new(db.clone(), b"counter".to_vec());

        assert!(matches!(item.read(), Err(StoreError::KeyNotFound(_))));
        item.write(DirectDbWriter::new(&db), &5).unwrap();
        assert_eq!(item.read().unwrap(), 5);
        assert_eq!(item.update(DirectDbWriter::new(&db), |v| v + 1).unwrap(), 6);

        // A fresh accessor sees the persisted value
        let item2: CachedDbItem<u64> = CachedDbItem::new(db.clone(), b"counter".to_vec());
        assert_eq!(item2.read().unwrap(), 6);
    }
}
