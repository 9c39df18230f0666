use crate::prelude::{Cache, DbKey, DbWriter, StoreError, DB};
use rocksdb::{Direction, IteratorMode, ReadOptions};
use serde::{de::DeserializeOwned, Serialize};
use std::{error::Error, hash::Hash, sync::Arc};

/// A concurrent DB store access with typed caching.
pub struct CachedDbAccess<TKey, TData>
where
    TKey: Clone + Hash + Eq + Send + Sync,
    TData: Clone + Send + Sync,
{
    db: Arc<DB>,
    cache: Cache<TKey, TData>,
    prefix: Vec<u8>,
}

pub type KeyDataResult<TData> = Result<(Box<[u8]>, TData), Box<dyn Error>>;

impl<TKey, TData> CachedDbAccess<TKey, TData>
where
    TKey: Clone + Hash + Eq + Send + Sync + AsRef<[u8]>,
    TData: Clone + Send + Sync,
{
    pub fn new(db: Arc<DB>, cache_size: u64, prefix: Vec<u8>) -> Self {
        Self { db, cache: Cache::new(cache_size), prefix }
    }

    pub fn has(&self, key: TKey) -> Result<bool, StoreError> {
        Ok(self.cache.contains_key(&key) || self.db.get_pinned(DbKey::new(&self.prefix, &key))?.is_some())
    }

    pub fn read(&self, key: TKey) -> Result<TData, StoreError>
    where
        TData: DeserializeOwned,
    {
        if let Some(data) = self.cache.get(&key) {
            return Ok(data);
        }
        let db_key = DbKey::new(&self.prefix, &key);
        if let Some(slice) = self.db.get_pinned(&db_key)? {
            let data: TData = bincode::deserialize(&slice)?;
            self.cache.insert(key, data.clone());
            Ok(data)
        } else {
            Err(StoreError::KeyNotFound(db_key))
        }
    }

    pub fn write(&self, mut writer: impl DbWriter, key: TKey, data: TData) -> Result<(), StoreError>
    where
        TData: Serialize,
    {
        let bin_data = bincode::serialize(&data)?;
        self.cache.insert(key.clone(), data);
        writer.put(DbKey::new(&self.prefix, &key), bin_data)?;
        Ok(())
    }

    pub fn delete(&self, mut writer: impl DbWriter, key: TKey) -> Result<(), StoreError> {
        self.cache.remove(&key);
        writer.delete(DbKey::new(&self.prefix, &key))?;
        Ok(())
    }

    pub fn delete_many(&self, mut writer: impl DbWriter, keys: &mut impl Iterator<Item = TKey>) -> Result<(), StoreError> {
        for key in keys {
            self.cache.remove(&key);
            writer.delete(DbKey::new(&self.prefix, &key))?;
        }
        Ok(())
    }

    /// Iterates over all store entries in key order, skipping the cache
    pub fn iterator(&self) -> impl Iterator<Item = KeyDataResult<TData>> + '_
    where
        TData: DeserializeOwned,
    {
        let prefix_key = DbKey::prefix_only(&self.prefix);
        let mut read_opts = ReadOptions::default();
        read_opts.set_iterate_range(rocksdb::PrefixRange(prefix_key.as_ref()));
        let prefix_len = self.prefix.len();
        self.db
            .iterator_opt(IteratorMode::From(prefix_key.as_ref(), Direction::Forward), read_opts)
            .map(move |item| match item {
                Ok((key, data_bytes)) => match bincode::deserialize(&data_bytes) {
                    Ok(data) => Ok((key[prefix_len..].into(), data)),
                    Err(err) => Err(err.into()),
                },
                Err(err) => Err(err.into()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::{create_temp_db, DirectDbWriter};

    #[test]
    fn test_cached_access_roundtrip() {
        let (_guard, db) = create_temp_db();
        let access: CachedDbAccess<[u8; 2], u64> = CachedDbAccess::new(db.clone(), 2, vec![42]);

        access.write(DirectDbWriter::new(&db), [1, 1], 10).unwrap();
        access.write(DirectDbWriter::new(&db), [2, 2], 20).unwrap();
        assert_eq!(access.read([1, 1]).unwrap(), 10);
        assert!(access.has([2, 2]).unwrap());
        assert!(matches!(access.read([3, 3]), Err(StoreError::KeyNotFound(_))));

        access.delete(DirectDbWriter::new(&db), [1, 1]).unwrap();
        assert!(!access.has([1, 1]).unwrap());

        let entries: Vec<_> = access.iterator().map(|r| r.unwrap()).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, 20);
    }
}
