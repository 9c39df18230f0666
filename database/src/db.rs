use rocksdb::{DBWithThreadMode, MultiThreaded, Options};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub type DB = DBWithThreadMode<MultiThreaded>;

/// Opens (creating if missing) a DB instance at the provided directory
pub fn open_db<P: AsRef<Path>>(db_path: P) -> Result<Arc<DB>, rocksdb::Error> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    Ok(Arc::new(DB::open(&opts, db_path)?))
}

/// Creates a DB instance in a temporary directory. The instance is destroyed
/// together with the returned guard.
pub fn create_temp_db() -> (TempDir, Arc<DB>) {
    let db_tempdir = tempfile::tempdir().expect("failed creating temp dir");
    let db = open_db(db_tempdir.path()).expect("failed opening temp db");
    (db_tempdir, db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_db_roundtrip() {
        let (_guard, db) = create_temp_db();
        db.put(b"k", b"v").unwrap();
        assert_eq!(db.get(b"k").unwrap().unwrap(), b"v");
        db.delete(b"k").unwrap();
        assert!(db.get(b"k").unwrap().is_none());
    }
}
