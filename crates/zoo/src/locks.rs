//! Per-directory serialization of the check/fetch/scan path.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct DirectoryLocks {
    table: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DirectoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `dir`; callers hold its guard for the critical section.
    pub fn entry(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut table = self.table.lock();
        Arc::clone(table.entry(dir.to_path_buf()).or_default())
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_directory_shares_a_lock() {
        let locks = DirectoryLocks::new();
        let a = locks.entry(Path::new("/zoo/gpu"));
        let b = locks.entry(Path::new("/zoo/gpu"));
        let c = locks.entry(Path::new("/zoo/cpu"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.len(), 2);

        let _guard = a.lock();
        assert!(b.try_lock().is_none());
        assert!(c.try_lock().is_some());
    }
}
