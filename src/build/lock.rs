//! Lock access that survives a panicking render.
//!
//! A render that panics while holding build state poisons the lock. The data
//! behind it is still a consistent snapshot (records are replaced wholesale),
//! so the guard is recovered and the event is logged.

use std::sync::{LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(
    result: LockResult<G>,
    kind: &'static str,
    owner: &'static str,
    op: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(owner, op, lock_kind = kind, "Recovered poisoned build lock");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), "read", owner, op)
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), "write", owner, op)
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    owner: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), "mutex", owner, op)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn poisoned_mutex_still_yields_its_data() {
        let set = Arc::new(Mutex::new(BTreeSet::from([1])));
        let poisoner = Arc::clone(&set);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().expect("first lock");
            panic!("render panicked");
        })
        .join();

        assert!(set.is_poisoned());
        mutex_lock(&set, "test", "insert").insert(2);
        assert_eq!(mutex_lock(&set, "test", "read").len(), 2);
    }

    #[test]
    fn poisoned_rwlock_serves_readers_and_writers() {
        let value = Arc::new(RwLock::new(1));
        let poisoner = Arc::clone(&value);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.write().expect("first write");
            panic!("render panicked");
        })
        .join();

        *rw_write(&value, "test", "write") = 5;
        assert_eq!(*rw_read(&value, "test", "read"), 5);
    }
}
