use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use metrics::counter;
use tracing::warn;

const METRIC_LOCK_POISONED: &str = "tierset_lock_poisoned_total";

/// Read-locks `lock`, taking the guard back from a panicked writer instead of propagating.
pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        note_poisoned(target, op, "rwlock.read");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        note_poisoned(target, op, "rwlock.write");
        poisoned.into_inner()
    })
}

fn note_poisoned(target: &'static str, op: &'static str, lock_kind: &'static str) {
    warn!(
        op,
        target_module = target,
        lock_kind,
        result = "poisoned_recovered",
        "Recovered from poisoned lock in {target}; data may predate the panic"
    );
    counter!(METRIC_LOCK_POISONED, "source" => target, "op" => op).increment(1);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn recovers_any_poisoned_rwlock() {
        let lock = Arc::new(RwLock::new(BTreeMap::from([("k", 1)])));
        let poisoner = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let _guard = poisoner.write().expect("first lock");
            panic!("poison the row lock");
        })
        .join();
        assert!(lock.is_poisoned());

        assert_eq!(rw_read(&lock, "infra::memory", "find").get("k"), Some(&1));
        rw_write(&lock, "infra::memory", "upsert").insert("k", 2);
        assert_eq!(rw_read(&lock, "infra::memory", "find").get("k"), Some(&2));
    }
}
