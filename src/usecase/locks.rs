//! Keyed async mutexes serializing coordinator mutations.
//!
//! Three key families exist:
//! - `code:<normalized-code>` serializes lazy group creation by code,
//! - `group:<group-id>` serializes every mutation committing against one
//!   group (foreground handlers and background tasks alike),
//! - `join:<group-id>:<normalized-username>` arbitrates concurrent claims of
//!   one username within one group.
//!
//! Callers only ever take keys in that order, so nesting cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{GroupCode, GroupId, Username};

/// Registry of named async mutexes.
///
/// Lock objects are created on first use and kept for the lifetime of the
/// registry; the table is bounded by the number of distinct groups and
/// usernames seen by the process.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a key, waiting until it is free.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inner = self.inner.lock().expect("lock registry poisoned");
            inner
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Key serializing group creation for one code.
pub fn code_key(code: &GroupCode) -> String {
    format!("code:{}", code.normalized())
}

/// Key serializing mutations of one group.
pub fn group_key(group_id: GroupId) -> String {
    format!("group:{}", group_id)
}

/// Key arbitrating one (group, normalized-username) claim.
pub fn join_key(group_id: GroupId, username: &Username) -> String {
    format!("join:{}:{}", group_id, username.normalized())
}
