//! Process-wide allow-list snapshot.
//!
//! The snapshot is replaced wholesale on every refresh and handed out as an
//! `Arc`, so an audit that already holds one keeps a consistent view while a
//! concurrent refresh swaps in the next.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{errors::StoreError, ports::DirectoryStore};

/// Immutable set of allow-listed usernames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowlistSnapshot {
    usernames: HashSet<String>,
}

impl AllowlistSnapshot {
    pub fn contains(&self, username: &str) -> bool {
        self.usernames.contains(username)
    }

    pub fn len(&self) -> usize {
        self.usernames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usernames.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for AllowlistSnapshot {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            usernames: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Default)]
struct CacheState {
    snapshot: Arc<AllowlistSnapshot>,
    refreshed_at: Option<DateTime<Utc>>,
}

pub struct AllowlistCache {
    store: Arc<dyn DirectoryStore>,
    state: RwLock<CacheState>,
}

impl AllowlistCache {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self {
            store,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Re-read the allow-list from the directory and replace the snapshot.
    ///
    /// On failure the previous snapshot stays current.
    pub async fn refresh(&self) -> Result<Arc<AllowlistSnapshot>, StoreError> {
        let names = self.store.list_allowed().await?;
        let snapshot = Arc::new(names.into_iter().collect::<AllowlistSnapshot>());

        let mut st = self.state.write().await;
        st.snapshot = snapshot.clone();
        st.refreshed_at = Some(Utc::now());
        tracing::debug!(size = snapshot.len(), "allow-list refreshed");
        Ok(snapshot)
    }

    /// Latest snapshot; empty if never refreshed.
    pub async fn current(&self) -> Arc<AllowlistSnapshot> {
        self.state.read().await.snapshot.clone()
    }

    pub async fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.refreshed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDirectory;

    #[tokio::test]
    async fn current_is_empty_before_first_refresh() {
        let cache = AllowlistCache::new(Arc::new(FakeDirectory::with_allowed(&["alice"])));
        assert!(cache.current().await.is_empty());
        assert!(cache.refreshed_at().await.is_none());
    }

    #[tokio::test]
    async fn refresh_replaces_snapshot_wholesale() {
        let dir = Arc::new(FakeDirectory::with_allowed(&["alice", "bob"]));
        let cache = AllowlistCache::new(dir.clone());

        let first = cache.refresh().await.unwrap();
        assert!(first.contains("alice"));
        assert!(first.contains("bob"));

        dir.set_allowed(&["carol"]);
        let second = cache.refresh().await.unwrap();
        assert!(!second.contains("alice"));
        assert!(second.contains("carol"));
        assert_eq!(*cache.current().await, *second);

        // A snapshot handed out earlier is unaffected by the refresh.
        assert!(first.contains("alice"));
        assert!(cache.refreshed_at().await.is_some());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let dir = Arc::new(FakeDirectory::with_allowed(&["alice"]));
        let cache = AllowlistCache::new(dir.clone());
        cache.refresh().await.unwrap();

        dir.fail_next_allowed_reads(1);
        assert!(cache.refresh().await.is_err());
        assert!(cache.current().await.contains("alice"));
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let snap: AllowlistSnapshot = ["Alice"].into_iter().collect();
        assert!(snap.contains("Alice"));
        assert!(!snap.contains("alice"));
    }
}
