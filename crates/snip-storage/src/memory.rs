use async_trait::async_trait;
use parking_lot::Mutex;
use snip_core::batch::first_conflict;
use snip_core::{
    LinkPair, LinkRef, ReadStore, Result, ShortCode, ShortLink, Store, StoreError, StoreStats,
    UserId,
};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug)]
struct State {
    links: Vec<ShortLink>,
    next_id: u64,
}

impl State {
    fn live_code_for_url(&self, user_id: &UserId, original_url: &str) -> Option<ShortCode> {
        self.links
            .iter()
            .find(|l| l.is_live() && &l.user_id == user_id && l.original_url == original_url)
            .map(|l| l.short_url.clone())
    }

    fn code_is_live(&self, user_id: &UserId, code: &ShortCode) -> bool {
        self.links
            .iter()
            .any(|l| l.is_live() && &l.user_id == user_id && &l.short_url == code)
    }

    fn push(&mut self, user_id: &UserId, code: &ShortCode, original_url: &str) -> ShortLink {
        let link = ShortLink {
            id: self.next_id,
            user_id: user_id.clone(),
            short_url: code.clone(),
            original_url: original_url.to_owned(),
            is_deleted: false,
        };
        self.next_id += 1;
        self.links.push(link.clone());
        link
    }
}

/// In-memory implementation of the store contract.
///
/// Records live in one ordered list behind a single mutex and every
/// operation is a linear scan. The lock is never held across an `.await`,
/// so dropping a pending operation cannot leave it locked.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                links: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Inserts one link, enforcing both per-user uniqueness rules.
    pub fn insert(
        &self,
        user_id: &UserId,
        code: &ShortCode,
        original_url: &str,
    ) -> Result<ShortLink> {
        let mut state = self.state.lock();

        if let Some(existing) = state.live_code_for_url(user_id, original_url) {
            return Err(StoreError::NotUnique {
                short_url: existing,
                original_url: original_url.to_owned(),
            });
        }
        if state.code_is_live(user_id, code) {
            return Err(StoreError::DuplicateCode(code.clone()));
        }

        let link = state.push(user_id, code, original_url);
        debug!(user_id = %user_id, code = %code, id = link.id, "stored link in memory");
        Ok(link)
    }

    /// Inserts a whole batch or nothing.
    ///
    /// The conflict scan and the inserts happen under the same lock
    /// acquisition, so no concurrent insert can slip in between them.
    pub fn insert_batch(&self, user_id: &UserId, batch: &[LinkPair]) -> Result<Vec<ShortLink>> {
        let mut state = self.state.lock();

        let conflict = first_conflict(
            batch,
            |url| state.live_code_for_url(user_id, url),
            |code| state.code_is_live(user_id, code),
        );
        if let Some(err) = conflict {
            return Err(err);
        }

        let inserted = batch
            .iter()
            .map(|item| state.push(user_id, &item.short_url, &item.original_url))
            .collect::<Vec<_>>();
        debug!(user_id = %user_id, count = inserted.len(), "stored link batch in memory");
        Ok(inserted)
    }

    /// Returns the original URL of the user's live link with this code.
    pub fn get_by_user(&self, user_id: &UserId, code: &ShortCode) -> Option<String> {
        self.state
            .lock()
            .links
            .iter()
            .find(|l| l.is_live() && &l.user_id == user_id && &l.short_url == code)
            .map(|l| l.original_url.clone())
    }

    /// Returns the user's live code for an original URL.
    pub fn get_by_original(&self, user_id: &UserId, original_url: &str) -> Option<ShortCode> {
        self.state.lock().live_code_for_url(user_id, original_url)
    }

    /// Physically removes the user's live link with this code.
    ///
    /// Used to undo an insert whose persistence failed.
    pub fn remove(&self, user_id: &UserId, code: &ShortCode) -> Option<ShortLink> {
        let mut state = self.state.lock();
        let index = state
            .links
            .iter()
            .position(|l| l.is_live() && &l.user_id == user_id && &l.short_url == code)?;
        Some(state.links.remove(index))
    }

    /// Returns a snapshot of every record, soft-deleted ones included.
    pub fn get_all(&self) -> Vec<ShortLink> {
        self.state.lock().links.clone()
    }

    /// Re-inserts a previously persisted record as is.
    ///
    /// The id and the deletion flag are kept. A live record that breaks a
    /// uniqueness rule, or an id seen twice, means the source is corrupt.
    pub fn restore(&self, link: ShortLink) -> Result<()> {
        let mut state = self.state.lock();

        if state.links.iter().any(|l| l.id == link.id) {
            return Err(StoreError::InvalidData(format!(
                "duplicate record id {}",
                link.id
            )));
        }
        if link.is_live() {
            if state
                .live_code_for_url(&link.user_id, &link.original_url)
                .is_some()
            {
                return Err(StoreError::InvalidData(format!(
                    "user {} has more than one live link for {}",
                    link.user_id, link.original_url
                )));
            }
            if state.code_is_live(&link.user_id, &link.short_url) {
                return Err(StoreError::InvalidData(format!(
                    "user {} has more than one live link with code {}",
                    link.user_id, link.short_url
                )));
            }
        }

        let after = link.id.checked_add(1).ok_or_else(|| {
            StoreError::InvalidData(format!("record id {} is out of range", link.id))
        })?;
        state.next_id = state.next_id.max(after);
        state.links.push(link);
        Ok(())
    }

    /// Marks the given live links as deleted. Returns how many were flipped.
    pub fn soft_delete(&self, links: &[LinkRef]) -> usize {
        let mut state = self.state.lock();
        let mut flipped = 0;

        for target in links {
            if let Some(link) = state.links.iter_mut().find(|l| {
                l.is_live() && l.user_id == target.user_id && l.short_url == target.short_url
            }) {
                link.is_deleted = true;
                flipped += 1;
            }
        }

        flipped
    }

    /// Drops every soft-deleted record. Returns how many were removed.
    pub fn purge_deleted(&self) -> u64 {
        let mut state = self.state.lock();
        let before = state.links.len();
        state.links.retain(ShortLink::is_live);
        (before - state.links.len()) as u64
    }

    /// Returns the number of records, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.state.lock().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadStore for MemoryStore {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        let state = self.state.lock();
        let mut deleted = false;

        for link in state.links.iter().filter(|l| &l.short_url == code) {
            if link.is_live() {
                return Ok(link.original_url.clone());
            }
            deleted = true;
        }

        if deleted {
            Err(StoreError::Deleted(code.clone()))
        } else {
            Err(StoreError::NotFound(code.to_string()))
        }
    }

    async fn get_all_urls(&self, user_id: &UserId) -> Result<Vec<LinkPair>> {
        Ok(self
            .state
            .lock()
            .links
            .iter()
            .filter(|l| l.is_live() && &l.user_id == user_id)
            .map(ShortLink::to_pair)
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.state.lock();
        let live = state.links.iter().filter(|l| l.is_live());
        let users: HashSet<&UserId> = live.clone().map(|l| &l.user_id).collect();

        Ok(StoreStats {
            urls: live.count() as u64,
            users: users.len() as u64,
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set(
        &self,
        user_id: &UserId,
        code: &ShortCode,
        original_url: &str,
    ) -> Result<ShortCode> {
        self.insert(user_id, code, original_url)
            .map(|link| link.short_url)
    }

    async fn set_batch(&self, user_id: &UserId, batch: Vec<LinkPair>) -> Result<Vec<LinkPair>> {
        if batch.is_empty() {
            return Ok(batch);
        }
        self.insert_batch(user_id, &batch)?;
        Ok(batch)
    }

    async fn delete_short_urls(&self, links: Vec<LinkRef>) -> Result<()> {
        let flipped = self.soft_delete(&links);
        debug!(requested = links.len(), flipped, "soft-deleted links in memory");
        Ok(())
    }

    async fn hard_delete_urls(&self) -> Result<u64> {
        Ok(self.purge_deleted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn user(s: &str) -> UserId {
        UserId::new(s)
    }

    #[tokio::test]
    async fn set_and_get() {
        let store = MemoryStore::new();

        let stored = store
            .set(&user("u1"), &code("ABC123"), "https://example.com/")
            .await
            .unwrap();
        assert_eq!(stored.as_str(), "ABC123");

        let url = store.get(&code("ABC123")).await.unwrap();
        assert_eq!(url, "https://example.com/");
    }

    #[tokio::test]
    async fn get_nonexistent() {
        let store = MemoryStore::new();

        let err = store.get(&code("NOPE00")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn same_url_returns_existing_code() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("ABC123"), "https://example.com/")
            .await
            .unwrap();

        let err = store
            .set(&user("u1"), &code("XYZ789"), "https://example.com/")
            .await
            .unwrap_err();

        match err {
            StoreError::NotUnique { short_url, .. } => assert_eq!(short_url.as_str(), "ABC123"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn same_code_is_duplicate() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("ABC123"), "https://one.example/")
            .await
            .unwrap();

        let err = store
            .set(&user("u1"), &code("ABC123"), "https://two.example/")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateCode(_)));
    }

    #[tokio::test]
    async fn uniqueness_is_scoped_per_user() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("ABC123"), "https://example.com/")
            .await
            .unwrap();

        store
            .set(&user("u2"), &code("ABC123"), "https://example.com/")
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn deleted_url_can_be_shortened_again() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("ABC123"), "https://example.com/")
            .await
            .unwrap();
        store
            .delete_short_urls(vec![LinkRef::new("u1", code("ABC123"))])
            .await
            .unwrap();

        store
            .set(&user("u1"), &code("DEF456"), "https://example.com/")
            .await
            .unwrap();

        let links = store.get_all_urls(&user("u1")).await.unwrap();
        assert_eq!(links, vec![LinkPair::new(code("DEF456"), "https://example.com/")]);
    }

    #[tokio::test]
    async fn deleted_and_missing_are_distinct() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("ABC123"), "https://example.com/")
            .await
            .unwrap();
        store
            .delete_short_urls(vec![LinkRef::new("u1", code("ABC123"))])
            .await
            .unwrap();

        assert!(matches!(
            store.get(&code("ABC123")).await,
            Err(StoreError::Deleted(_))
        ));
        assert!(matches!(
            store.get(&code("NOPE00")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_scoped_to_owner() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("ABC123"), "https://example.com/")
            .await
            .unwrap();

        store
            .delete_short_urls(vec![LinkRef::new("u2", code("ABC123"))])
            .await
            .unwrap();

        assert_eq!(store.get(&code("ABC123")).await.unwrap(), "https://example.com/");
    }

    #[tokio::test]
    async fn live_record_wins_over_deleted_one_on_get() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("ABC123"), "https://old.example/")
            .await
            .unwrap();
        store
            .delete_short_urls(vec![LinkRef::new("u1", code("ABC123"))])
            .await
            .unwrap();
        store
            .set(&user("u2"), &code("ABC123"), "https://new.example/")
            .await
            .unwrap();

        assert_eq!(store.get(&code("ABC123")).await.unwrap(), "https://new.example/");
    }

    #[tokio::test]
    async fn hard_delete_removes_only_deleted_records() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("AAAAAA"), "https://one.example/")
            .await
            .unwrap();
        store
            .set(&user("u2"), &code("BBBBBB"), "https://two.example/")
            .await
            .unwrap();
        store
            .delete_short_urls(vec![LinkRef::new("u1", code("AAAAAA"))])
            .await
            .unwrap();

        assert_eq!(store.hard_delete_urls().await.unwrap(), 1);

        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].short_url.as_str(), "BBBBBB");
        assert!(store.get_all_urls(&user("u1")).await.unwrap().is_empty());
        assert!(matches!(
            store.get(&code("AAAAAA")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("OLD000"), "https://two.example/")
            .await
            .unwrap();

        let batch = vec![
            LinkPair::new(code("AAAAAA"), "https://one.example/"),
            LinkPair::new(code("BBBBBB"), "https://two.example/"),
            LinkPair::new(code("CCCCCC"), "https://three.example/"),
        ];
        let err = store.set_batch(&user("u1"), batch).await.unwrap_err();

        match err {
            StoreError::NotUnique {
                short_url,
                original_url,
            } => {
                assert_eq!(short_url.as_str(), "OLD000");
                assert_eq!(original_url, "https://two.example/");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn batch_inserts_every_item() {
        let store = MemoryStore::new();
        let batch = vec![
            LinkPair::new(code("AAAAAA"), "https://one.example/"),
            LinkPair::new(code("BBBBBB"), "https://two.example/"),
        ];

        let stored = store.set_batch(&user("u1"), batch.clone()).await.unwrap();

        assert_eq!(stored, batch);
        assert_eq!(store.get_all_urls(&user("u1")).await.unwrap(), batch);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = MemoryStore::new();
        assert!(store.set_batch(&user("u1"), vec![]).await.unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn remove_undoes_an_insert() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("ABC123"), "https://example.com/")
            .await
            .unwrap();

        let removed = store.remove(&user("u1"), &code("ABC123")).unwrap();
        assert_eq!(removed.original_url, "https://example.com/");
        assert!(store.is_empty());
        assert!(store.remove(&user("u1"), &code("ABC123")).is_none());
    }

    #[tokio::test]
    async fn lookup_helpers() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("ABC123"), "https://example.com/")
            .await
            .unwrap();

        assert_eq!(
            store.get_by_user(&user("u1"), &code("ABC123")).as_deref(),
            Some("https://example.com/")
        );
        assert!(store.get_by_user(&user("u2"), &code("ABC123")).is_none());
        assert_eq!(
            store.get_by_original(&user("u1"), "https://example.com/"),
            Some(code("ABC123"))
        );
    }

    #[tokio::test]
    async fn restore_keeps_ids_and_flags() {
        let store = MemoryStore::new();
        store
            .restore(ShortLink {
                id: 41,
                user_id: user("u1"),
                short_url: code("ABC123"),
                original_url: "https://example.com/".to_string(),
                is_deleted: true,
            })
            .unwrap();

        assert!(matches!(
            store.get(&code("ABC123")).await,
            Err(StoreError::Deleted(_))
        ));

        let link = store
            .insert(&user("u1"), &code("DEF456"), "https://example.com/")
            .unwrap();
        assert_eq!(link.id, 42);
    }

    #[tokio::test]
    async fn restore_rejects_conflicting_live_records() {
        let store = MemoryStore::new();
        let first = ShortLink {
            id: 1,
            user_id: user("u1"),
            short_url: code("ABC123"),
            original_url: "https://example.com/".to_string(),
            is_deleted: false,
        };
        store.restore(first.clone()).unwrap();

        let err = store
            .restore(ShortLink {
                id: 2,
                short_url: code("DEF456"),
                ..first.clone()
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));

        let err = store.restore(first).unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }

    #[test]
    fn restore_rejects_the_largest_id() {
        let store = MemoryStore::new();
        let err = store
            .restore(ShortLink {
                id: u64::MAX,
                user_id: user("u1"),
                short_url: code("ABC123"),
                original_url: "https://example.com/".to_string(),
                is_deleted: false,
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidData(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn stats_count_live_links_and_users() {
        let store = MemoryStore::new();
        store
            .set(&user("u1"), &code("AAAAAA"), "https://one.example/")
            .await
            .unwrap();
        store
            .set(&user("u1"), &code("BBBBBB"), "https://two.example/")
            .await
            .unwrap();
        store
            .set(&user("u2"), &code("CCCCCC"), "https://one.example/")
            .await
            .unwrap();
        store
            .delete_short_urls(vec![LinkRef::new("u2", code("CCCCCC"))])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats, StoreStats { urls: 2, users: 1 });
    }

    #[tokio::test]
    async fn concurrent_sets_keep_codes_unique() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];

        for i in 0..50u64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                // Every task races for the same code with a distinct URL.
                store
                    .set(
                        &UserId::new("u1"),
                        &ShortCode::new_unchecked("SAME00"),
                        &format!("https://example{i}.com/"),
                    )
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(err) => assert!(matches!(err, StoreError::DuplicateCode(_))),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(store.len(), 1);
    }
}
