use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use tracing::{debug, trace};
use uuid::Uuid;

use super::realtime::Realtime;

/// A record stored in a [`Collection`].
pub trait Document: Clone + Serialize + Send + Sync + 'static {
    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;

    /// Key that must be unique across the collection, if any.
    /// Updates must not change it.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("document {id} not found in {collection}")]
    NotFound { collection: String, id: Uuid },
    #[error("document with key {key} already exists in {collection}")]
    Conflict { collection: String, key: String },
    #[error("collection {0} is unavailable")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    NewestFirst,
    OldestFirst,
}

type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Filter, order and page through a collection.
pub struct Query<T> {
    filters: Vec<Filter<T>>,
    order: Order,
    limit: Option<usize>,
    cursor_after: Option<Uuid>,
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order: Order::default(),
            limit: None,
            cursor_after: None,
        }
    }
}

impl<T> Query<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filters.push(Box::new(f));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Start after the document with this id, in the query's order.
    pub fn cursor_after(mut self, id: Uuid) -> Self {
        self.cursor_after = Some(id);
        self
    }

    fn matches(&self, doc: &T) -> bool {
        self.filters.iter().all(|f| f(doc))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentList<T> {
    /// Matching documents before paging.
    pub total: usize,
    pub documents: Vec<T>,
}

struct CollectionInner<T> {
    name: String,
    channel: String,
    docs: DashMap<Uuid, T>,
    unique: DashMap<String, Uuid>,
    realtime: Realtime,
    #[cfg(test)]
    failing_writes: std::sync::atomic::AtomicUsize,
}

/// A named set of documents with an optional unique index and change feed.
pub struct Collection<T> {
    inner: Arc<CollectionInner<T>>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub fn channel_name(database_id: &str, collection: &str) -> String {
    format!("databases.{database_id}.collections.{collection}.documents")
}

impl<T: Document> Collection<T> {
    pub fn new(database_id: &str, name: &str, realtime: Realtime) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                name: name.to_owned(),
                channel: channel_name(database_id, name),
                docs: DashMap::new(),
                unique: DashMap::new(),
                realtime,
                #[cfg(test)]
                failing_writes: Default::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Realtime channel that carries this collection's changes.
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub async fn create(&self, doc: T) -> Result<T, DbError> {
        self.check_available()?;
        let id = doc.id();

        match doc.unique_key() {
            Some(key) => match self.inner.unique.entry(key) {
                Entry::Occupied(e) => {
                    return Err(DbError::Conflict {
                        collection: self.inner.name.clone(),
                        key: e.key().clone(),
                    })
                }
                Entry::Vacant(e) => {
                    // the key only becomes visible once its document is stored
                    self.inner.docs.insert(id, doc.clone());
                    e.insert(id);
                }
            },
            None => {
                self.inner.docs.insert(id, doc.clone());
            }
        }
        trace!(collection = %self.inner.name, %id, "created");
        self.notify(id, "create", &doc);
        Ok(doc)
    }

    pub async fn get(&self, id: Uuid) -> Result<T, DbError> {
        self.inner
            .docs
            .get(&id)
            .map(|d| d.clone())
            .ok_or_else(|| self.not_found(id))
    }

    pub async fn find_by_key(&self, key: &str) -> Option<T> {
        let id = *self.inner.unique.get(key)?;
        self.inner.docs.get(&id).map(|d| d.clone())
    }

    /// Apply `f` to the stored document and return the new version.
    pub async fn update<F>(&self, id: Uuid, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut T),
    {
        self.check_available()?;
        let updated = {
            let mut doc = self.inner.docs.get_mut(&id).ok_or_else(|| self.not_found(id))?;
            let key = doc.unique_key();
            f(doc.value_mut());
            debug_assert_eq!(key, doc.unique_key(), "unique key changed on update");
            doc.clone()
        };

        self.notify(id, "update", &updated);
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<T, DbError> {
        self.check_available()?;
        // release the key first so it never points at a missing document
        let key = self
            .inner
            .docs
            .get(&id)
            .ok_or_else(|| self.not_found(id))?
            .unique_key();
        if let Some(key) = &key {
            self.inner.unique.remove_if(key, |_, owner| *owner == id);
        }
        let (_, doc) = self.inner.docs.remove(&id).ok_or_else(|| self.not_found(id))?;

        debug!(collection = %self.inner.name, %id, "deleted");
        self.notify(id, "delete", &doc);
        Ok(doc)
    }

    pub async fn list(&self, query: Query<T>) -> Result<DocumentList<T>, DbError> {
        let mut docs: Vec<T> = self
            .inner
            .docs
            .iter()
            .filter(|d| query.matches(d.value()))
            .map(|d| d.value().clone())
            .collect();

        docs.sort_by_key(|d| (d.created_at(), d.id()));
        if query.order == Order::NewestFirst {
            docs.reverse();
        }

        let total = docs.len();
        let start = match query.cursor_after {
            Some(cursor) => {
                docs.iter()
                    .position(|d| d.id() == cursor)
                    .ok_or_else(|| self.not_found(cursor))?
                    + 1
            }
            None => 0,
        };

        let documents = docs
            .into_iter()
            .skip(start)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(DocumentList { total, documents })
    }

    pub async fn count(&self, query: Query<T>) -> usize {
        self.inner
            .docs
            .iter()
            .filter(|d| query.matches(d.value()))
            .count()
    }

    fn not_found(&self, id: Uuid) -> DbError {
        DbError::NotFound {
            collection: self.inner.name.clone(),
            id,
        }
    }

    fn notify(&self, id: Uuid, action: &str, doc: &T) {
        let event = format!("{}.{id}.{action}", self.inner.channel);
        let payload = serde_json::to_value(doc).unwrap_or(serde_json::Value::Null);
        self.inner.realtime.publish(&self.inner.channel, vec![event], payload);
    }

    fn check_available(&self) -> Result<(), DbError> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            let failing = self
                .inner
                .failing_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if failing.is_ok() {
                return Err(DbError::Unavailable(self.inner.name.clone()));
            }
        }
        Ok(())
    }

    /// Make the next `n` writes fail with [`DbError::Unavailable`].
    #[cfg(test)]
    pub(crate) fn fail_next_writes(&self, n: usize) {
        self.inner
            .failing_writes
            .store(n, std::sync::atomic::Ordering::SeqCst);
    }
}
