use super::{
    ChangeKind, CollectionPath, DocChange, DocPath, Document, DocumentStore, Snapshot, Subscription,
};
use crate::error::{Result, SignalError};
use crate::utils::random_id;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

struct Entry {
    seq: u64,
    data: Document,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Entry>,
    next_seq: u64,
    next_watch: u64,
    doc_watchers: HashMap<u64, (DocPath, mpsc::UnboundedSender<Snapshot>)>,
    coll_watchers: HashMap<u64, (CollectionPath, mpsc::UnboundedSender<Vec<DocChange>>)>,
    unavailable: bool,
}

impl Inner {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            Err(SignalError::Unavailable("memory store is offline".into()))
        } else {
            Ok(())
        }
    }

    /// Документы коллекции в порядке создания
    fn children(&self, collection: &CollectionPath) -> Vec<(String, Document)> {
        let prefix = format!("{}/", collection.as_str());
        let mut found: Vec<(u64, String, Document)> = self
            .docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .map(|(path, entry)| {
                (
                    entry.seq,
                    path[prefix.len()..].to_string(),
                    entry.data.clone(),
                )
            })
            .collect();
        found.sort_by_key(|(seq, _, _)| *seq);
        found.into_iter().map(|(_, id, data)| (id, data)).collect()
    }

    fn write(&mut self, path: &DocPath, data: Document) {
        let kind = match self.docs.get_mut(path.as_str()) {
            Some(entry) => {
                entry.data = data.clone();
                ChangeKind::Modified
            }
            None => {
                self.next_seq += 1;
                self.docs.insert(
                    path.as_str().to_string(),
                    Entry {
                        seq: self.next_seq,
                        data: data.clone(),
                    },
                );
                ChangeKind::Added
            }
        };
        self.notify(path, Some(data.clone()), data, kind);
    }

    /// `current` уходит подписчикам документа, `changed` подписчикам коллекции
    fn notify(
        &mut self,
        path: &DocPath,
        current: Option<Document>,
        changed: Document,
        kind: ChangeKind,
    ) {
        self.doc_watchers.retain(|_, (watched, tx)| {
            if watched != path {
                return true;
            }
            tx.send(Snapshot {
                path: path.clone(),
                data: current.clone(),
            })
            .is_ok()
        });

        let parent = path.parent();
        let change = DocChange {
            kind,
            id: path.id().to_string(),
            data: changed,
        };
        self.coll_watchers.retain(|_, (watched, tx)| {
            if *watched != parent {
                return true;
            }
            tx.send(vec![change.clone()]).is_ok()
        });
    }
}

/// Хранилище документов в памяти процесса.
///
/// Клоны разделяют одно состояние, так что две стороны звонка в одном
/// процессе видят одни и те же документы.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Эмуляция недоступности сети
    pub fn set_available(&self, available: bool) {
        self.inner.lock().unavailable = !available;
    }

    /// Количество активных подписок
    pub fn watcher_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.doc_watchers.len() + inner.coll_watchers.len()
    }

    /// Количество документов под префиксом пути
    pub fn count_under(&self, prefix: &str) -> usize {
        let inner = self.inner.lock();
        inner
            .docs
            .keys()
            .filter(|path| path.as_str() == prefix || path.starts_with(&format!("{prefix}/")))
            .count()
    }

    fn unwatch_doc(inner: &Weak<Mutex<Inner>>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            inner.lock().doc_watchers.remove(&id);
        }
    }

    fn unwatch_collection(inner: &Weak<Mutex<Inner>>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            inner.lock().coll_watchers.remove(&id);
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        let inner = self.inner.lock();
        inner.check_available()?;
        Ok(inner.docs.get(path.as_str()).map(|e| e.data.clone()))
    }

    async fn create(&self, path: &DocPath, data: Document) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        if inner.docs.contains_key(path.as_str()) {
            return Err(SignalError::AlreadyExists(path.to_string()));
        }
        inner.write(path, data);
        Ok(())
    }

    async fn insert_field(&self, path: &DocPath, field: &str, value: Value) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        let mut data = match inner.docs.get(path.as_str()) {
            Some(entry) => entry.data.clone(),
            None => return Err(SignalError::NotFound(path.to_string())),
        };
        if data.contains_key(field) {
            return Err(SignalError::AlreadyExists(format!("{path}.{field}")));
        }
        data.insert(field.to_string(), value);
        inner.write(path, data);
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        if let Some(entry) = inner.docs.remove(path.as_str()) {
            inner.notify(path, None, entry.data, ChangeKind::Removed);
        }
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, data: Document) -> Result<String> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        let id = loop {
            let id = random_id();
            if !inner.docs.contains_key(collection.doc(&id).as_str()) {
                break id;
            }
        };
        inner.write(&collection.doc(&id), data);
        Ok(id)
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Document)>> {
        let inner = self.inner.lock();
        inner.check_available()?;
        Ok(inner.children(collection))
    }

    async fn watch_doc(&self, path: &DocPath) -> Result<Subscription<Snapshot>> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Snapshot {
            path: path.clone(),
            data: inner.docs.get(path.as_str()).map(|e| e.data.clone()),
        });

        inner.next_watch += 1;
        let id = inner.next_watch;
        inner.doc_watchers.insert(id, (path.clone(), tx));

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || Self::unwatch_doc(&weak, id)))
    }

    async fn watch_collection(
        &self,
        collection: &CollectionPath,
    ) -> Result<Subscription<Vec<DocChange>>> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let existing: Vec<DocChange> = inner
            .children(collection)
            .into_iter()
            .map(|(id, data)| DocChange {
                kind: ChangeKind::Added,
                id,
                data,
            })
            .collect();
        if !existing.is_empty() {
            let _ = tx.send(existing);
        }

        inner.next_watch += 1;
        let id = inner.next_watch;
        inner.coll_watchers.insert(id, (collection.clone(), tx));

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || {
            Self::unwatch_collection(&weak, id)
        }))
    }
}
