use crate::error::{Result, SignalError};
use crate::peer::types::{Candidate, Role};
use crate::store::{
    from_document, to_document, ChangeKind, CollectionPath, DocChange, DocumentStore,
    Subscription,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Обмен ICE кандидатами через подколлекции `caller`/`callee` документа звонка
#[derive(Clone)]
pub struct CandidateRelay {
    store: Arc<dyn DocumentStore>,
    calls: CollectionPath,
}

impl CandidateRelay {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self {
            store,
            calls: CollectionPath::root(collection),
        }
    }

    pub fn candidates_path(&self, call_id: &str, role: Role) -> CollectionPath {
        self.calls.doc(call_id).collection(role.as_str())
    }

    /// Добавляет локальный кандидат в подколлекцию своей роли.
    /// `StaleCall`, если документа звонка уже нет.
    pub async fn add_local_candidate(
        &self,
        call_id: &str,
        role: Role,
        candidate: &Candidate,
    ) -> Result<()> {
        if self.store.get(&self.calls.doc(call_id)).await?.is_none() {
            return Err(SignalError::StaleCall(call_id.to_string()));
        }
        self.store
            .add(
                &self.candidates_path(call_id, role),
                to_document(candidate)?,
            )
            .await?;
        Ok(())
    }

    /// Подписка на кандидатов собеседника, т.е. на подколлекцию противоположной роли
    pub async fn subscribe_remote_candidates(
        &self,
        call_id: &str,
        local_role: Role,
    ) -> Result<CandidateFeed> {
        let sub = self
            .store
            .watch_collection(&self.candidates_path(call_id, local_role.remote()))
            .await?;
        Ok(CandidateFeed {
            sub,
            seen: HashSet::new(),
            ready: VecDeque::new(),
        })
    }
}

/// Кандидаты собеседника по одному, в порядке добавления.
/// Удаления и изменения записей игнорируются.
pub struct CandidateFeed {
    sub: Subscription<Vec<DocChange>>,
    seen: HashSet<String>,
    ready: VecDeque<Candidate>,
}

impl CandidateFeed {
    pub async fn next(&mut self) -> Option<Candidate> {
        loop {
            if let Some(c) = self.ready.pop_front() {
                return Some(c);
            }
            let changes = self.sub.recv().await?;
            self.ingest(changes);
        }
    }

    pub fn try_next(&mut self) -> Option<Candidate> {
        loop {
            if let Some(c) = self.ready.pop_front() {
                return Some(c);
            }
            let changes = self.sub.try_recv()?;
            self.ingest(changes);
        }
    }

    fn ingest(&mut self, changes: Vec<DocChange>) {
        for change in changes {
            if change.kind != ChangeKind::Added || !self.seen.insert(change.id.clone()) {
                continue;
            }
            match from_document::<Candidate>(change.data) {
                Ok(c) => self.ready.push_back(c),
                Err(e) => tracing::warn!("Skipping malformed candidate {}: {e}", change.id),
            }
        }
    }
}
