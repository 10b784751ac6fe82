use crate::error::Result;
use crate::peer::types::Role;
use crate::store::{ChangeKind, CollectionPath, DocChange, DocumentStore, Subscription};
use std::sync::Arc;

/// Удаление общих документов звонка и наблюдение за их удалением
#[derive(Clone)]
pub struct TeardownCoordinator {
    store: Arc<dyn DocumentStore>,
    calls: CollectionPath,
}

impl TeardownCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self {
            store,
            calls: CollectionPath::root(collection),
        }
    }

    /// Удаляет кандидатов обеих ролей, затем сам документ звонка.
    /// Уже удалённые документы не считаются ошибкой.
    pub async fn delete_call(&self, call_id: &str) -> Result<()> {
        let mut removed = 0;
        for role in [Role::Caller, Role::Callee] {
            removed += self.sweep_candidates(call_id, role).await?;
        }
        self.store.delete(&self.calls.doc(call_id)).await?;
        tracing::info!("Deleted call {call_id} with {removed} candidates");
        Ok(())
    }

    /// Удаляет оставшихся кандидатов одной роли, возвращает их количество
    pub async fn sweep_candidates(&self, call_id: &str, role: Role) -> Result<usize> {
        let path = self.calls.doc(call_id).collection(role.as_str());
        let entries = self.store.list(&path).await?;
        for (id, _) in &entries {
            self.store.delete(&path.doc(id)).await?;
        }
        Ok(entries.len())
    }

    /// Сигнал о том, что собеседник положил трубку: удаление документов
    /// в подколлекции `callee`.
    pub async fn watch_hangup(&self, call_id: &str) -> Result<HangupFeed> {
        let path = self.calls.doc(call_id).collection(Role::Callee.as_str());
        let sub = self.store.watch_collection(&path).await?;
        Ok(HangupFeed { sub })
    }
}

pub struct HangupFeed {
    sub: Subscription<Vec<DocChange>>,
}

impl HangupFeed {
    /// Ждёт первую пачку изменений, в которой есть удаление
    pub async fn next(&mut self) -> Option<()> {
        loop {
            let changes = self.sub.recv().await?;
            if has_removal(&changes) {
                return Some(());
            }
        }
    }

    pub fn try_next(&mut self) -> Option<()> {
        loop {
            let changes = self.sub.try_recv()?;
            if has_removal(&changes) {
                return Some(());
            }
        }
    }
}

fn has_removal(changes: &[DocChange]) -> bool {
    changes.iter().any(|c| c.kind == ChangeKind::Removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::{Candidate, SessionDescription};
    use crate::signaling::{CandidateRelay, SessionExchange};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn delete_call_removes_everything_and_tolerates_repeat() {
        let store = MemoryStore::new();
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        SessionExchange::new(shared.clone(), "meet")
            .publish_offer("room1", &SessionDescription::offer("O1"))
            .await
            .unwrap();
        let relay = CandidateRelay::new(shared.clone(), "meet");
        for role in [Role::Caller, Role::Callee] {
            for i in 0..2 {
                relay
                    .add_local_candidate("room1", role, &Candidate::new(format!("{role}-{i}")))
                    .await
                    .unwrap();
            }
        }
        assert_eq!(store.count_under("meet/room1"), 5);

        let coordinator = TeardownCoordinator::new(shared, "meet");
        let mut hangup = coordinator.watch_hangup("room1").await.unwrap();
        assert!(hangup.try_next().is_none());

        coordinator.delete_call("room1").await.unwrap();
        assert_eq!(store.count_under("meet/room1"), 0);
        assert_eq!(hangup.try_next(), Some(()));

        coordinator.delete_call("room1").await.unwrap();
    }

    #[tokio::test]
    async fn additions_do_not_signal_hangup() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        SessionExchange::new(store.clone(), "meet")
            .publish_offer("room1", &SessionDescription::offer("O1"))
            .await
            .unwrap();
        let coordinator = TeardownCoordinator::new(store.clone(), "meet");
        let mut hangup = coordinator.watch_hangup("room1").await.unwrap();

        CandidateRelay::new(store, "meet")
            .add_local_candidate("room1", Role::Callee, &Candidate::new("c"))
            .await
            .unwrap();
        assert!(hangup.try_next().is_none());
    }
}
