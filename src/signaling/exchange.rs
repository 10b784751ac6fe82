use crate::error::{Result, SignalError};
use crate::peer::types::{CallRecord, SdpKind, SessionDescription};
use crate::store::{
    from_document, to_document, CollectionPath, DocPath, DocumentStore, Snapshot, Subscription,
};
use std::sync::Arc;

/// Публикация и чтение offer/answer для звонка
#[derive(Clone)]
pub struct SessionExchange {
    store: Arc<dyn DocumentStore>,
    calls: CollectionPath,
}

impl SessionExchange {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self {
            store,
            calls: CollectionPath::root(collection),
        }
    }

    pub fn record_path(&self, call_id: &str) -> DocPath {
        self.calls.doc(call_id)
    }

    /// Создаёт документ звонка с offer. Существующий документ не перезаписывается.
    pub async fn publish_offer(&self, call_id: &str, offer: &SessionDescription) -> Result<()> {
        expect_kind(offer, SdpKind::Offer)?;
        let record = CallRecord {
            offer: Some(offer.clone()),
            answer: None,
        };
        self.store
            .create(&self.record_path(call_id), to_document(&record)?)
            .await?;
        tracing::info!("Published offer for call {call_id}");
        Ok(())
    }

    /// Дописывает answer в существующий документ звонка
    pub async fn publish_answer(&self, call_id: &str, answer: &SessionDescription) -> Result<()> {
        expect_kind(answer, SdpKind::Answer)?;
        self.store
            .insert_field(
                &self.record_path(call_id),
                "answer",
                serde_json::to_value(answer)?,
            )
            .await?;
        tracing::info!("Published answer for call {call_id}");
        Ok(())
    }

    pub async fn read(&self, call_id: &str) -> Result<Option<CallRecord>> {
        match self.store.get(&self.record_path(call_id)).await? {
            Some(data) => Ok(Some(from_document(data)?)),
            None => Ok(None),
        }
    }

    pub async fn subscribe(&self, call_id: &str) -> Result<RecordFeed> {
        let sub = self.store.watch_doc(&self.record_path(call_id)).await?;
        Ok(RecordFeed { sub })
    }
}

fn expect_kind(desc: &SessionDescription, kind: SdpKind) -> Result<()> {
    if desc.kind != kind {
        return Err(SignalError::InvalidState(format!(
            "expected {kind:?} description, got {:?}",
            desc.kind
        )));
    }
    Ok(())
}

/// Поток значений документа звонка. `Ok(None)` значит, что документа нет.
pub struct RecordFeed {
    sub: Subscription<Snapshot>,
}

impl RecordFeed {
    pub async fn next(&mut self) -> Option<Result<Option<CallRecord>>> {
        self.sub.recv().await.map(decode)
    }

    pub fn try_next(&mut self) -> Option<Result<Option<CallRecord>>> {
        self.sub.try_recv().map(decode)
    }
}

fn decode(snapshot: Snapshot) -> Result<Option<CallRecord>> {
    snapshot.data.map(from_document).transpose()
}
