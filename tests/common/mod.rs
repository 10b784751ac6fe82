#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use ssc_call::store::{CollectionPath, DocChange, DocPath, Document, Snapshot, Subscription};
use ssc_call::{
    CallConfig, CallContext, CallSession, Candidate, DocumentStore, LocalStream, LocalTrack,
    MediaError, MediaSource, MemoryStore, RemoteStream, Result, SessionDescription,
    SessionEvent, SignalError, TrackKind, Transport, TransportEvent, TransportEvents,
    TransportFactory,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

pub fn host_candidate(side: &str, i: usize) -> Candidate {
    Candidate::new(format!(
        "candidate:{side}{i} 1 udp 2122260223 10.0.0.{i} 5000{i} typ host"
    ))
}

/// Что произошло с одним фейковым соединением
#[derive(Debug, Default)]
pub struct TransportLog {
    pub local: Option<SessionDescription>,
    pub remote: Option<SessionDescription>,
    pub remote_sets: usize,
    pub applied: Vec<Candidate>,
    pub streams_added: usize,
    pub receive_only: bool,
    pub closed: bool,
}

/// Соединение без сети: выдаёт заданные SDP и кандидатов
pub struct FakeFactory {
    offer: String,
    answer: String,
    candidates: Vec<Candidate>,
    fail_connect: AtomicBool,
    logs: Mutex<Vec<Arc<Mutex<TransportLog>>>>,
}

impl FakeFactory {
    pub fn new(offer: &str, answer: &str) -> Self {
        Self {
            offer: offer.to_string(),
            answer: answer.to_string(),
            candidates: Vec::new(),
            fail_connect: AtomicBool::new(false),
            logs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.logs.lock().len()
    }

    /// Журнал последнего созданного соединения
    pub fn last(&self) -> Arc<Mutex<TransportLog>> {
        self.logs
            .lock()
            .last()
            .cloned()
            .expect("no transport was created")
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn connect(&self, _servers: &[ssc_call::ServerConfig]) -> Result<(Box<dyn Transport>, TransportEvents)> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SignalError::Transport("connect refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(TransportLog::default()));
        self.logs.lock().push(log.clone());
        let transport = FakeTransport {
            offer: self.offer.clone(),
            answer: self.answer.clone(),
            candidates: self.candidates.clone(),
            log,
            events: tx,
        };
        Ok((Box::new(transport), rx))
    }
}

struct FakeTransport {
    offer: String,
    answer: String,
    candidates: Vec<Candidate>,
    log: Arc<Mutex<TransportLog>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl FakeTransport {
    /// Поток собеседника появляется, когда заданы оба описания и в SDP
    /// есть медиа-секции (свои треки или приём без них).
    /// Два трека одного потока, как у настоящего соединения.
    fn maybe_remote_stream(&self, log: &TransportLog) {
        let has_media = log.streams_added > 0 || log.receive_only;
        if has_media && log.local.is_some() && log.remote.is_some() {
            for _ in 0..2 {
                let _ = self.events.send(TransportEvent::RemoteStream(RemoteStream {
                    id: "remote".into(),
                }));
            }
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn add_stream(&self, _stream: &LocalStream) -> Result<()> {
        self.log.lock().streams_added += 1;
        Ok(())
    }

    async fn add_receive_only(&self) -> Result<()> {
        self.log.lock().receive_only = true;
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer(self.offer.clone()))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::answer(self.answer.clone()))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let mut log = self.log.lock();
        log.local = Some(desc);
        for candidate in &self.candidates {
            let _ = self
                .events
                .send(TransportEvent::LocalCandidate(candidate.clone()));
        }
        let _ = self.events.send(TransportEvent::GatheringComplete);
        self.maybe_remote_stream(&log);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let mut log = self.log.lock();
        if log.closed {
            return Err(SignalError::Transport("closed".into()));
        }
        log.remote = Some(desc);
        log.remote_sets += 1;
        self.maybe_remote_stream(&log);
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.log.lock().remote.is_some()
    }

    async fn add_candidate(&self, candidate: Candidate) -> Result<()> {
        let mut log = self.log.lock();
        if log.remote.is_none() {
            return Err(SignalError::Transport("remote description not set".into()));
        }
        log.applied.push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.lock().closed = true;
        Ok(())
    }
}

/// Камера с микрофоном, либо отказ в доступе
#[derive(Default)]
pub struct FakeMedia {
    deny: bool,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl FakeMedia {
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Default::default()
        }
    }

    pub fn held(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn acquire_local_stream(&self) -> std::result::Result<LocalStream, MediaError> {
        if self.deny {
            return Err(MediaError::PermissionDenied);
        }
        let n = self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(LocalStream {
            id: format!("local-{n}"),
            tracks: vec![
                LocalTrack {
                    id: "mic".into(),
                    kind: TrackKind::Audio,
                },
                LocalTrack {
                    id: "cam".into(),
                    kind: TrackKind::Video,
                },
            ],
        })
    }

    fn release(&self, _stream: &LocalStream) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Обёртка над MemoryStore: считает удаления и умеет отказывать в create
pub struct CountingStore {
    pub inner: MemoryStore,
    deletes: AtomicUsize,
    fail_create: AtomicBool,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            deletes: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        self.inner.get(path).await
    }

    async fn create(&self, path: &DocPath, data: Document) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SignalError::Unavailable("create rejected".into()));
        }
        self.inner.create(path, data).await
    }

    async fn insert_field(&self, path: &DocPath, field: &str, value: Value) -> Result<()> {
        self.inner.insert_field(path, field, value).await
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(path).await
    }

    async fn add(&self, collection: &CollectionPath, data: Document) -> Result<String> {
        self.inner.add(collection, data).await
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Document)>> {
        self.inner.list(collection).await
    }

    async fn watch_doc(&self, path: &DocPath) -> Result<Subscription<Snapshot>> {
        self.inner.watch_doc(path).await
    }

    async fn watch_collection(
        &self,
        collection: &CollectionPath,
    ) -> Result<Subscription<Vec<DocChange>>> {
        self.inner.watch_collection(collection).await
    }
}

/// Одна сторона звонка со всеми фейками
pub struct Side {
    pub session: CallSession,
    pub factory: Arc<FakeFactory>,
    pub media: Arc<FakeMedia>,
    pub store: Arc<CountingStore>,
    pub events: broadcast::Receiver<SessionEvent>,
}

impl Side {
    pub async fn open(
        call_id: &str,
        shared: &MemoryStore,
        factory: FakeFactory,
        media: FakeMedia,
    ) -> Self {
        let factory = Arc::new(factory);
        let media = Arc::new(media);
        let store = Arc::new(CountingStore::new(shared.clone()));
        let ctx = CallContext {
            config: Arc::new(CallConfig::default()),
            store: store.clone(),
            transports: factory.clone(),
            media: media.clone(),
        };
        let session = CallSession::open(call_id, ctx).await.unwrap();
        let events = session.subscribe_events();
        Self {
            session,
            factory,
            media,
            store,
            events,
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

/// Гоняет обе стороны, пока события не закончатся
pub async fn settle_pair(a: &mut CallSession, b: &mut CallSession) {
    for _ in 0..64 {
        let applied = a.settle().await.unwrap() + b.settle().await.unwrap();
        if applied == 0 {
            return;
        }
    }
    panic!("sessions did not settle");
}
