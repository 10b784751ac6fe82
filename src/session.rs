use crate::config::CallConfig;
use crate::error::{Result, SignalError};
use crate::logger;
use crate::peer::state::EVENT_CAPACITY;
use crate::peer::{
    CallRecord, MediaSource, PeerConnectionManager, PeerEvent, PeerInput, Role,
    RtcTransportFactory, SessionEvent, SessionState, SessionStatus, TransportFactory,
};
use crate::signaling::{
    CandidateRelay, HangupFeed, RecordFeed, SessionExchange, TeardownCoordinator,
};
use crate::store::DocumentStore;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Всё, что нужно сессии снаружи
#[derive(Clone)]
pub struct CallContext {
    pub config: Arc<CallConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub transports: Arc<dyn TransportFactory>,
    pub media: Arc<dyn MediaSource>,
}

impl CallContext {
    /// Соединения на webrtc-rs. Заодно включает логирование с фильтром
    /// из конфигурации.
    pub fn with_webrtc(
        config: CallConfig,
        store: Arc<dyn DocumentStore>,
        media: Arc<dyn MediaSource>,
    ) -> Self {
        logger::init(&config.log_filter);
        let transports = Arc::new(RtcTransportFactory::new(&config));
        Self {
            config: Arc::new(config),
            store,
            transports,
            media,
        }
    }
}

enum Input {
    Record(Result<Option<CallRecord>>),
    Hangup,
    Peer(PeerInput),
}

/// Звонок с одним собеседником через документ `collection/call_id`.
///
/// Все изменения состояния происходят в `create`/`join`/`hangup` и в
/// `step`/`settle`, которые разбирают события из хранилища и транспорта.
/// После завершения звонка сессия возвращается в `Idle` и готова к новому.
pub struct CallSession {
    call_id: String,
    state: SessionState,
    /// Выставляется на время собственного create/join, чтобы свой offer
    /// не выглядел как входящий звонок
    negotiating: bool,
    record_seen: bool,
    peer: PeerConnectionManager,
    exchange: SessionExchange,
    teardown: TeardownCoordinator,
    record_feed: Option<RecordFeed>,
    hangup_feed: Option<HangupFeed>,
    status_tx: watch::Sender<SessionStatus>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl CallSession {
    pub async fn open(call_id: impl Into<String>, ctx: CallContext) -> Result<Self> {
        ctx.config.validate()?;
        let call_id = call_id.into();
        let collection = ctx.config.collection.as_str();

        let exchange = SessionExchange::new(ctx.store.clone(), collection);
        let relay = CandidateRelay::new(ctx.store.clone(), collection);
        let teardown = TeardownCoordinator::new(ctx.store.clone(), collection);
        let peer = PeerConnectionManager::new(
            ctx.config.clone(),
            ctx.transports.clone(),
            ctx.media.clone(),
            exchange.clone(),
            relay,
        );
        let (status_tx, _) = watch::channel(SessionStatus::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let mut session = Self {
            call_id,
            state: SessionState::Idle,
            negotiating: false,
            record_seen: false,
            peer,
            exchange,
            teardown,
            record_feed: None,
            hangup_feed: None,
            status_tx,
            events_tx,
        };
        session.watch_call().await?;
        tracing::info!("Watching call {}", session.call_id);
        Ok(session)
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.peer.role()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Исходящий звонок: Idle -> Calling
    pub async fn create(&mut self) -> Result<()> {
        self.expect_state("create", &[SessionState::Idle])?;
        self.ensure_watching().await?;
        self.negotiating = true;

        match self.peer.create(&self.call_id).await {
            Ok(_) => {
                self.announce_local_stream();
                self.transition(SessionState::Calling);
                Ok(())
            }
            Err(e @ SignalError::AlreadyExists(_)) => {
                // кто-то уже позвонил в этот документ
                tracing::warn!("Call {} already has an offer: {e}", self.call_id);
                self.negotiating = false;
                self.transition(SessionState::Ringing);
                Err(e)
            }
            Err(e) => {
                self.negotiating = false;
                Err(e)
            }
        }
    }

    /// Ответ на входящий звонок: Ringing -> Calling
    pub async fn join(&mut self) -> Result<()> {
        self.expect_state("join", &[SessionState::Ringing])?;
        self.negotiating = true;

        match self.peer.join(&self.call_id).await {
            Ok(_) => {
                self.announce_local_stream();
                self.transition(SessionState::Calling);
                Ok(())
            }
            Err(e) => {
                self.negotiating = false;
                if matches!(e, SignalError::NotFound(_) | SignalError::AlreadyExists(_)) {
                    // offer исчез или на него уже ответили
                    tracing::warn!("Call {} cannot be joined: {e}", self.call_id);
                    self.transition(SessionState::Idle);
                }
                Err(e)
            }
        }
    }

    /// Завершение звонка этой стороной. Общие документы удаляются,
    /// собеседник узнаёт об этом по своей подписке.
    pub async fn hangup(&mut self) -> Result<()> {
        self.expect_state(
            "hangup",
            &[
                SessionState::Ringing,
                SessionState::Calling,
                SessionState::Connected,
            ],
        )?;
        if self.state != SessionState::Ringing {
            self.transition(SessionState::Ended);
        }

        self.peer.teardown().await;
        self.unwatch_call();
        let deleted = self.teardown.delete_call(&self.call_id).await;
        if let Err(e) = &deleted {
            tracing::warn!("Failed to delete call {}: {e}", self.call_id);
        }
        let reset = self.reset().await;
        deleted.and(reset)
    }

    /// Ждёт одно событие из хранилища или транспорта и применяет его
    pub async fn step(&mut self) -> Result<()> {
        let input = tokio::select! {
            biased;
            record = next_record(&mut self.record_feed) => Input::Record(record),
            () = next_hangup(&mut self.hangup_feed) => Input::Hangup,
            input = self.peer.recv_input() => Input::Peer(input),
        };
        self.apply(input).await
    }

    /// Применяет все уже доступные события, не дожидаясь новых
    pub async fn settle(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Some(input) = self.try_input() {
            self.apply(input).await?;
            applied += 1;
        }
        Ok(applied)
    }

    fn try_input(&mut self) -> Option<Input> {
        if let Some(record) = self.record_feed.as_mut().and_then(RecordFeed::try_next) {
            return Some(Input::Record(record));
        }
        if self
            .hangup_feed
            .as_mut()
            .and_then(HangupFeed::try_next)
            .is_some()
        {
            return Some(Input::Hangup);
        }
        self.peer.try_recv_input().map(Input::Peer)
    }

    async fn apply(&mut self, input: Input) -> Result<()> {
        match input {
            Input::Record(Ok(Some(record))) => self.on_record(record).await,
            Input::Record(Ok(None)) => {
                if self.record_seen && self.state.in_call() {
                    tracing::info!("Call document {} was deleted", self.call_id);
                    self.on_remote_hangup().await;
                }
                Ok(())
            }
            Input::Record(Err(e)) => {
                tracing::warn!("Ignoring malformed call document {}: {e}", self.call_id);
                Ok(())
            }
            Input::Hangup => {
                if self.state.in_call() {
                    tracing::info!("Other side hung up call {}", self.call_id);
                    self.on_remote_hangup().await;
                }
                Ok(())
            }
            Input::Peer(input) => {
                if let Some(PeerEvent::RemoteStreamAvailable) = self.peer.handle_input(input).await? {
                    let _ = self.events_tx.send(SessionEvent::RemoteStreamAvailable);
                    if self.state == SessionState::Calling {
                        self.transition(SessionState::Connected);
                    } else {
                        self.publish_status();
                    }
                }
                Ok(())
            }
        }
    }

    async fn on_record(&mut self, record: CallRecord) -> Result<()> {
        self.record_seen = true;

        if let Some(answer) = record.answer.clone() {
            if self.state == SessionState::Calling
                && self.peer.role() == Some(Role::Caller)
                && self.peer.complete_answer(answer).await?
            {
                self.transition(SessionState::Connected);
            }
        }

        if record.offer.is_some()
            && record.answer.is_none()
            && !self.negotiating
            && self.state == SessionState::Idle
        {
            tracing::info!("Incoming call {}", self.call_id);
            self.transition(SessionState::Ringing);
        }
        Ok(())
    }

    /// Собеседник удалил документы: локальная очистка без удаления общего
    async fn on_remote_hangup(&mut self) {
        self.transition(SessionState::Ended);
        let role = self.peer.role();
        self.peer.teardown().await;
        self.unwatch_call();

        if let Some(role) = role {
            match self.teardown.sweep_candidates(&self.call_id, role).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {n} leftover {role} candidates"),
                Err(e) => tracing::warn!("Failed to sweep {role} candidates: {e}"),
            }
        }
        if let Err(e) = self.reset().await {
            tracing::warn!("Failed to re-watch call {}: {e}", self.call_id);
        }
    }

    /// Ended -> Idle с новыми подписками на документ звонка
    async fn reset(&mut self) -> Result<()> {
        self.negotiating = false;
        self.record_seen = false;
        self.transition(SessionState::Idle);
        self.watch_call().await
    }

    async fn watch_call(&mut self) -> Result<()> {
        let record_feed = self.exchange.subscribe(&self.call_id).await?;
        let hangup_feed = self.teardown.watch_hangup(&self.call_id).await?;
        self.record_feed = Some(record_feed);
        self.hangup_feed = Some(hangup_feed);
        Ok(())
    }

    async fn ensure_watching(&mut self) -> Result<()> {
        if self.record_feed.is_none() || self.hangup_feed.is_none() {
            self.watch_call().await?;
        }
        Ok(())
    }

    /// Старые подписки не должны пережить звонок
    fn unwatch_call(&mut self) {
        self.record_feed = None;
        self.hangup_feed = None;
    }

    fn expect_state(&self, op: &str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SignalError::InvalidState(format!(
                "{op} is not allowed in state {}",
                self.state
            )))
        }
    }

    fn announce_local_stream(&self) {
        if self.peer.local_stream_available() {
            let _ = self.events_tx.send(SessionEvent::LocalStreamAvailable);
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::info!("Call {}: {from} -> {to}", self.call_id);
        let _ = self.events_tx.send(SessionEvent::StateChanged { from, to });
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(SessionStatus {
            state: self.state,
            local_stream_available: self.peer.local_stream_available(),
            remote_stream_available: self.peer.remote_stream_available(),
        });
    }
}

async fn next_record(feed: &mut Option<RecordFeed>) -> Result<Option<CallRecord>> {
    if let Some(feed) = feed {
        if let Some(record) = feed.next().await {
            return record;
        }
    }
    std::future::pending().await
}

async fn next_hangup(feed: &mut Option<HangupFeed>) {
    if let Some(feed) = feed {
        if feed.next().await.is_some() {
            return;
        }
    }
    std::future::pending().await
}
