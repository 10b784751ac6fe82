use crate::config::CallConfig;
use crate::error::{Result, SignalError};
use crate::logger::dump_candidate;
use crate::peer::ice::{CandidateTally, PendingCandidates};
use crate::peer::media::{LocalStream, MediaSource, RemoteStream};
use crate::peer::transport::{Transport, TransportEvent, TransportEvents, TransportFactory};
use crate::peer::types::{Candidate, Role, SdpKind, SessionDescription};
use crate::signaling::{CandidateFeed, CandidateRelay, SessionExchange};
use std::sync::Arc;

/// Входящее событие для активного соединения
#[derive(Debug, Clone, PartialEq)]
pub enum PeerInput {
    Transport(TransportEvent),
    RemoteCandidate(Candidate),
}

/// То, что менеджер соединения сообщает наверх
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    RemoteStreamAvailable,
}

struct ActiveCall {
    call_id: String,
    role: Role,
    transport: Box<dyn Transport>,
    events: TransportEvents,
    remote_candidates: CandidateFeed,
    pending: PendingCandidates,
    tally: CandidateTally,
    local_stream: Option<LocalStream>,
    remote_stream: Option<RemoteStream>,
}

impl ActiveCall {
    /// Trickle: кандидат применяется сразу, либо ждёт remote description
    async fn apply_remote_candidate(&mut self, candidate: Candidate) {
        if !self.transport.has_remote_description().await {
            self.pending.push(candidate);
            return;
        }
        dump_candidate("REMOTE", &candidate);
        if let Err(e) = self.transport.add_candidate(candidate).await {
            tracing::warn!("Failed to add ICE candidate: {e}");
        }
    }

    /// Применяет все отложенные кандидаты после установки remote description
    async fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!("Applying {} pending candidates", self.pending.len());
        }
        while let Some(candidate) = self.pending.pop() {
            dump_candidate("REMOTE", &candidate);
            if let Err(e) = self.transport.add_candidate(candidate).await {
                tracing::warn!("Failed to apply pending candidate: {e}");
            }
        }
    }

    async fn shutdown(self, media: &dyn MediaSource) {
        let ActiveCall {
            call_id,
            role,
            transport,
            remote_candidates,
            local_stream,
            ..
        } = self;
        drop(remote_candidates);
        release(transport.as_ref(), local_stream.as_ref(), media).await;
        tracing::info!("Closed {role} connection for call {call_id}");
    }
}

async fn release(transport: &dyn Transport, stream: Option<&LocalStream>, media: &dyn MediaSource) {
    if let Err(e) = transport.close().await {
        tracing::warn!("Failed to close transport: {e}");
    }
    if let Some(stream) = stream {
        media.release(stream);
    }
}

/// Владелец единственного соединения на звонок: create/join/hangup и
/// доставка кандидатов в обе стороны.
pub struct PeerConnectionManager {
    config: Arc<CallConfig>,
    factory: Arc<dyn TransportFactory>,
    media: Arc<dyn MediaSource>,
    exchange: SessionExchange,
    relay: CandidateRelay,
    active: Option<ActiveCall>,
}

impl PeerConnectionManager {
    pub fn new(
        config: Arc<CallConfig>,
        factory: Arc<dyn TransportFactory>,
        media: Arc<dyn MediaSource>,
        exchange: SessionExchange,
        relay: CandidateRelay,
    ) -> Self {
        Self {
            config,
            factory,
            media,
            exchange,
            relay,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.active.as_ref().map(|c| c.role)
    }

    pub fn call_id(&self) -> Option<&str> {
        self.active.as_ref().map(|c| c.call_id.as_str())
    }

    pub fn local_stream_available(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|c| c.local_stream.is_some())
    }

    pub fn remote_stream_available(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|c| c.remote_stream.is_some())
    }

    /// Сторона A: новое соединение, offer в документ звонка
    pub async fn create(&mut self, call_id: &str) -> Result<Role> {
        let mut call = self.open(call_id, Role::Caller).await?;
        match send_offer(&self.exchange, &mut call).await {
            Ok(()) => {
                self.active = Some(call);
                Ok(Role::Caller)
            }
            Err(e) => {
                tracing::warn!("Offer for call {call_id} failed: {e}");
                call.shutdown(self.media.as_ref()).await;
                Err(e)
            }
        }
    }

    /// Сторона B: читаем offer, публикуем answer
    pub async fn join(&mut self, call_id: &str) -> Result<Role> {
        self.ensure_idle()?;
        let record = self
            .exchange
            .read(call_id)
            .await?
            .ok_or_else(|| SignalError::NotFound(format!("call {call_id}")))?;
        let offer = record
            .offer
            .ok_or_else(|| SignalError::NotFound(format!("offer for call {call_id}")))?;
        if record.answer.is_some() {
            return Err(SignalError::AlreadyExists(format!(
                "answer for call {call_id}"
            )));
        }

        let mut call = self.open(call_id, Role::Callee).await?;
        match send_answer(&self.exchange, &mut call, offer).await {
            Ok(()) => {
                self.active = Some(call);
                Ok(Role::Callee)
            }
            Err(e) => {
                tracing::warn!("Answer for call {call_id} failed: {e}");
                call.shutdown(self.media.as_ref()).await;
                Err(e)
            }
        }
    }

    /// Применяет answer на стороне A. Повторный вызов ничего не делает;
    /// `Ok(true)` только если remote description установлен сейчас.
    pub async fn complete_answer(&mut self, answer: SessionDescription) -> Result<bool> {
        let call = self
            .active
            .as_mut()
            .ok_or_else(|| SignalError::InvalidState("no active call".into()))?;
        if call.role != Role::Caller || answer.kind != SdpKind::Answer {
            return Err(SignalError::InvalidState(format!(
                "{} cannot apply a {:?} description",
                call.role, answer.kind
            )));
        }
        if call.transport.has_remote_description().await {
            tracing::debug!("Remote description already set, ignoring answer");
            return Ok(false);
        }

        call.transport.set_remote_description(answer).await?;
        call.flush_pending().await;
        tracing::info!("Answer applied for call {}", call.call_id);
        Ok(true)
    }

    /// Закрывает соединение и освобождает медиа. Без соединения ничего не делает.
    pub async fn teardown(&mut self) {
        if let Some(call) = self.active.take() {
            call.shutdown(self.media.as_ref()).await;
        }
    }

    /// Ждёт следующее событие транспорта или кандидата собеседника.
    /// Без активного соединения не завершается.
    pub async fn recv_input(&mut self) -> PeerInput {
        let Some(call) = self.active.as_mut() else {
            return std::future::pending().await;
        };
        tokio::select! {
            Some(event) = call.events.recv() => PeerInput::Transport(event),
            Some(candidate) = call.remote_candidates.next() => PeerInput::RemoteCandidate(candidate),
            else => std::future::pending().await,
        }
    }

    pub fn try_recv_input(&mut self) -> Option<PeerInput> {
        let call = self.active.as_mut()?;
        if let Ok(event) = call.events.try_recv() {
            return Some(PeerInput::Transport(event));
        }
        call.remote_candidates
            .try_next()
            .map(PeerInput::RemoteCandidate)
    }

    pub async fn handle_input(&mut self, input: PeerInput) -> Result<Option<PeerEvent>> {
        let Some(call) = self.active.as_mut() else {
            return Ok(None);
        };
        match input {
            PeerInput::Transport(TransportEvent::LocalCandidate(candidate)) => {
                dump_candidate("LOCAL", &candidate);
                call.tally.record(&candidate);
                match self
                    .relay
                    .add_local_candidate(&call.call_id, call.role, &candidate)
                    .await
                {
                    Ok(()) => Ok(None),
                    Err(SignalError::StaleCall(id)) => {
                        tracing::debug!("Dropping local candidate for stale call {id}");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            PeerInput::Transport(TransportEvent::GatheringComplete) => {
                tracing::debug!("ICE candidate gathering completed");
                call.tally.log_summary();
                Ok(None)
            }
            PeerInput::Transport(TransportEvent::RemoteStream(stream)) => {
                if call.remote_stream.is_some() {
                    return Ok(None);
                }
                tracing::info!("Remote stream {} available", stream.id);
                call.remote_stream = Some(stream);
                Ok(Some(PeerEvent::RemoteStreamAvailable))
            }
            PeerInput::RemoteCandidate(candidate) => {
                call.apply_remote_candidate(candidate).await;
                Ok(None)
            }
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match &self.active {
            Some(call) => Err(SignalError::InvalidState(format!(
                "connection for call {} is still open",
                call.call_id
            ))),
            None => Ok(()),
        }
    }

    /// Соединение, локальные медиа и подписка на кандидатов собеседника.
    /// Подписка появляется раньше, чем local description.
    async fn open(&self, call_id: &str, role: Role) -> Result<ActiveCall> {
        self.ensure_idle()?;
        let (transport, events) = self.factory.connect(&self.config.ice_servers).await?;

        let local_stream = match self.media.acquire_local_stream().await {
            Ok(stream) => {
                if let Err(e) = transport.add_stream(&stream).await {
                    release(transport.as_ref(), Some(&stream), self.media.as_ref()).await;
                    return Err(e);
                }
                Some(stream)
            }
            Err(e) => {
                tracing::warn!("Local media unavailable ({e}), continuing receive-only");
                if let Err(e) = transport.add_receive_only().await {
                    release(transport.as_ref(), None, self.media.as_ref()).await;
                    return Err(e);
                }
                None
            }
        };

        let remote_candidates = match self.relay.subscribe_remote_candidates(call_id, role).await {
            Ok(feed) => feed,
            Err(e) => {
                release(transport.as_ref(), local_stream.as_ref(), self.media.as_ref()).await;
                return Err(e);
            }
        };

        tracing::info!("Opened {role} connection for call {call_id}");
        Ok(ActiveCall {
            call_id: call_id.to_string(),
            role,
            transport,
            events,
            remote_candidates,
            pending: PendingCandidates::default(),
            tally: CandidateTally::default(),
            local_stream,
            remote_stream: None,
        })
    }
}

async fn send_offer(exchange: &SessionExchange, call: &mut ActiveCall) -> Result<()> {
    let offer = call.transport.create_offer().await?;
    call.transport.set_local_description(offer.clone()).await?;
    exchange.publish_offer(&call.call_id, &offer).await
}

async fn send_answer(
    exchange: &SessionExchange,
    call: &mut ActiveCall,
    offer: SessionDescription,
) -> Result<()> {
    call.transport.set_remote_description(offer).await?;
    call.flush_pending().await;
    let answer = call.transport.create_answer().await?;
    call.transport.set_local_description(answer.clone()).await?;
    exchange.publish_answer(&call.call_id, &answer).await
}
