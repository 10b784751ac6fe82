use crate::error::Result;
use crate::peer::media::{LocalStream, RemoteStream};
use crate::peer::types::{Candidate, ServerConfig, SessionDescription};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// События транспорта, которые сигнальный слой должен переправить дальше
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Найден новый локальный кандидат (trickle)
    LocalCandidate(Candidate),
    /// Сбор кандидатов завершён
    GatheringComplete,
    RemoteStream(RemoteStream),
}

pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Одно соединение с собеседником
#[async_trait]
pub trait Transport: Send + Sync {
    async fn add_stream(&self, stream: &LocalStream) -> Result<()>;
    /// Без своих медиа: только приём аудио и видео собеседника
    async fn add_receive_only(&self) -> Result<()>;
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    async fn has_remote_description(&self) -> bool;
    async fn add_candidate(&self, candidate: Candidate) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Создание соединений. Обработчики событий регистрируются сразу при
/// создании, поэтому ни один кандидат не теряется.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(
        &self,
        ice_servers: &[ServerConfig],
    ) -> Result<(Box<dyn Transport>, TransportEvents)>;
}
