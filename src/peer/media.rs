use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MediaError {
    #[error("media permission denied")]
    PermissionDenied,
    #[error("no capture device")]
    NoDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// Локальный поток с камеры/микрофона
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStream {
    pub id: String,
    pub tracks: Vec<LocalTrack>,
}

/// Поток собеседника, о котором сообщил транспорт
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
}

/// Захват локального аудио/видео
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire_local_stream(&self) -> Result<LocalStream, MediaError>;

    /// Останавливает все треки потока и освобождает устройства
    fn release(&self, stream: &LocalStream);
}

/// Источник без устройств: звонок идёт только на приём
pub struct NoMedia;

#[async_trait]
impl MediaSource for NoMedia {
    async fn acquire_local_stream(&self) -> Result<LocalStream, MediaError> {
        Err(MediaError::NoDevice)
    }

    fn release(&self, _stream: &LocalStream) {}
}
