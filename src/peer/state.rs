use serde::Serialize;
use std::fmt;

/// Состояние звонка на этой стороне
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    /// Пришёл чужой offer, ждём join или hangup
    Ringing,
    /// Свой offer или answer опубликован
    Calling,
    Connected,
    /// Ресурсы освобождаются; сразу после этого Idle
    Ended,
}

impl SessionState {
    /// Есть ли звонок, который можно завершить
    pub fn in_call(self) -> bool {
        matches!(
            self,
            SessionState::Ringing | SessionState::Calling | SessionState::Connected
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// То, что видит UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub local_stream_available: bool,
    pub remote_stream_available: bool,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            local_stream_available: false,
            remote_stream_available: false,
        }
    }
}

/// Переходы и прочие события сессии
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    LocalStreamAvailable,
    RemoteStreamAvailable,
}

/// Ёмкость канала событий сессии
pub const EVENT_CAPACITY: usize = 64;
