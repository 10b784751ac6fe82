// Конфигурация приложения
// Логирование можно отключить только в режиме разработки

use crate::error::{Result, SignalError};
use crate::peer::types::ServerConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

/// Дефолтные STUN серверы
pub static DEFAULT_ICE_SERVERS: Lazy<Vec<ServerConfig>> = Lazy::new(|| {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
});

/// Настройки звонка
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CallConfig {
    /// Коллекция, в которой лежат документы звонков
    pub collection: String,
    pub ice_servers: Vec<ServerConfig>,
    pub ice_candidate_pool_size: u8,
    pub log_filter: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            collection: "meet".into(),
            ice_servers: DEFAULT_ICE_SERVERS.clone(),
            ice_candidate_pool_size: 10,
            log_filter: "info".into(),
        }
    }
}

impl CallConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: CallConfig = serde_json::from_str(raw)
            .map_err(|e| SignalError::Config(format!("cannot parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SignalError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Валидация серверов и имени коллекции
    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() || self.collection.contains('/') {
            return Err(SignalError::Config(format!(
                "collection must be a single path segment, got {:?}",
                self.collection
            )));
        }

        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(SignalError::Config("server URL cannot be empty".into()));
            }

            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none())
            {
                return Err(SignalError::Config(format!(
                    "TURN server {} requires username and credential",
                    server.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CallConfig::default();
        assert_eq!(config.collection, "meet");
        assert_eq!(config.ice_servers.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = CallConfig::from_json(r#"{"collection":"calls"}"#).unwrap();
        assert_eq!(config.collection, "calls");
        assert_eq!(config.ice_candidate_pool_size, 10);
        assert_eq!(config.ice_servers.len(), 2);
    }

    #[test]
    fn turn_without_credentials_is_rejected() {
        let raw = r#"{"ice_servers":[{"id":"t","type":"turn","url":"turn.example.org"}]}"#;
        let err = CallConfig::from_json(raw).unwrap_err();
        assert!(matches!(err, SignalError::Config(_)));
    }

    #[test]
    fn nested_collection_is_rejected() {
        let config = CallConfig {
            collection: "a/b".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_is_read_from_file() {
        let path = std::env::temp_dir().join(format!("ssc-call-{}.json", crate::utils::random_id()));
        std::fs::write(&path, r#"{"collection":"rooms","log_filter":"debug"}"#).unwrap();
        let config = CallConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.collection, "rooms");
        assert_eq!(config.log_filter, "debug");

        assert!(matches!(
            CallConfig::from_file(&path),
            Err(SignalError::Config(_))
        ));
    }
}
