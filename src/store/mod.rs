//! Общее изменяемое хранилище документов, через которое идёт сигнализация.
//!
//! Пути устроены как в Firestore: `collection/doc/subcollection/doc`.

pub mod memory;
pub mod subscription;

pub use memory::MemoryStore;
pub use subscription::Subscription;

use crate::error::{Result, SignalError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Содержимое документа: набор полей верхнего уровня
pub type Document = serde_json::Map<String, Value>;

/// Путь к коллекции: нечётное число сегментов
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

/// Путь к документу: чётное число сегментов
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn doc(&self, id: &str) -> DocPath {
        DocPath(format!("{}/{}", self.0, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DocPath {
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, name))
    }

    /// Последний сегмент пути
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Коллекция, в которой лежит документ
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Текущее значение документа; `data == None` если документа нет
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: DocPath,
    pub data: Option<Document>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// Изменение одного документа коллекции
#[derive(Debug, Clone, PartialEq)]
pub struct DocChange {
    pub kind: ChangeKind,
    pub id: String,
    pub data: Document,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>>;

    /// Создание документа; `AlreadyExists`, если он уже есть
    async fn create(&self, path: &DocPath, data: Document) -> Result<()>;

    /// Установить одно поле существующего документа.
    /// `NotFound` без документа, `AlreadyExists` если поле уже задано.
    async fn insert_field(&self, path: &DocPath, field: &str, value: Value) -> Result<()>;

    /// Удаление; отсутствующий документ не ошибка
    async fn delete(&self, path: &DocPath) -> Result<()>;

    /// Добавить документ в коллекцию, вернуть его id
    async fn add(&self, collection: &CollectionPath, data: Document) -> Result<String>;

    /// Документы коллекции в порядке добавления
    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Document)>>;

    /// Подписка на документ; текущее значение приходит сразу
    async fn watch_doc(&self, path: &DocPath) -> Result<Subscription<Snapshot>>;

    /// Подписка на коллекцию; существующие документы приходят первыми как `Added`
    async fn watch_collection(
        &self,
        collection: &CollectionPath,
    ) -> Result<Subscription<Vec<DocChange>>>;
}

pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(SignalError::Encoding(format!(
            "expected an object, got {other}"
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(data: Document) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(data))?)
}
