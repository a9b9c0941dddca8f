//! Ядро кластерного клиента `Redis`-совместимого хранилища.
//!
//! Крейт покрывает все, что лежит между пользовательскими помощниками
//! команд и сырым потоком байтов: кодек `RESP`, соединения с
//! автоматическим переподключением, маршрутизацию по хеш-слотам,
//! конвейеризацию с сохранением пользовательского порядка, движок
//! подписки и распределенные консультативные блокировки.
//!
//! Крейт написан в учебных целях как более крупный пример идиоматичного
//! приложения `Tokio`: предпочтение отдается ясности, а не полноте
//! каталога команд.

pub mod clients;

pub mod cmd;
pub use cmd::{Request, SubscriptionKind};

mod connection;
pub use connection::{ConnectParams, Connection, Liveness, RetryPolicy, SubscriptionSets, TlsSettings};

mod error;
pub use error::Error;

mod frame;
pub use frame::Error as FrameError;
pub use frame::Frame;

mod lock;
pub use lock::LockManager;

mod parse;

mod pipeline;
pub use pipeline::Pipeline;

mod router;
pub use router::Role;

mod slot;
pub use slot::{hash_slot, SLOT_COUNT};

pub mod subscriber;
pub use subscriber::Message;

mod topology;

/// Порт по умолчанию.
pub const DEFAULT_PORT: u16 = 6379;

/// Специализированный `Result` для операций клиентского ядра.
///
/// Определяется для удобства.
pub type Result<T> = std::result::Result<T, Error>;
