//! Типы ошибок клиентского ядра.
//!
//! Транспортные сбои по возможности устраняются на месте повторным
//! подключением; если восстановление невозможно, они всплывают как
//! `ConnectionClosed`. Ошибки сервера всплывают без изменений, с отдельно
//! выделенным префиксом (`MOVED`, `CROSSSLOT`, `NOAUTH` и др.).

use std::fmt;
use std::io;

/// Ошибка любой операции клиентского ядра.
#[derive(Debug)]
pub enum Error {
    /// Сокет недоступен, а повторные подключения исчерпаны или отключены.
    ConnectionClosed,

    /// Команда, не связанная с pub/sub, выполнена на подписанном соединении,
    /// либо на уже подписанном соединении запрошена вторая подписка.
    SubscribedConnection,

    /// Ключи многоключевой команды принадлежат разным слотам.
    CrossSlot,

    /// Ответ сервера вида `-PREFIX message`.
    Server {
        /// Первое слово сообщения (`ERR`, `MOVED`, `WRONGTYPE` и др.).
        prefix: String,

        /// Полный текст сообщения, включая префикс.
        message: String,
    },

    /// Испорченный или усеченный кадр RESP.
    Decode(String),

    /// Ожидание блокировки истекло.
    LockUnavailable,

    /// Нарушение внутреннего инварианта: операция на отсутствующем сокете.
    InvalidSocket,

    /// Ошибка ввода-вывода за пределами обмена запрос-ответ
    /// (установка соединения, рукопожатие).
    Io(io::Error),
}

impl Error {
    /// Создает `Error::Server` из текста ошибки, отделяя префикс.
    pub(crate) fn server(message: impl Into<String>) -> Error {
        let message = message.into();
        let prefix = message
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();

        Error::Server { prefix, message }
    }

    /// Возвращает префикс ошибки сервера, если это ошибка сервера.
    pub fn server_prefix(&self) -> Option<&str> {
        match self {
            Error::Server { prefix, .. } => Some(prefix),
            _ => None,
        }
    }

    /// `true`, если ошибка вызвана потерей транспорта.
    ///
    /// Движок подписки различает по этому признаку два пути завершения
    /// цикла: после транспортного сбоя соединение остается сломанным,
    /// после остальных ошибок оно переподключается.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::ConnectionClosed | Error::Io(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ConnectionClosed => "Соединение закрыто.".fmt(fmt),
            Error::SubscribedConnection => {
                "Операция недоступна на подписанном соединении.".fmt(fmt)
            }
            Error::CrossSlot => "Ключи команды принадлежат разным слотам.".fmt(fmt),
            Error::Server { message, .. } => write!(fmt, "Ошибка сервера: {}.", message),
            Error::Decode(msg) => write!(fmt, "Ошибка протокола: {}.", msg),
            Error::LockUnavailable => "Блокировка занята.".fmt(fmt),
            Error::InvalidSocket => "Невалидный сокет.".fmt(fmt),
            Error::Io(err) => err.fmt(fmt),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(src: io::Error) -> Error {
        Error::Io(src)
    }
}

impl From<crate::frame::Error> for Error {
    fn from(src: crate::frame::Error) -> Error {
        match src {
            crate::frame::Error::Incomplete => {
                Error::Decode("поток кончился слишком рано".to_string())
            }
            crate::frame::Error::Other(msg) => Error::Decode(msg),
        }
    }
}

impl From<crate::parse::ParseError> for Error {
    fn from(src: crate::parse::ParseError) -> Error {
        Error::Decode(src.to_string())
    }
}
