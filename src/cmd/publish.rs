use crate::cmd::Request;
use crate::Frame;

use bytes::Bytes;

/// Отправляет `message` в определенный `channel`.
///
/// Возвращает количество подписчиков, получивших сообщение.
/// Не гарантируется, что все эти подписчики обработают сообщение,
/// поскольку они могут отключиться в любой момент.
#[derive(Debug)]
pub struct Publish {
    /// Название канала.
    channel: String,

    /// Сообщение.
    message: Bytes,
}

/// Отправляет `message` в шардированный канал.
///
/// Шардированные каналы хешируются как ключи: сообщение обслуживает
/// узел-владелец слота канала.
#[derive(Debug)]
pub struct Spublish {
    /// Название шардированного канала.
    channel: String,

    /// Сообщение.
    message: Bytes,
}

impl Publish {
    /// Создает новую команду `Publish`.
    pub fn new(channel: impl ToString, message: Bytes) -> Publish {
        Publish {
            channel: channel.to_string(),
            message,
        }
    }

    /// Преобразует команду в соответствующий `Frame`.
    ///
    /// Это вызывается клиентом при кодировке команды `Publish`
    /// для отправки на сервер
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"PUBLISH"));
        frame.push_bulk(Bytes::from(self.channel.into_bytes()));
        frame.push_bulk(self.message);
        frame
    }

    /// Преобразует команду в `Request` для конвейера. `PUBLISH` не
    /// привязан к слоту и маршрутизируется на произвольный узел.
    pub fn into_request(self) -> Request {
        Request::new("PUBLISH")
            .wildcard()
            .arg(self.channel)
            .arg_bytes(self.message)
    }
}

impl Spublish {
    /// Создает новую команду `Spublish`.
    pub fn new(channel: impl ToString, message: Bytes) -> Spublish {
        Spublish {
            channel: channel.to_string(),
            message,
        }
    }

    /// Возвращает название канала; по нему вычисляется слот.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Преобразует команду в соответствующий `Frame`.
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"SPUBLISH"));
        frame.push_bulk(Bytes::from(self.channel.into_bytes()));
        frame.push_bulk(self.message);
        frame
    }

    /// Преобразует команду в `Request` для конвейера.
    pub fn into_request(self) -> Request {
        Request::new("SPUBLISH")
            .key(self.channel)
            .arg_bytes(self.message)
    }
}
