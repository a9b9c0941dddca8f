use crate::cmd::Request;
use crate::Frame;

use bytes::Bytes;

/// Возвращает `PONG` при отсутствии аргумента, иначе — копию аргумента
/// в виде объемной строки.
///
/// Эта команда часто используется для тестирования того, что соединение
/// живо, а также для измерения задержки.
#[derive(Debug)]
pub struct Ping {
    /// Опциональное сообщение.
    msg: Option<Bytes>,
}

impl Ping {
    /// Создает новую команду `Ping` с опциональным `msg`.
    pub fn new(msg: Option<Bytes>) -> Ping {
        Ping { msg }
    }

    /// Преобразует команду в соответствующий `Frame`.
    ///
    /// Это вызывается клиентом при кодировке команды `Ping`
    /// для отправки на сервер
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"PING"));

        if let Some(msg) = self.msg {
            frame.push_bulk(msg);
        }

        frame
    }

    /// Преобразует команду в `Request` для конвейера. `PING` не имеет
    /// ключей и маршрутизируется на произвольный узел.
    pub fn into_request(self) -> Request {
        let mut request = Request::new("PING").readonly().wildcard();

        if let Some(msg) = self.msg {
            request = request.arg_bytes(msg);
        }

        request
    }
}
