use crate::cmd::Request;
use crate::Frame;

use bytes::Bytes;

/// Извлекает значение по ключу.
///
/// При отсутствии значения, возвращается специальное значение `nil`. Ошибка
/// возвращается, если значение не является строкой, поскольку `GET`
/// работает только со строками
#[derive(Debug)]
pub struct Get {
    /// Названия ключа для получения
    key: String,
}

impl Get {
    /// Создает новую команду `Get`, которая запрашивает `key`
    pub fn new(key: impl ToString) -> Get {
        Get {
            key: key.to_string(),
        }
    }

    /// Возвращает ключ
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Преобразует команду в соответствующий `Frame`.
    ///
    /// Это вызывается клиентом при кодировке команды `Get`
    /// для отправки на сервер
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"GET"));
        frame.push_bulk(Bytes::from(self.key.into_bytes()));
        frame
    }

    /// Преобразует команду в `Request` для конвейера.
    pub fn into_request(self) -> Request {
        Request::new("GET").key(self.key).readonly()
    }
}
