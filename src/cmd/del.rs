use crate::cmd::Request;
use crate::Frame;

use bytes::Bytes;

/// Удаляет один или несколько ключей.
///
/// Возвращает количество фактически удаленных ключей. В кластерном режиме
/// все ключи должны принадлежать одному слоту.
#[derive(Debug)]
pub struct Del {
    /// Ключи для удаления.
    keys: Vec<String>,
}

/// Проверяет существование ключа.
#[derive(Debug)]
pub struct Exists {
    /// Ключ для проверки.
    key: String,
}

impl Del {
    /// Создает новую команду `Del` для указанных `keys`.
    pub fn new(keys: Vec<String>) -> Del {
        Del { keys }
    }

    /// Возвращает ключи
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Преобразует команду в соответствующий `Frame`.
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"DEL"));

        for key in self.keys {
            frame.push_bulk(Bytes::from(key.into_bytes()));
        }

        frame
    }

    /// Преобразует команду в `Request` для конвейера.
    pub fn into_request(self) -> Request {
        let mut request = Request::new("DEL");

        for key in self.keys {
            request = request.key(key);
        }

        request
    }
}

impl Exists {
    /// Создает новую команду `Exists` для `key`.
    pub fn new(key: impl ToString) -> Exists {
        Exists {
            key: key.to_string(),
        }
    }

    /// Преобразует команду в соответствующий `Frame`.
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"EXISTS"));
        frame.push_bulk(Bytes::from(self.key.into_bytes()));
        frame
    }

    /// Преобразует команду в `Request` для конвейера.
    pub fn into_request(self) -> Request {
        Request::new("EXISTS").key(self.key).readonly()
    }
}
