use crate::cmd::Request;
use crate::Frame;

use bytes::Bytes;

/// Добавляет значения в голову списка. Возвращает длину списка после
/// добавления.
#[derive(Debug)]
pub struct Lpush {
    /// Ключ списка.
    key: String,

    /// Значения для добавления.
    values: Vec<Bytes>,
}

/// Извлекает значение из головы списка.
#[derive(Debug)]
pub struct Lpop {
    /// Ключ списка.
    key: String,
}

/// Извлекает значение из хвоста списка.
#[derive(Debug)]
pub struct Rpop {
    /// Ключ списка.
    key: String,
}

impl Lpush {
    /// Создает новую команду `Lpush`.
    pub fn new(key: impl ToString, values: Vec<Bytes>) -> Lpush {
        Lpush {
            key: key.to_string(),
            values,
        }
    }

    /// Преобразует команду в соответствующий `Frame`.
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"LPUSH"));
        frame.push_bulk(Bytes::from(self.key.into_bytes()));

        for value in self.values {
            frame.push_bulk(value);
        }

        frame
    }

    /// Преобразует команду в `Request` для конвейера.
    pub fn into_request(self) -> Request {
        let mut request = Request::new("LPUSH").key(self.key);

        for value in self.values {
            request = request.arg_bytes(value);
        }

        request
    }
}

impl Lpop {
    /// Создает новую команду `Lpop`.
    pub fn new(key: impl ToString) -> Lpop {
        Lpop {
            key: key.to_string(),
        }
    }

    /// Преобразует команду в соответствующий `Frame`.
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"LPOP"));
        frame.push_bulk(Bytes::from(self.key.into_bytes()));
        frame
    }

    /// Преобразует команду в `Request` для конвейера.
    pub fn into_request(self) -> Request {
        Request::new("LPOP").key(self.key)
    }
}

impl Rpop {
    /// Создает новую команду `Rpop`.
    pub fn new(key: impl ToString) -> Rpop {
        Rpop {
            key: key.to_string(),
        }
    }

    /// Преобразует команду в соответствующий `Frame`.
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"RPOP"));
        frame.push_bulk(Bytes::from(self.key.into_bytes()));
        frame
    }

    /// Преобразует команду в `Request` для конвейера.
    pub fn into_request(self) -> Request {
        Request::new("RPOP").key(self.key)
    }
}
