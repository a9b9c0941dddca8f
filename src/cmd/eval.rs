use crate::cmd::Request;
use crate::Frame;

use bytes::Bytes;

/// Выполняет серверный скрипт.
///
/// Формат команды: `EVAL script numkeys key [key ...] arg [arg ...]`.
/// Менеджер блокировок использует `Eval` для атомарного
/// сравнения-и-удаления при освобождении блокировки.
#[derive(Debug)]
pub struct Eval {
    /// Текст скрипта.
    script: String,

    /// Ключи, передаваемые скрипту как `KEYS`.
    keys: Vec<String>,

    /// Аргументы, передаваемые скрипту как `ARGV`.
    args: Vec<Bytes>,
}

impl Eval {
    /// Создает новую команду `Eval`.
    pub fn new(script: impl ToString, keys: Vec<String>, args: Vec<Bytes>) -> Eval {
        Eval {
            script: script.to_string(),
            keys,
            args,
        }
    }

    /// Возвращает ключи
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Преобразует команду в соответствующий `Frame`.
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"EVAL"));
        frame.push_bulk(Bytes::from(self.script.into_bytes()));
        frame.push_bulk(Bytes::from(self.keys.len().to_string().into_bytes()));

        for key in self.keys {
            frame.push_bulk(Bytes::from(key.into_bytes()));
        }

        for arg in self.args {
            frame.push_bulk(arg);
        }

        frame
    }

    /// Преобразует команду в `Request` для конвейера.
    pub fn into_request(self) -> Request {
        let mut request = Request::new("EVAL")
            .arg(self.script)
            .arg(self.keys.len());

        for key in self.keys {
            request = request.key(key);
        }

        for arg in self.args {
            request = request.arg_bytes(arg);
        }

        request
    }
}
