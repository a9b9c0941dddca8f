use crate::cmd::Request;
use crate::Frame;

use bytes::Bytes;
use std::time::Duration;

/// Устанавливает строковое `value` для `key`.
///
/// Предыдущее значение перезаписывается, независимо от типа (при наличии).
/// Предыдущее время жизни отбрасывается (discard) при успешной операции `SET`.
///
/// # Настройки
///
/// Поддерживаются следующие настройки:
///
/// * PX `milliseconds` - время жизни в миллисекундах.
/// * NX - установка только при отсутствии ключа; так захватывается
///   консультативная блокировка.
#[derive(Debug)]
pub struct Set {
    /// Ключ для поиска
    key: String,

    /// Значение для хранения
    value: Bytes,

    /// Время жизни ключа
    expire: Option<Duration>,

    /// Установка только при отсутствии ключа.
    nx: bool,
}

impl Set {
    /// Создает новую команду `Set`, устанавливающую `value` для `key`.
    ///
    /// Если `expire` является `Some`, значение должно быть удалено по истечение определенного времени.
    pub fn new(key: impl ToString, value: Bytes, expire: Option<Duration>) -> Set {
        Set {
            key: key.to_string(),
            value,
            expire,
            nx: false,
        }
    }

    /// Включает настройку `NX`: значение устанавливается, только если
    /// ключ отсутствует.
    pub fn nx(mut self) -> Set {
        self.nx = true;
        self
    }

    /// Возвращает ключ
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Возвращает значение
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Возвращает время жизни
    pub fn expire(&self) -> Option<Duration> {
        self.expire
    }

    /// Преобразует команду в соответствующий `Frame`.
    ///
    /// Это вызывается клиентом при кодировке команды `Set`
    /// для отправки на сервер
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"SET"));
        frame.push_bulk(Bytes::from(self.key.into_bytes()));
        frame.push_bulk(self.value);
        if let Some(ms) = self.expire {
            // Время жизни в протоколе может быть определено двумя способами:
            // 1. SET key value EX seconds
            // 2. SET key value PX milliseconds
            // Мы выбираем второй вариант, поскольку он предоставляет большую точность
            frame.push_bulk(Bytes::from_static(b"PX"));
            frame.push_bulk(Bytes::from(ms.as_millis().to_string().into_bytes()));
        }
        if self.nx {
            frame.push_bulk(Bytes::from_static(b"NX"));
        }
        frame
    }

    /// Преобразует команду в `Request` для конвейера.
    pub fn into_request(self) -> Request {
        let expire = self.expire;
        let nx = self.nx;

        let mut request = Request::new("SET").key(self.key).arg_bytes(self.value);

        if let Some(ms) = expire {
            request = request.arg("PX").arg(ms.as_millis());
        }

        if nx {
            request = request.arg("NX");
        }

        request
    }
}
