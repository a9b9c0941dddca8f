mod del;
pub use del::{Del, Exists};

mod eval;
pub use eval::Eval;

mod get;
pub use get::Get;

mod list;
pub use list::{Lpop, Lpush, Rpop};

mod ping;
pub use ping::Ping;

mod publish;
pub use publish::{Publish, Spublish};

mod set;
pub use set::Set;

mod subscribe;
pub use subscribe::{Subscribe, SubscriptionKind, Unsubscribe};

use crate::Frame;

use bytes::Bytes;

/// Произвольная команда с метаданными маршрутизации.
///
/// Структуры команд покрывают частые случаи; `Request` позволяет собрать
/// любую команду, пометив аргументы-ключи для маршрутизатора. Конвейер
/// принимает именно `Request`, поскольку каждая его сущность маршрутизируется
/// независимо.
///
/// Названия команд всегда отправляются в верхнем регистре.
#[derive(Debug)]
pub struct Request {
    /// Название команды в верхнем регистре.
    name: String,

    /// Аргументы, включая название команды первым.
    parts: Vec<Bytes>,

    /// Аргументы, классифицированные как ключи.
    keys: Vec<Bytes>,

    /// `false` для команд только для чтения.
    write: bool,
}

impl Request {
    /// Создает запрос команды `name` без аргументов.
    pub fn new(name: impl AsRef<str>) -> Request {
        let name = name.as_ref().to_uppercase();

        Request {
            parts: vec![Bytes::from(name.clone().into_bytes())],
            name,
            keys: vec![],
            write: true,
        }
    }

    /// Добавляет аргумент. Нестроковые аргументы передаются в десятичном
    /// текстовом виде.
    pub fn arg(mut self, arg: impl ToString) -> Request {
        self.parts.push(Bytes::from(arg.to_string().into_bytes()));
        self
    }

    /// Добавляет аргумент в виде сырых байтов.
    pub fn arg_bytes(mut self, arg: Bytes) -> Request {
        self.parts.push(arg);
        self
    }

    /// Добавляет аргумент, участвующий в маршрутизации как ключ.
    pub fn key(mut self, key: impl ToString) -> Request {
        let key = Bytes::from(key.to_string().into_bytes());
        self.parts.push(key.clone());
        self.keys.push(key);
        self
    }

    /// Помечает команду как команду только для чтения.
    pub fn readonly(mut self) -> Request {
        self.write = false;
        self
    }

    /// Помечает команду как общекластерную: маршрутизатор выбирает
    /// произвольный узел вместо вычисления слота.
    pub fn wildcard(mut self) -> Request {
        self.keys = vec![Bytes::from_static(b"*")];
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_write(&self) -> bool {
        self.write
    }

    pub(crate) fn keys(&self) -> &[Bytes] {
        &self.keys
    }

    /// Преобразует запрос в кадр для отправки на сервер.
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();

        for part in self.parts {
            frame.push_bulk(part);
        }

        frame
    }
}
