use crate::Frame;

use bytes::Bytes;

/// Вид подписки. Варианты различаются только названиями команд и тегами
/// сообщений.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Подписка на каналы (`SUBSCRIBE`).
    Channel,

    /// Подписка по шаблонам (`PSUBSCRIBE`).
    Pattern,

    /// Подписка на шардированные каналы (`SSUBSCRIBE`).
    Shard,
}

impl SubscriptionKind {
    /// Название команды подписки.
    pub(crate) fn subscribe_command(self) -> &'static str {
        match self {
            SubscriptionKind::Channel => "SUBSCRIBE",
            SubscriptionKind::Pattern => "PSUBSCRIBE",
            SubscriptionKind::Shard => "SSUBSCRIBE",
        }
    }

    /// Название команды отписки.
    pub(crate) fn unsubscribe_command(self) -> &'static str {
        match self {
            SubscriptionKind::Channel => "UNSUBSCRIBE",
            SubscriptionKind::Pattern => "PUNSUBSCRIBE",
            SubscriptionKind::Shard => "SUNSUBSCRIBE",
        }
    }

    /// Тег сообщения с данными.
    pub(crate) fn message_tag(self) -> &'static str {
        match self {
            SubscriptionKind::Channel => "message",
            SubscriptionKind::Pattern => "pmessage",
            SubscriptionKind::Shard => "smessage",
        }
    }

    /// Вид подписки по тегу сообщения с данными.
    pub(crate) fn from_message_tag(tag: &str) -> Option<SubscriptionKind> {
        match tag {
            "message" => Some(SubscriptionKind::Channel),
            "pmessage" => Some(SubscriptionKind::Pattern),
            "smessage" => Some(SubscriptionKind::Shard),
            _ => None,
        }
    }

    /// Вид подписки по тегу уведомления об отписке.
    pub(crate) fn from_unsubscribe_tag(tag: &str) -> Option<SubscriptionKind> {
        match tag {
            "unsubscribe" => Some(SubscriptionKind::Channel),
            "punsubscribe" => Some(SubscriptionKind::Pattern),
            "sunsubscribe" => Some(SubscriptionKind::Shard),
            _ => None,
        }
    }
}

/// Подписывает соединение на один или несколько каналов, шаблонов или
/// шардированных каналов, в зависимости от вида.
///
/// Пока подписка активна, соединение может выполнять только команды,
/// связанные с pub/sub.
#[derive(Debug)]
pub struct Subscribe {
    kind: SubscriptionKind,
    names: Vec<String>,
}

/// Отписывает соединение от каналов указанного вида.
///
/// Если каналы не указаны, выполняется отписка от всех каналов этого
/// вида.
#[derive(Clone, Debug)]
pub struct Unsubscribe {
    kind: SubscriptionKind,
    names: Vec<String>,
}

impl Subscribe {
    /// Создает новую команду `Subscribe` указанного вида.
    pub fn new(kind: SubscriptionKind, names: Vec<String>) -> Subscribe {
        Subscribe { kind, names }
    }

    /// Преобразует команду в соответствующий `Frame`.
    ///
    /// Это вызывается клиентом при кодировке команды `Subscribe`
    /// для отправки на сервер
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from(self.kind.subscribe_command().as_bytes()));

        for name in self.names {
            frame.push_bulk(Bytes::from(name.into_bytes()));
        }

        frame
    }
}

impl Unsubscribe {
    /// Создает новую команду `Unsubscribe` указанного вида.
    pub fn new(kind: SubscriptionKind, names: &[String]) -> Unsubscribe {
        Unsubscribe {
            kind,
            names: names.to_vec(),
        }
    }

    /// Преобразует команду в соответствующий `Frame`.
    ///
    /// Это вызывается клиентом при кодировке команды `Unsubscribe`
    /// для отправки на сервер
    pub(crate) fn into_frame(self) -> Frame {
        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from(self.kind.unsubscribe_command().as_bytes()));

        for name in self.names {
            frame.push_bulk(Bytes::from(name.into_bytes()));
        }

        frame
    }
}
