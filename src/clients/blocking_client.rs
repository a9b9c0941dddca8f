//! Минимальная реализация блокирующего кластерного клиента.
//!
//! Предоставляет блокирующее подключение и методы для обработки поддерживаемых команд.

use crate::subscriber::Message;
use crate::{ConnectParams, Result};

use bytes::Bytes;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Клиент, подключенный к хранилищу блокирующим способом.
///
/// `BlockingClient` оборачивает асинхронный `Client` и выполняет его
/// операции на собственной среде `current_thread`. Соединения
/// устанавливаются с помощью функции `connect`.
///
/// Запросы обрабатываются с помощью разных методов `BlockingClient`.
pub struct BlockingClient {
    /// Асинхронный `Client`.
    inner: crate::clients::Client,

    /// Среда `current_thread` для выполнения операций с помощью
    /// асинхронного `Client` блокирующим способом.
    rt: Runtime,
}

impl BlockingClient {
    /// Устанавливает соединение с хранилищем, находящимся по `addr`
    /// вида `host:port`.
    ///
    /// # Примеры
    ///
    /// ```no_run
    /// use mini_redis_cluster::clients::BlockingClient;
    ///
    /// fn main() {
    ///     let client = match BlockingClient::connect("localhost:6379") {
    ///         Ok(client) => client,
    ///         Err(_) => panic!("Провал установки соединения!"),
    ///     };
    /// # drop(client);
    /// }
    /// ```
    pub fn connect(addr: &str) -> Result<BlockingClient> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let inner = rt.block_on(crate::clients::Client::connect(addr))?;

        Ok(BlockingClient { inner, rt })
    }

    /// Устанавливает соединение с полными параметрами.
    pub fn with_params(params: ConnectParams) -> Result<BlockingClient> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let inner = rt.block_on(crate::clients::Client::with_params(params))?;

        Ok(BlockingClient { inner, rt })
    }

    /// "Пингует" хранилище.
    pub fn ping(&mut self, msg: Option<Bytes>) -> Result<Bytes> {
        self.rt.block_on(self.inner.ping(msg))
    }

    /// Извлекает значение по ключу.
    ///
    /// При отсутствии значения, возвращается `None`.
    pub fn get(&mut self, key: &str) -> Result<Option<Bytes>> {
        self.rt.block_on(self.inner.get(key))
    }

    /// Устанавливает переданное `value` для `key`.
    pub fn set(&mut self, key: &str, value: Bytes) -> Result<()> {
        self.rt.block_on(self.inner.set(key, value))
    }

    /// Устанавливает переданное `value` для `key`. Значение истекает
    /// после `expiration`.
    pub fn set_expires(
        &mut self,
        key: &str,
        value: Bytes,
        expiration: Duration,
    ) -> Result<()> {
        self.rt
            .block_on(self.inner.set_expires(key, value, expiration))
    }

    /// Удаляет ключи. Возвращает количество фактически удаленных.
    pub fn del(&mut self, keys: &[&str]) -> Result<i64> {
        self.rt.block_on(self.inner.del(keys))
    }

    /// Отправляет `message` в определенный `channel`.
    ///
    /// Возвращает количество подписчиков канала.
    pub fn publish(&mut self, channel: &str, message: Bytes) -> Result<i64> {
        self.rt.block_on(self.inner.publish(channel, message))
    }

    /// Подписывает клиента на определенные каналы и блокирует вызывающий
    /// поток в цикле приема до срабатывания `stop` или полной отписки.
    pub fn subscribe<H, P>(&mut self, channels: Vec<String>, handler: H, stop: P) -> Result<()>
    where
        H: FnMut(Message) -> Result<()>,
        P: FnMut(&Message) -> bool,
    {
        self.rt.block_on(self.inner.subscribe(channels, handler, stop))
    }
}
