//! Минимальная реализация кластерного клиента `Redis`-совместимого
//! хранилища.
//!
//! Предоставляет асинхронное подключение с обнаружением топологии и
//! методы для обработки поддерживаемых команд. Команды маршрутизируются
//! по хеш-слотам ключей; в одиночном режиме кандидат один, но проверка
//! согласованности слотов выполняется так же.

use crate::cmd::{
    Del, Eval, Exists, Get, Lpop, Lpush, Ping, Publish, Rpop, Set, Spublish, SubscriptionKind,
};
use crate::connection::{ConnectParams, Connection};
use crate::lock::LockManager;
use crate::pipeline::Pipeline;
use crate::router::Router;
use crate::subscriber::{self, Message};
use crate::topology;
use crate::{Error, Frame, Result};

use async_stream::try_stream;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::Stream;
use tracing::{debug, instrument};

/// Клиент, подключенный к `Redis`-совместимому хранилищу.
///
/// При подключении клиент обнаруживает топологию: одиночный экземпляр
/// или кластер. В кластерном режиме открывается соединение на каждый
/// узел, и каждая команда маршрутизируется на узел-владелец слота ее
/// ключей. Обработчик клиента дешево клонируется и свободно разделяется
/// между задачами: единственное общее мутабельное состояние — соединения,
/// каждое под собственным мьютексом.
///
/// Запросы обрабатываются с помощью разных методов `Client`.
#[derive(Clone)]
pub struct Client {
    /// Параметры затравочного подключения.
    params: ConnectParams,

    /// Маршрутизатор под `RwLock`: читается на каждой команде,
    /// атомарно подменяется при обновлении топологии.
    router: Arc<RwLock<Router>>,
}

impl Client {
    /// Устанавливает соединение с хранилищем, находящимся по `addr`
    /// вида `host:port`.
    ///
    /// # Примеры
    ///
    /// ```no_run
    /// use mini_redis_cluster::clients::Client;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = match Client::connect("localhost:6379").await {
    ///         Ok(client) => client,
    ///         Err(_) => panic!("Невозможно установить соединение!"),
    ///     };
    /// # drop(client);
    /// }
    /// ```
    pub async fn connect(addr: &str) -> Result<Client> {
        let (host, port) = split_addr(addr)?;
        Client::with_params(ConnectParams::new(host, port)).await
    }

    /// Устанавливает соединение с полными параметрами: база, учетные
    /// данные, TLS, политика повторов, keepalive.
    pub async fn with_params(params: ConnectParams) -> Result<Client> {
        let router = topology::discover(&params).await?;

        Ok(Client {
            params,
            router: Arc::new(RwLock::new(router)),
        })
    }

    /// Заново обнаруживает топологию и атомарно подменяет маршрутизатор
    /// и карту слотов.
    #[instrument(skip(self))]
    pub async fn refresh_topology(&self) -> Result<()> {
        let router = topology::discover(&self.params).await?;

        *self.router.write().await = router;
        debug!("топология обновлена");

        Ok(())
    }

    /// `true`, если удаленная сторона — кластер.
    pub async fn is_cluster(&self) -> bool {
        self.router.read().await.is_cluster()
    }

    /// Количество известных узлов.
    pub async fn node_count(&self) -> usize {
        self.router.read().await.for_each_node().len()
    }

    /// "Пингует" хранилище.
    ///
    /// При отсутствии аргументов, возвращается "PONG",
    /// иначе, возвращается копия аргументов в виде группы (bulk).
    ///
    /// Эта команда часто используется для тестирования того, что
    /// соединение открыто, а также для измерения задержки.
    #[instrument(skip(self))]
    pub async fn ping(&self, msg: Option<Bytes>) -> Result<Bytes> {
        let frame = Ping::new(msg).into_frame();
        debug!(request = ?frame);

        match self.execute(&[], false, false, frame).await? {
            Frame::Simple(value) => Ok(value.into()),
            Frame::Bulk(value) => Ok(value),
            frame => Err(frame.to_error()),
        }
    }

    /// Извлекает значение по ключу.
    ///
    /// При отсутствии значения, возвращается `None`.
    ///
    /// # Примеры
    ///
    /// ```no_run
    /// use mini_redis_cluster::clients::Client;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::connect("localhost:6379").await.unwrap();
    ///
    ///     let val = client.get("foo").await.unwrap();
    ///     println!("{:?}", val);
    /// }
    /// ```
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let frame = Get::new(key).into_frame();
        debug!(request = ?frame);

        self.read_value(self.execute(&[key.as_bytes()], false, false, frame).await?)
    }

    /// Извлекает значение по ключу со случайной реплики слота.
    ///
    /// Перед первым чтением на соединении реплики один раз выполняется
    /// `READONLY`. При отсутствии реплик чтение выполняется с праймари.
    #[instrument(skip(self))]
    pub async fn get_from_replica(&self, key: &str) -> Result<Option<Bytes>> {
        let frame = Get::new(key).into_frame();
        debug!(request = ?frame);

        self.read_value(self.execute(&[key.as_bytes()], false, true, frame).await?)
    }

    /// Устанавливает переданное `value` для `key`.
    ///
    /// `value` ассоциируется с `key`, пока не будет перезаписано следующим
    /// вызовом `set` или не будет удалено.
    #[instrument(skip(self))]
    pub async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.set_cmd(Set::new(key, value, None)).await
    }

    /// Устанавливает переданное `value` для `key`. Значение истекает после `expiration`.
    #[instrument(skip(self))]
    pub async fn set_expires(
        &self,
        key: &str,
        value: Bytes,
        expiration: Duration,
    ) -> Result<()> {
        self.set_cmd(Set::new(key, value, Some(expiration))).await
    }

    /// Устанавливает `value` для `key`, только если ключ отсутствует.
    ///
    /// Возвращает `true` при установке. Так захватывается
    /// консультативная блокировка.
    #[instrument(skip(self))]
    pub async fn set_nx(&self, key: &str, value: Bytes, expiration: Duration) -> Result<bool> {
        let frame = Set::new(key, value, Some(expiration)).nx().into_frame();
        debug!(request = ?frame);

        match self.execute(&[key.as_bytes()], true, false, frame).await? {
            Frame::Simple(response) if response == "OK" => Ok(true),
            // Nil означает, что ключ занят.
            Frame::Null => Ok(false),
            frame => Err(frame.to_error()),
        }
    }

    /// Основная логика `SET`, используемая методами `set` и `set_expires`.
    async fn set_cmd(&self, cmd: Set) -> Result<()> {
        let key = cmd.key().to_string();
        let frame = cmd.into_frame();
        debug!(request = ?frame);

        // При успехе сервер отвечает простым `OK`. Любой другой ответ
        // означает ошибку.
        match self.execute(&[key.as_bytes()], true, false, frame).await? {
            Frame::Simple(response) if response == "OK" => Ok(()),
            frame => Err(frame.to_error()),
        }
    }

    /// Удаляет ключи. Возвращает количество фактически удаленных.
    ///
    /// В кластерном режиме все ключи должны принадлежать одному слоту,
    /// иначе команда проваливается до отправки каких-либо байтов.
    #[instrument(skip(self))]
    pub async fn del(&self, keys: &[&str]) -> Result<i64> {
        let cmd = Del::new(keys.iter().map(|key| key.to_string()).collect());
        let key_bytes: Vec<&[u8]> = keys.iter().map(|key| key.as_bytes()).collect();

        let frame = cmd.into_frame();
        debug!(request = ?frame);

        self.read_int(self.execute(&key_bytes, true, false, frame).await?)
    }

    /// Проверяет существование ключа.
    #[instrument(skip(self))]
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let frame = Exists::new(key).into_frame();

        let count = self
            .read_int(self.execute(&[key.as_bytes()], false, false, frame).await?)?;

        Ok(count > 0)
    }

    /// Отправляет `message` в определенный `channel`.
    ///
    /// Возвращает количество подписчиков канала.
    /// Не гарантируется, что все эти подписчики получат сообщение, поскольку
    /// они могут отключиться в любой момент.
    #[instrument(skip(self))]
    pub async fn publish(&self, channel: &str, message: Bytes) -> Result<i64> {
        let frame = Publish::new(channel, message).into_frame();
        debug!(request = ?frame);

        self.read_int(self.execute(&[], true, false, frame).await?)
    }

    /// Отправляет `message` в шардированный канал.
    ///
    /// Шардированные каналы хешируются как ключи: команда уходит на
    /// узел-владелец слота канала.
    #[instrument(skip(self))]
    pub async fn spublish(&self, channel: &str, message: Bytes) -> Result<i64> {
        let cmd = Spublish::new(channel, message);
        let key = cmd.channel().to_string();

        let frame = cmd.into_frame();
        debug!(request = ?frame);

        self.read_int(self.execute(&[key.as_bytes()], true, false, frame).await?)
    }

    /// Добавляет значения в голову списка. Возвращает длину списка.
    #[instrument(skip(self))]
    pub async fn lpush(&self, key: &str, values: Vec<Bytes>) -> Result<i64> {
        let frame = Lpush::new(key, values).into_frame();
        debug!(request = ?frame);

        self.read_int(self.execute(&[key.as_bytes()], true, false, frame).await?)
    }

    /// Извлекает значение из головы списка.
    #[instrument(skip(self))]
    pub async fn lpop(&self, key: &str) -> Result<Option<Bytes>> {
        let frame = Lpop::new(key).into_frame();

        self.read_value(self.execute(&[key.as_bytes()], true, false, frame).await?)
    }

    /// Извлекает значение из хвоста списка.
    #[instrument(skip(self))]
    pub async fn rpop(&self, key: &str) -> Result<Option<Bytes>> {
        let frame = Rpop::new(key).into_frame();

        self.read_value(self.execute(&[key.as_bytes()], true, false, frame).await?)
    }

    /// Выполняет серверный скрипт.
    #[instrument(skip(self, script, args))]
    pub async fn eval(
        &self,
        script: &str,
        keys: Vec<String>,
        args: Vec<Bytes>,
    ) -> Result<Frame> {
        let cmd = Eval::new(script, keys, args);
        let key_strings: Vec<String> = cmd.keys().to_vec();
        let key_bytes: Vec<&[u8]> = key_strings.iter().map(|key| key.as_bytes()).collect();

        let frame = cmd.into_frame();
        debug!(request = ?frame);

        self.execute(&key_bytes, true, false, frame).await
    }

    /// Выполняет `FLUSHALL` на каждом праймари кластера.
    #[instrument(skip(self))]
    pub async fn flush_all(&self) -> Result<()> {
        let primaries = self.router.read().await.for_each_primary();

        let mut frame = Frame::array();
        frame.push_bulk(Bytes::from_static(b"FLUSHALL"));

        for conn in primaries {
            match conn.exchange(&frame).await? {
                Frame::Simple(response) if response == "OK" => {}
                frame => return Err(frame.to_error()),
            }
        }

        Ok(())
    }

    /// Создает пустой конвейер поверх топологии клиента.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.router.clone())
    }

    /// Создает менеджер консультативных блокировок поверх клиента.
    pub fn lock_manager(&self) -> LockManager {
        LockManager::new(self.clone())
    }

    /// Подписывает выделенное соединение на каналы и блокирует
    /// вызывающую задачу в цикле приема.
    ///
    /// `handler` вызывается для каждого сообщения, чье имя еще числится
    /// в активном наборе; истинный `stop` завершает цикл. Вызов
    /// возвращается после завершения цикла и отписки.
    pub async fn subscribe<H, P>(&self, channels: Vec<String>, handler: H, stop: P) -> Result<()>
    where
        H: FnMut(Message) -> Result<()>,
        P: FnMut(&Message) -> bool,
    {
        let conn = self
            .subscriber_connection(SubscriptionKind::Channel, &channels)
            .await?;

        subscriber::subscribe_on(&conn, SubscriptionKind::Channel, channels, handler, stop).await
    }

    /// Вариант [`Client::subscribe`] для шаблонов (`PSUBSCRIBE`).
    pub async fn psubscribe<H, P>(&self, patterns: Vec<String>, handler: H, stop: P) -> Result<()>
    where
        H: FnMut(Message) -> Result<()>,
        P: FnMut(&Message) -> bool,
    {
        let conn = self
            .subscriber_connection(SubscriptionKind::Pattern, &patterns)
            .await?;

        subscriber::subscribe_on(&conn, SubscriptionKind::Pattern, patterns, handler, stop).await
    }

    /// Вариант [`Client::subscribe`] для шардированных каналов
    /// (`SSUBSCRIBE`).
    ///
    /// Все каналы одного вызова должны принадлежать одному слоту; цикл
    /// обслуживается соединением с узлом-владельцем этого слота.
    pub async fn ssubscribe<H, P>(&self, channels: Vec<String>, handler: H, stop: P) -> Result<()>
    where
        H: FnMut(Message) -> Result<()>,
        P: FnMut(&Message) -> bool,
    {
        let conn = self
            .subscriber_connection(SubscriptionKind::Shard, &channels)
            .await?;

        subscriber::subscribe_on(&conn, SubscriptionKind::Shard, channels, handler, stop).await
    }

    /// Подписка с обработчиком ошибок цикла: вернув `Ok`, обработчик
    /// продолжает цикл вместо его завершения.
    pub async fn subscribe_filtered<H, P, E>(
        &self,
        kind: SubscriptionKind,
        names: Vec<String>,
        handler: H,
        stop: P,
        on_error: E,
    ) -> Result<()>
    where
        H: FnMut(Message) -> Result<()>,
        P: FnMut(&Message) -> bool,
        E: FnMut(Error) -> Result<()>,
    {
        let conn = self.subscriber_connection(kind, &names).await?;

        subscriber::subscribe_filtered(&conn, kind, names, handler, stop, on_error).await
    }

    /// Преобразует подписку в `Stream` сообщений, опубликованных в
    /// подписанных каналах.
    ///
    /// Цикл приема выполняется в фоновой задаче; уничтожение потока
    /// завершает подписку при следующем сообщении.
    pub fn subscribe_stream(
        &self,
        channels: Vec<String>,
    ) -> impl Stream<Item = Result<Message>> {
        let client = self.clone();

        // Используем макрос `try_stream` из крейта `async-stream`:
        // генераторы в `Rust` нестабильны, крейт симулирует их поверх
        // `async/await`.
        try_stream! {
            let conn = client
                .subscriber_connection(SubscriptionKind::Channel, &channels)
                .await?;

            let (tx, mut rx) = mpsc::unbounded_channel();
            let stop_probe = tx.clone();

            let task = tokio::spawn(async move {
                subscriber::subscribe_on(
                    &conn,
                    SubscriptionKind::Channel,
                    channels,
                    move |message| {
                        let _ = tx.send(message);
                        Ok(())
                    },
                    // Уничтоженный получатель завершает цикл.
                    move |_| stop_probe.is_closed(),
                )
                .await
            });

            while let Some(message) = rx.recv().await {
                yield message;
            }

            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => Err(err)?,
                // Паника задачи подписки; поток просто завершается.
                Err(_) => {}
            }
        }
    }

    /// Открывает выделенное соединение для подписки.
    ///
    /// Подписка занимает соединение целиком, поэтому маршрутизирующие
    /// соединения для нее не используются: выбирается целевой узел, и к
    /// нему открывается новое соединение с теми же параметрами.
    async fn subscriber_connection(
        &self,
        kind: SubscriptionKind,
        names: &[String],
    ) -> Result<Arc<Connection>> {
        let target = {
            let router = self.router.read().await;

            match kind {
                // Шардированные каналы хешируются как ключи: все каналы
                // вызова должны принадлежать одному слоту, цикл идет к
                // его владельцу.
                SubscriptionKind::Shard => {
                    let keys: Vec<&[u8]> = names.iter().map(|name| name.as_bytes()).collect();
                    router.route(&keys, true, false).await?
                }
                _ => router.route(&[b"*"], false, false).await?,
            }
        };

        let conn = Connection::open(target.params().clone()).await?;

        Ok(Arc::new(conn))
    }

    /// Маршрутизирует кадр и выполняет синхронный обмен.
    async fn execute(
        &self,
        keys: &[&[u8]],
        write: bool,
        replica: bool,
        frame: Frame,
    ) -> Result<Frame> {
        let conn = {
            let router = self.router.read().await;
            router.route(keys, write, replica).await?
        };

        conn.exchange(&frame).await
    }

    /// Приводит ответ к опциональному значению: `Null` — отсутствие.
    fn read_value(&self, frame: Frame) -> Result<Option<Bytes>> {
        match frame {
            Frame::Simple(value) => Ok(Some(value.into())),
            Frame::Bulk(value) => Ok(Some(value)),
            Frame::Null => Ok(None),
            frame => Err(frame.to_error()),
        }
    }

    /// Приводит ответ к целому числу.
    fn read_int(&self, frame: Frame) -> Result<i64> {
        match frame {
            Frame::Integer(value) => Ok(value),
            frame => Err(frame.to_error()),
        }
    }
}

/// Разбирает адрес вида `host:port`.
fn split_addr(addr: &str) -> Result<(String, u16)> {
    let mut parts = addr.rsplitn(2, ':');

    let port = parts
        .next()
        .and_then(|port| port.parse::<u16>().ok());
    let host = parts.next();

    match (host, port) {
        (Some(host), Some(port)) => Ok((host.to_string(), port)),
        _ => Err(Error::Decode(format!("невалидный адрес `{}`", addr))),
    }
}
