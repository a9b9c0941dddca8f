//! Соединение с узлом хранилища.
//!
//! `Connection` владеет одним сокетом TCP (при необходимости обернутым в
//! TLS), состоянием жизненного цикла и политикой повторного подключения.
//! Сокет разделен на сторону записи и сторону чтения с отдельными
//! мьютексами: мьютекс записи сериализует записи и синхронные пары
//! запрос-ответ, а стороной чтения во время подписки монопольно владеет
//! цикл подписки — поэтому команды отписки могут записываться
//! параллельно с чтением.
//!
//! Параметры соединения (хост, порт, база, учетные данные) неизменяемы
//! после создания; `SELECT`, выполненный на сервере напрямую, их не
//! обновляет.

use crate::cmd::SubscriptionKind;
use crate::frame::{self, Frame};
use crate::{Error, Result};

use bytes::{Buf, Bytes, BytesMut};
use socket2::{SockRef, TcpKeepalive};
use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt;
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, ServerName};
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Параметры подключения к узлу.
#[derive(Clone, Debug)]
pub struct ConnectParams {
    /// Хост узла.
    pub host: String,

    /// Порт узла.
    pub port: u16,

    /// Индекс базы данных, выбираемый после рукопожатия.
    pub database: u32,

    /// Имя пользователя; `AUTH` отправляется, если заданы имя или пароль.
    pub username: Option<String>,

    /// Пароль.
    pub password: Option<String>,

    /// Настройки TLS. При наличии сырой сокет TCP оборачивается
    /// до рукопожатия `RESP`.
    pub tls: Option<TlsSettings>,

    /// Политика повторного подключения для `ensure_live`.
    pub retry: RetryPolicy,

    /// Начальная задержка TCP keepalive на уровне ОС.
    /// `None` — keepalive отключен.
    pub keepalive: Option<Duration>,
}

impl ConnectParams {
    /// Создает параметры подключения к `host:port` с настройками
    /// по умолчанию: база 0, без учетных данных, без TLS, повторные
    /// подключения включены.
    pub fn new(host: impl ToString, port: u16) -> ConnectParams {
        ConnectParams {
            host: host.to_string(),
            port,
            database: 0,
            username: None,
            password: None,
            tls: None,
            retry: RetryPolicy::default(),
            keepalive: None,
        }
    }

    /// Идентификатор узла вида `host:port`.
    pub(crate) fn node_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Возвращает копию параметров, нацеленную на другой узел.
    /// Учетные данные, TLS и политика повторов сохраняются.
    pub(crate) fn rehost(&self, host: impl ToString, port: u16) -> ConnectParams {
        let mut params = self.clone();
        params.host = host.to_string();
        params.port = port;
        params
    }
}

/// Настройки TLS клиента.
#[derive(Clone)]
pub struct TlsSettings {
    /// Конфигурация `rustls`.
    pub config: Arc<ClientConfig>,

    /// Имя сервера для проверки сертификата.
    pub server_name: String,
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("TlsSettings")
            .field("server_name", &self.server_name)
            .finish()
    }
}

/// Политика повторного подключения.
///
/// `backoff` — чистая функция от номера попытки к задержке перед
/// следующей попыткой.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Включены ли повторные подключения.
    pub enabled: bool,

    /// Верхняя граница количества попыток на один синхронный вызов.
    pub max_attempts: u32,

    /// Задержка между попытками.
    pub backoff: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
}

impl RetryPolicy {
    /// Политика с экспоненциальной задержкой: 50 мс, 100 мс, 200 мс, …
    pub fn new(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            enabled: true,
            max_attempts,
            backoff: Arc::new(|attempt| Duration::from_millis(50 << attempt.min(6))),
        }
    }

    /// Повторные подключения отключены: сломанное соединение сразу
    /// возвращает ошибку.
    pub fn disabled() -> RetryPolicy {
        RetryPolicy {
            enabled: false,
            max_attempts: 0,
            backoff: Arc::new(|_| Duration::from_millis(0)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy::new(3)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("RetryPolicy")
            .field("enabled", &self.enabled)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Состояние жизненного цикла соединения.
///
/// `Ready` — строго состояние после успешного рукопожатия, при котором
/// с тех пор не наблюдалось ошибок ввода-вывода. Все остальные состояния
/// считаются неживыми.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    Ready,
    Opening,
    Closing,
    Closed,
    Broken,
}

impl Liveness {
    fn from_u8(value: u8) -> Liveness {
        match value {
            0 => Liveness::Ready,
            1 => Liveness::Opening,
            2 => Liveness::Closing,
            3 => Liveness::Closed,
            _ => Liveness::Broken,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Liveness::Ready => 0,
            Liveness::Opening => 1,
            Liveness::Closing => 2,
            Liveness::Closed => 3,
            Liveness::Broken => 4,
        }
    }
}

/// Три набора подписок соединения.
#[derive(Debug, Default)]
pub struct SubscriptionSets {
    /// Каналы (`SUBSCRIBE`).
    pub channels: BTreeSet<String>,

    /// Шаблоны (`PSUBSCRIBE`).
    pub patterns: BTreeSet<String>,

    /// Шардированные каналы (`SSUBSCRIBE`).
    pub shard_channels: BTreeSet<String>,
}

impl SubscriptionSets {
    /// `true`, если все три набора пусты.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.patterns.is_empty() && self.shard_channels.is_empty()
    }

    /// Возвращает набор, соответствующий виду подписки.
    pub(crate) fn set_mut(&mut self, kind: SubscriptionKind) -> &mut BTreeSet<String> {
        match kind {
            SubscriptionKind::Channel => &mut self.channels,
            SubscriptionKind::Pattern => &mut self.patterns,
            SubscriptionKind::Shard => &mut self.shard_channels,
        }
    }

    pub(crate) fn set_ref(&self, kind: SubscriptionKind) -> &BTreeSet<String> {
        match kind {
            SubscriptionKind::Channel => &self.channels,
            SubscriptionKind::Pattern => &self.patterns,
            SubscriptionKind::Shard => &self.shard_channels,
        }
    }

    pub(crate) fn clear_all(&mut self) {
        self.channels.clear();
        self.patterns.clear();
        self.shard_channels.clear();
    }
}

/// Сторона чтения сокета.
enum ReadSocket {
    Tcp(OwnedReadHalf),
    Tls(ReadHalf<TlsStream<TcpStream>>),
}

/// Сторона записи сокета.
enum WriteSocket {
    Tcp(BufWriter<OwnedWriteHalf>),
    Tls(BufWriter<WriteHalf<TlsStream<TcpStream>>>),
}

impl ReadSocket {
    async fn read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            ReadSocket::Tcp(stream) => stream.read_buf(buf).await,
            ReadSocket::Tls(stream) => stream.read_buf(buf).await,
        }
    }
}

impl WriteSocket {
    async fn write_all(&mut self, src: &[u8]) -> io::Result<()> {
        match self {
            WriteSocket::Tcp(stream) => stream.write_all(src).await,
            WriteSocket::Tls(stream) => stream.write_all(src).await,
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        match self {
            WriteSocket::Tcp(stream) => stream.flush().await,
            WriteSocket::Tls(stream) => stream.flush().await,
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            WriteSocket::Tcp(stream) => stream.shutdown().await,
            WriteSocket::Tls(stream) => stream.shutdown().await,
        }
    }
}

/// Сторона записи под мьютексом соединения.
pub(crate) struct Writer {
    /// Сток записи. `None` после закрытия или транспортного сбоя.
    sink: Option<WriteSocket>,
}

/// Сторона чтения. Во время подписки ею монопольно владеет цикл
/// подписки; вне подписки она захватывается вместе со стороной записи
/// на время синхронной пары запрос-ответ.
pub(crate) struct Reader {
    /// Источник чтения. `None` после закрытия или транспортного сбоя.
    source: Option<ReadSocket>,

    /// Буфер для чтения кадров.
    buffer: BytesMut,

    /// `true` между записью запроса и полным чтением ответа. Если флаг
    /// поднят в начале нового обмена, предыдущий обмен был отменен
    /// посреди чтения и соединение находится в неопределенном состоянии.
    in_flight: bool,
}

impl Writer {
    /// Записывает один кадр в сокет.
    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_raw(&frame.encode()).await
    }

    /// Записывает уже закодированные байты в сокет.
    async fn write_raw(&mut self, src: &[u8]) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(Error::InvalidSocket)?;

        let result = async {
            sink.write_all(src).await?;
            sink.flush().await
        }
        .await;

        if result.is_err() {
            // Транспортный сбой: сокет становится неиспользуемым.
            self.sink = None;
            return Err(Error::ConnectionClosed);
        }

        Ok(())
    }
}

impl Reader {
    /// Читает из сокета ровно один кадр.
    ///
    /// Данные, оставшиеся в буфере после разбора кадра, сохраняются для
    /// следующего чтения.
    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            // Пытаемся разобрать кадр из буферизованных данных.
            if let Some(frame) = self.parse_frame()? {
                self.in_flight = false;
                return Ok(frame);
            }

            // Данных для целого кадра недостаточно, читаем из сокета.
            let source = self.source.as_mut().ok_or(Error::ConnectionClosed)?;

            match source.read_buf(&mut self.buffer).await {
                // `0` означает "конец потока": удаленная сторона закрыла
                // соединение.
                Ok(0) => {
                    self.source = None;
                    return Err(Error::ConnectionClosed);
                }
                Ok(_) => {}
                Err(_) => {
                    self.source = None;
                    return Err(Error::ConnectionClosed);
                }
            }
        }
    }

    /// Пытается разобрать кадр из буфера. Если данных недостаточно,
    /// возвращается `Ok(None)`. Испорченная кодировка делает соединение
    /// сломанным.
    fn parse_frame(&mut self) -> Result<Option<Frame>> {
        use frame::Error::Incomplete;

        let mut buf = Cursor::new(&self.buffer[..]);

        match Frame::check(&mut buf) {
            Ok(_) => {
                // `check` продвинул курсор до конца кадра, его позиция —
                // длина кадра.
                let len = buf.position() as usize;

                buf.set_position(0);

                let frame = Frame::parse(&mut buf)?;

                // Отбрасываем разобранные данные из буфера чтения.
                self.buffer.advance(len);

                Ok(Some(frame))
            }
            Err(Incomplete) => Ok(None),
            Err(err) => {
                // Испорченное кадрирование: поток не может быть
                // ресинхронизирован, сокет становится неиспользуемым.
                self.source = None;
                Err(err.into())
            }
        }
    }

    /// Отбрасывает байты, уже находящиеся в буфере приема, и байты,
    /// доступные в сокете без ожидания.
    fn drain_residual(&mut self) {
        self.buffer.clear();

        let mut dead = false;

        if let Some(ReadSocket::Tcp(stream)) = &self.source {
            let mut scratch = [0u8; 512];

            loop {
                match stream.try_read(&mut scratch) {
                    // Удаленная сторона закрыла соединение.
                    Ok(0) => {
                        dead = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(_) => {
                        dead = true;
                        break;
                    }
                }
            }
        }

        if dead {
            self.source = None;
        }
    }
}

/// Соединение с одним узлом хранилища.
///
/// Методы принимают `&self`: обращения к сокету сериализуются
/// внутренними мьютексами, поэтому соединение свободно разделяется между
/// задачами через `Arc`. Читать соединение могут не две задачи
/// одновременно: либо синхронные пары запрос-ответ под мьютексами, либо
/// единственный цикл подписки, владеющий стороной чтения.
pub struct Connection {
    params: ConnectParams,

    /// Сторона записи. Этот мьютекс сериализует записи и синхронные
    /// пары запрос-ответ.
    writer: Mutex<Writer>,

    /// Сторона чтения.
    reader: Mutex<Reader>,

    /// Состояние жизненного цикла.
    state: AtomicU8,

    /// `true`, пока цикл подписки владеет стороной чтения.
    is_subscribed: AtomicBool,

    /// Наборы подписок. Стандартный мьютекс: критические секции
    /// не содержат асинхронных операций.
    subscriptions: std::sync::Mutex<SubscriptionSets>,

    /// Сигнал о закрытии для цикла подписки. `watch` хранит последнее
    /// значение, поэтому сигнал не теряется между итерациями цикла.
    closed_tx: watch::Sender<bool>,

    /// `READONLY` уже отправлен на этом соединении.
    readonly_sent: AtomicBool,
}

impl Connection {
    /// Устанавливает соединение и выполняет рукопожатие.
    ///
    /// Рукопожатие: `PING` с ожиданием `PONG`; `AUTH` при наличии учетных
    /// данных; `SELECT` при ненулевой базе. Keepalive включается на уровне
    /// ОС до рукопожатия. Ошибка на любом шаге всплывает, не оставляя
    /// объекта соединения.
    pub async fn open(params: ConnectParams) -> Result<Connection> {
        let (mut writer, mut reader) = connect_socket(&params).await?;

        handshake(&params, &mut writer, &mut reader).await?;

        let (closed_tx, _) = watch::channel(false);

        Ok(Connection {
            params,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            state: AtomicU8::new(Liveness::Ready.as_u8()),
            is_subscribed: AtomicBool::new(false),
            subscriptions: std::sync::Mutex::new(SubscriptionSets::default()),
            closed_tx,
            readonly_sent: AtomicBool::new(false),
        })
    }

    /// Возвращает параметры соединения.
    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    /// Возвращает текущее состояние жизненного цикла.
    pub fn liveness(&self) -> Liveness {
        Liveness::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: Liveness) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// `true`, пока соединение занято подпиской.
    pub fn is_subscribed(&self) -> bool {
        self.is_subscribed.load(Ordering::Acquire)
    }

    /// Возвращает отсортированный список подписанных каналов.
    pub fn subscribed_channels(&self) -> Vec<String> {
        self.subscriptions().channels.iter().cloned().collect()
    }

    /// Возвращает отсортированный список подписанных шаблонов.
    pub fn subscribed_patterns(&self) -> Vec<String> {
        self.subscriptions().patterns.iter().cloned().collect()
    }

    /// Возвращает отсортированный список подписанных шардированных каналов.
    pub fn subscribed_shard_channels(&self) -> Vec<String> {
        self.subscriptions()
            .shard_channels
            .iter()
            .cloned()
            .collect()
    }

    pub(crate) fn subscriptions(&self) -> std::sync::MutexGuard<'_, SubscriptionSets> {
        self.subscriptions.lock().unwrap()
    }

    /// Пытается занять соединение под подписку. Проигравший из двух
    /// одновременных вызовов получает `false`.
    pub(crate) fn try_begin_subscription(&self) -> bool {
        self.is_subscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_subscription(&self) {
        self.is_subscribed.store(false, Ordering::Release);
    }

    /// Получатель сигнала о закрытии.
    pub(crate) fn closed_watch(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    /// `READONLY` уже выполнен на этом соединении.
    pub(crate) fn readonly_sent(&self) -> bool {
        self.readonly_sent.load(Ordering::Acquire)
    }

    pub(crate) fn mark_readonly_sent(&self) {
        self.readonly_sent.store(true, Ordering::Release);
    }

    /// Захватывает обе стороны транспорта. Порядок захвата — сначала
    /// запись, затем чтение — одинаков во всех путях.
    pub(crate) async fn lock_pair(&self) -> (MutexGuard<'_, Writer>, MutexGuard<'_, Reader>) {
        let writer = self.writer.lock().await;
        let reader = self.reader.lock().await;
        (writer, reader)
    }

    /// Закрывает соединение. Идемпотентно.
    ///
    /// Сигнал о закрытии отправляется до захвата мьютексов: активный
    /// цикл подписки наблюдает его, прерывает чтение и освобождает
    /// сторону чтения.
    pub async fn close(&self) {
        self.set_state(Liveness::Closing);
        let _ = self.closed_tx.send(true);

        {
            let mut writer = self.writer.lock().await;

            if let Some(mut sink) = writer.sink.take() {
                let _ = sink.shutdown().await;
            }
        }

        {
            let mut reader = self.reader.lock().await;
            reader.source = None;
            reader.buffer.clear();
            reader.in_flight = false;
        }

        self.set_state(Liveness::Closed);
    }

    /// Заменяет сокет и заново выполняет рукопожатие.
    pub async fn reconnect(&self) -> Result<()> {
        let (mut writer, mut reader) = self.lock_pair().await;
        self.reopen(&mut writer, &mut reader).await
    }

    async fn reopen(&self, writer: &mut Writer, reader: &mut Reader) -> Result<()> {
        self.set_state(Liveness::Opening);

        let (mut new_writer, mut new_reader) = connect_socket(&self.params).await?;

        handshake(&self.params, &mut new_writer, &mut new_reader).await?;

        *writer = new_writer;
        *reader = new_reader;
        self.readonly_sent.store(false, Ordering::Release);
        self.set_state(Liveness::Ready);
        let _ = self.closed_tx.send(false);

        Ok(())
    }

    /// Восстанавливает живость соединения.
    ///
    /// Если соединение не готово и повторы отключены, возвращается
    /// `ConnectionClosed`. Иначе выполняется до `max_attempts` попыток
    /// переподключения с задержкой `backoff(n)` между ними; каждая попытка
    /// заново устанавливает сокет и выполняет рукопожатие.
    pub(crate) async fn ensure_live(&self, writer: &mut Writer, reader: &mut Reader) -> Result<()> {
        if self.liveness() == Liveness::Ready && writer.sink.is_some() && reader.source.is_some() {
            return Ok(());
        }

        let retry = &self.params.retry;

        if !retry.enabled {
            return Err(Error::ConnectionClosed);
        }

        for attempt in 0..retry.max_attempts {
            match self.reopen(writer, reader).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(attempt, %err, "провал попытки переподключения");

                    if attempt + 1 < retry.max_attempts {
                        time::sleep((retry.backoff)(attempt)).await;
                    }
                }
            }
        }

        self.set_state(Liveness::Broken);
        Err(Error::ConnectionClosed)
    }

    /// Синхронный обмен: записывает запрос и читает один ответ.
    ///
    /// Под мьютексами: защитный сброс остаточных байтов, `ensure_live`,
    /// запись, чтение. Ответ-ошибка сервера всплывает как типизированная
    /// ошибка. На подписанном соединении обмен недоступен и не потребляет
    /// ни одного байта из сокета.
    pub async fn exchange(&self, request: &Frame) -> Result<Frame> {
        if self.is_subscribed() {
            return Err(Error::SubscribedConnection);
        }

        let (mut writer, mut reader) = self.lock_pair().await;

        self.prepare(&mut writer, &mut reader);
        self.ensure_live(&mut writer, &mut reader).await?;

        reader.in_flight = true;
        self.classify(writer.write_frame(request).await)?;
        let reply = self.classify(reader.read_frame().await)?;

        match reply {
            Frame::Error(msg) => Err(Error::server(msg)),
            frame => Ok(frame),
        }
    }

    /// Записывает запрос, не читая ответа. Ответ позже потребляется
    /// вызовом `recv`.
    pub async fn send(&self, request: &Frame) -> Result<()> {
        if self.is_subscribed() {
            return Err(Error::SubscribedConnection);
        }

        let (mut writer, mut reader) = self.lock_pair().await;

        self.prepare(&mut writer, &mut reader);
        self.ensure_live(&mut writer, &mut reader).await?;

        reader.in_flight = true;
        self.classify(writer.write_frame(request).await)
    }

    /// Читает один ответ. Используется движком подписки, владеющим
    /// стороной чтения: мьютекс чтения захватывается на время одного
    /// кадра, сторона записи остается свободной для команд отписки.
    pub async fn recv(&self) -> Result<Frame> {
        let mut reader = self.reader.lock().await;

        match self.liveness() {
            Liveness::Closing | Liveness::Closed => return Err(Error::ConnectionClosed),
            _ => {}
        }

        self.classify(reader.read_frame().await)
    }

    /// Записывает команду подписки или отписки, не трогая сторону
    /// чтения. Единственный путь записи на подписанном соединении.
    pub(crate) async fn write_pubsub(&self, frame: &Frame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        self.classify(writer.write_frame(frame).await)
    }

    /// Готовит транспорт к новому обмену: отмененный посреди чтения обмен
    /// оставляет соединение в неопределенном состоянии, такое соединение
    /// считается сломанным и пересоздается при следующем использовании.
    pub(crate) fn prepare(&self, writer: &mut Writer, reader: &mut Reader) {
        if reader.in_flight {
            writer.sink = None;
            reader.source = None;
            reader.in_flight = false;
            self.set_state(Liveness::Broken);
        }

        reader.drain_residual();

        if (writer.sink.is_none() || reader.source.is_none())
            && self.liveness() == Liveness::Ready
        {
            self.set_state(Liveness::Broken);
        }
    }

    pub(crate) async fn write_frame_io(&self, writer: &mut Writer, frame: &Frame) -> Result<()> {
        self.classify(writer.write_frame(frame).await)
    }

    pub(crate) async fn write_raw_io(&self, writer: &mut Writer, src: &[u8]) -> Result<()> {
        self.classify(writer.write_raw(src).await)
    }

    pub(crate) async fn read_frame_io(&self, reader: &mut Reader) -> Result<Frame> {
        self.classify(reader.read_frame().await)
    }

    pub(crate) fn mark_in_flight(&self, reader: &mut Reader) {
        reader.in_flight = true;
    }

    /// Сбрасывает остаточные байты и снимает маркер незавершенного обмена.
    /// Вызывается движком подписки при завершении цикла.
    pub(crate) async fn drain_after_subscription(&self) {
        let mut reader = self.reader.lock().await;
        reader.drain_residual();
        reader.in_flight = false;
    }

    fn classify<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.set_state(Liveness::Broken);
        }

        result
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Connection")
            .field("host", &self.params.host)
            .field("port", &self.params.port)
            .field("state", &self.liveness())
            .field("is_subscribed", &self.is_subscribed())
            .finish()
    }
}

/// Устанавливает сокет: TCP, keepalive на уровне ОС, затем, при наличии
/// настроек, обертка TLS. Сокет разделяется на стороны чтения и записи.
async fn connect_socket(params: &ConnectParams) -> Result<(Writer, Reader)> {
    let stream = TcpStream::connect((params.host.as_str(), params.port)).await?;

    if let Some(delay) = params.keepalive {
        let keepalive = TcpKeepalive::new().with_time(delay);
        SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;
    }

    let (read, write) = match &params.tls {
        Some(tls) => {
            let server_name = ServerName::try_from(tls.server_name.as_str()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "невалидное имя сервера TLS")
            })?;

            let connector = TlsConnector::from(tls.config.clone());
            let stream = connector.connect(server_name, stream).await?;

            let (read, write) = tokio::io::split(stream);

            (
                ReadSocket::Tls(read),
                WriteSocket::Tls(BufWriter::new(write)),
            )
        }
        None => {
            let (read, write) = stream.into_split();

            (
                ReadSocket::Tcp(read),
                WriteSocket::Tcp(BufWriter::new(write)),
            )
        }
    };

    Ok((
        Writer { sink: Some(write) },
        Reader {
            source: Some(read),
            // Буфер чтения в 4 КБ. Для реальных приложений значение
            // подбирается под профиль нагрузки.
            buffer: BytesMut::with_capacity(4 * 1024),
            in_flight: false,
        },
    ))
}

/// Рукопожатие после установки сокета.
async fn handshake(params: &ConnectParams, writer: &mut Writer, reader: &mut Reader) -> Result<()> {
    // PING подтверждает, что на другой стороне говорят на `RESP`.
    let mut ping = Frame::array();
    ping.push_bulk(Bytes::from_static(b"PING"));

    writer.write_frame(&ping).await?;

    match reader.read_frame().await? {
        Frame::Simple(s) if s == "PONG" => {}
        Frame::Error(msg) => return Err(Error::server(msg)),
        frame => return Err(frame.to_error()),
    }

    if params.username.is_some() || params.password.is_some() {
        let mut auth = Frame::array();
        auth.push_bulk(Bytes::from_static(b"AUTH"));

        if let Some(username) = &params.username {
            auth.push_bulk(Bytes::from(username.clone().into_bytes()));
        }

        auth.push_bulk(Bytes::from(
            params.password.clone().unwrap_or_default().into_bytes(),
        ));

        writer.write_frame(&auth).await?;

        match reader.read_frame().await? {
            Frame::Simple(s) if s == "OK" => {}
            Frame::Error(msg) => return Err(Error::server(msg)),
            frame => return Err(frame.to_error()),
        }
    }

    if params.database != 0 {
        let mut select = Frame::array();
        select.push_bulk(Bytes::from_static(b"SELECT"));
        select.push_bulk(Bytes::from(params.database.to_string().into_bytes()));

        writer.write_frame(&select).await?;

        match reader.read_frame().await? {
            Frame::Simple(s) if s == "OK" => {}
            Frame::Error(msg) => return Err(Error::server(msg)),
            frame => return Err(frame.to_error()),
        }
    }

    Ok(())
}
