//! Тестовый сервер в процессе.
//!
//! Минимальное `RESP`-совместимое хранилище для интеграционных тестов:
//! строки и списки с временем жизни, транзакции `MULTI`/`EXEC`, pub/sub
//! с шаблонами и шардированными каналами, `INFO`, `CLUSTER SLOTS`,
//! `READONLY`, `SET … NX PX` и скрипт сравнения-и-удаления. Сервер
//! запускается на эфемерном порту в одиночном, кластерном или
//! реплицированном виде.

#![allow(dead_code)]

use mini_redis_cluster::{Frame, FrameError};

use bytes::{Buf, Bytes, BytesMut};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant};

/// Обработчик запущенного тестового сервера.
pub struct TestServer {
    pub addr: SocketAddr,
    pub db: Db,
}

/// Набор узлов тестового кластера.
pub struct TestCluster {
    pub nodes: Vec<TestServer>,
}

impl TestServer {
    /// Адрес сервера в виде `host:port`.
    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }
}

/// Запускает одиночный сервер на эфемерном порту.
pub async fn start() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let db = Db::new();

    tokio::spawn(serve(listener, db.clone(), None));

    TestServer { addr, db }
}

/// Запускает кластер из двух праймари: слоты 0–8191 и 8192–16383.
/// Базы узлов независимы.
pub async fn start_cluster() -> TestCluster {
    let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let second = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let first_addr = first.local_addr().unwrap();
    let second_addr = second.local_addr().unwrap();

    let topology = Arc::new(Topology {
        entries: vec![
            (0, 8191, vec![first_addr]),
            (8192, 16383, vec![second_addr]),
        ],
    });

    let first_db = Db::new();
    let second_db = Db::new();

    tokio::spawn(serve(first, first_db.clone(), Some(topology.clone())));
    tokio::spawn(serve(second, second_db.clone(), Some(topology)));

    TestCluster {
        nodes: vec![
            TestServer {
                addr: first_addr,
                db: first_db,
            },
            TestServer {
                addr: second_addr,
                db: second_db,
            },
        ],
    }
}

/// Запускает кластер из праймари и реплики, обслуживающих весь диапазон
/// слотов. База общая, поэтому чтение с реплики видит записи праймари.
pub async fn start_replicated() -> TestCluster {
    let primary = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let replica = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let primary_addr = primary.local_addr().unwrap();
    let replica_addr = replica.local_addr().unwrap();

    let topology = Arc::new(Topology {
        entries: vec![(0, 16383, vec![primary_addr, replica_addr])],
    });

    let db = Db::new();

    tokio::spawn(serve(primary, db.clone(), Some(topology.clone())));
    tokio::spawn(serve(replica, db.clone(), Some(topology)));

    TestCluster {
        nodes: vec![
            TestServer {
                addr: primary_addr,
                db: db.clone(),
            },
            TestServer {
                addr: replica_addr,
                db,
            },
        ],
    }
}

/// Описание кластера для `CLUSTER SLOTS`.
struct Topology {
    /// (первый слот, последний слот, узлы диапазона, праймари первым).
    entries: Vec<(i64, i64, Vec<SocketAddr>)>,
}

impl Topology {
    fn to_frame(&self) -> Frame {
        let entries = self
            .entries
            .iter()
            .map(|(start, end, nodes)| {
                let mut items = vec![Frame::Integer(*start), Frame::Integer(*end)];

                for node in nodes {
                    items.push(Frame::Array(vec![
                        Frame::Bulk(Bytes::from(node.ip().to_string().into_bytes())),
                        Frame::Integer(node.port() as i64),
                        Frame::Bulk(Bytes::from_static(b"test-node-id")),
                    ]));
                }

                Frame::Array(items)
            })
            .collect();

        Frame::Array(entries)
    }
}

/// Цикл принятия соединений.
async fn serve(listener: TcpListener, db: Db, topology: Option<Arc<Topology>>) {
    loop {
        let (socket, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(_) => return,
        };

        let mut handler = Handler {
            db: db.clone(),
            topology: topology.clone(),
            io: FrameIo::new(socket),
            sub_id: None,
            push_rx: None,
            queued: None,
        };

        tokio::spawn(async move {
            let _ = handler.run().await;

            if let Some(id) = handler.sub_id {
                handler.db.drop_subscriber(id);
            }
        });
    }
}

/// Чтение и запись кадров на сокете обработчика.
struct FrameIo {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl FrameIo {
    fn new(socket: TcpStream) -> FrameIo {
        FrameIo {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    async fn read_frame(&mut self) -> std::io::Result<Option<Frame>> {
        loop {
            let mut cursor = Cursor::new(&self.buffer[..]);

            match Frame::check(&mut cursor) {
                Ok(()) => {
                    let len = cursor.position() as usize;
                    cursor.set_position(0);

                    let frame = Frame::parse(&mut cursor).map_err(|_| {
                        std::io::Error::new(std::io::ErrorKind::InvalidData, "bad frame")
                    })?;

                    self.buffer.advance(len);
                    return Ok(Some(frame));
                }
                Err(FrameError::Incomplete) => {}
                Err(_) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "bad frame",
                    ));
                }
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return Ok(None);
            }
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        self.stream.write_all(&frame.encode()).await?;
        self.stream.flush().await
    }
}

/// Обработчик одного соединения.
struct Handler {
    db: Db,
    topology: Option<Arc<Topology>>,
    io: FrameIo,

    /// Идентификатор подписчика, если соединение подписано.
    sub_id: Option<u64>,

    /// Входящие сообщения pub/sub для подписанного соединения.
    push_rx: Option<UnboundedReceiver<Frame>>,

    /// Очередь транзакции между `MULTI` и `EXEC`.
    queued: Option<Vec<Vec<Bytes>>>,
}

impl Handler {
    async fn run(&mut self) -> std::io::Result<()> {
        loop {
            let frame = select! {
                res = self.io.read_frame() => match res? {
                    Some(frame) => Some(frame),
                    None => return Ok(()),
                },
                push = next_push(&mut self.push_rx) => {
                    self.io.write_frame(&push).await?;
                    None
                }
            };

            if let Some(frame) = frame {
                let args = match command_args(frame) {
                    Some(args) if !args.is_empty() => args,
                    _ => {
                        let reply = Frame::Error("ERR protocol error".to_string());
                        self.io.write_frame(&reply).await?;
                        continue;
                    }
                };

                for reply in self.apply(args) {
                    self.io.write_frame(&reply).await?;
                }
            }
        }
    }

    /// Выполняет команду и возвращает кадры для записи.
    fn apply(&mut self, args: Vec<Bytes>) -> Vec<Frame> {
        let name = String::from_utf8_lossy(&args[0]).to_uppercase();

        // Внутри транзакции команды данных ставятся в очередь.
        if self.queued.is_some() && !matches!(name.as_str(), "MULTI" | "EXEC" | "DISCARD") {
            self.queued.as_mut().unwrap().push(args);
            return vec![Frame::Simple("QUEUED".to_string())];
        }

        match name.as_str() {
            "MULTI" => {
                self.queued = Some(vec![]);
                vec![ok()]
            }
            "EXEC" => match self.queued.take() {
                Some(commands) => {
                    let replies = commands
                        .into_iter()
                        .map(|args| dispatch_data(&self.db, args))
                        .collect();

                    vec![Frame::Array(replies)]
                }
                None => vec![Frame::Error("ERR EXEC without MULTI".to_string())],
            },
            "DISCARD" => {
                self.queued = None;
                vec![ok()]
            }
            "AUTH" | "SELECT" | "READONLY" => vec![ok()],
            "INFO" => {
                let enabled = if self.topology.is_some() { 1 } else { 0 };
                let text = format!("# Cluster\r\ncluster_enabled:{}\r\n", enabled);

                vec![Frame::Bulk(Bytes::from(text.into_bytes()))]
            }
            "CLUSTER" => match self.topology.as_ref() {
                Some(topology) if args.len() >= 2 => {
                    let sub = String::from_utf8_lossy(&args[1]).to_uppercase();

                    if sub == "SLOTS" {
                        vec![topology.to_frame()]
                    } else {
                        vec![Frame::Error("ERR unknown CLUSTER subcommand".to_string())]
                    }
                }
                _ => vec![Frame::Error(
                    "ERR This instance has cluster support disabled".to_string(),
                )],
            },
            "SUBSCRIBE" => self.subscribe_cmd(SubKind::Channel, args),
            "PSUBSCRIBE" => self.subscribe_cmd(SubKind::Pattern, args),
            "SSUBSCRIBE" => self.subscribe_cmd(SubKind::Shard, args),
            "UNSUBSCRIBE" => self.unsubscribe_cmd(SubKind::Channel, args),
            "PUNSUBSCRIBE" => self.unsubscribe_cmd(SubKind::Pattern, args),
            "SUNSUBSCRIBE" => self.unsubscribe_cmd(SubKind::Shard, args),
            _ => vec![dispatch_data(&self.db, args)],
        }
    }

    fn subscribe_cmd(&mut self, kind: SubKind, args: Vec<Bytes>) -> Vec<Frame> {
        if args.len() < 2 {
            return vec![Frame::Error(
                "ERR wrong number of arguments".to_string(),
            )];
        }

        if self.sub_id.is_none() {
            let (id, rx) = self.db.register_subscriber();
            self.sub_id = Some(id);
            self.push_rx = Some(rx);
        }

        let names = args[1..]
            .iter()
            .map(|name| String::from_utf8_lossy(name).to_string())
            .collect();

        self.db.subscribe(self.sub_id.unwrap(), kind, names)
    }

    fn unsubscribe_cmd(&mut self, kind: SubKind, args: Vec<Bytes>) -> Vec<Frame> {
        let id = match self.sub_id {
            Some(id) => id,
            None => return vec![unsubscribe_ack(kind, None, 0)],
        };

        let names = args[1..]
            .iter()
            .map(|name| String::from_utf8_lossy(name).to_string())
            .collect();

        self.db.unsubscribe(id, kind, names)
    }
}

async fn next_push(rx: &mut Option<UnboundedReceiver<Frame>>) -> Frame {
    match rx {
        Some(rx) => match rx.recv().await {
            Some(frame) => frame,
            None => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

/// Извлекает аргументы команды из кадра-массива объемных строк.
fn command_args(frame: Frame) -> Option<Vec<Bytes>> {
    match frame {
        Frame::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Frame::Bulk(data) => Some(data),
                Frame::Simple(s) => Some(Bytes::from(s.into_bytes())),
                Frame::Integer(n) => Some(Bytes::from(n.to_string().into_bytes())),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn ok() -> Frame {
    Frame::Simple("OK".to_string())
}

fn wrong_type() -> Frame {
    Frame::Error(
        "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    )
}

/// Выполняет команду данных над базой.
fn dispatch_data(db: &Db, args: Vec<Bytes>) -> Frame {
    let name = String::from_utf8_lossy(&args[0]).to_uppercase();
    let text = |data: &Bytes| String::from_utf8_lossy(data).to_string();

    match name.as_str() {
        "PING" => match args.get(1) {
            Some(msg) => Frame::Bulk(msg.clone()),
            None => Frame::Simple("PONG".to_string()),
        },
        "GET" if args.len() == 2 => match db.get(&text(&args[1])) {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) => Frame::Null,
            Err(_) => wrong_type(),
        },
        "SET" if args.len() >= 3 => {
            let mut expire = None;
            let mut nx = false;
            let mut index = 3;

            while index < args.len() {
                match String::from_utf8_lossy(&args[index]).to_uppercase().as_str() {
                    "PX" if index + 1 < args.len() => {
                        let ms: u64 = text(&args[index + 1]).parse().unwrap_or(0);
                        expire = Some(Duration::from_millis(ms));
                        index += 2;
                    }
                    "EX" if index + 1 < args.len() => {
                        let secs: u64 = text(&args[index + 1]).parse().unwrap_or(0);
                        expire = Some(Duration::from_secs(secs));
                        index += 2;
                    }
                    "NX" => {
                        nx = true;
                        index += 1;
                    }
                    _ => return Frame::Error("ERR syntax error".to_string()),
                }
            }

            if db.set(text(&args[1]), args[2].clone(), expire, nx) {
                ok()
            } else {
                Frame::Null
            }
        }
        "DEL" if args.len() >= 2 => {
            let keys: Vec<String> = args[1..].iter().map(|key| text(key)).collect();
            Frame::Integer(db.del(&keys))
        }
        "EXISTS" if args.len() == 2 => Frame::Integer(db.exists(&text(&args[1])) as i64),
        "LPUSH" if args.len() >= 3 => {
            match db.lpush(text(&args[1]), args[2..].to_vec()) {
                Ok(len) => Frame::Integer(len),
                Err(_) => wrong_type(),
            }
        }
        "LPOP" if args.len() == 2 => match db.lpop(&text(&args[1])) {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) => Frame::Null,
            Err(_) => wrong_type(),
        },
        "RPOP" if args.len() == 2 => match db.rpop(&text(&args[1])) {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) => Frame::Null,
            Err(_) => wrong_type(),
        },
        "FLUSHALL" => {
            db.flush();
            ok()
        }
        // Серверные скрипты сведены к единственному, который использует
        // клиент: атомарное сравнение-и-удаление токена блокировки.
        "EVAL" if args.len() == 5 => {
            Frame::Integer(db.compare_and_delete(&text(&args[3]), &args[4]))
        }
        "PUBLISH" if args.len() == 3 => {
            Frame::Integer(db.publish(&text(&args[1]), args[2].clone()))
        }
        "SPUBLISH" if args.len() == 3 => {
            Frame::Integer(db.spublish(&text(&args[1]), args[2].clone()))
        }
        _ => Frame::Error(format!("ERR unknown command '{}'", name)),
    }
}

/// Вид подписки на стороне тестового сервера.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SubKind {
    Channel,
    Pattern,
    Shard,
}

impl SubKind {
    fn subscribe_tag(self) -> &'static str {
        match self {
            SubKind::Channel => "subscribe",
            SubKind::Pattern => "psubscribe",
            SubKind::Shard => "ssubscribe",
        }
    }

    fn unsubscribe_tag(self) -> &'static str {
        match self {
            SubKind::Channel => "unsubscribe",
            SubKind::Pattern => "punsubscribe",
            SubKind::Shard => "sunsubscribe",
        }
    }
}

fn unsubscribe_ack(kind: SubKind, name: Option<&str>, remaining: usize) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(Bytes::from_static(kind.unsubscribe_tag().as_bytes())),
        match name {
            Some(name) => Frame::Bulk(Bytes::from(name.to_string().into_bytes())),
            None => Frame::Null,
        },
        Frame::Integer(remaining as i64),
    ])
}

/// Состояние тестового хранилища, разделяемое всеми соединениями.
#[derive(Clone)]
pub struct Db {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    pubsub: Mutex<PubSub>,
}

struct State {
    entries: HashMap<String, Entry>,
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

enum Value {
    Str(Bytes),
    List(VecDeque<Bytes>),
}

struct PubSub {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

struct Subscriber {
    channels: HashSet<String>,
    patterns: HashSet<String>,
    shard_channels: HashSet<String>,
    tx: UnboundedSender<Frame>,
}

impl Subscriber {
    fn total(&self) -> usize {
        self.channels.len() + self.patterns.len() + self.shard_channels.len()
    }

    fn set_mut(&mut self, kind: SubKind) -> &mut HashSet<String> {
        match kind {
            SubKind::Channel => &mut self.channels,
            SubKind::Pattern => &mut self.patterns,
            SubKind::Shard => &mut self.shard_channels,
        }
    }
}

impl Db {
    pub fn new() -> Db {
        Db {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    entries: HashMap::new(),
                }),
                pubsub: Mutex::new(PubSub {
                    next_id: 0,
                    subscribers: HashMap::new(),
                }),
            }),
        }
    }

    /// Возвращает значение по ключу с ленивым истечением времени жизни.
    fn get(&self, key: &str) -> Result<Option<Bytes>, ()> {
        let mut state = self.shared.state.lock().unwrap();

        if entry_expired(&state, key) {
            state.entries.remove(key);
            return Ok(None);
        }

        match state.entries.get(key) {
            Some(Entry {
                value: Value::Str(data),
                ..
            }) => Ok(Some(data.clone())),
            Some(_) => Err(()),
            None => Ok(None),
        }
    }

    fn set(&self, key: String, value: Bytes, expire: Option<Duration>, nx: bool) -> bool {
        let mut state = self.shared.state.lock().unwrap();

        if entry_expired(&state, &key) {
            state.entries.remove(&key);
        }

        if nx && state.entries.contains_key(&key) {
            return false;
        }

        state.entries.insert(
            key,
            Entry {
                value: Value::Str(value),
                expires_at: expire.map(|duration| Instant::now() + duration),
            },
        );

        true
    }

    fn del(&self, keys: &[String]) -> i64 {
        let mut state = self.shared.state.lock().unwrap();
        let mut removed = 0;

        for key in keys {
            if entry_expired(&state, key) {
                state.entries.remove(key);
                continue;
            }

            if state.entries.remove(key).is_some() {
                removed += 1;
            }
        }

        removed
    }

    fn exists(&self, key: &str) -> bool {
        let mut state = self.shared.state.lock().unwrap();

        if entry_expired(&state, key) {
            state.entries.remove(key);
            return false;
        }

        state.entries.contains_key(key)
    }

    fn lpush(&self, key: String, values: Vec<Bytes>) -> Result<i64, ()> {
        let mut state = self.shared.state.lock().unwrap();

        let entry = state.entries.entry(key).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });

        match &mut entry.value {
            Value::List(list) => {
                for value in values {
                    list.push_front(value);
                }

                Ok(list.len() as i64)
            }
            _ => Err(()),
        }
    }

    fn lpop(&self, key: &str) -> Result<Option<Bytes>, ()> {
        self.pop(key, true)
    }

    fn rpop(&self, key: &str) -> Result<Option<Bytes>, ()> {
        self.pop(key, false)
    }

    fn pop(&self, key: &str, front: bool) -> Result<Option<Bytes>, ()> {
        let mut state = self.shared.state.lock().unwrap();

        match state.entries.get_mut(key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                let value = if front {
                    list.pop_front()
                } else {
                    list.pop_back()
                };

                Ok(value)
            }
            Some(_) => Err(()),
            None => Ok(None),
        }
    }

    fn flush(&self) {
        self.shared.state.lock().unwrap().entries.clear();
    }

    /// Атомарно удаляет ключ, только если его значение равно `token`.
    fn compare_and_delete(&self, key: &str, token: &Bytes) -> i64 {
        let mut state = self.shared.state.lock().unwrap();

        let matches = matches!(
            state.entries.get(key),
            Some(Entry { value: Value::Str(data), .. }) if data == token
        );

        if matches {
            state.entries.remove(key);
            1
        } else {
            0
        }
    }

    fn register_subscriber(&self) -> (u64, UnboundedReceiver<Frame>) {
        let mut pubsub = self.shared.pubsub.lock().unwrap();

        let id = pubsub.next_id;
        pubsub.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();

        pubsub.subscribers.insert(
            id,
            Subscriber {
                channels: HashSet::new(),
                patterns: HashSet::new(),
                shard_channels: HashSet::new(),
                tx,
            },
        );

        (id, rx)
    }

    fn drop_subscriber(&self, id: u64) {
        self.shared.pubsub.lock().unwrap().subscribers.remove(&id);
    }

    fn subscribe(&self, id: u64, kind: SubKind, names: Vec<String>) -> Vec<Frame> {
        let mut pubsub = self.shared.pubsub.lock().unwrap();
        let subscriber = pubsub.subscribers.get_mut(&id).unwrap();

        let mut acks = Vec::with_capacity(names.len());

        for name in names {
            subscriber.set_mut(kind).insert(name.clone());

            acks.push(Frame::Array(vec![
                Frame::Bulk(Bytes::from_static(kind.subscribe_tag().as_bytes())),
                Frame::Bulk(Bytes::from(name.into_bytes())),
                Frame::Integer(subscriber.total() as i64),
            ]));
        }

        acks
    }

    fn unsubscribe(&self, id: u64, kind: SubKind, names: Vec<String>) -> Vec<Frame> {
        let mut pubsub = self.shared.pubsub.lock().unwrap();
        let subscriber = pubsub.subscribers.get_mut(&id).unwrap();

        // Пустой список означает отписку от всех имен вида.
        let names = if names.is_empty() {
            subscriber.set_mut(kind).iter().cloned().collect()
        } else {
            names
        };

        if names.is_empty() {
            return vec![unsubscribe_ack(kind, None, subscriber.total())];
        }

        let mut acks = Vec::with_capacity(names.len());

        for name in names {
            subscriber.set_mut(kind).remove(&name);

            acks.push(unsubscribe_ack(kind, Some(&name), subscriber.total()));
        }

        acks
    }

    /// Доставляет сообщение подписчикам канала и подходящих шаблонов.
    /// Возвращает количество доставок.
    fn publish(&self, channel: &str, payload: Bytes) -> i64 {
        let pubsub = self.shared.pubsub.lock().unwrap();
        let mut delivered = 0;

        for subscriber in pubsub.subscribers.values() {
            if subscriber.channels.contains(channel) {
                let frame = Frame::Array(vec![
                    Frame::Bulk(Bytes::from_static(b"message")),
                    Frame::Bulk(Bytes::from(channel.to_string().into_bytes())),
                    Frame::Bulk(payload.clone()),
                ]);

                if subscriber.tx.send(frame).is_ok() {
                    delivered += 1;
                }
            }

            for pattern in &subscriber.patterns {
                if glob_match(pattern.as_bytes(), channel.as_bytes()) {
                    let frame = Frame::Array(vec![
                        Frame::Bulk(Bytes::from_static(b"pmessage")),
                        Frame::Bulk(Bytes::from(pattern.clone().into_bytes())),
                        Frame::Bulk(Bytes::from(channel.to_string().into_bytes())),
                        Frame::Bulk(payload.clone()),
                    ]);

                    if subscriber.tx.send(frame).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }

        delivered
    }

    /// Доставляет сообщение подписчикам шардированного канала.
    fn spublish(&self, channel: &str, payload: Bytes) -> i64 {
        let pubsub = self.shared.pubsub.lock().unwrap();
        let mut delivered = 0;

        for subscriber in pubsub.subscribers.values() {
            if subscriber.shard_channels.contains(channel) {
                let frame = Frame::Array(vec![
                    Frame::Bulk(Bytes::from_static(b"smessage")),
                    Frame::Bulk(Bytes::from(channel.to_string().into_bytes())),
                    Frame::Bulk(payload.clone()),
                ]);

                if subscriber.tx.send(frame).is_ok() {
                    delivered += 1;
                }
            }
        }

        delivered
    }
}

impl Db {
    /// Количество подписчиков канала. Тесты синхронизируются по этому
    /// значению перед публикацией.
    pub fn channel_subscribers(&self, name: &str) -> usize {
        let pubsub = self.shared.pubsub.lock().unwrap();

        pubsub
            .subscribers
            .values()
            .filter(|subscriber| subscriber.channels.contains(name))
            .count()
    }

    /// Количество подписчиков шаблона.
    pub fn pattern_subscribers(&self, pattern: &str) -> usize {
        let pubsub = self.shared.pubsub.lock().unwrap();

        pubsub
            .subscribers
            .values()
            .filter(|subscriber| subscriber.patterns.contains(pattern))
            .count()
    }

    /// Количество подписчиков шардированного канала.
    pub fn shard_subscribers(&self, name: &str) -> usize {
        let pubsub = self.shared.pubsub.lock().unwrap();

        pubsub
            .subscribers
            .values()
            .filter(|subscriber| subscriber.shard_channels.contains(name))
            .count()
    }

    /// Строковое значение ключа напрямую, мимо протокола.
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        self.get(key).ok().flatten()
    }
}

fn entry_expired(state: &State, key: &str) -> bool {
    state
        .entries
        .get(key)
        .and_then(|entry| entry.expires_at)
        .map(|when| when <= Instant::now())
        .unwrap_or(false)
}

/// Сопоставление шаблона канала с именем: `*` — любая подстрока,
/// `?` — один символ.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], text)
                || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => glob_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}
