//! Конвейер команд.
//!
//! Конвейер накапливает команды, запоминая для каждой целевой узел и
//! порядковый номер подачи, затем сбрасывает пакеты по узлам и собирает
//! ответы обратно в порядок подачи. Внутри узла порядок выдачи сохраняется;
//! между узлами порядок не гарантируется, но итог пересортировывается.
//!
//! Ключи с разными слотами внутри одной сущности — ошибка на этапе
//! маршрутизации; ключи с разными слотами в разных сущностях допустимы,
//! поскольку каждая сущность маршрутизируется независимо.

use crate::cmd::Request;
use crate::connection::Connection;
use crate::frame::Frame;
use crate::router::Router;
use crate::{Error, Result};

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Отложенный пакет команд.
pub struct Pipeline {
    router: Arc<RwLock<Router>>,

    /// Накопленные сущности в порядке подачи.
    entries: Vec<Entry>,

    /// Отбрасывать ли служебные ответы транзакций.
    filter_multi_exec: bool,

    /// Текущая сущность находится между `MULTI` и `EXEC`.
    in_multi: bool,
}

struct Entry {
    /// Порядковый номер подачи, начиная с 1.
    ordinal: usize,

    /// Идентификатор целевого узла.
    node: String,

    conn: Arc<Connection>,

    /// Закодированный запрос.
    bytes: Bytes,

    /// Ответ этой сущности отбрасывается при сборке.
    drop_reply: bool,
}

impl Pipeline {
    pub(crate) fn new(router: Arc<RwLock<Router>>) -> Pipeline {
        Pipeline {
            router,
            entries: vec![],
            filter_multi_exec: false,
            in_multi: false,
        }
    }

    /// Включает фильтрацию служебных ответов транзакций: ответы `MULTI`
    /// (`OK`), ответы `QUEUED` внутри транзакции отбрасываются; результат
    /// `EXEC` сохраняется.
    pub fn filter_multi_exec(mut self) -> Pipeline {
        self.filter_multi_exec = true;
        self
    }

    /// Количество накопленных команд.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true`, если конвейер пуст.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Добавляет команду в конвейер.
    ///
    /// Команда маршрутизируется и кодируется немедленно; ошибка
    /// `CrossSlot` проявляется здесь, до отправки каких-либо байтов.
    pub async fn add(&mut self, request: Request) -> Result<()> {
        let (node, conn) = {
            let router = self.router.read().await;
            router.route_entry(request.keys(), request.is_write())?
        };

        let drop_reply = if self.filter_multi_exec {
            transaction_mask(request.name(), &mut self.in_multi)
        } else {
            false
        };

        let ordinal = self.entries.len() + 1;
        let bytes = request.into_frame().encode();

        self.entries.push(Entry {
            ordinal,
            node,
            conn,
            bytes,
            drop_reply,
        });

        Ok(())
    }

    /// Сбрасывает конвейер и возвращает ответы в порядке подачи.
    pub async fn flush(&mut self) -> Result<Vec<Frame>> {
        self.flush_batched(None).await
    }

    /// Сбрасывает конвейер, ограничивая размер одной записи в сокет
    /// `batch_size` командами, чтобы ограничить давление на буферы сокета.
    pub async fn flush_batched(&mut self, batch_size: Option<usize>) -> Result<Vec<Frame>> {
        if self.entries.is_empty() {
            return Ok(vec![]);
        }

        // Подписанное соединение делает конвейер невозможным; проверка
        // выполняется до любых записей.
        for entry in &self.entries {
            if entry.conn.is_subscribed() {
                return Err(Error::SubscribedConnection);
            }
        }

        // Группируем сущности по узлам, сохраняя порядок внутри узла.
        let mut order: Vec<String> = vec![];
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();

        for (index, entry) in self.entries.iter().enumerate() {
            groups
                .entry(entry.node.clone())
                .or_insert_with(|| {
                    order.push(entry.node.clone());
                    vec![]
                })
                .push(index);
        }

        let mut replies: Vec<Option<Frame>> = Vec::with_capacity(self.entries.len());
        replies.resize_with(self.entries.len(), || None);

        for node in &order {
            let indexes = &groups[node];
            let conn = self.entries[indexes[0]].conn.clone();

            debug!(node = %node, commands = indexes.len(), "сброс пакета узла");

            // Пакет узла выдается под его мьютексами; ответы внутри узла
            // читаются в порядке выдачи.
            let (mut writer, mut reader) = conn.lock_pair().await;

            conn.prepare(&mut writer, &mut reader);
            conn.ensure_live(&mut writer, &mut reader).await?;

            let chunk_size = batch_size.unwrap_or(indexes.len()).max(1);

            for chunk in indexes.chunks(chunk_size) {
                let mut batch = Vec::new();

                for &index in chunk {
                    batch.extend_from_slice(&self.entries[index].bytes);
                }

                conn.mark_in_flight(&mut reader);
                conn.write_raw_io(&mut writer, &batch).await?;

                for &index in chunk {
                    let frame = conn.read_frame_io(&mut reader).await?;
                    replies[self.entries[index].ordinal - 1] = Some(frame);
                }
            }
        }

        // Собираем ответы в порядок подачи, отбрасывая служебные ответы
        // транзакций.
        let mut out = Vec::with_capacity(self.entries.len());

        for (entry, reply) in self.entries.iter().zip(replies) {
            if entry.drop_reply {
                continue;
            }

            out.push(reply.ok_or(Error::InvalidSocket)?);
        }

        self.entries.clear();
        self.in_multi = false;

        Ok(out)
    }
}

/// Обновляет режим транзакции и возвращает, отбрасывается ли ответ
/// команды `name`. Сам `MULTI` и ответы `QUEUED` внутри транзакции
/// отбрасываются; результат `EXEC` сохраняется.
fn transaction_mask(name: &str, in_multi: &mut bool) -> bool {
    match name {
        "MULTI" => {
            *in_multi = true;
            true
        }
        "EXEC" => {
            *in_multi = false;
            false
        }
        _ => *in_multi,
    }
}
