//! Маршрутизация команд по узлам.
//!
//! Один и тот же набор возможностей — `route`, `for_each_primary`,
//! `for_each_node` — предоставляется двумя вариантами маршрутизатора:
//! одиночным и кластерным. Одиночный вариант всегда выбирает единственный
//! узел, но все равно проверяет согласованность слотов ключей, чтобы
//! пользовательский код оставался переносимым.

use crate::connection::Connection;
use crate::frame::Frame;
use crate::slot::{hash_slot, SlotMap};
use crate::{Error, Result};

use bytes::Bytes;
use rand::seq::{IteratorRandom, SliceRandom};
use rand::thread_rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Роль узла кластера для его диапазона слотов.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Primary,
    Replica,
}

/// Узел кластера: соединение и роль.
pub(crate) struct NodeEntry {
    pub(crate) conn: Arc<Connection>,
    pub(crate) role: Role,
}

/// Обработчик кластера: отображение идентификаторов узлов на соединения
/// плюс карта слотов. Создается один раз и только читается до явного
/// обновления топологии.
pub(crate) struct ClusterHandle {
    pub(crate) nodes: HashMap<String, NodeEntry>,
    pub(crate) slots: SlotMap,
}

/// Маршрутизатор команд.
pub(crate) enum Router {
    Standalone(Arc<Connection>),
    Cluster(ClusterHandle),
}

impl Router {
    /// Возвращает слот, общий для всех ключей.
    ///
    /// `None` означает общекластерную команду: список ключей пуст или
    /// состоит из единственного `"*"`. Ключи с разными слотами — ошибка
    /// `CrossSlot`, определяемая до отправки каких-либо байтов.
    pub(crate) fn common_slot(keys: &[&[u8]]) -> Result<Option<u16>> {
        if keys.is_empty() || (keys.len() == 1 && keys[0] == b"*") {
            return Ok(None);
        }

        let mut slot = None;

        for key in keys {
            let current = hash_slot(key);

            match slot {
                None => slot = Some(current),
                Some(prev) if prev != current => return Err(Error::CrossSlot),
                Some(_) => {}
            }
        }

        Ok(slot)
    }

    /// Выбирает соединение для команды.
    ///
    /// Правила:
    /// 1. Общекластерная команда: произвольный праймари для записи,
    ///    произвольный узел для чтения.
    /// 2. Ключи с разными слотами — `CrossSlot`.
    /// 3. Один общий слот: чтение с `replica` — случайная реплика слота
    ///    (с однократным `READONLY` на соединении), иначе праймари.
    /// 4. В одиночном режиме кандидат один, но согласованность тегов
    ///    все равно проверяется.
    pub(crate) async fn route(
        &self,
        keys: &[&[u8]],
        write: bool,
        replica: bool,
    ) -> Result<Arc<Connection>> {
        let slot = Router::common_slot(keys)?;

        match self {
            Router::Standalone(conn) => Ok(conn.clone()),
            Router::Cluster(cluster) => match slot {
                None => cluster.any_node(write),
                Some(slot) => {
                    if !write && replica {
                        if let Some(conn) = cluster.random_replica(slot) {
                            ensure_readonly(&conn).await?;
                            return Ok(conn);
                        }
                    }

                    cluster.primary(slot)
                }
            },
        }
    }

    /// Выбирает узел для сущности конвейера: идентификатор и соединение.
    /// Реплики не участвуют, поэтому выбор синхронный.
    pub(crate) fn route_entry(
        &self,
        keys: &[Bytes],
        write: bool,
    ) -> Result<(String, Arc<Connection>)> {
        let keys: Vec<&[u8]> = keys.iter().map(|key| &key[..]).collect();
        let slot = Router::common_slot(&keys)?;

        match self {
            Router::Standalone(conn) => Ok((conn.params().node_id(), conn.clone())),
            Router::Cluster(cluster) => {
                let conn = match slot {
                    None => cluster.any_node(write)?,
                    Some(slot) => cluster.primary(slot)?,
                };

                Ok((conn.params().node_id(), conn))
            }
        }
    }

    /// Возвращает соединения всех праймари.
    pub(crate) fn for_each_primary(&self) -> Vec<Arc<Connection>> {
        match self {
            Router::Standalone(conn) => vec![conn.clone()],
            Router::Cluster(cluster) => cluster
                .nodes
                .values()
                .filter(|entry| entry.role == Role::Primary)
                .map(|entry| entry.conn.clone())
                .collect(),
        }
    }

    /// Возвращает соединения всех узлов.
    pub(crate) fn for_each_node(&self) -> Vec<Arc<Connection>> {
        match self {
            Router::Standalone(conn) => vec![conn.clone()],
            Router::Cluster(cluster) => cluster
                .nodes
                .values()
                .map(|entry| entry.conn.clone())
                .collect(),
        }
    }

    /// `true` в кластерном режиме.
    pub(crate) fn is_cluster(&self) -> bool {
        matches!(self, Router::Cluster(_))
    }
}

impl ClusterHandle {
    /// Возвращает праймари слота.
    fn primary(&self, slot: u16) -> Result<Arc<Connection>> {
        let id = self
            .slots
            .primary_for(slot)
            .ok_or(Error::InvalidSocket)?;

        self.nodes
            .get(id)
            .map(|entry| entry.conn.clone())
            .ok_or(Error::InvalidSocket)
    }

    /// Возвращает случайную реплику слота, если реплики есть.
    fn random_replica(&self, slot: u16) -> Option<Arc<Connection>> {
        let replicas = self.slots.replicas_for(slot);
        let id = replicas.choose(&mut thread_rng())?;

        self.nodes.get(id).map(|entry| entry.conn.clone())
    }

    /// Возвращает произвольный праймари (для записи) или произвольный
    /// узел (для чтения).
    fn any_node(&self, write: bool) -> Result<Arc<Connection>> {
        let mut rng = thread_rng();

        let entry = if write {
            self.nodes
                .values()
                .filter(|entry| entry.role == Role::Primary)
                .choose(&mut rng)
        } else {
            self.nodes.values().choose(&mut rng)
        };

        entry
            .map(|entry| entry.conn.clone())
            .ok_or(Error::InvalidSocket)
    }
}

/// Переводит соединение с репликой в режим чтения. `READONLY`
/// отправляется один раз на соединение, перед первым чтением.
async fn ensure_readonly(conn: &Arc<Connection>) -> Result<()> {
    if conn.readonly_sent() {
        return Ok(());
    }

    let mut frame = Frame::array();
    frame.push_bulk(Bytes::from_static(b"READONLY"));

    debug!(node = %conn.params().node_id(), "включение режима чтения с реплики");

    match conn.exchange(&frame).await? {
        Frame::Simple(s) if s == "OK" => {
            conn.mark_readonly_sent();
            Ok(())
        }
        frame => Err(frame.to_error()),
    }
}
