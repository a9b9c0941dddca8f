//! Обнаружение топологии.
//!
//! При подключении библиотека выясняет, является ли удаленная сторона
//! одиночным экземпляром или кластером: `INFO CLUSTER` и разбор поля
//! `cluster_enabled`. В кластерном режиме `CLUSTER SLOTS` дает диапазоны
//! слотов и узлы; для каждого отдельного узла открывается соединение.
//! Топология обнаруживается один раз при подключении и при явном
//! обновлении; сплетни кластера не воспроизводятся.

use crate::connection::{ConnectParams, Connection};
use crate::frame::Frame;
use crate::router::{ClusterHandle, NodeEntry, Role, Router};
use crate::slot::SlotMap;
use crate::{Error, Result};

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Диапазон слотов из ответа `CLUSTER SLOTS`: первый узел — праймари,
/// остальные — реплики.
struct SlotRange {
    end: u16,
    nodes: Vec<(String, u16)>,
}

/// Обнаруживает топологию и строит маршрутизатор.
pub(crate) async fn discover(params: &ConnectParams) -> Result<Router> {
    let seed = Arc::new(Connection::open(params.clone()).await?);

    if !cluster_enabled(&seed).await? {
        debug!(node = %params.node_id(), "одиночный режим");
        return Ok(Router::Standalone(seed));
    }

    let mut request = Frame::array();
    request.push_bulk(Bytes::from_static(b"CLUSTER"));
    request.push_bulk(Bytes::from_static(b"SLOTS"));

    let reply = seed.exchange(&request).await?;
    let ranges = parse_cluster_slots(reply)?;

    if ranges.is_empty() {
        return Err(Error::Decode(
            "пустой ответ CLUSTER SLOTS".to_string(),
        ));
    }

    // Роль узла: праймари, если узел возглавляет хотя бы один диапазон.
    let mut roles: HashMap<String, Role> = HashMap::new();
    let mut endpoints: HashMap<String, (String, u16)> = HashMap::new();

    for range in &ranges {
        for (index, (host, port)) in range.nodes.iter().enumerate() {
            let id = format!("{}:{}", host, port);

            endpoints
                .entry(id.clone())
                .or_insert_with(|| (host.clone(), *port));

            let role = if index == 0 { Role::Primary } else { Role::Replica };

            roles
                .entry(id)
                .and_modify(|existing| {
                    if role == Role::Primary {
                        *existing = Role::Primary;
                    }
                })
                .or_insert(role);
        }
    }

    // Открываем соединение на каждый отдельный узел. Затравочное
    // соединение переиспользуется, если узел есть в топологии.
    let seed_id = params.node_id();
    let mut nodes: HashMap<String, NodeEntry> = HashMap::new();

    for (id, (host, port)) in endpoints {
        let conn = if id == seed_id {
            seed.clone()
        } else {
            Arc::new(Connection::open(params.rehost(host, port)).await?)
        };

        let role = roles.get(&id).copied().unwrap_or(Role::Replica);

        debug!(node = %id, ?role, "узел кластера");
        nodes.insert(id, NodeEntry { conn, role });
    }

    let mut slots = SlotMap::new();

    for range in ranges {
        let ids = range
            .nodes
            .iter()
            .map(|(host, port)| format!("{}:{}", host, port))
            .collect();

        slots.insert_range(range.end, ids);
    }

    Ok(Router::Cluster(ClusterHandle { nodes, slots }))
}

/// Выясняет у узла, включен ли кластерный режим.
async fn cluster_enabled(conn: &Connection) -> Result<bool> {
    let mut request = Frame::array();
    request.push_bulk(Bytes::from_static(b"INFO"));
    request.push_bulk(Bytes::from_static(b"CLUSTER"));

    let text = match conn.exchange(&request).await? {
        Frame::Bulk(data) => String::from_utf8_lossy(&data).to_string(),
        Frame::Simple(s) => s,
        frame => return Err(frame.to_error()),
    };

    Ok(parse_cluster_enabled(&text))
}

/// Разбирает поле `cluster_enabled:<0|1>` из текста `INFO`.
fn parse_cluster_enabled(text: &str) -> bool {
    text.lines().any(|line| line.trim() == "cluster_enabled:1")
}

/// Разбирает ответ `CLUSTER SLOTS`.
///
/// Каждая сущность: `[start_slot, end_slot, [хост праймари, порт, id],
/// [хост реплики, порт, id]…]`. Сущности с недостаточным числом полей
/// пропускаются.
fn parse_cluster_slots(reply: Frame) -> Result<Vec<SlotRange>> {
    let entries = match reply {
        Frame::Array(entries) => entries,
        frame => return Err(frame.to_error()),
    };

    let mut ranges = Vec::with_capacity(entries.len());

    for entry in entries {
        let items = match entry {
            Frame::Array(items) => items,
            frame => return Err(frame.to_error()),
        };

        if items.len() < 3 {
            continue;
        }

        let end = match items[1] {
            Frame::Integer(end) => end as u16,
            ref frame => return Err(frame.to_error()),
        };

        let mut nodes = Vec::with_capacity(items.len() - 2);

        for node in items.into_iter().skip(2) {
            let fields = match node {
                Frame::Array(fields) => fields,
                frame => return Err(frame.to_error()),
            };

            if fields.len() < 2 {
                continue;
            }

            let host = match &fields[0] {
                Frame::Bulk(host) => String::from_utf8_lossy(host).to_string(),
                frame => return Err(frame.to_error()),
            };

            let port = match fields[1] {
                Frame::Integer(port) => port as u16,
                ref frame => return Err(frame.to_error()),
            };

            nodes.push((host, port));
        }

        if nodes.is_empty() {
            continue;
        }

        ranges.push(SlotRange { end, nodes });
    }

    Ok(ranges)
}
