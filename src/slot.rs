//! Вычисление хеш-слотов кластера и карта слотов.
//!
//! Слот ключа — это CRC16-XMODEM от байтов ключа по модулю 16 384. Если
//! ключ содержит хеш-тег `{X}` с непустым `X`, хешируется только `X`. Это
//! позволяет пользователю размещать связанные ключи на одном узле.

use crc16::{State, XMODEM};
use std::collections::BTreeMap;

/// Количество слотов кластера.
pub const SLOT_COUNT: u16 = 16_384;

/// Возвращает слот ключа с учетом хеш-тегов.
pub fn hash_slot(key: &[u8]) -> u16 {
    State::<XMODEM>::calculate(hash_tag(key)) % SLOT_COUNT
}

/// Если ключ содержит `{` и `}`, слот определяется только содержимым
/// между первой парой скобок. Пустой тег `{}` не считается тегом.
fn hash_tag(key: &[u8]) -> &[u8] {
    key.iter()
        .position(|b| *b == b'{')
        .and_then(|open| {
            let after_open = open + 1;
            key[after_open..]
                .iter()
                .position(|b| *b == b'}')
                .and_then(|close_offset| {
                    if close_offset != 0 {
                        Some(&key[after_open..after_open + close_offset])
                    } else {
                        None
                    }
                })
        })
        .unwrap_or(key)
}

/// Тотальное отображение слотов {0,…,16383} на упорядоченные списки
/// идентификаторов узлов: первый — праймари, остальные — реплики.
///
/// Диапазоны хранятся в `BTreeMap` по последнему слоту диапазона, поиск —
/// первый диапазон с концом не меньше запрошенного слота. В одиночном
/// (standalone) режиме все слоты разрешаются в единственный узел.
#[derive(Debug, Default)]
pub(crate) struct SlotMap {
    ranges: BTreeMap<u16, Vec<String>>,
}

impl SlotMap {
    /// Создает пустую карту слотов.
    pub(crate) fn new() -> SlotMap {
        SlotMap {
            ranges: BTreeMap::new(),
        }
    }

    /// Создает карту одиночного режима: все слоты принадлежат `node`.
    pub(crate) fn standalone(node: String) -> SlotMap {
        let mut map = SlotMap::new();
        map.insert_range(SLOT_COUNT - 1, vec![node]);
        map
    }

    /// Регистрирует диапазон, заканчивающийся слотом `end`.
    /// `nodes[0]` — праймари, далее реплики.
    pub(crate) fn insert_range(&mut self, end: u16, nodes: Vec<String>) {
        self.ranges.insert(end, nodes);
    }

    /// Возвращает список узлов слота, праймари первым.
    pub(crate) fn nodes_for(&self, slot: u16) -> Option<&[String]> {
        self.ranges
            .range(slot..)
            .next()
            .map(|(_, nodes)| &nodes[..])
    }

    /// Возвращает идентификатор праймари слота.
    pub(crate) fn primary_for(&self, slot: u16) -> Option<&str> {
        self.nodes_for(slot).and_then(|nodes| {
            nodes.first().map(|node| node.as_str())
        })
    }

    /// Возвращает идентификаторы реплик слота. Список может быть пустым.
    pub(crate) fn replicas_for(&self, slot: u16) -> &[String] {
        self.nodes_for(slot)
            .map(|nodes| &nodes[1..])
            .unwrap_or(&[])
    }
}
