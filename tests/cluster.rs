mod support;

use mini_redis_cluster::clients::Client;
use mini_redis_cluster::{hash_slot, Error};

use std::time::Duration;

/// Ждет выполнения условия, опрашивая его с небольшим интервалом.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    panic!("условие не выполнилось за отведенное время");
}

/// Ключ, слот которого меньше 8192 (первый узел тестового кластера).
fn low_slot_key(prefix: &str) -> String {
    (0..)
        .map(|i| format!("{}{}", prefix, i))
        .find(|key| hash_slot(key.as_bytes()) < 8192)
        .unwrap()
}

/// Ключ, слот которого не меньше 8192 (второй узел).
fn high_slot_key(prefix: &str) -> String {
    (0..)
        .map(|i| format!("{}{}", prefix, i))
        .find(|key| hash_slot(key.as_bytes()) >= 8192)
        .unwrap()
}

/// Подключение к любому узлу обнаруживает кластер целиком.
#[tokio::test]
async fn discovers_cluster_topology() {
    let cluster = support::start_cluster().await;

    let client = Client::connect(&cluster.nodes[0].addr_string())
        .await
        .unwrap();

    assert!(client.is_cluster().await);
    assert_eq!(client.node_count().await, 2);

    // Подключение ко второму узлу дает ту же картину.
    let client = Client::connect(&cluster.nodes[1].addr_string())
        .await
        .unwrap();

    assert!(client.is_cluster().await);
    assert_eq!(client.node_count().await, 2);
}

/// Команды уходят на узел-владелец слота ключа.
#[tokio::test]
async fn routes_commands_by_slot() {
    let cluster = support::start_cluster().await;
    let client = Client::connect(&cluster.nodes[0].addr_string())
        .await
        .unwrap();

    let low = low_slot_key("k");
    let high = high_slot_key("k");

    client.set(&low, "low-value".into()).await.unwrap();
    client.set(&high, "high-value".into()).await.unwrap();

    // Значения легли каждое в базу своего узла.
    assert!(cluster.nodes[0].db.peek(&low).is_some());
    assert!(cluster.nodes[1].db.peek(&low).is_none());

    assert!(cluster.nodes[1].db.peek(&high).is_some());
    assert!(cluster.nodes[0].db.peek(&high).is_none());

    // Чтение через маршрутизатор возвращает записанное.
    let value = client.get(&low).await.unwrap().unwrap();
    assert_eq!(&value[..], b"low-value");

    let value = client.get(&high).await.unwrap().unwrap();
    assert_eq!(&value[..], b"high-value");
}

/// Многоключевая команда с ключами разных слотов отклоняется до
/// отправки каких-либо байтов.
#[tokio::test]
async fn cross_slot_command_rejected() {
    let cluster = support::start_cluster().await;
    let client = Client::connect(&cluster.nodes[0].addr_string())
        .await
        .unwrap();

    let low = low_slot_key("k");
    let high = high_slot_key("k");

    let err = client.del(&[&low, &high]).await.unwrap_err();
    assert!(matches!(err, Error::CrossSlot));
}

/// Общекластерная административная команда обходит все праймари.
#[tokio::test]
async fn flush_all_reaches_every_primary() {
    let cluster = support::start_cluster().await;
    let client = Client::connect(&cluster.nodes[0].addr_string())
        .await
        .unwrap();

    let low = low_slot_key("k");
    let high = high_slot_key("k");

    client.set(&low, "a".into()).await.unwrap();
    client.set(&high, "b".into()).await.unwrap();

    client.flush_all().await.unwrap();

    assert!(cluster.nodes[0].db.peek(&low).is_none());
    assert!(cluster.nodes[1].db.peek(&high).is_none());
}

/// Чтение с реплики: перед первым чтением на соединении реплики
/// выполняется `READONLY`, и значение, записанное через праймари,
/// читается обратно.
#[tokio::test]
async fn replica_read_round_trip() {
    let cluster = support::start_replicated().await;
    let client = Client::connect(&cluster.nodes[0].addr_string())
        .await
        .unwrap();

    client.set("key", "value".into()).await.unwrap();

    // База общая для праймари и реплики, поэтому чтение с реплики
    // видит запись.
    let value = client.get_from_replica("key").await.unwrap().unwrap();
    assert_eq!(&value[..], b"value");

    // Повторное чтение идет по уже переведенному соединению.
    let value = client.get_from_replica("key").await.unwrap().unwrap();
    assert_eq!(&value[..], b"value");
}

/// Обновление топологии атомарно подменяет маршрутизатор; клиент
/// остается рабочим.
#[tokio::test]
async fn refresh_topology_keeps_client_usable() {
    let cluster = support::start_cluster().await;
    let client = Client::connect(&cluster.nodes[0].addr_string())
        .await
        .unwrap();

    client.refresh_topology().await.unwrap();

    assert!(client.is_cluster().await);
    assert_eq!(client.node_count().await, 2);

    let low = low_slot_key("k");
    client.set(&low, "value".into()).await.unwrap();

    let value = client.get(&low).await.unwrap().unwrap();
    assert_eq!(&value[..], b"value");
}

/// Шардированная подписка обслуживается узлом-владельцем слота канала;
/// `SPUBLISH` доставляет сообщение именно туда.
#[tokio::test]
async fn shard_subscription_targets_owning_node() {
    let cluster = support::start_cluster().await;
    let client = Client::connect(&cluster.nodes[0].addr_string())
        .await
        .unwrap();

    // Канал, принадлежащий второму узлу.
    let channel = high_slot_key("chan");

    let subscriber_client = client.clone();
    let loop_channel = channel.clone();

    let loop_handle = tokio::spawn(async move {
        let mut payloads = vec![];

        subscriber_client
            .ssubscribe(
                vec![loop_channel],
                |message| {
                    payloads.push(message.payload.clone());
                    Ok(())
                },
                |_| true,
            )
            .await
            .map(|()| payloads)
    });

    // Подписка зарегистрировалась на узле-владельце слота.
    let db = cluster.nodes[1].db.clone();
    let probe = channel.clone();
    wait_until(move || db.shard_subscribers(&probe) == 1).await;

    assert_eq!(cluster.nodes[0].db.shard_subscribers(&channel), 0);

    assert_eq!(client.spublish(&channel, "payload".into()).await.unwrap(), 1);

    let payloads = loop_handle.await.unwrap().unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(&payloads[0][..], b"payload");
}

/// Шардированные каналы одного вызова обязаны принадлежать одному
/// слоту.
#[tokio::test]
async fn shard_subscription_rejects_cross_slot_channels() {
    let cluster = support::start_cluster().await;
    let client = Client::connect(&cluster.nodes[0].addr_string())
        .await
        .unwrap();

    let low = low_slot_key("chan");
    let high = high_slot_key("chan");

    let err = client
        .ssubscribe(vec![low, high], |_| Ok(()), |_| true)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CrossSlot));
}
