//! Пример публикации сообщения в канале.
//!
//! Простой клиент, который подключается к хранилищу
//! и публикует сообщение в канале `foo`.
//!
//! Команда для подписки на канал (выполняется в другом терминале):
//!
//!     cargo run --example sub
//!
//! Команда для запуска примера (выполняется в другом терминале):
//!
//!     cargo run --example pub

#![warn(rust_2018_idioms)]

use mini_redis_cluster::{clients::Client, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Открываем соединение и обнаруживаем топологию
    let client = Client::connect("127.0.0.1:6379").await?;

    // Публикуем сообщение `bar` в канале `foo`
    client.publish("foo", "bar".into()).await?;

    Ok(())
}
