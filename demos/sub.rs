//! Пример подписки на канал.
//!
//! Простой клиент, который подключается к хранилищу,
//! подписывается на канал `foo`
//! и ждет публикации сообщений в этом канале.
//!
//! Команда для запуска примера:
//!
//!     cargo run --example sub
//!
//! Команда для публикации сообщения (выполняется в другом терминале):
//!
//!     cargo run --example pub

#![warn(rust_2018_idioms)]

use mini_redis_cluster::{clients::Client, Result};

#[tokio::main]
pub async fn main() -> Result<()> {
    // Открываем соединение и обнаруживаем топологию
    let client = Client::connect("127.0.0.1:6379").await?;

    // Подписываемся на канал `foo` и печатаем первое сообщение;
    // предикат остановки завершает цикл после первой доставки
    client
        .subscribe(
            vec!["foo".into()],
            |msg| {
                println!(
                    "Получено сообщение `{:?}` из канала `{}`",
                    msg.payload, msg.channel,
                );
                Ok(())
            },
            |_| true,
        )
        .await?;

    Ok(())
}
