//! Простой клиент, который подключается к хранилищу,
//! устанавливает значение `world` для ключа `hello`,
//! и получает это значение от сервера.
//!
//! Команда для запуска примера:
//!
//!     cargo run --example hello_world

#![warn(rust_2018_idioms)]

use mini_redis_cluster::{clients::Client, Result};

#[tokio::main]
pub async fn main() -> Result<()> {
    // Открываем соединение и обнаруживаем топологию
    let client = Client::connect("127.0.0.1:6379").await?;

    // Устанавливаем значение `world` для ключа `hello`
    client.set("hello", "world".into()).await?;

    // Получаем значение по ключу `hello`
    let result = client.get("hello").await?;

    println!("{:?}", result.unwrap());

    Ok(())
}
