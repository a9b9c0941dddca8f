//! Клиентские реализации: асинхронный кластерный `Client` и
//! `BlockingClient`, оборачивающий его для синхронного кода.

mod blocking_client;
pub use blocking_client::BlockingClient;

mod client;
pub use client::Client;
