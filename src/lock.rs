//! Распределенные консультативные блокировки.
//!
//! Блокировка — это ключ, устанавливаемый `SET name token NX PX ttl` со
//! случайным токеном владения. Освобождение безопасно: серверный скрипт
//! атомарно сравнивает токен и удаляет ключ, только если блокировка все
//! еще принадлежит освобождающему. Время жизни ограничивает удержание
//! блокировки упавшим владельцем.

use crate::clients::Client;
use crate::frame::Frame;
use crate::{Error, Result};

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, instrument};

/// Серверный скрипт сравнения-и-удаления: ключ удаляется, только если
/// его значение равно токену.
const RELEASE_SCRIPT: &str =
    r#"if redis.call("get", KEYS[1]) == ARGV[1] then return redis.call("del", KEYS[1]) else return 0 end"#;

/// Задержка между попытками захвата занятой блокировки.
const ACQUIRE_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Длина случайного токена владения.
const TOKEN_LEN: usize = 24;

/// Менеджер консультативных блокировок поверх клиента.
#[derive(Clone)]
pub struct LockManager {
    client: Client,
}

impl LockManager {
    /// Создает менеджер блокировок, использующий `client`.
    pub fn new(client: Client) -> LockManager {
        LockManager { client }
    }

    /// Захватывает блокировку `name` на время `ttl`.
    ///
    /// При конфликте попытки повторяются с небольшой задержкой, пока не
    /// истечет `wait`. Возвращает токен владения; по истечении ожидания —
    /// ошибку `LockUnavailable`.
    #[instrument(skip(self))]
    pub async fn acquire(&self, name: &str, ttl: Duration, wait: Duration) -> Result<String> {
        let token = random_token();
        let deadline = Instant::now() + wait;

        loop {
            if self.try_set(name, &token, ttl).await? {
                debug!(name, "блокировка захвачена");
                return Ok(token);
            }

            if Instant::now() + ACQUIRE_RETRY_DELAY >= deadline {
                return Err(Error::LockUnavailable);
            }

            time::sleep(ACQUIRE_RETRY_DELAY).await;
        }
    }

    /// Однократная попытка захвата. Возвращает `None`, если блокировка
    /// занята.
    #[instrument(skip(self))]
    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<String>> {
        let token = random_token();

        if self.try_set(name, &token, ttl).await? {
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    /// Освобождает блокировку `name`, если она принадлежит `token`.
    ///
    /// Возвращает `true`, только если блокировка удерживалась этим
    /// токеном. Чужой токен не удаляет ключ.
    #[instrument(skip(self))]
    pub async fn release(&self, name: &str, token: &str) -> Result<bool> {
        let deleted = self
            .client
            .eval(
                RELEASE_SCRIPT,
                vec![name.to_string()],
                vec![Bytes::from(token.to_string().into_bytes())],
            )
            .await?;

        match deleted {
            Frame::Integer(n) => Ok(n == 1),
            frame => Err(frame.to_error()),
        }
    }

    /// Неавторитетная проверка существования блокировки.
    pub async fn is_locked(&self, name: &str) -> Result<bool> {
        self.client.exists(name).await
    }

    /// Выполняет `body` под блокировкой `name`.
    ///
    /// `body` выполняется, только если блокировка захвачена. Освобождение
    /// гарантируется и на нормальном, и на ошибочном пути.
    pub async fn with_lock<T, F, Fut>(
        &self,
        name: &str,
        ttl: Duration,
        wait: Duration,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self.acquire(name, ttl, wait).await?;

        let result = body().await;
        let released = self.release(name, &token).await;

        match result {
            Ok(value) => {
                released?;
                Ok(value)
            }
            // Ошибка тела важнее ошибки освобождения.
            Err(err) => Err(err),
        }
    }

    async fn try_set(&self, name: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.client
            .set_nx(name, Bytes::from(token.to_string().into_bytes()), ttl)
            .await
    }
}

/// Непрозрачный случайный токен, однозначно идентифицирующий удержание
/// блокировки.
fn random_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
