//! Движок подписки.
//!
//! Подписывающий вызов — блокирующая операция на задаче вызывающей
//! стороны: задача становится единственным владельцем стороны чтения
//! соединения и крутит цикл приема до остановки. Пользователи, которым
//! нужно продолжать выполнять команды, оборачивают вызов в фоновую
//! задачу.
//!
//! Наборы подписок мутируются только из задачи подписки после входа в
//! цикл; внешние вызывающие стороны меняют их лишь до входа в цикл и
//! после его завершения. Отмена приходит либо сигналом о закрытии
//! соединения, либо предикатом остановки; оба пути сходятся в едином
//! завершении.

use crate::cmd::{Subscribe, SubscriptionKind, Unsubscribe};
use crate::connection::{Connection, Liveness};
use crate::frame::Frame;
use crate::parse::Parse;
use crate::{Error, Result};

use bytes::Bytes;
use std::sync::Arc;
use tokio::select;
use tracing::debug;

/// Сообщение, полученное подпиской.
#[derive(Debug, Clone)]
pub struct Message {
    /// Вид подписки, доставившей сообщение.
    pub kind: SubscriptionKind,

    /// Шаблон, по которому пришло сообщение (`pmessage`).
    pub pattern: Option<String>,

    /// Канал, в котором опубликовано сообщение.
    pub channel: String,

    /// Содержимое сообщения.
    pub payload: Bytes,
}

impl Message {
    /// Имя, по которому сообщение числится в наборе подписок: шаблон
    /// для сообщений по шаблону, иначе канал.
    fn routing_name(&self) -> &str {
        match self.kind {
            SubscriptionKind::Pattern => self.pattern.as_deref().unwrap_or(&self.channel),
            _ => &self.channel,
        }
    }
}

/// Результат разбора одного кадра цикла приема.
enum Notice {
    /// Сообщение с данными.
    Data(Message),

    /// Уведомление об отписке; `None` означает отписку от всех
    /// каналов вида. `remaining` — количество оставшихся серверных
    /// регистраций соединения.
    Unsubscribed {
        kind: SubscriptionKind,
        name: Option<String>,
        remaining: i64,
    },

    /// Протокольный шум: подтверждения подписки и неизвестные теги.
    Ignored,
}

/// Подписывает `conn` и крутит цикл приема до остановки.
///
/// Ошибки внутри цикла заново поднимаются; для перехвата используется
/// [`subscribe_filtered`].
pub async fn subscribe_on<H, P>(
    conn: &Arc<Connection>,
    kind: SubscriptionKind,
    names: Vec<String>,
    handler: H,
    stop: P,
) -> Result<()>
where
    H: FnMut(Message) -> Result<()>,
    P: FnMut(&Message) -> bool,
{
    subscribe_filtered(conn, kind, names, handler, stop, Err).await
}

/// Подписывает `conn` и крутит цикл приема до остановки.
///
/// Контракт:
/// 1. Если соединение уже подписано, синхронный провал
///    `SubscribedConnection` без изменения состояния.
/// 2. Имена регистрируются в соответствующем наборе соединения.
/// 3. Отправляется команда подписки, соединение помечается подписанным.
/// 4. Цикл приема: сообщение, чье имя еще в активном наборе, идет в
///    `handler`; истинный `stop` прерывает цикл; уведомление об отписке
///    убирает имя из набора, опустевшие наборы завершают цикл; прочие
///    теги игнорируются.
/// 5. Единое завершение: лучший случай отписки от остаточных серверных
///    регистраций, очистка наборов, сброс остаточных байтов, снятие
///    флага подписки. После нетранспортной ошибки соединение
///    переподключается и немедленно пригодно; после транспортной —
///    остается сломанным.
///
/// `on_error` — единственная точка расширения обработки ошибок внутри
/// цикла; вернув `Ok`, обработчик продолжает цикл.
pub async fn subscribe_filtered<H, P, E>(
    conn: &Arc<Connection>,
    kind: SubscriptionKind,
    names: Vec<String>,
    mut handler: H,
    mut stop: P,
    mut on_error: E,
) -> Result<()>
where
    H: FnMut(Message) -> Result<()>,
    P: FnMut(&Message) -> bool,
    E: FnMut(Error) -> Result<()>,
{
    // Из двух одновременных подписок выигрывает одна; проигравшая не
    // меняет состояния.
    if !conn.try_begin_subscription() {
        return Err(Error::SubscribedConnection);
    }

    if let Err(err) = setup(conn, kind, &names).await {
        conn.subscriptions().clear_all();
        conn.end_subscription();
        return Err(err);
    }

    debug!(?kind, ?names, "подписка активна");

    let mut closed_rx = conn.closed_watch();
    let mut exit_err: Option<Error> = None;

    loop {
        // `watch` хранит последнее значение: закрытие, случившееся до
        // регистрации ожидания, не теряется.
        if *closed_rx.borrow() {
            exit_err = Some(Error::ConnectionClosed);
            break;
        }

        let frame = select! {
            _ = closed_rx.changed() => {
                // Принудительное закрытие с другой задачи.
                exit_err = Some(Error::ConnectionClosed);
                break;
            }
            res = conn.recv() => match res {
                Ok(frame) => frame,
                Err(err) if err.is_transport() => {
                    exit_err = Some(err);
                    break;
                }
                Err(err) => match on_error(err) {
                    Ok(()) => continue,
                    Err(err) => {
                        exit_err = Some(err);
                        break;
                    }
                },
            }
        };

        match classify(frame) {
            Ok(Notice::Data(message)) => {
                // Сообщения по именам, уже удаленным из активного
                // набора, не доставляются.
                let active = conn
                    .subscriptions()
                    .set_ref(message.kind)
                    .contains(message.routing_name());

                if !active {
                    continue;
                }

                if let Err(err) = handler(message.clone()) {
                    match on_error(err) {
                        Ok(()) => {}
                        Err(err) => {
                            exit_err = Some(err);
                            break;
                        }
                    }
                }

                if stop(&message) {
                    debug!(channel = %message.channel, "предикат остановки сработал");
                    break;
                }
            }
            Ok(Notice::Unsubscribed { kind, name, .. }) => {
                let emptied = {
                    let mut sets = conn.subscriptions();

                    match name {
                        Some(name) => {
                            sets.set_mut(kind).remove(&name);
                        }
                        // Уведомление с nil означает отписку от всех
                        // каналов вида.
                        None => sets.set_mut(kind).clear(),
                    }

                    sets.is_empty()
                };

                if emptied {
                    break;
                }
            }
            Ok(Notice::Ignored) => {}
            Err(err) => match on_error(err) {
                Ok(()) => {}
                Err(err) => {
                    exit_err = Some(err);
                    break;
                }
            },
        }
    }

    teardown(conn, exit_err).await
}

/// Регистрирует имена и отправляет команду подписки.
async fn setup(conn: &Arc<Connection>, kind: SubscriptionKind, names: &[String]) -> Result<()> {
    conn.subscriptions()
        .set_mut(kind)
        .extend(names.iter().cloned());

    let frame = Subscribe::new(kind, names.to_vec()).into_frame();

    let (mut writer, mut reader) = conn.lock_pair().await;

    conn.prepare(&mut writer, &mut reader);
    conn.ensure_live(&mut writer, &mut reader).await?;
    conn.mark_in_flight(&mut reader);
    conn.write_frame_io(&mut writer, &frame).await
}

/// Отписывает подписанное соединение от имен вида `kind`.
///
/// Команды отписки — единственные команды, допустимые на подписанном
/// соединении; запись идет по стороне записи, пока цикл подписки
/// продолжает владеть стороной чтения. Пустой список имен означает
/// отписку от всех имен вида.
pub async fn unsubscribe_on(
    conn: &Arc<Connection>,
    kind: SubscriptionKind,
    names: &[String],
) -> Result<()> {
    let frame = Unsubscribe::new(kind, names).into_frame();
    conn.write_pubsub(&frame).await
}

/// Единое завершение обоих путей выхода из цикла.
async fn teardown(conn: &Arc<Connection>, exit_err: Option<Error>) -> Result<()> {
    let transport_exit = exit_err
        .as_ref()
        .map(Error::is_transport)
        .unwrap_or(false);

    // Отписка от остаточных серверных регистраций, если сокет еще жив.
    if !transport_exit && conn.liveness() == Liveness::Ready {
        let pending: Vec<SubscriptionKind> = {
            let sets = conn.subscriptions();

            [
                SubscriptionKind::Channel,
                SubscriptionKind::Pattern,
                SubscriptionKind::Shard,
            ]
            .iter()
            .copied()
            .filter(|kind| !sets.set_ref(*kind).is_empty())
            .collect()
        };

        let mut sent_any = false;

        for kind in pending {
            // Команда без аргументов — отписка от всех каналов вида.
            let frame = Unsubscribe::new(kind, &[]).into_frame();

            if conn.write_pubsub(&frame).await.is_ok() {
                sent_any = true;
            }
        }

        // Дочитываем подтверждения отписки: соединение возвращается к
        // чистому потоку запрос-ответ, а не оставляет подтверждения
        // следующему обмену.
        if sent_any {
            for _ in 0..128 {
                match conn.recv().await {
                    Ok(frame) => match classify(frame) {
                        Ok(Notice::Unsubscribed { remaining: 0, .. }) => break,
                        _ => {}
                    },
                    Err(_) => break,
                }
            }
        }
    }

    conn.subscriptions().clear_all();
    conn.drain_after_subscription().await;
    conn.end_subscription();

    match exit_err {
        None => Ok(()),
        Some(err) => {
            if !err.is_transport() {
                // После нетранспортной ошибки соединение должно быть
                // немедленно пригодным.
                let _ = conn.reconnect().await;
            }

            Err(err)
        }
    }
}

/// Разбирает кадр цикла приема по тегу.
fn classify(frame: Frame) -> Result<Notice> {
    let mut parse = Parse::new(frame)?;
    let tag = parse.next_string()?;

    if let Some(kind) = SubscriptionKind::from_message_tag(&tag) {
        let message = match kind {
            SubscriptionKind::Pattern => {
                let pattern = parse.next_string()?;
                let channel = parse.next_string()?;
                let payload = parse.next_bytes()?;

                Message {
                    kind,
                    pattern: Some(pattern),
                    channel,
                    payload,
                }
            }
            _ => {
                let channel = parse.next_string()?;
                let payload = parse.next_bytes()?;

                Message {
                    kind,
                    pattern: None,
                    channel,
                    payload,
                }
            }
        };

        // Сообщения с данными имеют фиксированную арность.
        parse.finish()?;

        return Ok(Notice::Data(message));
    }

    if let Some(kind) = SubscriptionKind::from_unsubscribe_tag(&tag) {
        let name = match parse.next()? {
            Frame::Null => None,
            Frame::Simple(s) => Some(s),
            Frame::Bulk(data) => Some(
                std::str::from_utf8(&data[..])
                    .map_err(|_| Error::Decode("невалидное имя канала".to_string()))?
                    .to_string(),
            ),
            frame => return Err(frame.to_error()),
        };

        let remaining = parse.next_int().unwrap_or(0);

        return Ok(Notice::Unsubscribed {
            kind,
            name,
            remaining,
        });
    }

    // Подтверждения подписки и неизвестные теги — протокольный шум.
    Ok(Notice::Ignored)
}
