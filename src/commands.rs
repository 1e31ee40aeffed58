//! Chat command parsing, owner gating, and the update listener.
//!
//! Private chats get the welcome text for any message. In groups,
//! `/start` and `/stop` are owner-only and `/status` is open to everyone.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::VolwatchError;
use crate::models::telegram::{ChatId, ChatType, Update};
use crate::monitor::config::MonitorConfig;
use crate::monitor::{SharedDesk, wait_or_shutdown};
use crate::notify::TelegramClient;
use crate::notify::format::{
    activated_reply, refusal_reply, status_message, stopped_reply, welcome_message,
};
use crate::retry::RetryPolicy;
use crate::state::BotRunState;

/// Long-poll timeout passed to `getUpdates`.
const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// A recognised bot command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
}

impl Command {
    /// Parses the first token of `text`.
    ///
    /// Accepts an `@username` suffix attached (`/stop@bot`) or as the next
    /// token (`/stop @bot`). Returns `None` for anything that is not a
    /// command, and for commands addressed to a bot other than
    /// `bot_username`.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let mut tokens = text.split_whitespace();
        let first = tokens.next()?;
        let (name, attached) = match first.split_once('@') {
            Some((name, mention)) => (name, Some(mention)),
            None => (first, None),
        };
        let mention = match attached {
            Some(mention) => Some(mention),
            None => tokens.next().and_then(|t| t.strip_prefix('@')),
        };

        if let (Some(mention), Some(me)) = (mention, bot_username)
            && !mention.eq_ignore_ascii_case(me)
        {
            return None;
        }

        match name.to_ascii_lowercase().as_str() {
            "/start" => Some(Self::Start),
            "/stop" => Some(Self::Stop),
            "/status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// A message to send back in response to an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: ChatId,
    pub text: String,
    pub topic_id: Option<i64>,
}

/// Everything a command handler reads or writes.
#[derive(Clone)]
pub struct CommandContext {
    pub state: Arc<BotRunState>,
    pub desk: SharedDesk,
    pub config: Arc<MonitorConfig>,
    pub bot_username: Option<String>,
}

/// Decides the reply to one update, flipping the run flag for owner
/// `/start` and `/stop`.
pub async fn handle_update(update: &Update, ctx: &CommandContext) -> Option<Reply> {
    let message = update.message.as_ref()?;
    let reply = |text: String| Reply {
        chat_id: ChatId::Id(message.chat.id),
        text,
        topic_id: message.message_thread_id,
    };

    match message.chat.tpe {
        ChatType::Private => Some(reply(welcome_message(&ctx.config))),
        ChatType::Group | ChatType::Supergroup => {
            let command = Command::parse(message.text.as_deref()?, ctx.bot_username.as_deref())?;
            let user_id = message.from.as_ref().map(|user| user.id);
            let name = message
                .from
                .as_ref()
                .and_then(|user| user.first_name.as_deref())
                .unwrap_or("owner");

            match command {
                Command::Start | Command::Stop if !ctx.state.is_owner(user_id) => {
                    warn!(?user_id, ?command, chat = message.chat.id, "unauthorized command");
                    let action = if command == Command::Start {
                        "activate"
                    } else {
                        "stop"
                    };
                    Some(reply(refusal_reply(action)))
                }
                Command::Start => {
                    ctx.state.set_running(true);
                    info!(?user_id, chat = message.chat.id, "monitoring activated");
                    Some(reply(activated_reply(name, &ctx.config)))
                }
                Command::Stop => {
                    ctx.state.set_running(false);
                    info!(?user_id, chat = message.chat.id, "monitoring paused");
                    Some(reply(stopped_reply(name)))
                }
                Command::Status => {
                    let desk = ctx.desk.lock().await;
                    Some(reply(status_message(
                        ctx.state.is_running(),
                        &ctx.config,
                        &desk.limiter,
                        desk.queue.len(),
                        ctx.bot_username.as_deref(),
                    )))
                }
            }
        }
        ChatType::Channel | ChatType::Unknown => None,
    }
}

/// Advances the cursor past every update queued while the bot was down,
/// so stale commands are not replayed. Returns how many were skipped.
///
/// # Errors
///
/// Propagates the `getUpdates` failure.
pub async fn skip_pending_updates(
    client: &TelegramClient,
    state: &BotRunState,
) -> crate::Result<usize> {
    let updates = client.get_updates(None, Duration::ZERO).await?;
    if let Some(last) = updates.iter().map(|update| update.update_id).max() {
        state.advance_cursor(last);
    }
    Ok(updates.len())
}

/// Polls for updates and answers commands until shutdown.
///
/// Poll failures back off along `policy`'s schedule without an attempt
/// cap; a rejected cursor is cleared before the next poll.
pub async fn run_command_listener(
    client: Arc<TelegramClient>,
    ctx: CommandContext,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("command listener started");
    let mut failures: u32 = 0;

    while !*shutdown.borrow() {
        let polled = tokio::select! {
            polled = client.get_updates(ctx.state.next_offset(), POLL_TIMEOUT) => polled,
            _ = shutdown.changed() => break,
        };

        match polled {
            Ok(updates) => {
                failures = 0;
                for update in updates {
                    ctx.state.advance_cursor(update.update_id);
                    let Some(reply) = handle_update(&update, &ctx).await else {
                        continue;
                    };
                    if let Err(e) = client
                        .send_message(&reply.chat_id, &reply.text, reply.topic_id)
                        .await
                    {
                        warn!(chat_id = ?reply.chat_id, "failed to send command reply: {e}");
                    }
                }
            }
            Err(e) => {
                if matches!(e, VolwatchError::Telegram(_)) {
                    ctx.state.reset_cursor();
                }
                let wait = policy.backoff(failures);
                failures = failures.saturating_add(1);
                warn!(
                    failures,
                    backoff_ms = wait.as_millis() as u64,
                    "command poll failed: {e}"
                );
                if wait_or_shutdown(&mut shutdown, wait).await {
                    break;
                }
            }
        }
    }
    info!("command listener stopped");
}
