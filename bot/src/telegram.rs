//! Telegram Bot API transport: long-polls updates and relays replies.

use crate::commands::{ChatId, Command, CommandHandler, Outbox, UserId};
use crate::marketplace::Marketplace;
use anyhow::{bail, Result};
use async_trait::async_trait;
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio::time::sleep;

const BASE_URL: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(POLL_TIMEOUT_SECS + 10);
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bot API methods used by the bot
#[derive(Display, Copy, Clone, Debug)]
enum Method {
    #[strum(serialize = "getUpdates")]
    GetUpdates,
    #[strum(serialize = "sendMessage")]
    SendMessage,
    #[strum(serialize = "editMessageText")]
    EditMessageText,
    #[strum(serialize = "answerCallbackQuery")]
    AnswerCallbackQuery,
}

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Deserialize, Debug)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Chat {
    pub id: i64,
}

#[derive(Deserialize, Debug)]
pub struct User {
    pub id: i64,
}

#[derive(Deserialize, Debug)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

fn menu_keyboard() -> Value {
    json!({
        "inline_keyboard": [
            [
                { "text": "🟢 Start Monitoring", "callback_data": "start_monitor" },
                { "text": "🔴 Stop Monitoring", "callback_data": "stop_monitor" }
            ],
            [
                { "text": "💰 Check Floor Price", "callback_data": "floor_price" },
                { "text": "⚙️ Settings", "callback_data": "settings" }
            ]
        ]
    })
}

#[derive(Clone)]
pub struct Telegram {
    client: reqwest::Client,
    token: String,
}

impl Telegram {
    pub fn new(token: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            token: token.to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, payload: Value) -> Result<T> {
        let url = format!("{BASE_URL}/bot{}/{method}", self.token);

        // The token is part of the URL, keep it out of error messages.
        let response: ApiResponse<T> = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;

        match response.result {
            Some(result) if response.ok => Ok(result),
            _ => bail!(
                "{method} failed: {}",
                response.description.unwrap_or_default()
            ),
        }
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.call(
            Method::GetUpdates,
            json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    pub async fn send_message(&self, chat: ChatId, text: &str, keyboard: Option<Value>) -> Result<()> {
        let mut payload = json!({
            "chat_id": chat.0,
            "text": text,
            "link_preview_options": { "is_disabled": true },
        });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = keyboard;
        }
        self.call::<Value>(Method::SendMessage, payload).await?;
        Ok(())
    }

    pub async fn edit_message_text(&self, chat: ChatId, message_id: i64, text: &str) -> Result<()> {
        self.call::<Value>(
            Method::EditMessageText,
            json!({
                "chat_id": chat.0,
                "message_id": message_id,
                "text": text,
                "link_preview_options": { "is_disabled": true },
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, id: &str) -> Result<()> {
        self.call::<Value>(Method::AnswerCallbackQuery, json!({ "callback_query_id": id }))
            .await?;
        Ok(())
    }

    /// Polls for updates forever, handling each one on its own task.
    pub async fn run<M: Marketplace>(&self, handler: Arc<CommandHandler<M>>) -> Result<()> {
        let mut offset = 0;

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    error!("Failed to fetch updates: {e}");
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);

                let telegram = self.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = telegram.dispatch(&handler, update).await {
                        error!("Failed to handle update: {e}");
                    }
                });
            }
        }
    }

    async fn dispatch<M: Marketplace>(&self, handler: &CommandHandler<M>, update: Update) -> Result<()> {
        if let Some(query) = update.callback_query {
            return self.handle_callback(handler, query).await;
        }

        let Some(message) = update.message else {
            debug!("Ignoring update {}", update.update_id);
            return Ok(());
        };
        let (Some(from), Some(text)) = (message.from, message.text) else {
            return Ok(());
        };
        let Some(command) = Command::parse(&text) else {
            return Ok(());
        };

        let chat = ChatId(message.chat.id);
        let reply = handler.handle(UserId(from.id), chat, command).await;
        let keyboard = reply.menu.then(menu_keyboard);
        self.send_message(chat, &reply.text, keyboard).await
    }

    /// Button presses edit the message that carried the keyboard.
    async fn handle_callback<M: Marketplace>(
        &self,
        handler: &CommandHandler<M>,
        query: CallbackQuery,
    ) -> Result<()> {
        if let Err(e) = self.answer_callback_query(&query.id).await {
            warn!("Failed to answer callback query: {e}");
        }

        let Some(message) = query.message else {
            return Ok(());
        };
        let Some(command) = query.data.as_deref().and_then(Command::parse) else {
            return Ok(());
        };

        let chat = ChatId(message.chat.id);
        let reply = handler.handle(UserId(query.from.id), chat, command).await;
        self.edit_message_text(chat, message.message_id, &reply.text)
            .await
    }
}

#[async_trait]
impl Outbox for Telegram {
    async fn send(&self, chat: ChatId, text: &str) -> Result<()> {
        self.send_message(chat, text, None).await
    }
}
