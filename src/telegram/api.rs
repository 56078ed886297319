//! Bot API client

use super::types::{
    AnswerCallbackQuery, ApiResponse, EditMessageMedia, EditMessageReplyMarkup,
    GetUpdates, InlineKeyboardMarkup, InputMediaPhoto, Message, SendChatAction, SendMessage,
    SendPhoto, Update,
};
use super::TelegramError;
use crate::session::{ChatId, MessageId};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";
const PARSE_MODE: &str = "MarkdownV2";
/// Headroom on top of the long-polling timeout
const POLL_GRACE: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram Bot API client
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(token: &str) -> Result<Self, TelegramError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: format!("{API_BASE}/bot{token}"),
        })
    }

    async fn call<B, T>(
        &self,
        method: &'static str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, TelegramError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{method}", self.base_url);
        let response: ApiResponse<T> = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(TelegramError::Api {
                method,
                code: response.error_code,
                description: response.description.unwrap_or_default(),
            });
        }
        response
            .result
            .ok_or(TelegramError::MissingResult { method })
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let body = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: &["message", "callback_query"],
        };
        self.call("getUpdates", &body, timeout + POLL_GRACE).await
    }

    pub async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId, TelegramError> {
        let body = SendMessage {
            chat_id: chat_id.0,
            text,
            parse_mode: PARSE_MODE,
            disable_web_page_preview: true,
        };
        let message: Message = self.call("sendMessage", &body, REQUEST_TIMEOUT).await?;
        Ok(MessageId(message.message_id))
    }

    pub async fn send_photo(
        &self,
        chat_id: ChatId,
        photo_url: &str,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId, TelegramError> {
        let body = SendPhoto {
            chat_id: chat_id.0,
            photo: photo_url,
            caption,
            parse_mode: PARSE_MODE,
            reply_markup: keyboard,
        };
        let message: Message = self.call("sendPhoto", &body, REQUEST_TIMEOUT).await?;
        Ok(MessageId(message.message_id))
    }

    /// Replace the photo and caption of a message in place
    pub async fn edit_message_media(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        photo_url: &str,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let body = EditMessageMedia {
            chat_id: chat_id.0,
            message_id: message_id.0,
            media: InputMediaPhoto {
                kind: "photo",
                media: photo_url,
                caption,
                parse_mode: PARSE_MODE,
            },
            reply_markup: keyboard,
        };
        // Result is the edited message, or `true` for inline messages
        let _: serde_json::Value = self.call("editMessageMedia", &body, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    /// Replace the inline keyboard; `None` removes it
    pub async fn edit_message_reply_markup(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let body = EditMessageReplyMarkup {
            chat_id: chat_id.0,
            message_id: message_id.0,
            reply_markup: keyboard.unwrap_or_default(),
        };
        match self
            .call::<_, serde_json::Value>("editMessageReplyMarkup", &body, REQUEST_TIMEOUT)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_modified() => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        let body = AnswerCallbackQuery { callback_query_id };
        let _: bool = self.call("answerCallbackQuery", &body, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    pub async fn send_chat_action(
        &self,
        chat_id: ChatId,
        action: &'static str,
    ) -> Result<(), TelegramError> {
        let body = SendChatAction {
            chat_id: chat_id.0,
            action,
        };
        let _: bool = self.call("sendChatAction", &body, REQUEST_TIMEOUT).await?;
        Ok(())
    }
}
