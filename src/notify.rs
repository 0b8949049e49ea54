use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to reach notifier: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notifier rejected message with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

pub trait Notifier {
    fn send(&self, message: &str) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn send(&self, message: &str) -> Result<(), NotifyError> {
        (**self).send(message)
    }
}

/// Sends HTML-formatted messages through the Telegram Bot API.
#[derive(Debug)]
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    client: reqwest::blocking::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { bot_token, chat_id, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", TELEGRAM_API_URL, self.bot_token)
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let form = [
            ("chat_id", self.chat_id.as_str()),
            ("text", message),
            ("parse_mode", "HTML"),
            ("disable_web_page_preview", "true"),
        ];

        let response = self.client.post(self.endpoint()).form(&form).send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        info!("Telegram message sent successfully");
        Ok(())
    }
}
