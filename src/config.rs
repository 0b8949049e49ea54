use anyhow::{Context, Result, bail};
use clap::Args;
use clap::builder::BoolishValueParser;
use std::path::PathBuf;
use std::time::Duration;

use crate::alert::DEFAULT_MAX_DESCRIPTION_LENGTH;
use crate::artifacts::ArtifactOptions;
use crate::browser::BrowserSettings;
use crate::pacing::Pacing;

pub const DEFAULT_SITE_BASE_URL: &str = "https://www.upwork.com";

/// A list of strings given as a JSON array, e.g. `["a", "b"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonList(pub Vec<String>);

fn parse_json_list(raw: &str) -> Result<JsonList, String> {
    if raw.trim().is_empty() {
        return Ok(JsonList::default());
    }
    serde_json::from_str::<Vec<String>>(raw)
        .map(JsonList)
        .map_err(|e| format!("expected a JSON array of strings: {}", e))
}

/// Settings for the watch commands. Every flag can also come from the
/// environment or a `.env` file.
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Telegram bot token
    #[arg(long, global = true, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Telegram chat that receives alerts
    #[arg(long, global = true, env = "TELEGRAM_CHAT_ID")]
    pub chat_id: Option<String>,

    /// Search result pages to poll, as a JSON array
    #[arg(long, global = true, env = "SEARCH_URLS", value_parser = parse_json_list)]
    pub search_urls: Option<JsonList>,

    /// Proxy URLs to pick from, as a JSON array
    #[arg(long, global = true, env = "PROXY_LIST", value_parser = parse_json_list, hide_env_values = true)]
    pub proxy_list: Option<JsonList>,

    /// Route the browser through a random proxy from the list
    #[arg(long, global = true, env = "USE_PROXY", default_value_t = true, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub use_proxy: bool,

    /// Minutes between rounds, before jitter
    #[arg(long, global = true, env = "CHECK_INTERVAL_MINUTES", default_value_t = 3)]
    pub check_interval_minutes: u64,

    /// Description length in alerts, in characters
    #[arg(long, global = true, env = "MAX_DESCRIPTION_LENGTH", default_value_t = DEFAULT_MAX_DESCRIPTION_LENGTH)]
    pub max_description_length: usize,

    /// Seen-job store (default: platform data directory)
    #[arg(long, global = true, env = "JOB_HISTORY_FILE")]
    pub history_file: Option<PathBuf>,

    /// Where debug artifacts are written
    #[arg(long, global = true, env = "DEBUG_DIR", default_value = "debug")]
    pub debug_dir: PathBuf,

    #[arg(long, global = true, env = "SAVE_SEARCH_HTML", default_value_t = false, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub save_search_html: bool,

    #[arg(long, global = true, env = "SAVE_POST_HTML", default_value_t = false, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub save_post_html: bool,

    #[arg(long, global = true, env = "SAVE_ALERT_MESSAGES", default_value_t = false, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub save_alert_messages: bool,

    /// Run Chrome without a window
    #[arg(long, global = true, env = "HEADLESS", default_value_t = true, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub headless: bool,

    /// Base for resolving relative posting links
    #[arg(long, global = true, env = "SITE_BASE_URL", default_value = DEFAULT_SITE_BASE_URL)]
    pub site_base_url: String,
}

/// Resolved settings, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub chat_id: String,
    pub search_urls: Vec<String>,
    /// Empty when proxies are disabled.
    pub proxies: Vec<String>,
    pub check_interval: Duration,
    pub max_description_length: usize,
    pub history_file: PathBuf,
    pub debug_dir: PathBuf,
    pub artifacts: ArtifactOptions,
    pub headless: bool,
    pub site_base_url: String,
    pub plugin_dir: PathBuf,
}

impl Config {
    pub fn from_args(args: WatchArgs) -> Result<Self> {
        let bot_token = args
            .bot_token
            .filter(|t| !t.trim().is_empty())
            .context("TELEGRAM_BOT_TOKEN is not set")?;
        let chat_id = args
            .chat_id
            .filter(|c| !c.trim().is_empty())
            .context("TELEGRAM_CHAT_ID is not set")?;

        let search_urls: Vec<String> = args
            .search_urls
            .unwrap_or_default()
            .0
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if search_urls.is_empty() {
            bail!("SEARCH_URLS is empty; nothing to watch");
        }

        let proxies = if args.use_proxy {
            args.proxy_list.unwrap_or_default().0
        } else {
            Vec::new()
        };

        let history_file = args.history_file.unwrap_or_else(default_history_file);

        Ok(Self {
            bot_token,
            chat_id,
            search_urls,
            proxies,
            check_interval: Duration::from_secs(args.check_interval_minutes * 60),
            max_description_length: args.max_description_length,
            history_file,
            debug_dir: args.debug_dir,
            artifacts: ArtifactOptions {
                save_search_html: args.save_search_html,
                save_post_html: args.save_post_html,
                save_messages: args.save_alert_messages,
            },
            headless: args.headless,
            site_base_url: args.site_base_url,
            plugin_dir: data_dir().join("proxy_auth_plugin"),
        })
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            headless: self.headless,
            proxies: self.proxies.clone(),
            plugin_dir: self.plugin_dir.clone(),
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::default().with_interval(self.check_interval)
    }
}

/// Platform data directory, or the working directory when there is none.
pub fn data_dir() -> PathBuf {
    match directories::ProjectDirs::from("", "", "jobwatch") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => PathBuf::from("."),
    }
}

/// Where the seen-job store lives when no path is given.
pub fn default_history_file() -> PathBuf {
    data_dir().join("job_history.json")
}
