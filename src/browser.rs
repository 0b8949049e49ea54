use headless_chrome::browser::default_executable;
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::seq::SliceRandom;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pacing::{self, Pacing};
use crate::proxy::{self, ProxyExtension, ProxySpec};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.212 Safari/537.36",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("failed to load {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("failed to read page content for {url}: {reason}")]
    Content { url: String, reason: String },

    #[error("{0} returned an empty page")]
    Empty(String),
}

/// Rendered HTML plus whether the requested readiness selector showed up
/// before the timeout. A page that never became ready is still returned.
#[derive(Debug, Clone)]
pub struct Page {
    pub html: String,
    pub ready: bool,
}

pub trait PageFetcher {
    fn fetch(&self, url: &str, wait_for: Option<&str>) -> Result<Page, FetchError>;
}

impl<T: PageFetcher + ?Sized> PageFetcher for &T {
    fn fetch(&self, url: &str, wait_for: Option<&str>) -> Result<Page, FetchError> {
        (**self).fetch(url, wait_for)
    }
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub proxies: Vec<String>,
    /// Where the SOCKS credential extension is written.
    pub plugin_dir: PathBuf,
}

/// Launches a fresh Chrome for every fetch. The browser process is killed
/// when `Browser` drops, so every return path releases it.
pub struct ChromeFetcher {
    settings: BrowserSettings,
    pacing: Pacing,
}

impl ChromeFetcher {
    pub fn new(settings: BrowserSettings, pacing: Pacing) -> Self {
        Self { settings, pacing }
    }

    fn launch_args(&self, user_agent: &str, proxy: Option<&ProxySpec>) -> LaunchPlan {
        let mut plan = LaunchPlan {
            args: vec![
                OsString::from(format!("--user-agent={}", user_agent)),
                OsString::from("--disable-blink-features=AutomationControlled"),
                OsString::from("--disable-dev-shm-usage"),
                OsString::from("--disable-infobars"),
            ],
            ignore_default_args: vec![OsString::from("--enable-automation")],
            extensions: Vec::new(),
        };

        if let Some(spec) = proxy {
            match spec {
                ProxySpec::AuthenticatedSocks { scheme, host, port, username, password } => {
                    let extension = ProxyExtension::new(scheme, host, *port, username, password);
                    match extension.write_to(&self.settings.plugin_dir) {
                        Ok(dir) => {
                            info!("Using SOCKS proxy with auth plugin: {}", spec.describe());
                            plan.ignore_default_args.push(OsString::from("--disable-extensions"));
                            plan.extensions.push(dir.into_os_string());
                        }
                        Err(e) => {
                            warn!("Error setting up proxy plugin: {}", e);
                            plan.args.push(OsString::from(format!(
                                "--proxy-server={}://{}:{}",
                                scheme, host, port
                            )));
                        }
                    }
                }
                ProxySpec::Direct(raw) => {
                    info!("Using proxy: {}", spec.describe());
                    plan.args.push(OsString::from(format!("--proxy-server={}", raw)));
                }
            }
        }

        plan
    }

    fn browse(
        &self,
        browser: &Browser,
        url: &str,
        wait_for: Option<&str>,
        user_agent: &str,
    ) -> Result<Page, FetchError> {
        let tab = browser.new_tab().map_err(|e| FetchError::Launch(e.to_string()))?;

        for step in tab_setup(user_agent) {
            let applied = match step {
                TabStep::Stealth => tab.enable_stealth_mode(),
                TabStep::UserAgent(agent) => tab.set_user_agent(agent, None, None),
            };
            if let Err(e) = applied {
                debug!("Tab setup step {:?} failed: {}", step, e);
            }
        }

        tab.navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| FetchError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Waiting for page to settle...");
        pacing::pause(&self.pacing.settle);
        self.scroll_like_a_human(&tab);

        let ready = match wait_for {
            Some(selector) => self.wait_until_ready(&tab, selector),
            None => true,
        };

        let html = tab.get_content().map_err(|e| FetchError::Content {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if html.trim().is_empty() {
            return Err(FetchError::Empty(url.to_string()));
        }

        info!("Response length: {} bytes", html.len());
        Ok(Page { html, ready })
    }

    fn scroll_like_a_human(&self, tab: &Tab) {
        for _ in 0..self.pacing.scrolls {
            let script = format!("window.scrollBy(0, {});", self.pacing.scroll_amount());
            if let Err(e) = tab.evaluate(&script, false) {
                debug!("Scroll failed: {}", e);
            }
            pacing::pause(&self.pacing.scroll_pause);
        }
    }

    /// A timeout is logged, not returned; the caller parses whatever rendered.
    fn wait_until_ready(&self, tab: &Tab, selector: &str) -> bool {
        match tab.wait_for_element_with_custom_timeout(selector, self.pacing.ready_timeout) {
            Ok(_) => true,
            Err(e) => {
                warn!("Timeout waiting for selector '{}': {}", selector, e);
                false
            }
        }
    }
}

impl PageFetcher for ChromeFetcher {
    fn fetch(&self, url: &str, wait_for: Option<&str>) -> Result<Page, FetchError> {
        info!("Fetching HTML for {}", url);

        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        let proxy = proxy::choose(&self.settings.proxies);
        let plan = self.launch_args(user_agent, proxy.as_ref());

        let options = LaunchOptions {
            headless: self.settings.headless,
            sandbox: false,
            window_size: Some((1920, 1080)),
            path: default_executable().ok(),
            args: plan.args.iter().map(OsString::as_os_str).collect(),
            ignore_default_args: plan.ignore_default_args.iter().map(OsString::as_os_str).collect(),
            extensions: plan.extensions.iter().map(OsString::as_os_str).collect::<Vec<&OsStr>>(),
            idle_browser_timeout: Duration::from_secs(120),
            ..Default::default()
        };

        let browser = Browser::new(options).map_err(|e| FetchError::Launch(e.to_string()))?;
        self.browse(&browser, url, wait_for, user_agent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TabStep<'a> {
    Stealth,
    UserAgent(&'a str),
}

/// Stealth mode rewrites the user agent to a Windows one, so the chosen
/// agent is applied after it.
fn tab_setup(user_agent: &str) -> [TabStep<'_>; 2] {
    [TabStep::Stealth, TabStep::UserAgent(user_agent)]
}

struct LaunchPlan {
    args: Vec<OsString>,
    ignore_default_args: Vec<OsString>,
    extensions: Vec<OsString>,
}
