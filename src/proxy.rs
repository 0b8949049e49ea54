//! Proxy selection and the credential-injecting extension for SOCKS proxies.
//!
//! Chrome cannot prompt for proxy credentials when running unattended, so an
//! authenticated SOCKS proxy is configured by a tiny extension that sets the
//! proxy and answers `onAuthRequired`. Everything else goes straight to
//! `--proxy-server`.

use rand::seq::SliceRandom;
use reqwest::Url;
use serde_json::json;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxySpec {
    AuthenticatedSocks {
        scheme: String,
        host: String,
        port: u16,
        username: String,
        password: String,
    },
    Direct(String),
}

impl ProxySpec {
    /// Anything that does not parse as a URL is passed through verbatim.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let Ok(url) = Url::parse(raw) else {
            return ProxySpec::Direct(raw.to_string());
        };

        let is_socks = url.scheme().starts_with("socks");
        let username = url.username();
        match (is_socks, username.is_empty(), url.host_str(), url.port()) {
            (true, false, Some(host), Some(port)) => ProxySpec::AuthenticatedSocks {
                scheme: url.scheme().to_string(),
                host: host.to_string(),
                port,
                username: username.to_string(),
                password: url.password().unwrap_or_default().to_string(),
            },
            _ => ProxySpec::Direct(raw.to_string()),
        }
    }

    /// Host and port only, safe to log.
    pub fn describe(&self) -> String {
        match self {
            ProxySpec::AuthenticatedSocks { scheme, host, port, .. } => {
                format!("{}://{}:{} (authenticated)", scheme, host, port)
            }
            ProxySpec::Direct(raw) => match Url::parse(raw) {
                Ok(url) => format!(
                    "{}://{}:{}",
                    url.scheme(),
                    url.host_str().unwrap_or_default(),
                    url.port_or_known_default().unwrap_or_default()
                ),
                Err(_) => raw.clone(),
            },
        }
    }
}

/// Uniform random pick from the configured pool, if any.
pub fn choose(pool: &[String]) -> Option<ProxySpec> {
    pool.choose(&mut rand::thread_rng()).map(|raw| ProxySpec::parse(raw))
}

/// Extension sources for an authenticated SOCKS proxy.
pub struct ProxyExtension {
    pub manifest: String,
    pub background: String,
}

impl ProxyExtension {
    pub fn new(scheme: &str, host: &str, port: u16, username: &str, password: &str) -> Self {
        let manifest = json!({
            "version": "1.0.0",
            "manifest_version": 2,
            "name": "Chrome Proxy",
            "permissions": [
                "proxy",
                "tabs",
                "unlimitedStorage",
                "storage",
                "<all_urls>",
                "webRequest",
                "webRequestBlocking"
            ],
            "background": { "scripts": ["background.js"] }
        });

        let config = json!({
            "mode": "fixed_servers",
            "rules": {
                "singleProxy": { "scheme": scheme, "host": host, "port": port },
                "bypassList": ["localhost"]
            }
        });
        let credentials = json!({
            "authCredentials": { "username": username, "password": password }
        });

        let background = format!(
            r#"var config = {config};
chrome.proxy.settings.set({{value: config, scope: "regular"}}, function() {{}});
function callbackFn(details) {{
    return {credentials};
}}
chrome.webRequest.onAuthRequired.addListener(
    callbackFn,
    {{urls: ["<all_urls>"]}},
    ['blocking']
);
"#
        );

        Self {
            manifest: manifest.to_string(),
            background,
        }
    }

    /// Write the extension into `dir` and return the directory to load.
    pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join("manifest.json"), &self.manifest)?;
        fs::write(dir.join("background.js"), &self.background)?;
        dir.canonicalize()
    }
}
