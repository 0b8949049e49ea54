//! Optional debug dumps of fetched pages and outgoing alerts.

use chrono::Local;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct ArtifactOptions {
    pub save_search_html: bool,
    pub save_post_html: bool,
    pub save_messages: bool,
}

/// Writes debug artifacts under a root directory. Failures are logged and
/// swallowed: a broken debug dump must not stop an alert.
pub struct ArtifactSink {
    root: PathBuf,
    options: ArtifactOptions,
    script: Option<Regex>,
}

impl ArtifactSink {
    pub fn new(root: impl Into<PathBuf>, options: ArtifactOptions) -> Self {
        let script = match Regex::new(r"(?is)<script\b[^>]*>.*?</script>") {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Script stripping disabled: {}", e);
                None
            }
        };
        Self { root: root.into(), options, script }
    }

    pub fn save_search_html(&self, search_url: &str, html: &str) {
        if self.options.save_search_html {
            self.write_html("search_html", &search_id(search_url), html);
        }
    }

    pub fn save_post_html(&self, job_uid: &str, html: &str) {
        if self.options.save_post_html {
            let id = if job_uid.is_empty() { "unknown" } else { job_uid };
            self.write_html("job_html", id, html);
        }
    }

    pub fn save_message(&self, message: &str) {
        if self.options.save_messages {
            let path = self.root.join("alert_messages").join(format!("{}.txt", timestamp()));
            self.write(&path, message);
        }
    }

    /// Always written: a page with no recognisable tiles is the first sign
    /// of markup drift.
    pub fn save_unparsed_search(&self, html: &str) {
        let path = self
            .root
            .join("search_html")
            .join(format!("debug_empty_search_{}.html", timestamp()));
        self.write(&path, html);
    }

    fn write_html(&self, kind: &str, id: &str, html: &str) {
        let path = self.root.join(kind).join(format!("{}_{}.html", timestamp(), id));
        self.write(&path, &self.strip_scripts(html));
    }

    fn strip_scripts(&self, html: &str) -> String {
        match &self.script {
            Some(re) => re.replace_all(html, "").into_owned(),
            None => html.to_string(),
        }
    }

    fn write(&self, path: &Path, contents: &str) {
        match write_file(path, contents) {
            Ok(()) => info!("Saved {}", path.display()),
            Err(e) => warn!("Failed to save {}: {}", path.display(), e),
        }
    }
}

fn write_file(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Last path segment of a search URL, without the query string.
fn search_id(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    match path.trim_end_matches('/').rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => "search".to_string(),
    }
}
