use anyhow::Result;
use chrono::Local;
use std::thread;
use tracing::{debug, error, info, warn};

use crate::alert::AlertFormatter;
use crate::artifacts::ArtifactSink;
use crate::browser::PageFetcher;
use crate::config::Config;
use crate::detail::{DETAIL_READY_SELECTOR, DetailExtractor};
use crate::history::JobHistory;
use crate::listing::{LISTING_READY_SELECTOR, ListingExtractor};
use crate::models::JobRecord;
use crate::notify::Notifier;
use crate::pacing::{self, Pacing};

/// What happened during one pass over every search target.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub targets: usize,
    pub failed_targets: usize,
    pub listed: usize,
    pub new_jobs: usize,
    pub already_seen: usize,
    pub missing_uid: usize,
    pub delivery_failures: usize,
    pub history_saved: bool,
}

/// Fetch, parse, dedupe and notify, one search target at a time, forever.
pub struct Poller<F, N> {
    search_urls: Vec<String>,
    fetcher: F,
    notifier: N,
    listing: ListingExtractor,
    detail: DetailExtractor,
    formatter: AlertFormatter,
    history: JobHistory,
    artifacts: ArtifactSink,
    pacing: Pacing,
}

impl<F: PageFetcher, N: Notifier> Poller<F, N> {
    pub fn new(config: &Config, fetcher: F, notifier: N, history: JobHistory, pacing: Pacing) -> Result<Self> {
        Ok(Self {
            search_urls: config.search_urls.clone(),
            fetcher,
            notifier,
            listing: ListingExtractor::new(&config.site_base_url)?,
            detail: DetailExtractor::new()?,
            formatter: AlertFormatter::new(config.max_description_length),
            history,
            artifacts: ArtifactSink::new(&config.debug_dir, config.artifacts.clone()),
            pacing,
        })
    }

    pub fn history(&self) -> &JobHistory {
        &self.history
    }

    /// Poll until the process is killed.
    pub fn run(&mut self) {
        loop {
            info!("Starting search at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
            let report = self.run_round();
            info!(
                "Round finished: {} listed, {} new, {} already seen, {} targets failed",
                report.listed, report.new_jobs, report.already_seen, report.failed_targets
            );

            let delay = self.pacing.next_round_delay();
            let next_check = Local::now() + chrono::Duration::seconds(delay.as_secs() as i64);
            info!(
                "Next check in about {} minutes at approximately {}",
                delay.as_secs() / 60,
                next_check.format("%H:%M:%S")
            );
            thread::sleep(delay);
        }
    }

    /// One pass over every target. History is written whenever it holds
    /// uids not yet on disk, including ones left over from a failed save.
    pub fn run_round(&mut self) -> RoundReport {
        let mut report = RoundReport::default();
        let targets = self.search_urls.clone();

        for url in &targets {
            report.targets += 1;
            self.process_target(url, &mut report);
            pacing::pause(&self.pacing.between_targets);
        }

        if self.history.is_dirty() {
            match self.history.persist() {
                Ok(()) => {
                    report.history_saved = true;
                    info!("Job history updated, now tracking {} jobs", self.history.len());
                }
                Err(e) => error!("Failed to save job history: {}", e),
            }
        }

        report
    }

    fn process_target(&mut self, url: &str, report: &mut RoundReport) {
        info!("Processing search URL: {}", url);

        let page = match self.fetcher.fetch(url, Some(LISTING_READY_SELECTOR)) {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to fetch search page: {}", e);
                report.failed_targets += 1;
                return;
            }
        };
        if !page.ready {
            debug!("Search page rendered without job tiles becoming ready");
        }
        self.artifacts.save_search_html(url, &page.html);

        let jobs = self.listing.extract(&page.html);
        if jobs.is_empty() {
            self.artifacts.save_unparsed_search(&page.html);
            return;
        }
        report.listed += jobs.len();

        for job in jobs {
            if !job.has_uid() {
                debug!("Ignoring tile without a job uid: {}", job.title);
                report.missing_uid += 1;
                continue;
            }
            if self.history.contains(&job.job_uid) {
                info!("Skipping already seen job: {}", job.title);
                report.already_seen += 1;
                continue;
            }
            self.alert(job, report);
        }
    }

    /// Enrich, format and send. The uid is marked seen even when delivery
    /// fails, so a failed alert is not retried.
    fn alert(&mut self, mut job: JobRecord, report: &mut RoundReport) {
        info!("Found new job: {}", job.title);
        self.enrich(&mut job);

        let message = self.formatter.format(&job);
        self.artifacts.save_message(&message);

        if let Err(e) = self.notifier.send(&message) {
            error!("Failed to send alert for {}: {}", job.job_uid, e);
            report.delivery_failures += 1;
        }

        self.history.add(&job.job_uid);
        report.new_jobs += 1;
    }

    fn enrich(&self, job: &mut JobRecord) {
        if job.url.is_empty() {
            debug!("No posting URL for {}, alerting with listing data", job.job_uid);
            return;
        }

        info!("Processing job posting: {}", job.title);
        match self.fetcher.fetch(&job.url, Some(DETAIL_READY_SELECTOR)) {
            Ok(page) => {
                self.artifacts.save_post_html(&job.job_uid, &page.html);
                self.detail.merge(&page.html, job);
            }
            Err(e) => warn!("Failed to fetch job posting, alerting with listing data: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactOptions;
    use crate::browser::{FetchError, Page};
    use crate::notify::NotifyError;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    const SEARCH_A: &str = "https://www.upwork.com/nx/search/jobs/?q=rust";
    const SEARCH_B: &str = "https://www.upwork.com/nx/search/jobs/?q=scraping";
    const DETAIL_URL: &str = "https://www.upwork.com/jobs/~abc123";

    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<String, String>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl PageFetcher for FakeFetcher {
        fn fetch(&self, url: &str, _wait_for: Option<&str>) -> Result<Page, FetchError> {
            self.calls.borrow_mut().push(url.to_string());
            match self.pages.get(url) {
                Some(html) => Ok(Page { html: html.clone(), ready: true }),
                None => Err(FetchError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_RESET".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: RefCell<Vec<String>>,
        fail: Cell<bool>,
    }

    impl Notifier for FakeNotifier {
        fn send(&self, message: &str) -> Result<(), NotifyError> {
            self.sent.borrow_mut().push(message.to_string());
            if self.fail.get() {
                return Err(NotifyError::Rejected {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    body: "upstream down".to_string(),
                });
            }
            Ok(())
        }
    }

    fn config(dir: &Path, search_urls: &[&str]) -> Config {
        Config {
            bot_token: "token".to_string(),
            chat_id: "42".to_string(),
            search_urls: search_urls.iter().map(|s| s.to_string()).collect(),
            proxies: Vec::new(),
            check_interval: Duration::ZERO,
            max_description_length: 300,
            history_file: dir.join("job_history.json"),
            debug_dir: dir.join("debug"),
            artifacts: ArtifactOptions::default(),
            headless: true,
            site_base_url: "https://www.upwork.com".to_string(),
            plugin_dir: dir.join("proxy_auth_plugin"),
        }
    }

    fn poller<'a>(
        config: &Config,
        fetcher: &'a FakeFetcher,
        notifier: &'a FakeNotifier,
    ) -> Poller<&'a FakeFetcher, &'a FakeNotifier> {
        let history = JobHistory::load(&config.history_file);
        Poller::new(config, fetcher, notifier, history, Pacing::none()).unwrap()
    }

    fn listing_page(tiles: &[(&str, &str)]) -> String {
        let tiles: String = tiles
            .iter()
            .map(|(uid, href)| {
                format!(
                    r#"<article class="job-tile" data-test="JobTile" data-ev-job-uid="{uid}">
                         <h2 class="job-tile-title"><a href="{href}">Build a scraper</a></h2>
                         <span data-test="job-type-label">Hourly: $20.00 - $35.00</span>
                       </article>"#
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", tiles)
    }

    const DETAIL_PAGE: &str = r#"
        <html><body><div data-test="JobDetailsVisitor">
          <div data-test="Description"><p>Full description from the posting.</p></div>
          <div data-test="ClientActivity"><ul>
            <li>Proposals: <span class="value">Less than 5</span></li>
          </ul></div>
        </div></body></html>"#;

    #[test]
    fn test_new_job_is_enriched_alerted_and_persisted() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path(), &[SEARCH_A]);
        let fetcher = FakeFetcher::default()
            .with_page(SEARCH_A, &listing_page(&[("abc123", "/jobs/~abc123")]))
            .with_page(DETAIL_URL, DETAIL_PAGE);
        let notifier = FakeNotifier::default();

        let mut poller = poller(&config, &fetcher, &notifier);
        let report = poller.run_round();

        assert_eq!(report.new_jobs, 1);
        assert!(report.history_saved);
        assert_eq!(fetcher.calls(), vec![SEARCH_A, DETAIL_URL]);

        let sent = notifier.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("NEW JOB: Build a scraper"));
        assert!(sent[0].contains("$20.00 - $35.00 per hour"));
        assert!(sent[0].contains("Full description from the posting."));
        assert!(sent[0].contains("<b>📝 Proposals:</b> Less than 5"));

        assert!(JobHistory::load(&config.history_file).contains("abc123"));
    }

    #[test]
    fn test_seen_job_is_not_refetched_or_realerted() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path(), &[SEARCH_A]);
        let mut preloaded = JobHistory::load(&config.history_file);
        preloaded.add("abc123");
        preloaded.persist().unwrap();

        let fetcher = FakeFetcher::default()
            .with_page(SEARCH_A, &listing_page(&[("abc123", "/jobs/~abc123")]))
            .with_page(DETAIL_URL, DETAIL_PAGE);
        let notifier = FakeNotifier::default();

        let mut poller = poller(&config, &fetcher, &notifier);
        let report = poller.run_round();

        assert_eq!(report.already_seen, 1);
        assert_eq!(report.new_jobs, 0);
        assert!(!report.history_saved);
        assert_eq!(fetcher.calls(), vec![SEARCH_A]);
        assert!(notifier.sent.borrow().is_empty());
        assert_eq!(poller.history().uids(), vec!["abc123"]);
    }

    #[test]
    fn test_repeated_rounds_alert_once() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path(), &[SEARCH_A]);
        let fetcher = FakeFetcher::default()
            .with_page(SEARCH_A, &listing_page(&[("abc123", "/jobs/~abc123"), ("abc123", "/jobs/~abc123")]))
            .with_page(DETAIL_URL, DETAIL_PAGE);
        let notifier = FakeNotifier::default();

        let mut poller = poller(&config, &fetcher, &notifier);
        for _ in 0..3 {
            poller.run_round();
        }

        assert_eq!(notifier.sent.borrow().len(), 1);
        assert_eq!(fetcher.calls().iter().filter(|url| *url == DETAIL_URL).count(), 1);
    }

    #[test]
    fn test_failed_target_does_not_stop_round() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path(), &[SEARCH_A, SEARCH_B]);
        let fetcher = FakeFetcher::default()
            .with_page(SEARCH_B, &listing_page(&[("abc123", "/jobs/~abc123")]))
            .with_page(DETAIL_URL, DETAIL_PAGE);
        let notifier = FakeNotifier::default();

        let mut poller = poller(&config, &fetcher, &notifier);
        let report = poller.run_round();

        assert_eq!(report.targets, 2);
        assert_eq!(report.failed_targets, 1);
        assert_eq!(report.new_jobs, 1);
        assert_eq!(notifier.sent.borrow().len(), 1);
    }

    #[test]
    fn test_delivery_failure_still_marks_seen() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path(), &[SEARCH_A]);
        let fetcher = FakeFetcher::default()
            .with_page(SEARCH_A, &listing_page(&[("abc123", "/jobs/~abc123")]))
            .with_page(DETAIL_URL, DETAIL_PAGE);
        let notifier = FakeNotifier::default();
        notifier.fail.set(true);

        let mut poller = poller(&config, &fetcher, &notifier);
        let report = poller.run_round();
        assert_eq!(report.delivery_failures, 1);
        assert!(report.history_saved);

        notifier.fail.set(false);
        poller.run_round();
        assert_eq!(notifier.sent.borrow().len(), 1);
    }

    #[test]
    fn test_failed_save_is_retried_next_round() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("state");
        fs::write(&blocker, "").unwrap();
        let mut config = config(dir.path(), &[SEARCH_A]);
        config.history_file = blocker.join("job_history.json");

        let fetcher = FakeFetcher::default()
            .with_page(SEARCH_A, &listing_page(&[("abc123", "/jobs/~abc123")]))
            .with_page(DETAIL_URL, DETAIL_PAGE);
        let notifier = FakeNotifier::default();
        let mut poller = poller(&config, &fetcher, &notifier);

        let first = poller.run_round();
        assert_eq!(first.new_jobs, 1);
        assert!(!first.history_saved);

        fs::remove_file(&blocker).unwrap();
        let second = poller.run_round();
        assert_eq!(second.new_jobs, 0);
        assert!(second.history_saved);
        assert!(JobHistory::load(&config.history_file).contains("abc123"));

        assert!(!poller.run_round().history_saved);
    }

    #[test]
    fn test_detail_failure_alerts_with_listing_data() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path(), &[SEARCH_A]);
        let fetcher =
            FakeFetcher::default().with_page(SEARCH_A, &listing_page(&[("abc123", "/jobs/~abc123")]));
        let notifier = FakeNotifier::default();

        let mut poller = poller(&config, &fetcher, &notifier);
        let report = poller.run_round();

        assert_eq!(report.new_jobs, 1);
        let sent = notifier.sent.borrow();
        assert!(sent[0].contains("No description provided"));
        assert!(!sent[0].contains("JOB ACTIVITY"));
    }

    #[test]
    fn test_tiles_without_uid_are_ignored() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path(), &[SEARCH_A]);
        let fetcher = FakeFetcher::default().with_page(SEARCH_A, &listing_page(&[("", "/jobs/~nouid")]));
        let notifier = FakeNotifier::default();

        let mut poller = poller(&config, &fetcher, &notifier);
        let report = poller.run_round();

        assert_eq!(report.missing_uid, 1);
        assert_eq!(report.new_jobs, 0);
        assert!(poller.history().is_empty());
        assert!(!config.history_file.exists());
    }

    #[test]
    fn test_page_without_tiles_is_dumped_for_debugging() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path(), &[SEARCH_A]);
        let fetcher = FakeFetcher::default().with_page(SEARCH_A, "<html><body>Are you a robot?</body></html>");
        let notifier = FakeNotifier::default();

        let mut poller = poller(&config, &fetcher, &notifier);
        let report = poller.run_round();

        assert_eq!(report.listed, 0);
        assert!(config.debug_dir.join("search_html").is_dir());
    }
}
