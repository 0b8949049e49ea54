use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::models::{Field, JobRecord, JobType, UNKNOWN_POSTED};
use crate::selectors::{self, SelectorChain, Strategy, first_of, non_empty, text_of};

/// Present once the search results have rendered.
pub const LISTING_READY_SELECTOR: &str = r#"article.job-tile[data-test="JobTile"]"#;

const TILE_SELECTORS: &[&str] = &[
    LISTING_READY_SELECTOR,
    r#"article[data-test="JobTile"], article.job-tile"#,
    r#"[data-test="JobTile"]"#,
];

const TITLE_SELECTORS: &[&str] = &[
    "h2.job-tile-title a",
    "h2.h5.job-tile-title a",
    r#"[data-test="job-tile-title-link"]"#,
    r#"[data-test="job-tile-title"] a"#,
    "a.air3-link",
];

const SKILL_SELECTORS: &[&str] = &[
    r#"[data-test="TokenClamp"] [data-test="token"]"#,
    r#"[data-test="TokenClamp JobAttrs"] [data-test="token"]"#,
    r#".air3-token-container [data-test="token"]"#,
    r#".skills-list [data-test="Skill"] span.air3-badge"#,
];

const UID_ATTRIBUTES: &[&str] = &["data-ev-job-uid", "data-test-key"];

const POSTED_TIME_STRATEGIES: &[Strategy<ListingExtractor>] = &[
    ListingExtractor::posted_from_published_date,
    ListingExtractor::posted_from_posted_on,
];

/// Turns a rendered search-results page into partial job records.
pub struct ListingExtractor {
    base_url: Url,
    tiles: SelectorChain,
    title: SelectorChain,
    skills: SelectorChain,
    published_date: SelectorChain,
    posted_on: SelectorChain,
    type_label: SelectorChain,
    fixed_budget: SelectorChain,
    experience: SelectorChain,
    duration: SelectorChain,
    description: SelectorChain,
    span: Selector,
    hourly_rate: Regex,
}

impl ListingExtractor {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid site base URL: {}", base_url))?;
        let span = selectors::compile("span").context("Failed to compile span selector")?;
        let hourly_rate = Regex::new(r"\$(\d+\.\d+)\s*-\s*\$(\d+\.\d+)")?;

        Ok(Self {
            base_url,
            tiles: SelectorChain::new(TILE_SELECTORS),
            title: SelectorChain::new(TITLE_SELECTORS),
            skills: SelectorChain::new(SKILL_SELECTORS),
            published_date: SelectorChain::new(&[r#"[data-test="job-pubilshed-date"]"#]),
            posted_on: SelectorChain::new(&[r#"[data-test="PostedOn"]"#]),
            type_label: SelectorChain::new(&[r#"[data-test="job-type-label"]"#]),
            fixed_budget: SelectorChain::new(&[r#"[data-test="is-fixed-price"] strong:nth-of-type(2)"#]),
            experience: SelectorChain::new(&[r#"[data-test="experience-level"] strong"#]),
            duration: SelectorChain::new(&[r#"[data-test="duration-label"] strong:nth-of-type(2)"#]),
            description: SelectorChain::new(&[".air3-line-clamp p"]),
            span,
            hourly_rate,
        })
    }

    /// Every posting tile on the page, in page order. Tiles without a
    /// usable uid are still returned; callers decide what to do with them.
    pub fn extract(&self, html: &str) -> Vec<JobRecord> {
        if html.trim().is_empty() {
            return Vec::new();
        }

        let document = Html::parse_document(html);
        let tiles = self.tiles.all(document.root_element());
        if tiles.is_empty() {
            warn!("No job tiles found in search results; markup may have changed");
            return Vec::new();
        }
        info!("Found {} job tiles in search results", tiles.len());

        let jobs: Vec<JobRecord> = tiles.into_iter().map(|tile| self.extract_tile(tile)).collect();
        debug!("Extracted {} job records", jobs.len());
        jobs
    }

    fn extract_tile(&self, tile: ElementRef<'_>) -> JobRecord {
        let mut job = JobRecord::default();

        job.job_uid = UID_ATTRIBUTES
            .iter()
            .filter_map(|attr| tile.value().attr(attr))
            .map(str::trim)
            .find(|uid| !uid.is_empty())
            .unwrap_or_default()
            .to_string();

        match self.title.first(tile) {
            Some(link) => {
                if let Some(title) = non_empty(text_of(link)) {
                    job.title = title;
                }
                if let Some(href) = link.value().attr("href") {
                    job.url = self.resolve_url(href);
                }
            }
            None => debug!("No title link in tile {}", job.job_uid),
        }

        job.posted_time = first_of(self, tile, POSTED_TIME_STRATEGIES)
            .unwrap_or_else(|| UNKNOWN_POSTED.to_string());

        if let Some(label) = self.type_label.text(tile) {
            job.job_type = JobType::classify(&label);
            job.budget = match job.job_type {
                JobType::Hourly => self.hourly_budget(&label),
                JobType::Fixed => Field::from(self.fixed_budget.text(tile)),
                JobType::Unknown => Field::missing(),
            };
        }

        job.experience_level = Field::from(self.experience.text(tile));
        job.duration = Field::from(self.duration.text(tile));
        if let Some(description) = self.description.text(tile) {
            job.description = description;
        }
        job.skills = self.extract_skills(tile);

        job
    }

    fn posted_from_published_date(&self, tile: ElementRef<'_>) -> Option<String> {
        let block = self.published_date.first(tile)?;
        let spans: Vec<_> = block.select(&self.span).collect();
        let posted = match spans.get(1) {
            Some(span) => text_of(*span),
            None => text_of(block).replace("Posted", "").trim().to_string(),
        };
        non_empty(posted)
    }

    fn posted_from_posted_on(&self, tile: ElementRef<'_>) -> Option<String> {
        let block = self.posted_on.first(tile)?;
        let posted = match block.select(&self.span).next() {
            Some(span) => text_of(span),
            None => text_of(block).replace("Posted", "").trim().to_string(),
        };
        non_empty(posted)
    }

    fn hourly_budget(&self, label: &str) -> Field {
        match self.hourly_rate.captures(label) {
            Some(caps) => Field::new(format!("${} - ${} per hour", &caps[1], &caps[2])),
            None => Field::missing(),
        }
    }

    fn extract_skills(&self, tile: ElementRef<'_>) -> Vec<String> {
        self.skills
            .all(tile)
            .into_iter()
            .filter_map(|token| {
                let text = match token.select(&self.span).next() {
                    Some(span) => text_of(span),
                    None => text_of(token),
                };
                non_empty(text)
            })
            .collect()
    }

    fn resolve_url(&self, href: &str) -> String {
        let href = href.trim();
        if href.starts_with("http") {
            return href.to_string();
        }
        match self.base_url.join(href) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("Could not resolve job link '{}': {}", href, e);
                href.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NO_DESCRIPTION, NOT_SPECIFIED, UNKNOWN_TITLE};

    fn extractor() -> ListingExtractor {
        ListingExtractor::new("https://www.upwork.com").unwrap()
    }

    fn page(tiles: &str) -> String {
        format!("<html><body><section>{}</section></body></html>", tiles)
    }

    const HOURLY_TILE: &str = r#"
        <article class="job-tile" data-test="JobTile" data-ev-job-uid="abc123">
          <div data-test="job-pubilshed-date"><span>Posted</span><span>5 minutes ago</span></div>
          <h2 class="h5 job-tile-title"><a href="/jobs/Build-scraper_~abc123/">Build a scraper</a></h2>
          <ul>
            <li data-test="job-type-label"><strong>Hourly: $20.00 - $35.00</strong></li>
            <li data-test="experience-level"><strong>Intermediate</strong></li>
            <li data-test="duration-label"><strong>Est. time:</strong> <strong>1 to 3 months</strong></li>
          </ul>
          <div class="air3-line-clamp"><p>Need a resilient scraper for listings.</p></div>
          <div data-test="TokenClamp">
            <span data-test="token"><span>Rust</span></span>
            <span data-test="token"><span>Web Scraping</span></span>
            <span data-test="token"><span>Rust</span></span>
          </div>
        </article>"#;

    #[test]
    fn test_extract_hourly_tile() {
        let jobs = extractor().extract(&page(HOURLY_TILE));
        assert_eq!(jobs.len(), 1);

        let job = &jobs[0];
        assert_eq!(job.job_uid, "abc123");
        assert_eq!(job.title, "Build a scraper");
        assert_eq!(job.url, "https://www.upwork.com/jobs/Build-scraper_~abc123/");
        assert_eq!(job.posted_time, "5 minutes ago");
        assert_eq!(job.job_type, JobType::Hourly);
        assert_eq!(job.budget.get(), Some("$20.00 - $35.00 per hour"));
        assert_eq!(job.experience_level.get(), Some("Intermediate"));
        assert_eq!(job.duration.get(), Some("1 to 3 months"));
        assert_eq!(job.description, "Need a resilient scraper for listings.");
        assert!(!job.full_details_fetched);
    }

    #[test]
    fn test_skills_keep_order_and_duplicates() {
        let jobs = extractor().extract(&page(HOURLY_TILE));
        assert_eq!(jobs[0].skills, vec!["Rust", "Web Scraping", "Rust"]);
    }

    #[test]
    fn test_extract_fixed_tile() {
        let tile = r#"
            <article data-test="JobTile" data-test-key="fixed-1">
              <div data-test="PostedOn">Posted <span>2 hours ago</span></div>
              <a class="air3-link" href="https://www.upwork.com/jobs/~fixed-1">Logo design</a>
              <span data-test="job-type-label">Fixed price</span>
              <div data-test="is-fixed-price"><strong>Budget:</strong> <strong>$500</strong></div>
            </article>"#;
        let jobs = extractor().extract(&page(tile));
        assert_eq!(jobs.len(), 1);

        let job = &jobs[0];
        assert_eq!(job.job_uid, "fixed-1");
        assert_eq!(job.url, "https://www.upwork.com/jobs/~fixed-1");
        assert_eq!(job.posted_time, "2 hours ago");
        assert_eq!(job.job_type, JobType::Fixed);
        assert_eq!(job.budget.get(), Some("$500"));
    }

    #[test]
    fn test_empty_page_yields_no_records() {
        assert!(extractor().extract("").is_empty());
        assert!(extractor().extract("<html><body><p>Nothing here</p></body></html>").is_empty());
    }

    #[test]
    fn test_bare_tile_falls_back_to_defaults() {
        let jobs = extractor().extract(&page(r#"<article class="job-tile"><p>broken</p></article>"#));
        assert_eq!(jobs.len(), 1);

        let job = &jobs[0];
        assert!(!job.has_uid());
        assert_eq!(job.title, UNKNOWN_TITLE);
        assert_eq!(job.url, "");
        assert_eq!(job.posted_time, UNKNOWN_POSTED);
        assert_eq!(job.job_type, JobType::Unknown);
        assert_eq!(job.budget.to_string(), NOT_SPECIFIED);
        assert_eq!(job.experience_level.to_string(), NOT_SPECIFIED);
        assert_eq!(job.duration.to_string(), NOT_SPECIFIED);
        assert_eq!(job.description, NO_DESCRIPTION);
        assert!(job.skills.is_empty());
    }

    #[test]
    fn test_primary_title_selector_wins() {
        let tile = r#"
            <article class="job-tile" data-test="JobTile" data-ev-job-uid="t1">
              <a class="air3-link" href="/jobs/other">Sidebar link</a>
              <h2 class="job-tile-title"><a href="/jobs/real">Real title</a></h2>
            </article>"#;
        let jobs = extractor().extract(&page(tile));
        assert_eq!(jobs[0].title, "Real title");
        assert_eq!(jobs[0].url, "https://www.upwork.com/jobs/real");
    }

    #[test]
    fn test_hourly_without_rate_leaves_budget_unknown() {
        let tile = r#"
            <article class="job-tile" data-test="JobTile" data-ev-job-uid="h2">
              <span data-test="job-type-label">Hourly</span>
            </article>"#;
        let jobs = extractor().extract(&page(tile));
        assert_eq!(jobs[0].job_type, JobType::Hourly);
        assert!(!jobs[0].budget.is_specified());
    }

    #[test]
    fn test_fallback_tile_selector_used_when_primary_misses() {
        let tiles = r#"
            <div data-test="JobTile" data-ev-job-uid="one"></div>
            <div data-test="JobTile" data-ev-job-uid="two"></div>"#;
        let uids: Vec<_> = extractor()
            .extract(&page(tiles))
            .into_iter()
            .map(|job| job.job_uid)
            .collect();
        assert_eq!(uids, vec!["one", "two"]);
    }
}
