use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::models::{Activity, ClientInfo, Field, JobRecord};
use crate::selectors::{self, SelectorChain, collapse_whitespace, non_empty, select_text, text_of};

/// Present once a posting page has rendered.
pub const DETAIL_READY_SELECTOR: &str = r#"[data-test="JobDetailsVisitor"]"#;

const PROPOSALS_LABEL: &str = "Proposals";
const LAST_VIEWED_LABEL: &str = "Last viewed";
const INTERVIEWING_LABEL: &str = "Interviewing";
const INVITES_SENT_LABEL: &str = "Invites sent";
const UNANSWERED_INVITES_LABEL: &str = "Unanswered invites";

/// Parses a single posting page and merges what it finds into the record
/// built from the search tile.
pub struct DetailExtractor {
    description: SelectorChain,
    client_section: SelectorChain,
    member_since: SelectorChain,
    country: SelectorChain,
    city: SelectorChain,
    local_time: SelectorChain,
    spend: SelectorChain,
    hires: SelectorChain,
    hours: SelectorChain,
    industry: SelectorChain,
    company_size: SelectorChain,
    activity_section: SelectorChain,
    item: Selector,
    value: Selector,
    spend_amount: Regex,
}

impl DetailExtractor {
    pub fn new() -> Result<Self> {
        let item = selectors::compile("li").context("Failed to compile list item selector")?;
        let value = selectors::compile(".value").context("Failed to compile value selector")?;
        let spend_amount = Regex::new(r"(\$[\d,.]+[KM]?)")?;

        Ok(Self {
            description: SelectorChain::new(&[r#"[data-test="Description"] p"#]),
            client_section: SelectorChain::new(&[r#"[data-test="AboutClientVisitor"]"#]),
            member_since: SelectorChain::new(&[r#"[data-qa="client-contract-date"] small"#]),
            country: SelectorChain::new(&[r#"[data-qa="client-location"] strong"#]),
            city: SelectorChain::new(&[r#"[data-qa="client-location"] .nowrap:nth-of-type(1)"#]),
            local_time: SelectorChain::new(&[r#"[data-qa="client-location"] [data-test="LocalTime"]"#]),
            spend: SelectorChain::new(&[r#"[data-qa="client-spend"]"#]),
            hires: SelectorChain::new(&[r#"[data-qa="client-hires"]"#]),
            hours: SelectorChain::new(&[r#"[data-qa="client-hours"]"#]),
            industry: SelectorChain::new(&[r#"[data-qa="client-company-profile-industry"]"#]),
            company_size: SelectorChain::new(&[r#"[data-qa="client-company-profile-size"]"#]),
            activity_section: SelectorChain::new(&[r#"[data-test="ClientActivity"]"#]),
            item,
            value,
            spend_amount,
        })
    }

    /// Merge detail-page fields into `job`. Fields already on the record are
    /// only replaced by values actually found on the page. An empty page
    /// leaves the record untouched and `full_details_fetched` unset.
    pub fn merge(&self, html: &str, job: &mut JobRecord) {
        if html.trim().is_empty() {
            debug!("No detail HTML for {}, keeping listing data", job.job_uid);
            return;
        }

        let document = Html::parse_document(html);
        let root = document.root_element();

        if let Some(description) = self.description.text(root) {
            job.description = description;
        }

        match self.client_section.first(root) {
            Some(section) => job.client.merge(self.client_info(section)),
            None => debug!("No client section on posting {}", job.job_uid),
        }

        match self.activity_section.first(root) {
            Some(section) => job.activity.merge(self.activity(section)),
            None => debug!("No activity section on posting {}", job.job_uid),
        }

        job.full_details_fetched = true;
    }

    fn client_info(&self, section: ElementRef<'_>) -> ClientInfo {
        ClientInfo {
            member_since: Field::from(self.member_since.text(section)),
            location: Field::from(self.location(section)),
            spend: Field::from(self.spend(section)),
            hires: Field::from(self.hires.text(section)),
            hours: Field::from(self.hours.text(section).map(|h| collapse_whitespace(&h))),
            company: Field::from(self.company(section)),
        }
    }

    /// "Country (City | 3:04 PM)", degrading to whichever parts exist.
    fn location(&self, section: ElementRef<'_>) -> Option<String> {
        let country = self.country.text(section);
        let details: Vec<String> = [self.city.text(section), self.local_time.text(section)]
            .into_iter()
            .flatten()
            .collect();

        match (country, details.is_empty()) {
            (Some(country), true) => Some(country),
            (Some(country), false) => Some(format!("{} ({})", country, details.join(" | "))),
            (None, false) => Some(details.join(" | ")),
            (None, true) => None,
        }
    }

    /// Dollar amount if one can be picked out, otherwise the raw text.
    fn spend(&self, section: ElementRef<'_>) -> Option<String> {
        let text = self.spend.text(section)?;
        match self.spend_amount.captures(&text) {
            Some(caps) => Some(caps[1].to_string()),
            None => Some(text),
        }
    }

    fn company(&self, section: ElementRef<'_>) -> Option<String> {
        let industry = self.industry.text(section)?;
        Some(match self.company_size.text(section) {
            Some(size) => format!("{} ({})", industry, size),
            None => industry,
        })
    }

    fn activity(&self, section: ElementRef<'_>) -> Activity {
        let items: Vec<ElementRef<'_>> = section.select(&self.item).collect();

        let proposals = items
            .first()
            .and_then(|item| self.labeled_value(*item, PROPOSALS_LABEL));

        // Second row is only trusted when it is actually the last-viewed row.
        let last_viewed = items
            .get(1)
            .filter(|item| text_of(**item).contains(LAST_VIEWED_LABEL))
            .and_then(|item| self.labeled_value(*item, LAST_VIEWED_LABEL));

        Activity {
            proposals: Field::from(proposals),
            last_viewed: Field::from(last_viewed),
            interviewing: Field::from(self.find_labeled(&items, INTERVIEWING_LABEL)),
            invites_sent: Field::from(self.find_labeled(&items, INVITES_SENT_LABEL)),
            unanswered_invites: Field::from(self.find_labeled(&items, UNANSWERED_INVITES_LABEL)),
        }
    }

    /// These rows move around between page versions, so scan for the label.
    fn find_labeled(&self, items: &[ElementRef<'_>], label: &str) -> Option<String> {
        items
            .iter()
            .find(|item| text_of(**item).contains(label))
            .and_then(|item| self.labeled_value(*item, label))
    }

    /// The row's `.value` element, or the text after the label's colon.
    fn labeled_value(&self, item: ElementRef<'_>, label: &str) -> Option<String> {
        if let Some(value) = select_text(item, &self.value) {
            return Some(value);
        }
        let text = text_of(item);
        let rest = text.split_once(label).map(|(_, rest)| rest)?;
        let value = rest.split_once(':').map_or(rest, |(_, value)| value);
        non_empty(value.trim().to_string())
    }
}
