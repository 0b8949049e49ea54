use serde::{Deserialize, Serialize};
use std::fmt;

pub const NOT_SPECIFIED: &str = "Not specified";
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_POSTED: &str = "Unknown";
pub const NO_DESCRIPTION: &str = "No description provided";

/// A scraped text value that may be missing. Displays as "Not specified"
/// when empty, so formatting code never has to special-case absence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field(Option<String>);

impl Field {
    /// Blank or whitespace-only input is treated as missing.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Field(None)
        } else {
            Field(Some(trimmed.to_string()))
        }
    }

    pub fn missing() -> Self {
        Field(None)
    }

    pub fn get(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_specified(&self) -> bool {
        self.0.is_some()
    }

    /// Overwrite with `other` only when it carries a value.
    pub fn merge(&mut self, other: Field) {
        if other.is_specified() {
            *self = other;
        }
    }
}

impl From<Option<String>> for Field {
    fn from(value: Option<String>) -> Self {
        value.map(Field::new).unwrap_or_default()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.get().unwrap_or(NOT_SPECIFIED))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    Hourly,
    Fixed,
    #[default]
    Unknown,
}

impl JobType {
    /// Classify a tile's type label by substring, "Hourly" winning over "Fixed".
    pub fn classify(label: &str) -> Self {
        if label.contains("Hourly") {
            JobType::Hourly
        } else if label.contains("Fixed") {
            JobType::Fixed
        } else {
            JobType::Unknown
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobType::Hourly => "Hourly",
            JobType::Fixed => "Fixed",
            JobType::Unknown => NOT_SPECIFIED,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub member_since: Field,
    pub location: Field,
    pub spend: Field,
    pub hires: Field,
    pub hours: Field,
    pub company: Field,
}

impl ClientInfo {
    pub fn merge(&mut self, other: ClientInfo) {
        self.member_since.merge(other.member_since);
        self.location.merge(other.location);
        self.spend.merge(other.spend);
        self.hires.merge(other.hires);
        self.hours.merge(other.hours);
        self.company.merge(other.company);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub proposals: Field,
    pub last_viewed: Field,
    pub interviewing: Field,
    pub invites_sent: Field,
    pub unanswered_invites: Field,
}

impl Activity {
    pub fn merge(&mut self, other: Activity) {
        self.proposals.merge(other.proposals);
        self.last_viewed.merge(other.last_viewed);
        self.interviewing.merge(other.interviewing);
        self.invites_sent.merge(other.invites_sent);
        self.unanswered_invites.merge(other.unanswered_invites);
    }
}

/// One posting discovered on a search page, optionally enriched from its
/// detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_uid: String,
    pub title: String,
    pub url: String, // absolute, empty when the tile had no link
    pub posted_time: String,
    pub job_type: JobType,
    pub budget: Field,
    pub experience_level: Field,
    pub duration: Field,
    pub description: String,
    pub skills: Vec<String>,
    pub full_details_fetched: bool,
    pub client: ClientInfo,
    pub activity: Activity,
}

impl Default for JobRecord {
    fn default() -> Self {
        Self {
            job_uid: String::new(),
            title: UNKNOWN_TITLE.to_string(),
            url: String::new(),
            posted_time: UNKNOWN_POSTED.to_string(),
            job_type: JobType::Unknown,
            budget: Field::missing(),
            experience_level: Field::missing(),
            duration: Field::missing(),
            description: NO_DESCRIPTION.to_string(),
            skills: Vec::new(),
            full_details_fetched: false,
            client: ClientInfo::default(),
            activity: Activity::default(),
        }
    }
}

impl JobRecord {
    pub fn has_uid(&self) -> bool {
        !self.job_uid.trim().is_empty()
    }
}
