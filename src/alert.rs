use std::fmt::{self, Write};
use tracing::warn;

use crate::models::{Field, JobRecord};

pub const DEFAULT_MAX_DESCRIPTION_LENGTH: usize = 300;

/// Renders job records as Telegram HTML messages.
#[derive(Debug, Clone)]
pub struct AlertFormatter {
    max_description_length: usize,
}

impl Default for AlertFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DESCRIPTION_LENGTH)
    }
}

impl AlertFormatter {
    pub fn new(max_description_length: usize) -> Self {
        Self { max_description_length }
    }

    /// Never fails: if the full message cannot be built, a one-line
    /// message with the title and link is returned instead.
    pub fn format(&self, job: &JobRecord) -> String {
        match self.render(job) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to format alert for {}: {}", job.job_uid, e);
                self.minimal(job)
            }
        }
    }

    fn minimal(&self, job: &JobRecord) -> String {
        format!("New Job: {} - See details at {}", escape(&job.title), escape(&job.url))
    }

    fn render(&self, job: &JobRecord) -> Result<String, fmt::Error> {
        let mut out = String::new();

        writeln!(out, "<b>🔔 NEW JOB: {}</b>", escape(&job.title))?;
        writeln!(out, "<b>💰 Budget:</b> {}", escape(&job.budget.to_string()))?;
        writeln!(out, "<b>⏰ Posted:</b> {}", escape(&job.posted_time))?;
        writeln!(out, "<b>📋 Job Type:</b> {}", job.job_type)?;
        writeln!(out, "<b>⚙️ Experience:</b> {}", escape(&job.experience_level.to_string()))?;
        writeln!(out, "<b>⏳ Duration:</b> {}", escape(&job.duration.to_string()))?;

        if !job.skills.is_empty() {
            writeln!(out, "<b>🔧 Skills:</b> {}", escape(&job.skills.join(", ")))?;
        }

        writeln!(out, "\n<b>📄 Description:</b>")?;
        writeln!(out, "{}", escape(&truncate(&job.description, self.max_description_length)))?;

        let client = [
            ("👤 Client Since", &job.client.member_since),
            ("📍 Location", &job.client.location),
            ("💵 Total Spent", &job.client.spend),
            ("🤝 Hires", &job.client.hires),
            ("⏰ Hours", &job.client.hours),
            ("🏢 Company", &job.client.company),
        ];
        write_block(&mut out, "CLIENT INFO", &client)?;

        let activity = [
            ("📝 Proposals", &job.activity.proposals),
            ("👁 Last Viewed", &job.activity.last_viewed),
            ("🗣 Interviewing", &job.activity.interviewing),
            ("✉️ Invites Sent", &job.activity.invites_sent),
            ("📭 Unanswered Invites", &job.activity.unanswered_invites),
        ];
        write_block(&mut out, "JOB ACTIVITY", &activity)?;

        write!(out, "\n<a href=\"{}\">👉 Apply on Upwork</a>", escape(&job.url))?;
        Ok(out)
    }
}

/// A titled block listing only the fields that have values; nothing at all
/// when every field is missing.
fn write_block(out: &mut String, heading: &str, fields: &[(&str, &Field)]) -> fmt::Result {
    let present: Vec<(&str, &str)> = fields
        .iter()
        .filter_map(|(label, field)| field.get().map(|value| (*label, value)))
        .collect();
    if present.is_empty() {
        return Ok(());
    }

    writeln!(out, "\n<b>{}:</b>", heading)?;
    for (label, value) in present {
        writeln!(out, "<b>{}:</b> {}", label, escape(value))?;
    }
    Ok(())
}

/// Cut to `max` characters, marking the cut with "...".
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// Escape text for Telegram's HTML parse mode, including attribute values.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
