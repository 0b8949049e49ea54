//! Ordered selector fallbacks shared by the listing and detail extractors.
//!
//! Every field is described by a literal list of candidates tried most
//! specific first. The first candidate that structurally matches wins and
//! results from different candidates are never merged.

use scraper::{ElementRef, Selector};
use tracing::{trace, warn};

/// A field strategy: inspect a scope element using the extractor's
/// compiled selectors, maybe produce a value.
pub type Strategy<C> = fn(&C, ElementRef<'_>) -> Option<String>;

pub fn compile(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Invalid selector '{}': {:?}", css, e);
            None
        }
    }
}

pub struct SelectorChain {
    candidates: Vec<(&'static str, Selector)>,
}

impl SelectorChain {
    /// Candidates that fail to parse are dropped with a warning.
    pub fn new(candidates: &[&'static str]) -> Self {
        let candidates = candidates
            .iter()
            .filter_map(|css| compile(css).map(|selector| (*css, selector)))
            .collect();
        Self { candidates }
    }

    /// First element of the earliest candidate that matches anything.
    pub fn first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.candidates.iter().find_map(|(css, selector)| {
            let found = scope.select(selector).next();
            if found.is_some() {
                trace!("Matched selector '{}'", css);
            }
            found
        })
    }

    /// Every element of the earliest candidate that yields at least one match.
    pub fn all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        for (css, selector) in &self.candidates {
            let found: Vec<_> = scope.select(selector).collect();
            if !found.is_empty() {
                trace!("Matched {} elements with '{}'", found.len(), css);
                return found;
            }
        }
        Vec::new()
    }

    /// Text of the first match, blank text counting as no value.
    pub fn text(&self, scope: ElementRef<'_>) -> Option<String> {
        self.first(scope).map(text_of).and_then(non_empty)
    }
}

/// Apply strategies in order and keep the first value produced.
pub fn first_of<C>(ctx: &C, scope: ElementRef<'_>, strategies: &[Strategy<C>]) -> Option<String> {
    strategies.iter().find_map(|strategy| strategy(ctx, scope))
}

/// Element text with internal whitespace collapsed to single spaces.
pub fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() { None } else { Some(text) }
}

/// Text of the first descendant matching `selector`.
pub fn select_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).next().map(text_of).and_then(non_empty)
}
