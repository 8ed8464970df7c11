//! Selector heuristics that pull [`RawListing`]s out of a listing page.
//!
//! Venue sites share no markup, so extraction works from ranked CSS selector
//! lists ([`SelectorProfile`]). Candidate containers come from the profile's
//! container selectors and from the ancestors of anything that looks like a
//! date. Each container then yields a title, a date and whatever else it
//! carries.

use crate::config::SelectorProfile;
use crate::dates::normalize_date_text;
use crate::models::RawListing;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

const MAX_PER_SELECTOR: usize = 100;
const MAX_DATE_ANCHORS: usize = 50;
const ANCESTOR_LEVELS: usize = 4;
const TITLE_CHARS: std::ops::RangeInclusive<usize> = 5..=150;
const DESCRIPTION_MAX: usize = 500;

static DATE_ANCHORS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"time, [datetime], .date, [class*="date"]"#).unwrap()
});
static DATETIME_ATTR: Lazy<Selector> = Lazy::new(|| Selector::parse("[datetime]").unwrap());

const MONTHS: &str = r"(?:january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept?|oct|nov|dec)\.?";
const WEEKDAYS: &str = r"(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tue|tues|wed|thu|thur|thurs|fri|sat|sun)\.?";

/// Date shapes searched for in free container text, most specific first.
static DATE_SCAN: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"(?i)\b{MONTHS}\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}\b"),
        format!(r"(?i)\b\d{{1,2}}(?:st|nd|rd|th)?\s+{MONTHS}\s+\d{{4}}\b"),
        r"\b\d{4}-\d{2}-\d{2}\b".to_string(),
        r"\b\d{1,2}/\d{1,2}/\d{2,4}\b".to_string(),
        r"\b\d{1,2}-\d{1,2}-\d{4}\b".to_string(),
        format!(r"(?i)\b{WEEKDAYS},?\s+{MONTHS}\s+\d{{1,2}}\b"),
        format!(r"(?i)\b{MONTHS}\s+\d{{1,2}}(?:st|nd|rd|th)?\b"),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static TITLE_CUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+[—–]\s+|\|").unwrap());
static DATE_CUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\||buy tickets|view event|\bdaily\b").unwrap());
static PLACEHOLDER_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)1x1|placeholder|spinner|blank\.(gif|png)|data:image").unwrap());

const IMAGE_ATTRS: [&str; 4] = ["src", "data-src", "data-lazy-src", "data-original"];

fn collapse(text: &str) -> String {
    text.split_whitespace().join(" ")
}

fn first_line(text: &str) -> &str {
    text.trim().lines().next().unwrap_or("")
}

fn cut_at<'a>(text: &'a str, cut: &Regex) -> &'a str {
    cut.find(text).map_or(text, |m| &text[..m.start()])
}

fn truncate_chars(text: &str, max: usize, keep: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(keep).collect::<String>().trim_end())
    } else {
        text.to_string()
    }
}

fn title_text(text: &str) -> String {
    collapse(cut_at(first_line(text), &TITLE_CUT))
}

/// First line, cut at a dash separator or pipe, whitespace collapsed, long
/// titles truncated to 97 characters plus an ellipsis.
pub fn clean_title(text: &str) -> String {
    truncate_chars(&title_text(text), 100, 97)
}

/// First line, cut at ticket-button text, ordinals stripped, at most 100
/// characters.
pub fn clean_date_text(text: &str) -> String {
    let cut = collapse(cut_at(first_line(text), &DATE_CUT));
    normalize_date_text(&cut).chars().take(100).collect::<String>().trim().to_string()
}

/// Absolute form of `href` relative to `base`. Protocol-relative links get
/// `https:`; fragments and script links are dropped.
pub fn resolve_url(base: Option<&str>, href: &str) -> Option<String> {
    let href = href.trim();
    let lower = href.to_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
    {
        return None;
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Url::parse(&format!("https://{rest}")).ok().map(String::from);
    }
    if let Ok(url) = Url::parse(href) {
        return matches!(url.scheme(), "http" | "https").then(|| url.into());
    }
    let base = Url::parse(base?).ok()?;
    base.join(href).ok().map(String::from)
}

fn compile(selectors: &[String]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(sel) => Some(sel),
            Err(e) => {
                warn!(selector = %s, error = %e, "Ignoring invalid selector");
                None
            }
        })
        .collect()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

/// Compiled form of a [`SelectorProfile`].
struct Compiled {
    containers: Vec<Selector>,
    fallback_containers: Vec<Selector>,
    title: Vec<Selector>,
    date: Vec<Selector>,
    time: Vec<Selector>,
    description: Vec<Selector>,
    image: Vec<Selector>,
    link: Vec<Selector>,
    price: Vec<Selector>,
    kind: Vec<Selector>,
}

impl Compiled {
    fn new(p: &SelectorProfile) -> Self {
        Self {
            containers: compile(&p.containers),
            fallback_containers: compile(&p.fallback_containers),
            title: compile(&p.title),
            date: compile(&p.date),
            time: compile(&p.time),
            description: compile(&p.description),
            image: compile(&p.image),
            link: compile(&p.link),
            price: compile(&p.price),
            kind: compile(&p.kind),
        }
    }
}

fn gather_containers<'a>(
    document: &'a Html,
    selectors: &[Selector],
    with_date_anchors: bool,
) -> Vec<ElementRef<'a>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for sel in selectors {
        for el in document.select(sel).take(MAX_PER_SELECTOR) {
            if seen.insert(el.id()) {
                out.push(el);
            }
        }
    }
    if with_date_anchors {
        for anchor in document.select(&DATE_ANCHORS).take(MAX_DATE_ANCHORS) {
            for ancestor in anchor
                .ancestors()
                .filter_map(ElementRef::wrap)
                .take(ANCESTOR_LEVELS)
            {
                if matches!(ancestor.value().name(), "body" | "html") {
                    break;
                }
                if seen.insert(ancestor.id()) {
                    out.push(ancestor);
                }
            }
        }
    }
    out
}

fn first_text(
    container: ElementRef<'_>,
    selectors: &[Selector],
    accept: impl Fn(&str) -> bool,
) -> Option<String> {
    selectors.iter().find_map(|sel| {
        container
            .select(sel)
            .map(|el| collapse(&element_text(el)))
            .find(|t| accept(t))
    })
}

fn find_title(container: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        container
            .select(sel)
            .map(|el| title_text(&element_text(el)))
            .find(|t| TITLE_CHARS.contains(&t.chars().count()))
    })
}

fn find_date(container: ElementRef<'_>, selectors: &[Selector], text: &str) -> Option<String> {
    let attr = container
        .value()
        .attr("datetime")
        .or_else(|| {
            container
                .select(&DATETIME_ATTR)
                .find_map(|el| el.value().attr("datetime"))
        })
        .map(str::trim)
        .filter(|d| !d.is_empty());
    if let Some(d) = attr {
        return Some(d.to_string());
    }
    if let Some(d) = first_text(container, selectors, |t| t.chars().count() >= 4) {
        return Some(d);
    }
    DATE_SCAN
        .iter()
        .find_map(|re| re.find(text).map(|m| m.as_str().to_string()))
}

fn find_link(container: ElementRef<'_>, selectors: &[Selector], base: &str) -> Option<String> {
    let own = container
        .value()
        .attr("href")
        .and_then(|href| resolve_url(Some(base), href));
    own.or_else(|| {
        selectors.iter().find_map(|sel| {
            container
                .select(sel)
                .filter_map(|el| el.value().attr("href"))
                .find_map(|href| resolve_url(Some(base), href))
        })
    })
}

fn find_image(container: ElementRef<'_>, selectors: &[Selector], base: &str) -> Option<String> {
    selectors.iter().find_map(|sel| {
        container.select(sel).find_map(|el| {
            IMAGE_ATTRS
                .iter()
                .filter_map(|attr| el.value().attr(attr))
                .filter(|src| !PLACEHOLDER_IMAGE.is_match(src))
                .find_map(|src| resolve_url(Some(base), src))
        })
    })
}

fn listing_from(container: ElementRef<'_>, c: &Compiled, base: &str) -> Option<RawListing> {
    let title = find_title(container, &c.title)?;
    let text = collapse(&element_text(container));
    let date_text = find_date(container, &c.date, &text).unwrap_or_default();
    Some(RawListing {
        time_text: first_text(container, &c.time, |t| !t.is_empty()).unwrap_or_default(),
        kind: first_text(container, &c.kind, |t| (2..=40).contains(&t.len())).unwrap_or_default(),
        description: first_text(container, &c.description, |t| t.chars().count() >= 20)
            .map(|d| truncate_chars(&d, DESCRIPTION_MAX, DESCRIPTION_MAX - 3))
            .unwrap_or_default(),
        image_url: find_image(container, &c.image, base),
        event_url: find_link(container, &c.link, base),
        price_text: first_text(container, &c.price, |t| !t.is_empty()).unwrap_or_default(),
        title,
        date_text,
        text,
    })
}

fn listings_in(containers: &[ElementRef<'_>], c: &Compiled, base: &str) -> Vec<RawListing> {
    containers
        .iter()
        .filter_map(|el| listing_from(*el, c, base))
        .unique_by(|l| (l.title.to_lowercase(), l.date_text.clone()))
        .collect()
}

/// Every listing-shaped container on the page, in document discovery order.
pub fn extract_listings(html: &str, base_url: &str, profile: &SelectorProfile) -> Vec<RawListing> {
    let document = Html::parse_document(html);
    let compiled = Compiled::new(profile);

    let primary = gather_containers(&document, &compiled.containers, true);
    let mut listings = listings_in(&primary, &compiled, base_url);
    if listings.is_empty() {
        let fallback = gather_containers(&document, &compiled.fallback_containers, false);
        listings = listings_in(&fallback, &compiled, base_url);
        debug!(
            containers = fallback.len(),
            listings = listings.len(),
            "Used fallback containers"
        );
    }
    debug!(
        containers = primary.len(),
        listings = listings.len(),
        %base_url,
        "Extracted listings"
    );
    listings
}

/// Detail pages have one event; the whole body is the container.
pub fn extract_detail(html: &str, base_url: &str, profile: &SelectorProfile) -> Option<RawListing> {
    let document = Html::parse_document(html);
    let compiled = Compiled::new(profile);
    listing_from(document.root_element(), &compiled, base_url)
}
