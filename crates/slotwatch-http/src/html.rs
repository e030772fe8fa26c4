//! Server-rendered reservation page parser.
//!
//! Item markup is any element carrying `data-zone` or one of the
//! [`ITEM_CLASSES`]. Only the innermost such elements count, so a
//! `zone-container` wrapping `reservation-item`s yields the items and not
//! the container. A page the parser cannot interpret is reported as
//! inconclusive, never as invented items.

use std::sync::LazyLock;

use regex::Regex;
use slotwatch_core::{
    is_challenge_page, AcquisitionContext, AvailabilityItem, DocumentParser, InconclusiveReason,
    ParseOutcome,
};
use tracing::debug;

pub const ITEM_CLASSES: [&str; 4] = ["reservation-item", "site-info", "camp-site", "zone-container"];

const MAX_NAME_CHARS: usize = 50;

/// Title fragments of the site's client-side app shell.
pub const SHELL_TITLES: [&str; 2] = ["캠핏", "camfit"];

fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(_compile_err) => match Regex::new(r"$^") {
            Ok(fallback) => fallback,
            Err(fallback_err) => panic!("hardcoded fallback regex must compile: {fallback_err}"),
        },
    }
}

static OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?is)<([a-z][a-z0-9]*)\b([^>]*)>"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?s)<[^>]*>"));
static CLASS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r#"(?i)\bclass\s*=\s*["']([^"']*)["']"#));
static ZONE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r#"(?i)\bdata-zone\s*=\s*["']([^"']*)["']"#));
static MOUNT_POINT: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r#"(?i)\bid\s*=\s*["'](?:root|__next)["']"#));
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?is)<title\b[^>]*>(.*?)</title>"));
static ZONE_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?i)\b([a-z])\s?(?:zone\b|존)"));
static SOLD_OUT: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?i)마감|예약완료|sold\s*out"));
static STATUS_WORDS: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?i)예약가능|예약완료|마감|sold\s*out"));

/// `"C존 A1"` / `"d zone"` -> `"C ZONE"` / `"D ZONE"`.
pub(crate) fn zone_from_text(text: &str) -> Option<String> {
    ZONE_IN_TEXT
        .captures(text)
        .map(|c| format!("{} ZONE", c[1].to_uppercase()))
}

/// Marks an item as unavailable.
pub(crate) fn is_sold_out(text: &str) -> bool {
    SOLD_OUT.is_match(text)
}

#[derive(Debug)]
struct ItemElement<'a> {
    zone_attr: Option<String>,
    inner: &'a str,
}

fn is_item_markup(attrs: &str) -> bool {
    if ZONE_ATTR.is_match(attrs) {
        return true;
    }
    CLASS_ATTR.captures(attrs).is_some_and(|c| {
        c[1].split_whitespace()
            .any(|class| ITEM_CLASSES.contains(&class))
    })
}

fn contains_item_markup(html: &str) -> bool {
    OPEN_TAG
        .captures_iter(html)
        .any(|c| is_item_markup(&c[2]))
}

/// Content between the open tag ending at `start` and its matching close tag.
fn element_inner<'a>(body: &'a str, start: usize, tag: &str) -> &'a str {
    let rest = &body[start..];
    let lower = rest.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}");
    let mut depth = 1usize;
    let mut pos = 0;

    loop {
        let next_open = lower[pos..].find(&open).map(|i| i + pos);
        let next_close = lower[pos..].find(&close).map(|i| i + pos);
        match (next_open, next_close) {
            (Some(o), Some(c)) if o < c => {
                depth += 1;
                pos = o + open.len();
            }
            (_, Some(c)) => {
                depth -= 1;
                if depth == 0 {
                    return &rest[..c];
                }
                pos = c + close.len();
            }
            (_, None) => return rest,
        }
    }
}

fn item_elements(body: &str) -> Vec<ItemElement<'_>> {
    let mut elements = Vec::new();
    for caps in OPEN_TAG.captures_iter(body) {
        let attrs = &caps[2];
        if attrs.trim_end().ends_with('/') || !is_item_markup(attrs) {
            continue;
        }
        let tag = caps[1].to_ascii_lowercase();
        let end = caps.get(0).map_or(0, |m| m.end());
        let inner = element_inner(body, end, &tag);
        if contains_item_markup(inner) {
            continue;
        }
        let zone_attr = ZONE_ATTR
            .captures(attrs)
            .map(|c| c[1].trim().to_string())
            .filter(|z| !z.is_empty());
        elements.push(ItemElement { zone_attr, inner });
    }
    elements
}

fn visible_text(html: &str) -> String {
    let text = ANY_TAG.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn item_name(text: &str, zone: &str) -> String {
    let stripped = STATUS_WORDS.replace_all(text, " ");
    let name = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let name: String = name.chars().take(MAX_NAME_CHARS).collect();
    let name = name.trim().to_string();
    if name.is_empty() {
        zone.to_string()
    } else {
        name
    }
}

/// Parser for the resource's HTML page.
#[derive(Debug, Clone)]
pub struct HtmlPageParser {
    shell_titles: Vec<String>,
}

impl Default for HtmlPageParser {
    fn default() -> Self {
        Self::with_shell_titles(SHELL_TITLES)
    }
}

impl HtmlPageParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page without item markup whose `<title>` contains one of `titles`
    /// (case-insensitive) is treated as the client-rendered app shell.
    pub fn with_shell_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            shell_titles: titles
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    fn is_shell(&self, body: &str) -> bool {
        if MOUNT_POINT.is_match(body) {
            return true;
        }
        TITLE.captures(body).is_some_and(|c| {
            let title = c[1].to_lowercase();
            self.shell_titles.iter().any(|t| title.contains(t.as_str()))
        })
    }
}

impl DocumentParser for HtmlPageParser {
    fn parse(&self, body: &str, ctx: &AcquisitionContext) -> ParseOutcome {
        if is_challenge_page(body) {
            return ParseOutcome::Inconclusive(InconclusiveReason::Blocked);
        }

        let elements = item_elements(body);
        if elements.is_empty() {
            if self.is_shell(body) {
                debug!("client-rendered shell without item markup");
                return ParseOutcome::Inconclusive(InconclusiveReason::ClientRenderedShell);
            }
            debug!("no item markup on page");
            return ParseOutcome::Items(Vec::new());
        }

        let date = ctx.search.date_from;
        let mut items = Vec::new();
        for element in elements {
            let text = visible_text(element.inner);
            let zone = match element.zone_attr.or_else(|| zone_from_text(&text)) {
                Some(zone) => zone,
                None => {
                    debug!(text = %text, "item markup without a zone, skipping");
                    continue;
                }
            };
            let name = item_name(&text, &zone);
            let item = if is_sold_out(&text) {
                AvailabilityItem::unavailable(name, zone, date, "")
            } else {
                AvailabilityItem::available(name, zone, date, "")
            };
            items.push(item);
        }

        debug!(found = items.len(), "page parsed");
        ParseOutcome::Items(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotwatch_core::{ItemStatus, MonitorConfig};

    fn ctx() -> AcquisitionContext {
        MonitorConfig::default().acquisition_context()
    }

    fn items(outcome: ParseOutcome) -> Vec<AvailabilityItem> {
        match outcome {
            ParseOutcome::Items(items) => items,
            other => panic!("expected items, got {:?}", other),
        }
    }

    #[test]
    fn test_challenge_page_is_blocked() {
        let body = "<html><head><title>Just a moment...</title></head><body></body></html>";
        assert_eq!(
            HtmlPageParser::new().parse(body, &ctx()),
            ParseOutcome::Inconclusive(InconclusiveReason::Blocked)
        );
    }

    #[test]
    fn test_spa_shell_is_inconclusive() {
        let body = r#"<html><head><title>캠핏</title></head><body><div id="root"></div><script src="/main.js"></script></body></html>"#;
        assert_eq!(
            HtmlPageParser::new().parse(body, &ctx()),
            ParseOutcome::Inconclusive(InconclusiveReason::ClientRenderedShell)
        );
    }

    #[test]
    fn test_shell_title_without_markup_is_inconclusive() {
        let body = r#"<html><head><title>캠핏 - 캠핑장 예약</title></head><body><noscript>JS required</noscript></body></html>"#;
        assert_eq!(
            HtmlPageParser::new().parse(body, &ctx()),
            ParseOutcome::Inconclusive(InconclusiveReason::ClientRenderedShell)
        );

        let custom = HtmlPageParser::with_shell_titles(["Booking App"]);
        let body = "<html><head><title>booking app</title></head><body></body></html>";
        assert_eq!(
            custom.parse(body, &ctx()),
            ParseOutcome::Inconclusive(InconclusiveReason::ClientRenderedShell)
        );
    }

    #[test]
    fn test_shell_title_with_markup_is_parsed() {
        let body = r#"<html><head><title>Camfit</title></head><body>
            <div class="camp-site">C존 A1</div></body></html>"#;
        let items = items(HtmlPageParser::new().parse(body, &ctx()));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].zone, "C ZONE");
    }

    #[test]
    fn test_extracts_data_zone_items() {
        let body = r#"
            <div id="root">
              <ul>
                <li data-zone="C ZONE"><span>C존 A1</span> <em>예약가능</em></li>
                <li data-zone="C ZONE"><span>C존 A2</span> <em>마감</em></li>
                <li data-zone="D ZONE"><span>D존 B1</span></li>
              </ul>
            </div>"#;
        let items = items(HtmlPageParser::new().parse(body, &ctx()));

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].name, "C존 A1");
        assert_eq!(items[0].zone, "C ZONE");
        assert!(items[0].is_available());
        assert_eq!(items[1].status, ItemStatus::Unavailable);
        assert_eq!(items[2].zone, "D ZONE");
        assert_eq!(items[2].date, ctx().search.date_from);
    }

    #[test]
    fn test_class_items_take_zone_from_text() {
        let body = r#"
            <div class="zone-container">
              <div class="site-info card"><div class="title">D존 B3</div><p>Sold Out</p></div>
              <div class="site-info card"><div class="title">D존 B4</div></div>
              <div class="site-info">Parking</div>
            </div>"#;
        let items = items(HtmlPageParser::new().parse(body, &ctx()));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "D존 B3");
        assert!(!items[0].is_available());
        assert_eq!(items[1].name, "D존 B4");
        assert_eq!(items[1].zone, "D ZONE");
        assert!(items[1].is_available());
    }

    #[test]
    fn test_plain_page_without_markup_is_empty() {
        let body = "<html><body><p>No reservations open yet.</p></body></html>";
        assert!(items(HtmlPageParser::new().parse(body, &ctx())).is_empty());
    }

    #[test]
    fn test_zone_from_text() {
        assert_eq!(zone_from_text("C존 A1").as_deref(), Some("C ZONE"));
        assert_eq!(zone_from_text("site d zone 4").as_deref(), Some("D ZONE"));
        assert_eq!(zone_from_text("Parking"), None);
    }

    #[test]
    fn test_long_names_are_truncated() {
        let long = format!("C존 {}", "x".repeat(80));
        let body = format!(r#"<div class="camp-site">{}</div>"#, long);
        let items = items(HtmlPageParser::new().parse(&body, &ctx()));
        assert_eq!(items[0].name.chars().count(), MAX_NAME_CHARS);
    }
}
