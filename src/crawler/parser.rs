//! Link discovery for fetched pages
//!
//! Turns a textual response body into a page title and the absolute
//! hyperlink targets the frontier may enqueue. Scheme filtering against the
//! configured allow-list happens in the frontier; this module only drops
//! targets that can never be fetched (`javascript:`, `mailto:`, ...).
//!
//! `scraper::Html` is not `Send`, so everything here is synchronous and the
//! parsed tree never outlives the call.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Prefixes of hrefs that never point at a fetchable page
const SKIPPED_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "about:"];

/// Title and outbound links of a parsed page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    /// Trimmed `<title>` text, if present and non-empty
    pub title: Option<String>,

    /// Absolute link targets in document order, without repeats
    pub links: Vec<Url>,
}

/// Parses a page body and collects its outbound links
///
/// Links come from `<a href>`, `<area href>` and `<link rel="canonical">`.
/// Relative targets resolve against `<base href>` when the page declares one,
/// otherwise against `page_url`. Anchors carrying a `download` attribute and
/// fragment-only hrefs are skipped; `rel="nofollow"` is followed.
///
/// # Example
///
/// ```
/// use weir::crawler::parse_page;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let page_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_page(html, &page_url);
/// assert_eq!(parsed.title.as_deref(), Some("Test"));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_page(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = declared_base(&document, page_url).unwrap_or_else(|| page_url.clone());

    ParsedPage {
        title: page_title(&document),
        links: collect_links(&document, &base),
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn page_title(document: &Html) -> Option<String> {
    let title = selector("title")?;
    document
        .select(&title)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

fn declared_base(document: &Html, page_url: &Url) -> Option<Url> {
    let base = selector("base[href]")?;
    let href = document.select(&base).next()?.value().attr("href")?;
    page_url.join(href.trim()).ok()
}

fn collect_links(document: &Html, base: &Url) -> Vec<Url> {
    let Some(targets) = selector("a[href], area[href], link[rel~='canonical'][href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&targets) {
        let element = element.value();
        if element.attr("download").is_some() {
            continue;
        }
        let Some(link) = element.attr("href").and_then(|href| resolve_link(href, base)) else {
            continue;
        };
        if seen.insert(link.as_str().to_string()) {
            links.push(link);
        }
    }

    links
}

/// Resolves an href against `base`, dropping targets that are not pages
///
/// The fragment of the resolved URL is removed, so `/a#x` and `/a#y` resolve
/// to the same target.
pub fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if SKIPPED_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
    {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    if resolved.cannot_be_a_base() || resolved.host_str().is_none() {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved)
}
