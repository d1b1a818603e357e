//! HTML inspection of organization pages.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

/// Phrases seen on parked, expired and for-sale domains.
pub const SALE_PATTERNS: &[&str] = &[
    "domain for sale",
    "buy this domain",
    "domain is for sale",
    "this domain is for sale",
    "purchase this domain",
    "domain may be for sale",
    "acquire this domain",
    "make an offer",
    "domain available",
    "parked free",
    "parked domain",
    "sedoparking",
    "parking-lander",
    "godaddy",
    "dan.com",
    "afternic",
    "sedo.com",
    "hugedomains",
    "undeveloped.com",
    "domainmarket",
    "brandbucket",
    "squadhelp",
    "is for sale",
    "for sale at",
    "domain has expired",
    "expired domain",
    "this site is under construction",
    "coming soon",
    "website coming soon",
    "page not found",
    "this page is parked",
    "parked by",
    "buy now for",
    "domain broker",
    "premium domain",
];

/// Narrower list used when re-checking replacement candidates; generic
/// words like "godaddy" appear on many healthy sites.
pub const STRICT_PARKED_PATTERNS: &[&str] = &[
    "sedoparking",
    "parking-lander",
    "godaddy.com/forsale",
    "dan.com",
    "afternic",
    "hugedomains",
    "buy this domain",
    "domain is for sale",
    "this domain is for sale",
    "domain for sale",
    "domainmarket",
];

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("title selector"));
static META_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).expect("meta selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("body selector"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSummary {
    pub title: String,
    pub description: String,
    pub text: String,
}

pub fn summarize_page(html: &str) -> PageSummary {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    let description = document
        .select(&META_DESCRIPTION)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(|d| d.trim().to_string())
        .unwrap_or_default();
    let text = document
        .select(&BODY)
        .next()
        .map(|body| visible_text(&body))
        .unwrap_or_default();

    PageSummary {
        title,
        description,
        text,
    }
}

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Body text a visitor would see; script and style contents are skipped.
fn visible_text(body: &ElementRef) -> String {
    body.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
            });
            (!hidden).then(|| text.trim())
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First pattern found anywhere in the raw page, including script and
/// markup that parked-domain landers hide their offers in.
pub fn find_pattern(html: &str, patterns: &[&'static str]) -> Option<&'static str> {
    let lower = html.to_lowercase();
    patterns.iter().copied().find(|p| lower.contains(p))
}

/// Checks visible title and text only.
pub fn detect_parked(html: &str) -> Option<&'static str> {
    let page = summarize_page(html);
    let visible = format!("{} {} {}", page.title, page.description, page.text);
    find_pattern(&visible, STRICT_PARKED_PATTERNS)
}
