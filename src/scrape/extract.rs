//! Pattern-based extraction of book links, trope tags and spice levels from
//! review-site markup. Everything here is pure: malformed or empty input
//! yields empty results rather than errors.

use once_cell::sync::Lazy;
use regex::Regex;

/// A link to a book detail page: `/books/<24 hex id>/<slug>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLink {
    pub external_id: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookMetadata {
    pub tags: Vec<String>,
    pub intensity_level: Option<u8>,
    pub intensity_label: Option<String>,
}

/// Canonical label for each spice level, indexed by `level - 1`.
pub const INTENSITY_LABELS: [&str; 5] = [
    "Glimpses and kisses",
    "Behind closed doors",
    "Open door",
    "Explicit open door",
    "Explicit and plentiful",
];

pub fn intensity_label(level: u8) -> Option<&'static str> {
    INTENSITY_LABELS.get(usize::from(level).checked_sub(1)?).copied()
}

static BOOK_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="/books/([a-f0-9]{24})/([^"]+)""#).unwrap());

static TOPIC_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="/topics/(?:best|most)/([^/"]+)/\d+""#).unwrap());

// Highest level first: the first match wins when a page carries several cues.
static INTENSITY_PATTERNS: Lazy<Vec<(u8, Regex)>> = Lazy::new(|| {
    (1..=5u8)
        .rev()
        .map(|level| {
            let phrase = INTENSITY_LABELS[usize::from(level) - 1];
            let pattern = format!(
                r"(?i)(?:{}|steam[_-]?level[_-]?{level}|spice[_-]?{level})",
                regex::escape(phrase)
            );
            (level, Regex::new(&pattern).unwrap())
        })
        .collect()
});

/// Book detail links in first-seen order, one per external id.
pub fn extract_links(html: &str) -> Vec<BookLink> {
    let mut seen = std::collections::HashSet::new();
    BOOK_LINK
        .captures_iter(html)
        .filter(|caps| seen.insert(caps[1].to_string()))
        .map(|caps| BookLink {
            external_id: caps[1].to_string(),
            slug: caps[2].to_string(),
        })
        .collect()
}

pub fn extract_metadata(html: &str) -> BookMetadata {
    let mut tags: Vec<String> = Vec::new();

    // A topic link may combine several tropes: /topics/best/slow-burn,grumpy-sunshine/1
    for caps in TOPIC_LINK.captures_iter(html) {
        for tag in caps[1].split(',').map(str::trim) {
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
    }

    let intensity_level = INTENSITY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(html))
        .map(|(level, _)| *level);

    BookMetadata {
        tags,
        intensity_level,
        intensity_label: intensity_level.and_then(intensity_label).map(str::to_string),
    }
}
