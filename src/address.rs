//! Street address normalization and comparison.

use once_cell::sync::Lazy;
use regex::Regex;

static STREET_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(st|street|ave|avenue|blvd|boulevard|rd|road|dr|drive|ln|lane|ct|court|pl|place|way|pkwy|parkway|cir|circle)\b",
    )
    .expect("street suffix pattern")
});

static DIRECTIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(n|s|e|w|ne|nw|se|sw|north|south|east|west)\b").expect("directional pattern")
});

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").expect("punctuation pattern"));

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)").expect("number pattern"));

const STATE_NAMES: [(&str, &str); 13] = [
    ("CALIFORNIA", "CA"),
    ("NEW YORK", "NY"),
    ("MASSACHUSETTS", "MA"),
    ("PENNSYLVANIA", "PA"),
    ("ILLINOIS", "IL"),
    ("TEXAS", "TX"),
    ("WASHINGTON", "WA"),
    ("OREGON", "OR"),
    ("COLORADO", "CO"),
    ("MISSOURI", "MO"),
    ("FLORIDA", "FL"),
    ("GEORGIA", "GA"),
    ("DISTRICT OF COLUMBIA", "DC"),
];

const DIRECTIONAL_ABBREVIATIONS: [&str; 8] = ["N", "S", "E", "W", "NE", "NW", "SE", "SW"];

/// Lowercase form without suffixes, directionals or punctuation.
pub fn normalize_address(address: &str) -> String {
    let lower = address.to_lowercase();
    let lower = STREET_SUFFIX.replace_all(&lower, "");
    let lower = DIRECTIONAL.replace_all(&lower, "");
    let lower = NON_ALNUM.replace_all(&lower, "");
    SPACES.replace_all(&lower, " ").trim().to_string()
}

pub fn extract_street_number(address: &str) -> Option<&str> {
    LEADING_NUMBER
        .captures(address.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Similarity in [0, 1] between two street addresses.
///
/// Differing street numbers score zero regardless of the street name.
pub fn address_similarity(a: &str, b: &str) -> f64 {
    if let (Some(na), Some(nb)) = (extract_street_number(a), extract_street_number(b)) {
        if na != nb {
            return 0.0;
        }
    }

    let norm_a = normalize_address(a);
    let norm_b = normalize_address(b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }
    if norm_a.contains(&norm_b) || norm_b.contains(&norm_a) {
        return 1.0;
    }

    let words_a: std::collections::HashSet<&str> = norm_a.split_whitespace().collect();
    let words_b: std::collections::HashSet<&str> = norm_b.split_whitespace().collect();
    let overlap = words_a.intersection(&words_b).count();
    let max_len = words_a.len().max(words_b.len());
    if max_len == 0 {
        0.0
    } else {
        overlap as f64 / max_len as f64
    }
}

pub fn normalize_state(state: &str) -> String {
    let state = state.trim().to_uppercase();
    STATE_NAMES
        .iter()
        .find(|(name, _)| *name == state)
        .map(|(_, abbr)| abbr.to_string())
        .unwrap_or(state)
}

/// First five digits, left-padded with zeros when shorter.
pub fn normalize_zip(zip: &str) -> String {
    let zip = zip.trim();
    let zip = zip.split('.').next().unwrap_or("");
    let digits: String = zip.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        0 => String::new(),
        n if n >= 5 => digits[..5].to_string(),
        _ => format!("{:0>5}", digits),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressParts {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Splits "street, city, state, zip" or "street, city, state zip".
pub fn parse_full_address(address: &str) -> AddressParts {
    let parts: Vec<&str> = address.split(',').map(str::trim).collect();
    let mut result = AddressParts::default();
    if address.trim().is_empty() {
        return result;
    }

    result.street = parts[0].to_string();
    if let Some(city) = parts.get(1) {
        result.city = city.to_string();
    }
    if let Some(state_zip) = parts.get(2) {
        if let Some(zip) = parts.get(3) {
            result.state = state_zip.to_string();
            result.zip = zip.to_string();
        } else {
            let mut tokens = state_zip.split_whitespace();
            match (tokens.next(), tokens.next()) {
                (Some(state), Some(zip)) => {
                    result.state = state.to_string();
                    result.zip = zip.to_string();
                }
                _ => result.state = state_zip.to_string(),
            }
        }
    }
    result
}

/// Title case that keeps compass abbreviations upper-case.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let upper = word.to_uppercase();
            if DIRECTIONAL_ABBREVIATIONS.contains(&upper.as_str()) {
                upper
            } else {
                title_word(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut start = true;
    for c in word.chars() {
        if c.is_alphabetic() {
            if start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start = false;
        } else {
            out.push(c);
            start = true;
        }
    }
    out
}

/// "Street, City, ST, 12345" with blank components dropped.
pub fn format_address(street: &str, city: &str, state: &str, zip: &str) -> String {
    let mut components = Vec::new();
    if !street.trim().is_empty() {
        components.push(title_case(street));
    }
    if !city.trim().is_empty() {
        components.push(title_case(city));
    }
    if !state.trim().is_empty() {
        components.push(normalize_state(state));
    }
    let zip = normalize_zip(zip);
    if !zip.is_empty() {
        components.push(zip);
    }
    components.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_suffixes_and_directionals() {
        assert_eq!(normalize_address("123 N. Main Street"), "123 main");
        assert_eq!(normalize_address("45 West 34th St."), "45 34th");
        assert_eq!(normalize_address("  9 Elm   Ave  "), "9 elm");
    }

    #[test]
    fn differing_street_numbers_never_match() {
        assert_eq!(address_similarity("100 Main St", "102 Main St"), 0.0);
    }

    #[test]
    fn containment_is_full_match() {
        assert_eq!(address_similarity("100 Main St", "100 Main Street Suite 4"), 1.0);
    }

    #[test]
    fn partial_overlap_uses_word_ratio() {
        let score = address_similarity("Market Square Mall", "Market Plaza Mall");
        assert!((score - 2.0 / 3.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn empty_address_scores_zero() {
        assert_eq!(address_similarity("", "100 Main St"), 0.0);
        assert_eq!(address_similarity("Street", "Main"), 0.0);
    }

    #[test]
    fn state_and_zip_normalization() {
        assert_eq!(normalize_state(" california "), "CA");
        assert_eq!(normalize_state("District of Columbia"), "DC");
        assert_eq!(normalize_state("nv"), "NV");
        assert_eq!(normalize_zip("2134.0"), "02134");
        assert_eq!(normalize_zip("94103-1234"), "94103");
        assert_eq!(normalize_zip("n/a"), "");
    }

    #[test]
    fn parses_state_and_zip_in_one_part() {
        let parts = parse_full_address("1 Main St, Boston, MA 02110");
        assert_eq!(parts.street, "1 Main St");
        assert_eq!(parts.city, "Boston");
        assert_eq!(parts.state, "MA");
        assert_eq!(parts.zip, "02110");

        let parts = parse_full_address("1 Main St, Boston, MA, 02110");
        assert_eq!(parts.state, "MA");
        assert_eq!(parts.zip, "02110");
    }

    #[test]
    fn title_case_keeps_directionals() {
        assert_eq!(title_case("123 nw MAIN street"), "123 NW Main Street");
        assert_eq!(
            format_address("5 e elm st", "new york", "new york", "10001.0"),
            "5 E Elm St, New York, NY, 10001"
        );
    }
}
