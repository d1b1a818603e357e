//! Display helpers shared by the HTML reports.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MISSING: &str = "—";

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").expect("valid regex"));

/// Escapes text for HTML element content.
pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escapes text for a quoted HTML attribute value.
pub fn attr_escape(text: &str) -> String {
    html_escape(text).replace('\'', "&#39;")
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `1234567.891` with 2 decimals is `1,234,567.89`. Zero decimals truncate.
pub fn format_number(value: Option<f64>, decimals: usize) -> String {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return MISSING.to_string();
    };
    let text = if decimals == 0 {
        format!("{}", value.trunc() as i64)
    } else {
        format!("{:.*}", decimals, value)
    };
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    match unsigned.split_once('.') {
        Some((int, frac)) => format!("{}{}.{}", sign, group_thousands(int), frac),
        None => format!("{}{}", sign, group_thousands(unsigned)),
    }
}

/// Compact dollars: `$1.50B`, `$2.3M`, `$45K`, `$950`.
pub fn format_currency(value: Option<f64>) -> String {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return MISSING.to_string();
    };
    if value == 0.0 {
        return "$0".to_string();
    }
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    let body = if abs >= 1e9 {
        format!("{:.2}B", abs / 1e9)
    } else if abs >= 1e6 {
        format!("{:.1}M", abs / 1e6)
    } else if abs >= 1e3 {
        format!("{:.0}K", abs / 1e3)
    } else {
        format_number(Some(abs.round()), 0)
    };
    format!("{}${}", sign, body)
}

pub fn format_sqft(sqft: f64) -> String {
    if sqft >= 1_000_000.0 {
        format!("{:.1}M", sqft / 1_000_000.0)
    } else if sqft >= 10_000.0 {
        format!("{:.0}K", sqft / 1_000.0)
    } else {
        format_number(Some(sqft.max(0.0)), 0)
    }
}

/// Tonnes of CO2e with K/M suffixes.
pub fn format_carbon(tco2e: f64) -> String {
    if tco2e >= 1_000_000.0 {
        format!("{:.2}M", tco2e / 1_000_000.0)
    } else if tco2e >= 1_000.0 {
        format!("{:.1}K", tco2e / 1_000.0)
    } else {
        format!("{:.0}", tco2e)
    }
}

pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let cleaned = NON_SLUG.replace_all(&lower, "");
    SLUG_SEPARATORS
        .replace_all(&cleaned, "-")
        .trim_matches('-')
        .to_string()
}

pub fn vertical_color(vertical: &str) -> &'static str {
    match vertical {
        "Commercial" => "#1a3870",
        "Education" => "#0088ff",
        "Healthcare" => "#7ec8ff",
        _ => "#6b7280",
    }
}

/// Reports show "Event Space" buildings as venues.
pub fn display_building_type(building_type: &str) -> &str {
    match building_type {
        "Event Space" => "Venue",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping() {
        assert_eq!(attr_escape(r#"Tom's "Bar" & <Grill>"#), "Tom&#39;s &quot;Bar&quot; &amp; &lt;Grill&gt;");
    }

    #[test]
    fn numbers() {
        assert_eq!(format_number(Some(1234567.891), 2), "1,234,567.89");
        assert_eq!(format_number(Some(999.9), 0), "999");
        assert_eq!(format_number(Some(-12345.0), 0), "-12,345");
        assert_eq!(format_number(None, 0), MISSING);
        assert_eq!(format_number(Some(f64::NAN), 1), MISSING);
    }

    #[test]
    fn currency() {
        assert_eq!(format_currency(Some(0.0)), "$0");
        assert_eq!(format_currency(Some(950.4)), "$950");
        assert_eq!(format_currency(Some(45_300.0)), "$45K");
        assert_eq!(format_currency(Some(2_340_000.0)), "$2.3M");
        assert_eq!(format_currency(Some(1_500_000_000.0)), "$1.50B");
        assert_eq!(format_currency(Some(-2_340_000.0)), "-$2.3M");
        assert_eq!(format_currency(None), MISSING);
    }

    #[test]
    fn sizes_and_carbon() {
        assert_eq!(format_sqft(2_500_000.0), "2.5M");
        assert_eq!(format_sqft(45_000.0), "45K");
        assert_eq!(format_sqft(9_999.0), "9,999");
        assert_eq!(format_carbon(1_234.0), "1.2K");
        assert_eq!(format_carbon(2_500_000.0), "2.50M");
        assert_eq!(format_carbon(12.4), "12");
    }

    #[test]
    fn slugs_and_types() {
        assert_eq!(slugify("NYC_1234 / Empire State  Bldg."), "nyc_1234-empire-state-bldg");
        assert_eq!(slugify("--Hello--"), "hello");
        assert_eq!(display_building_type("Event Space"), "Venue");
        assert_eq!(vertical_color("Education"), "#0088ff");
        assert_eq!(vertical_color("Other"), "#6b7280");
    }
}
