use tracing::warn;

use super::anchors::RawFragment;
use crate::store::{Identity, School};

/// Token that starts a place identifier inside a detail-page href.
pub const IDENTITY_MARKER: &str = "ChI";
/// Separates category/address and hours/phone in listing text.
pub const DELIMITER: char = '·';
const STARS_TOKEN: &str = "stars";
const REVIEWS_TOKEN: &str = "Reviews";

/// Build a school from raw listing text. Every field degrades to `None` on its own.
pub fn build(fragment: &RawFragment) -> School {
    let identity = identity_from_href(fragment.href.as_deref());
    if !identity.is_resolved() {
        warn!(href = ?fragment.href, "Listing link carries no place identifier");
    }
    let (category, address) = split_info_line(fragment.info_line.as_deref());
    let phone = split_phone(fragment.contact_line.as_deref());
    let (star_rating, review_count) = parse_rating(fragment.rating_label.as_deref());

    School {
        identity,
        address,
        category,
        phone,
        detail_url: fragment.href.clone(),
        external_site: fragment.website.clone(),
        display_name: fragment.headline.clone().unwrap_or_default(),
        rating_label: fragment.rating_label.clone(),
        star_rating,
        review_count,
    }
}

/// `.../!19sChIJabc?authuser=0` → `ChIJabc`. Without the marker the identity is unresolved.
pub fn identity_from_href(href: Option<&str>) -> Identity {
    href.and_then(|h| h.split('?').next())
        .and_then(|path| path.split(IDENTITY_MARKER).nth(1))
        .map(|tail| Identity::new(format!("{}{}", IDENTITY_MARKER, tail)))
        .unwrap_or_else(Identity::unresolved)
}

/// `"Secondary School · 12 Main St"` → (category, address).
pub fn split_info_line(line: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(line) = line else {
        return (None, None);
    };
    let mut parts = line.split(DELIMITER);
    let category = parts.next().map(|s| s.trim().to_string());
    let address = parts.next().map(|s| s.trim().to_string());
    (category, address)
}

/// `"Open 24 hours · 0803 123 4567"` → phone.
pub fn split_phone(line: Option<&str>) -> Option<String> {
    line?.split(DELIMITER).nth(1).map(|s| s.trim().to_string())
}

/// `"4.5 stars 120 Reviews"` → (4.5, 120). Malformed halves become `None` independently.
pub fn parse_rating(label: Option<&str>) -> (Option<f64>, Option<u64>) {
    let Some(label) = label else {
        return (None, None);
    };
    let mut parts = label.split(STARS_TOKEN);
    let stars = parts.next().and_then(|s| {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        s.parse::<f64>().ok().filter(|v| v.is_finite())
    });
    let reviews = parts
        .next()
        .map(|s| s.replacen(REVIEWS_TOKEN, "", 1))
        .and_then(|s| s.trim().parse::<u64>().ok());
    (stars, reviews)
}
