pub mod anchors;
pub mod dom;
pub mod fields;

use tracing::debug;

use crate::store::School;
use dom::Snapshot;

/// Two-step pipeline: snapshot → raw fragments → schools.
/// Duplicates within one snapshot are kept; the store collapses them.
pub fn extract_schools(html: &str) -> Vec<School> {
    let snapshot = Snapshot::parse(html);
    let anchors = anchors::find_anchors(snapshot.root());
    debug!(anchors = anchors.len(), "Place anchors found");

    anchors
        .iter()
        .map(|anchor| fields::build(&anchors::collect(anchor)))
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn feed_fixture_listings() {
        let schools = extract_schools(&fixture("feed"));
        assert_eq!(schools.len(), 4);

        let greenfield = &schools[0];
        assert_eq!(greenfield.identity.as_str(), "ChIJwYCC5iqLOxAR");
        assert_eq!(greenfield.display_name, "Greenfield Academy");
        assert_eq!(greenfield.category.as_deref(), Some("Secondary School"));
        assert_eq!(greenfield.address.as_deref(), Some("12 Main St, Ikeja"));
        assert_eq!(greenfield.phone.as_deref(), Some("0803 123 4567"));
        assert_eq!(greenfield.external_site.as_deref(), Some("https://greenfield.edu.ng/"));
        assert_eq!(greenfield.rating_label.as_deref(), Some("4.5 stars 120 Reviews"));
        assert_eq!(greenfield.star_rating, Some(4.5));
        assert_eq!(greenfield.review_count, Some(120));
        assert!(greenfield
            .detail_url
            .as_deref()
            .is_some_and(|u| u.contains("/maps/place/Greenfield+Academy")));
    }

    #[test]
    fn sparse_listing_degrades_per_field() {
        let schools = extract_schools(&fixture("feed"));
        let sunrise = &schools[1];
        assert_eq!(sunrise.identity.as_str(), "ChIJs9nR1sE");
        assert_eq!(sunrise.display_name, "Sunrise Nursery & Primary School");
        assert_eq!(sunrise.category.as_deref(), Some("Primary School"));
        assert!(sunrise.address.is_none());
        assert!(sunrise.phone.is_none());
        assert!(sunrise.external_site.is_none());
        assert!(sunrise.rating_label.is_none());
        assert!(sunrise.star_rating.is_none());
        assert!(sunrise.review_count.is_none());
    }

    #[test]
    fn unidentifiable_listing_still_emitted() {
        let schools = extract_schools(&fixture("feed"));
        let nameless = &schools[2];
        assert!(!nameless.identity.is_resolved());
        assert_eq!(nameless.display_name, "");
    }

    #[test]
    fn duplicate_listing_kept_in_batch() {
        let schools = extract_schools(&fixture("feed"));
        assert_eq!(schools[3].identity, schools[0].identity);
    }

    #[test]
    fn empty_page_has_no_schools() {
        let html = r#"<html><body><div role="feed"></div><a href="/maps/search/x">x</a></body></html>"#;
        assert!(extract_schools(html).is_empty());
    }
}
