use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::dom::{attr, children, parent, query, query_first, text};

const PLACE_PATH_MARKER: &str = "/maps/place/";

static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static WEBSITE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[data-value="Website"]"#).unwrap());
static HEADLINE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.fontHeadlineSmall").unwrap());
static RATING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.fontBodyMedium > span").unwrap());
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.fontBodyMedium").unwrap());

/// A place-detail link and the element that contains it.
pub struct Anchor<'a> {
    pub href: &'a str,
    pub root: ElementRef<'a>,
}

/// Text pulled out of one listing, before any field parsing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawFragment {
    pub href: Option<String>,
    pub website: Option<String>,
    pub headline: Option<String>,
    pub rating_label: Option<String>,
    /// `category · address`
    pub info_line: Option<String>,
    /// `hours · phone`
    pub contact_line: Option<String>,
}

/// Every link pointing at a place-detail page, anchored on its parent element.
pub fn find_anchors(root: ElementRef<'_>) -> Vec<Anchor<'_>> {
    query(root, &LINK_SEL)
        .into_iter()
        .filter_map(|link| {
            let href = attr(link, "href")?;
            if !href.contains(PLACE_PATH_MARKER) {
                return None;
            }
            Some(Anchor {
                href,
                root: parent(link)?,
            })
        })
        .collect()
}

pub fn collect(anchor: &Anchor<'_>) -> RawFragment {
    let root = anchor.root;

    // category/address and hours/phone sit as first and last child
    // of the body block's last child
    let lines = query_first(root, &BODY_SEL).and_then(|body| children(body).last().copied());
    let line_children = lines.map(children).unwrap_or_default();

    RawFragment {
        href: Some(anchor.href.to_string()),
        website: query_first(root, &WEBSITE_SEL)
            .and_then(|a| attr(a, "href"))
            .map(str::to_string),
        headline: query_first(root, &HEADLINE_SEL).map(text),
        rating_label: query_first(root, &RATING_SEL)
            .and_then(|span| attr(span, "aria-label"))
            .map(str::to_string),
        info_line: line_children.first().copied().map(text),
        contact_line: line_children.last().copied().map(text),
    }
}
