//! Thin query/navigation facade over a static HTML snapshot.
//!
//! Out-of-range navigation yields `None` or an empty `Vec`, never an error.

use scraper::{ElementRef, Html, Selector};

pub struct Snapshot {
    html: Html,
}

impl Snapshot {
    pub fn parse(html: &str) -> Self {
        Snapshot {
            html: Html::parse_document(html),
        }
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }
}

/// Descendants of `root` matching `selector`, in document order. `root` itself is excluded.
pub fn query<'a>(root: ElementRef<'a>, selector: &Selector) -> Vec<ElementRef<'a>> {
    root.select(selector).filter(|el| el.id() != root.id()).collect()
}

pub fn query_first<'a>(root: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    root.select(selector).find(|el| el.id() != root.id())
}

pub fn attr<'a>(node: ElementRef<'a>, name: &str) -> Option<&'a str> {
    node.value().attr(name)
}

pub fn text(node: ElementRef<'_>) -> String {
    node.text().collect()
}

pub fn parent(node: ElementRef<'_>) -> Option<ElementRef<'_>> {
    node.parent().and_then(ElementRef::wrap)
}

/// Element children only; text and comment nodes are skipped.
pub fn children(node: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    node.children().filter_map(ElementRef::wrap).collect()
}
