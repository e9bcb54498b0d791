//! Visible-text extraction from arbitrary HTML.
//!
//! Parsing uses the HTML5 algorithm via `scraper`, which recovers from any
//! malformed input, so extraction never fails: the worst case is an empty
//! string.

use scraper::Html;

/// Elements whose text content is never visible.
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

/// Concatenate every visible text node under `<body>`, in document order.
///
/// When the document has no body (framesets), the whole tree stands in for
/// it. No whitespace normalization is applied here.
pub fn extract_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let document = Html::parse_document(html);
    let root = document.root_element();
    let body = root
        .descendants()
        .find(|node| node.value().as_element().map(|e| e.name()) == Some("body"))
        .unwrap_or(*root);

    let mut text = String::new();
    for node in body.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| INVISIBLE.contains(&e.name()))
        });
        if !hidden {
            text.push_str(fragment);
        }
    }
    text
}

/// Collapse every whitespace run to a single space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
