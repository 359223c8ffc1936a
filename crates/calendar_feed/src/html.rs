use scraper::{Html, Node};

const BLOCK_TAGS: [&str; 10] = ["br", "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "tr"];

/// Flattens an HTML event description to plain text.
///
/// Text nodes are kept in document order, block elements and `<br>` start a new
/// line, blank lines are dropped. Entities are decoded by the parser.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();

    for node in fragment.tree.root().descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if BLOCK_TAGS.contains(&el.name()) => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
