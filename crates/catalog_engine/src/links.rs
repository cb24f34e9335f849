use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineLink {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFragment {
    pub html: String,
    pub links: Vec<InlineLink>,
}

/// Serialises `element` (outer HTML) with every `<a href>` replaced by an
/// inline `[text](href)` reference. Scripts and comments are dropped.
pub fn render_with_inline_links(element: ElementRef<'_>) -> RenderedFragment {
    let mut out = RenderedFragment {
        html: String::new(),
        links: Vec::new(),
    };
    visit_element(element, &mut out);
    out
}

fn visit_node(node: NodeRef<'_, Node>, out: &mut RenderedFragment) {
    match node.value() {
        Node::Text(text) => push_escaped(&mut out.html, text, false),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                visit_element(element, out);
            }
        }
        _ => {}
    }
}

fn visit_element(element: ElementRef<'_>, out: &mut RenderedFragment) {
    let name = element.value().name();
    if matches!(name, "script" | "style" | "noscript" | "template") {
        return;
    }
    if name == "a" {
        if let Some(href) = element.value().attr("href").map(str::trim) {
            let text = element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            out.html.push('[');
            push_escaped(&mut out.html, &text, false);
            out.html.push_str("](");
            push_escaped(&mut out.html, href, false);
            out.html.push(')');
            out.links.push(InlineLink {
                text,
                href: href.to_string(),
            });
            return;
        }
    }

    out.html.push('<');
    out.html.push_str(name);
    for (attr, value) in element.value().attrs() {
        out.html.push(' ');
        out.html.push_str(attr);
        out.html.push_str("=\"");
        push_escaped(&mut out.html, value, true);
        out.html.push('"');
    }
    out.html.push('>');
    if VOID_ELEMENTS.contains(&name) {
        return;
    }
    for child in element.children() {
        visit_node(child, out);
    }
    out.html.push_str("</");
    out.html.push_str(name);
    out.html.push('>');
}

fn push_escaped(buf: &mut String, text: &str, in_attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' if in_attribute => buf.push_str("&quot;"),
            _ => buf.push(c),
        }
    }
}
