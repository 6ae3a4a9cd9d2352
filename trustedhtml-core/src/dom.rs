//! dom.rs - Owned document tree built from the HTML parser's output.
//!
//! Markup is parsed as a `<body>` fragment with `html5ever` into a
//! `markup5ever_rcdom` tree, then copied into plain owned [`Node`]s the
//! sanitizer can rewrite in place. Comments, doctypes and processing
//! instructions never make it into the owned tree, and elements nested
//! deeper than [`MAX_DEPTH`] are discarded.
//!
//! Text nodes hold *escaped* text once the sanitizer has cleared them, so the
//! serializer writes them verbatim; only the no-break space is turned back
//! into `&nbsp;`.
//!
//! License: MIT OR APACHE 2.0

use html5ever::tendril::TendrilSink;
use html5ever::{parse_fragment, LocalName, Namespace, ParseOpts, QualName};
use log::warn;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::engine::Tag;

/// Elements nested deeper than this are dropped while building the tree.
pub const MAX_DEPTH: usize = 256;

pub const NBSP: char = '\u{a0}';
pub const NBSP_ENTITY: &str = "&nbsp;";

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements that never have content and serialize as `<br />`.
pub const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Characters escaped in text, `&` first. Plain text is recovered in reverse order.
pub const SPECIAL_CHARS: [(char, &str); 5] = [
    ('&', "&amp;"),
    ('"', "&quot;"),
    ('\'', "&apos;"),
    ('<', "&lt;"),
    ('>', "&gt;"),
];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>, attributes: Vec<(String, String)>, children: Vec<Node>) -> Self {
        Self { tag: Tag::new(name, attributes), children }
    }

    pub fn name(&self) -> &str {
        &self.tag.name
    }
}

/// A parsed fragment: the children of the implicit `<body>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Document {
    pub fn parse_fragment(markup: &str) -> Self {
        let context = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from("body"));
        let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new()).one(markup);

        // Fragment parsing yields a document holding a single <html> root.
        let document_children = dom.document.children.borrow();
        let root = document_children
            .iter()
            .find(|handle| matches!(handle.data, NodeData::Element { .. }));

        let mut children = Vec::new();
        match root {
            Some(root) => convert_children(root, 0, &mut children),
            None => convert_children(&dom.document, 0, &mut children),
        }
        Self { children }
    }

    /// Final markup, with no-break spaces written as `&nbsp;`.
    pub fn to_html(&self) -> String {
        render(&self.children, true)
    }

    /// Text content of the whole tree, unescaped.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn convert_children(parent: &Handle, depth: usize, out: &mut Vec<Node>) {
    for child in parent.children.borrow().iter() {
        convert(child, depth, out);
    }
}

fn convert(handle: &Handle, depth: usize, out: &mut Vec<Node>) {
    match &handle.data {
        NodeData::Text { contents } => out.push(Node::Text(contents.borrow().to_string())),
        NodeData::Element { name, attrs, .. } => {
            if depth >= MAX_DEPTH {
                warn!("Dropping <{}> nested deeper than {} levels.", name.local, MAX_DEPTH);
                return;
            }
            let attributes = attrs
                .borrow()
                .iter()
                .map(|attr| {
                    let key = match &attr.name.prefix {
                        Some(prefix) => format!("{}:{}", prefix, attr.name.local),
                        None => attr.name.local.to_string(),
                    };
                    (key, attr.value.to_string())
                })
                .collect();
            let mut children = Vec::new();
            convert_children(handle, depth + 1, &mut children);
            out.push(Node::Element(Element::new(name.local.to_string(), attributes, children)));
        }
        NodeData::Document => convert_children(handle, depth, out),
        NodeData::Doctype { .. } | NodeData::Comment { .. } | NodeData::ProcessingInstruction { .. } => {}
    }
}

/// Serializes nodes. `entities` writes no-break spaces as `&nbsp;`; without it they stay
/// raw, which is how the sanitizer inspects inner content.
pub fn render(nodes: &[Node], entities: bool) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node(node, entities, &mut out);
    }
    out
}

fn render_node(node: &Node, entities: bool, out: &mut String) {
    match node {
        Node::Text(text) if entities => out.push_str(&text.replace(NBSP, NBSP_ENTITY)),
        Node::Text(text) => out.push_str(text),
        Node::Element(element) => {
            out.push('<');
            out.push_str(element.name());
            for (key, value) in &element.tag.attributes {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape_attribute(value));
                out.push('"');
            }
            if is_void(element.name()) {
                out.push_str(" />");
                return;
            }
            out.push('>');
            for child in &element.children {
                render_node(child, entities, out);
            }
            out.push_str("</");
            out.push_str(element.name());
            out.push('>');
        }
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(&unescape_text(text)),
            Node::Element(element) => collect_text(&element.children, out),
        }
    }
}

pub fn escape_text(text: &str) -> String {
    SPECIAL_CHARS
        .iter()
        .fold(text.to_string(), |acc, (ch, entity)| acc.replace(*ch, entity))
}

pub fn unescape_text(text: &str) -> String {
    SPECIAL_CHARS
        .iter()
        .rev()
        .fold(text.to_string(), |acc, (ch, entity)| acc.replace(entity, &ch.to_string()))
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &Node) -> &Element {
        match node {
            Node::Element(element) => element,
            Node::Text(text) => panic!("expected element, got text {:?}", text),
        }
    }

    #[test]
    fn test_fragment_children_are_body_content() {
        let document = Document::parse_fragment("Hi <b title=\"a&amp;b\">there</b><!-- gone -->");
        assert_eq!(document.children.len(), 2);
        assert_eq!(document.children[0], Node::Text("Hi ".to_string()));
        let bold = element(&document.children[1]);
        assert_eq!(bold.name(), "b");
        assert_eq!(bold.tag.get("title"), Some("a&b"));
        assert_eq!(bold.children, vec![Node::Text("there".to_string())]);
    }

    #[test]
    fn test_document_level_tags_do_not_leak_into_fragment() {
        let document = Document::parse_fragment("<html><head><title>x</title></head><body><p>y</p></body></html>");
        assert!(document
            .children
            .iter()
            .all(|node| !matches!(node, Node::Element(e) if e.name() == "html" || e.name() == "body")));
    }

    #[test]
    fn test_nesting_beyond_the_bound_is_dropped() {
        let markup = "<span>".repeat(MAX_DEPTH + 10);
        let document = Document::parse_fragment(&markup);
        let mut depth = 0;
        let mut nodes = &document.children;
        while let Some(Node::Element(element)) = nodes.first() {
            depth += 1;
            nodes = &element.children;
        }
        assert_eq!(depth, MAX_DEPTH);
    }

    #[test]
    fn test_serializer_formats_attributes_and_void_elements() {
        let document = Document {
            children: vec![
                Node::Element(Element::new(
                    "a",
                    vec![("title".to_string(), "x\"<y>&z".to_string())],
                    vec![Node::Text(format!("a{}b", NBSP))],
                )),
                Node::Element(Element::new("br", Vec::new(), Vec::new())),
            ],
        };
        assert_eq!(document.to_html(), "<a title=\"x&quot;&lt;y&gt;&amp;z\">a&nbsp;b</a><br />");
        assert_eq!(render(&document.children, false), format!("<a title=\"x&quot;&lt;y&gt;&amp;z\">a{}b</a><br />", NBSP));
    }

    #[test]
    fn test_escape_and_plain_text_are_inverse() {
        let raw = "Tom & \"Jerry\" <'cat'> &amp;";
        let escaped = escape_text(raw);
        assert_eq!(escaped, "Tom &amp; &quot;Jerry&quot; &lt;&apos;cat&apos;&gt; &amp;amp;");
        assert_eq!(unescape_text(&escaped), raw);
    }
}
