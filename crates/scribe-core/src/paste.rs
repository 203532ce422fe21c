//! Clipboard deserialization: Word-dialect HTML and plain text into the
//! document model. Paste handling must never crash the editor, so every
//! entry point degrades to a single empty paragraph instead of failing.

use crate::core::{Editor, ElementNode, ImageMeta, Marks, Node, Point, Selection};
use crate::kind::{Align, ElementKind, ListKind};
use crate::ops::{Op, Transaction};
use crate::plugin::{parse_arg, CommandError, CommandSpec, EditorPlugin};

/// Recursion guard for hostile or pathologically nested markup.
const MAX_WALK_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// A minimal DOM for clipboard HTML.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum DomNode {
    Element(DomElement),
    Text(String),
    /// Word wraps its list enumerators in conditional comments; they are
    /// kept so the list detector can see them.
    Comment(String),
}

#[derive(Debug, Clone)]
struct DomElement {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<DomNode>,
}

impl DomElement {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scanner: a lossy, never-failing HTML reader. Unclosed tags close at end
// of input, stray close tags are ignored, and raw-text elements (style,
// script) are dropped wholesale.
// ---------------------------------------------------------------------------

fn parse_html(input: &str) -> Vec<DomNode> {
    HtmlScanner { input, pos: 0 }.scan()
}

struct HtmlScanner<'a> {
    input: &'a str,
    pos: usize,
}

fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "style" | "script" | "title" | "xml")
}

fn append(stack: &mut Vec<DomElement>, roots: &mut Vec<DomNode>, node: DomNode) {
    match stack.last_mut() {
        Some(top) => top.children.push(node),
        None => roots.push(node),
    }
}

impl<'a> HtmlScanner<'a> {
    fn scan(mut self) -> Vec<DomNode> {
        let mut stack: Vec<DomElement> = Vec::new();
        let mut roots: Vec<DomNode> = Vec::new();

        while self.pos < self.input.len() {
            if self.starts_with("<!--") {
                let body = self.read_comment();
                append(&mut stack, &mut roots, DomNode::Comment(body));
            } else if self.starts_with("</") {
                let tag = self.read_close_tag();
                if let Some(depth) = stack.iter().rposition(|el| el.tag == tag) {
                    while stack.len() > depth {
                        let el = stack.pop().expect("stack is non-empty");
                        append(&mut stack, &mut roots, DomNode::Element(el));
                    }
                }
            } else if self.starts_with("<!") || self.starts_with("<?") {
                self.skip_past('>');
            } else if self.at_open_tag() {
                let (el, self_closing) = self.read_open_tag();

                if is_raw_text_tag(&el.tag) && !self_closing {
                    self.skip_raw_text(&el.tag);
                    continue;
                }

                // <p> and <li> imply the end of an open sibling.
                if matches!(el.tag.as_str(), "p" | "li") {
                    if let Some(depth) = stack.iter().rposition(|open| open.tag == el.tag) {
                        while stack.len() > depth {
                            let open = stack.pop().expect("stack is non-empty");
                            append(&mut stack, &mut roots, DomNode::Element(open));
                        }
                    }
                }

                if self_closing || is_void_tag(&el.tag) {
                    append(&mut stack, &mut roots, DomNode::Element(el));
                } else {
                    stack.push(el);
                }
            } else {
                let text = self.read_text();
                if !text.is_empty() {
                    append(&mut stack, &mut roots, DomNode::Text(decode_entities(text)));
                }
            }
        }

        while let Some(el) = stack.pop() {
            append(&mut stack, &mut roots, DomNode::Element(el));
        }

        roots
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn at_open_tag(&self) -> bool {
        let mut chars = self.rest().chars();
        chars.next() == Some('<') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
    }

    fn read_text(&mut self) -> &'a str {
        let start = self.pos;
        // Consume at least one char: a stray '<' that opened no tag is
        // plain text, and skipping it here prevents an infinite loop.
        if let Some(c) = self.rest().chars().next() {
            self.pos += c.len_utf8();
        }
        while let Some(c) = self.rest().chars().next() {
            if c == '<' {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn read_comment(&mut self) -> String {
        self.pos += "<!--".len();
        match self.rest().find("-->") {
            Some(ix) => {
                let body = self.input[self.pos..self.pos + ix].to_string();
                self.pos += ix + "-->".len();
                body
            }
            None => {
                let body = self.rest().to_string();
                self.pos = self.input.len();
                body
            }
        }
    }

    fn read_close_tag(&mut self) -> String {
        self.pos += "</".len();
        let name = self.read_name();
        self.skip_past('>');
        name
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        for c in self.input[start..].chars() {
            if c.is_ascii_alphanumeric() || c == '-' || c == ':' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_ascii_lowercase()
    }

    fn skip_past(&mut self, stop: char) {
        match self.rest().find(stop) {
            Some(ix) => self.pos += ix + stop.len_utf8(),
            None => self.pos = self.input.len(),
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.rest().chars().next() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn skip_raw_text(&mut self, tag: &str) {
        let close = format!("</{tag}");
        let lower_rest = self.rest().to_ascii_lowercase();
        match lower_rest.find(&close) {
            Some(ix) => {
                self.pos += ix;
                self.skip_past('>');
            }
            None => self.pos = self.input.len(),
        }
    }

    fn read_open_tag(&mut self) -> (DomElement, bool) {
        self.pos += 1;
        let tag = self.read_name();
        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_ws();
            let Some(c) = self.rest().chars().next() else {
                break;
            };
            if c == '>' {
                self.pos += 1;
                break;
            }
            if c == '/' {
                self.pos += 1;
                if self.starts_with(">") {
                    self.pos += 1;
                    self_closing = true;
                    break;
                }
                continue;
            }
            let name = self.read_attr_name();
            if name.is_empty() {
                self.pos += c.len_utf8();
                continue;
            }
            self.skip_ws();
            let value = if self.starts_with("=") {
                self.pos += 1;
                self.skip_ws();
                self.read_attr_value()
            } else {
                String::new()
            };
            attrs.push((name, value));
        }

        (
            DomElement {
                tag,
                attrs,
                children: Vec::new(),
            },
            self_closing,
        )
    }

    fn read_attr_name(&mut self) -> String {
        let start = self.pos;
        for c in self.input[start..].chars() {
            if c.is_whitespace() || c == '=' || c == '>' || c == '/' {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.input[start..self.pos].to_ascii_lowercase()
    }

    fn read_attr_value(&mut self) -> String {
        let Some(quote) = self.rest().chars().next() else {
            return String::new();
        };
        if quote == '"' || quote == '\'' {
            self.pos += 1;
            match self.rest().find(quote) {
                Some(ix) => {
                    let value = &self.input[self.pos..self.pos + ix];
                    self.pos += ix + 1;
                    decode_entities(value)
                }
                None => {
                    let value = self.rest().to_string();
                    self.pos = self.input.len();
                    decode_entities(&value)
                }
            }
        } else {
            let start = self.pos;
            while let Some(c) = self.rest().chars().next() {
                if c.is_whitespace() || c == '>' {
                    break;
                }
                if c == '/' && self.starts_with("/>") {
                    break;
                }
                self.pos += c.len_utf8();
            }
            decode_entities(&self.input[start..self.pos])
        }
    }
}

fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let semi = rest
            .char_indices()
            .take(12)
            .find(|(_, c)| *c == ';')
            .map(|(ix, _)| ix);
        let Some(semi) = semi else {
            out.push('&');
            rest = &rest['&'.len_utf8()..];
            continue;
        };

        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest['&'.len_utf8()..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// DOM walk: HTML into document nodes.
// ---------------------------------------------------------------------------

/// A produced node plus the list kind it belongs to when it came from a
/// Word fake-list paragraph. The hint only survives until the grouping
/// pass wraps the item into a real container.
struct Walked {
    node: Node,
    list_hint: Option<ListKind>,
}

impl Walked {
    fn plain(node: Node) -> Self {
        Self {
            node,
            list_hint: None,
        }
    }
}

/// Deserialize clipboard HTML (including Microsoft Word's dialect) into
/// top-level document blocks. Never fails and never returns an empty
/// vector: unusable input yields a single empty paragraph.
pub fn deserialize_html(html: &str) -> Vec<Node> {
    let roots = parse_html(html);
    let walked: Vec<Walked> = roots.iter().flat_map(|n| walk_dom(n, 0)).collect();
    let blocks = group_top_level(walked);
    if blocks.is_empty() {
        vec![Node::paragraph("")]
    } else {
        blocks
    }
}

fn walk_dom(node: &DomNode, depth: usize) -> Vec<Walked> {
    if depth >= MAX_WALK_DEPTH {
        return Vec::new();
    }

    let el = match node {
        DomNode::Comment(_) => return Vec::new(),
        DomNode::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Vec::new();
            }
            return vec![Walked::plain(Node::text(trimmed))];
        }
        DomNode::Element(el) => el,
    };

    // Word encodes many list styles as plain paragraphs with proprietary
    // markers instead of <ul>/<ol>. Detect those before tag dispatch.
    if is_word_list_paragraph(el) {
        return word_list_item(el);
    }

    let mut children: Vec<Walked> = el
        .children
        .iter()
        .flat_map(|c| walk_dom(c, depth + 1))
        .collect();

    apply_style_marks(el, &mut children);

    let align = dom_align(el);

    match el.tag.as_str() {
        "p" => make_block(ElementKind::Paragraph, align, children),
        "h1" => make_block(ElementKind::HeadingOne, align, children),
        "h2" => make_block(ElementKind::HeadingTwo, align, children),
        "h3" => make_block(ElementKind::HeadingThree, align, children),
        "h4" => make_block(ElementKind::HeadingFour, align, children),
        "h5" => make_block(ElementKind::HeadingFive, align, children),
        "h6" => make_block(ElementKind::HeadingSix, align, children),
        "blockquote" => make_block(ElementKind::BlockQuote, align, children),
        "ul" => make_list(ListKind::Bulleted, children),
        "ol" => make_list(ListKind::Numbered, children),
        "li" => make_list_item(children),
        "a" => make_link(el, children),
        "img" => make_image(el),
        "b" | "strong" => marked(children, |m| m.bold = true),
        "i" | "em" => marked(children, |m| m.italic = true),
        "u" => marked(children, |m| m.underline = true),
        "s" | "strike" => marked(children, |m| m.strikethrough = true),
        "code" => marked(children, |m| m.code = true),
        "br" => Vec::new(),
        // Unknown wrappers contribute their children unchanged.
        _ => children,
    }
}

/// Build a text block from the walked children; inline content goes into
/// the block, stray block children are spliced through in order. A block
/// left with no content at all is dropped.
fn make_block(kind: ElementKind, align: Option<Align>, children: Vec<Walked>) -> Vec<Walked> {
    let mut out: Vec<Walked> = Vec::new();
    let mut inline: Vec<Node> = Vec::new();

    fn flush(kind: ElementKind, align: Option<Align>, inline: &mut Vec<Node>, out: &mut Vec<Walked>) {
        if inline.is_empty() {
            return;
        }
        out.push(Walked::plain(Node::Element(ElementNode {
            align,
            children: std::mem::take(inline),
            ..ElementNode::new(kind)
        })));
    }

    for walked in children {
        if node_is_inline(&walked.node) {
            inline.push(walked.node);
        } else {
            flush(kind, align, &mut inline, &mut out);
            out.push(walked);
        }
    }
    flush(kind, align, &mut inline, &mut out);

    out
}

fn make_list(kind: ListKind, children: Vec<Walked>) -> Vec<Walked> {
    let mut items: Vec<Node> = Vec::new();

    for walked in children {
        match walked.node {
            Node::Element(el) if el.kind == ElementKind::ListItem => {
                items.push(Node::Element(el));
            }
            Node::Element(el) if el.kind.is_list() => {
                // Nested containers flatten into the enclosing list.
                items.extend(el.children);
            }
            node => {
                let children = if node_is_inline(&node) {
                    vec![Node::Element(ElementNode {
                        children: vec![node],
                        ..ElementNode::new(ElementKind::Paragraph)
                    })]
                } else {
                    vec![node]
                };
                items.push(Node::Element(ElementNode {
                    children,
                    ..ElementNode::new(ElementKind::ListItem)
                }));
            }
        }
    }

    if items.is_empty() {
        return Vec::new();
    }
    vec![Walked::plain(Node::list(kind, items))]
}

fn make_list_item(children: Vec<Walked>) -> Vec<Walked> {
    let mut inline: Vec<Node> = Vec::new();
    flatten_inline(children.into_iter().map(|w| w.node).collect(), &mut inline);
    if inline.is_empty() {
        inline.push(Node::text(""));
    }

    vec![Walked::plain(Node::Element(ElementNode {
        children: vec![Node::Element(ElementNode {
            children: inline,
            ..ElementNode::new(ElementKind::Paragraph)
        })],
        ..ElementNode::new(ElementKind::ListItem)
    }))]
}

fn flatten_inline(nodes: Vec<Node>, out: &mut Vec<Node>) {
    for node in nodes {
        match node {
            Node::Text(_) => out.push(node),
            Node::Element(el) if el.kind.is_inline() => out.push(Node::Element(el)),
            Node::Element(el) => flatten_inline(el.children, out),
        }
    }
}

fn make_link(el: &DomElement, children: Vec<Walked>) -> Vec<Walked> {
    let url = el.attr("href").unwrap_or("").to_string();

    let mut inline: Vec<Node> = Vec::new();
    flatten_inline(children.into_iter().map(|w| w.node).collect(), &mut inline);
    if inline.is_empty() {
        if url.is_empty() {
            return Vec::new();
        }
        inline.push(Node::text(url.clone()));
    }

    vec![Walked::plain(Node::Element(ElementNode {
        url: Some(url),
        children: inline,
        ..ElementNode::new(ElementKind::Link)
    }))]
}

fn make_image(el: &DomElement) -> Vec<Walked> {
    let Some(src) = el.attr("src") else {
        return Vec::new();
    };

    let title = el
        .attr("title")
        .or_else(|| el.attr("alt"))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string());
    let width = el.attr("width").and_then(|v| v.parse().ok());
    let height = el.attr("height").and_then(|v| v.parse().ok());
    let meta = ImageMeta {
        title,
        width,
        height,
        ..ImageMeta::default()
    };

    vec![Walked::plain(Node::Element(ElementNode {
        url: Some(src.to_string()),
        image: (meta != ImageMeta::default()).then_some(meta),
        children: vec![Node::text("")],
        ..ElementNode::new(ElementKind::Image)
    }))]
}

fn marked(mut children: Vec<Walked>, set: impl Fn(&mut Marks)) -> Vec<Walked> {
    for walked in &mut children {
        mark_node(&mut walked.node, &set);
    }
    children
}

fn mark_node(node: &mut Node, set: &dyn Fn(&mut Marks)) {
    match node {
        Node::Text(t) => set(&mut t.marks),
        // Marks compose across nested inline elements (link text keeps
        // the surrounding bold); block children are left alone.
        Node::Element(el) if el.kind.is_inline() => {
            for child in &mut el.children {
                mark_node(child, set);
            }
        }
        Node::Element(_) => {}
    }
}

fn node_is_inline(node: &Node) -> bool {
    match node {
        Node::Text(_) => true,
        Node::Element(el) => el.kind.is_inline(),
    }
}

// ---------------------------------------------------------------------------
// Inline style inference.
// ---------------------------------------------------------------------------

fn apply_style_marks(el: &DomElement, children: &mut [Walked]) {
    let style = el.attr("style").unwrap_or("");
    if style.is_empty() {
        return;
    }

    if let Some(color) = style_value(style, "color") {
        if !color.is_empty() {
            for walked in children.iter_mut() {
                mark_node(&mut walked.node, &|m: &mut Marks| {
                    m.color = Some(color.clone())
                });
            }
        }
    }
    if style_value(style, "font-weight").is_some_and(|v| v == "bold" || v == "700") {
        for walked in children.iter_mut() {
            mark_node(&mut walked.node, &|m: &mut Marks| m.bold = true);
        }
    }
    if style_value(style, "font-style").is_some_and(|v| v == "italic") {
        for walked in children.iter_mut() {
            mark_node(&mut walked.node, &|m: &mut Marks| m.italic = true);
        }
    }
    if let Some(decoration) = style_value(style, "text-decoration") {
        if decoration.contains("underline") {
            for walked in children.iter_mut() {
                mark_node(&mut walked.node, &|m: &mut Marks| m.underline = true);
            }
        }
        if decoration.contains("line-through") {
            for walked in children.iter_mut() {
                mark_node(&mut walked.node, &|m: &mut Marks| m.strikethrough = true);
            }
        }
    }
}

fn style_value(style: &str, property: &str) -> Option<String> {
    for declaration in style.split(';') {
        let Some((name, value)) = declaration.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(property) {
            return Some(value.trim().to_ascii_lowercase());
        }
    }
    None
}

fn dom_align(el: &DomElement) -> Option<Align> {
    let value = el
        .attr("style")
        .and_then(|style| style_value(style, "text-align"))
        .or_else(|| el.attr("align").map(|v| v.to_ascii_lowercase()))?;
    match value.as_str() {
        "left" => Some(Align::Left),
        "center" => Some(Align::Center),
        "right" => Some(Align::Right),
        "justify" => Some(Align::Justify),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Word fake-list detection.
// ---------------------------------------------------------------------------

fn is_word_list_paragraph(el: &DomElement) -> bool {
    if el
        .attr("class")
        .is_some_and(|class| class.contains("MsoListParagraph"))
    {
        return true;
    }
    if el
        .attr("style")
        .is_some_and(|style| style.to_ascii_lowercase().contains("mso-list"))
    {
        return true;
    }
    contains_word_ignore_marker(el)
}

fn contains_word_ignore_marker(el: &DomElement) -> bool {
    el.children.iter().any(|child| match child {
        DomNode::Comment(body) => body.contains("supportLists"),
        DomNode::Element(inner) => {
            inner.attr("style").is_some_and(|style| {
                style
                    .to_ascii_lowercase()
                    .replace(' ', "")
                    .contains("mso-list:ignore")
            }) || contains_word_ignore_marker(inner)
        }
        DomNode::Text(_) => false,
    })
}

fn has_symbol_font(el: &DomElement) -> bool {
    let in_attrs = el.attrs.iter().any(|(_, value)| {
        let value = value.to_ascii_lowercase();
        value.contains("symbol") || value.contains("wingdings")
    });
    in_attrs
        || el
            .children
            .iter()
            .any(|c| matches!(c, DomNode::Element(inner) if has_symbol_font(inner)))
}

fn collect_inner_text(el: &DomElement, out: &mut String) {
    for child in &el.children {
        match child {
            DomNode::Text(t) => out.push_str(t),
            DomNode::Element(inner) => {
                if inner.tag == "br" {
                    out.push('\n');
                } else {
                    collect_inner_text(inner, out);
                }
            }
            DomNode::Comment(_) => {}
        }
    }
}

fn word_list_item(el: &DomElement) -> Vec<Walked> {
    let mut text = String::new();
    collect_inner_text(el, &mut text);

    let bulleted = has_symbol_font(el) || text.contains('·') || text.contains('•');
    let kind = if bulleted {
        ListKind::Bulleted
    } else {
        ListKind::Numbered
    };

    let text = text.replace(['\n', '\r'], " ");
    let cleaned = strip_enumerator(text.trim(), kind);

    vec![Walked {
        node: Node::list_item(cleaned),
        list_hint: Some(kind),
    }]
}

fn strip_enumerator(text: &str, kind: ListKind) -> String {
    let text = text.trim_start();
    match kind {
        ListKind::Numbered => {
            let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits > 0 {
                let rest = &text[digits..];
                if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
                    return rest.trim_start().to_string();
                }
            }
            text.to_string()
        }
        ListKind::Bulleted => {
            let mut chars = text.chars();
            match chars.next() {
                Some('·') | Some('•') | Some('-') => chars.as_str().trim_start().to_string(),
                _ => text.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level grouping: consecutive hinted items merge into one container;
// stray inline nodes are wrapped into paragraphs.
// ---------------------------------------------------------------------------

fn group_top_level(walked: Vec<Walked>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    let mut list_kind: Option<ListKind> = None;
    let mut list_run: Vec<Node> = Vec::new();
    let mut inline_run: Vec<Node> = Vec::new();

    fn flush_list(kind: &mut Option<ListKind>, run: &mut Vec<Node>, out: &mut Vec<Node>) {
        if let Some(kind) = kind.take() {
            if !run.is_empty() {
                out.push(Node::list(kind, std::mem::take(run)));
            }
        }
    }

    fn flush_inline(run: &mut Vec<Node>, out: &mut Vec<Node>) {
        if run.is_empty() {
            return;
        }
        out.push(Node::Element(ElementNode {
            children: std::mem::take(run),
            ..ElementNode::new(ElementKind::Paragraph)
        }));
    }

    for item in walked {
        match item.list_hint {
            Some(kind) => {
                flush_inline(&mut inline_run, &mut out);
                if list_kind != Some(kind) {
                    flush_list(&mut list_kind, &mut list_run, &mut out);
                    list_kind = Some(kind);
                }
                list_run.push(item.node);
            }
            None => {
                flush_list(&mut list_kind, &mut list_run, &mut out);
                if node_is_inline(&item.node) {
                    inline_run.push(item.node);
                } else {
                    flush_inline(&mut inline_run, &mut out);
                    out.push(item.node);
                }
            }
        }
    }
    flush_list(&mut list_kind, &mut list_run, &mut out);
    flush_inline(&mut inline_run, &mut out);

    out
}

// ---------------------------------------------------------------------------
// Plain text.
// ---------------------------------------------------------------------------

/// Deserialize pasted plain text: one paragraph per line, with URL/email
/// lines becoming links and enumerated lines grouping into lists.
pub fn deserialize_plain_text(text: &str) -> Vec<Node> {
    let mut walked: Vec<Walked> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((kind, rest)) = detect_enumerator(line) {
            walked.push(Walked {
                node: Node::list_item(rest),
                list_hint: Some(kind),
            });
            continue;
        }

        if is_url(line) {
            walked.push(Walked::plain(Node::Element(ElementNode {
                children: vec![Node::link(line, line)],
                ..ElementNode::new(ElementKind::Paragraph)
            })));
            continue;
        }
        if is_email(line) {
            walked.push(Walked::plain(Node::Element(ElementNode {
                children: vec![Node::link(format!("mailto:{line}"), line)],
                ..ElementNode::new(ElementKind::Paragraph)
            })));
            continue;
        }

        walked.push(Walked::plain(Node::paragraph(line)));
    }

    let blocks = group_top_level(walked);
    if blocks.is_empty() {
        vec![Node::paragraph("")]
    } else {
        blocks
    }
}

fn detect_enumerator(line: &str) -> Option<(ListKind, &str)> {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            if let Some(rest) = rest.strip_prefix(' ') {
                return Some((ListKind::Numbered, rest.trim_start()));
            }
        }
    }

    for bullet in ['-', '*', '•'] {
        if let Some(rest) = line.strip_prefix(bullet) {
            if let Some(rest) = rest.strip_prefix(' ') {
                return Some((ListKind::Bulleted, rest.trim_start()));
            }
        }
    }

    None
}

fn is_url(line: &str) -> bool {
    if line.contains(char::is_whitespace) {
        return false;
    }
    line.starts_with("http://") || line.starts_with("https://") || line.starts_with("www.")
}

fn is_email(line: &str) -> bool {
    if line.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = line.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.contains('@')
}

// ---------------------------------------------------------------------------
// Paste commands.
// ---------------------------------------------------------------------------

pub(crate) struct PastePlugin;

impl EditorPlugin for PastePlugin {
    fn id(&self) -> &'static str {
        "paste"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("paste.insert_html", "Paste HTML", |editor, args| {
                let html: String = parse_arg(args.as_ref(), "html")?;
                insert_blocks(editor, deserialize_html(&html), "command:paste.insert_html")
            })
            .description("Deserialize clipboard HTML and insert it at the selection.")
            .keywords(["paste", "clipboard", "html", "word"])
            .args_example(serde_json::json!({ "html": "<p>Hello</p>" })),
            CommandSpec::new("paste.insert_text", "Paste plain text", |editor, args| {
                let text: String = parse_arg(args.as_ref(), "text")?;
                insert_blocks(
                    editor,
                    deserialize_plain_text(&text),
                    "command:paste.insert_text",
                )
            })
            .description("Interpret pasted plain text and insert it at the selection.")
            .keywords(["paste", "clipboard", "text"])
            .args_example(serde_json::json!({ "text": "Hello" })),
        ]
    }
}

fn insert_blocks(
    editor: &mut Editor,
    blocks: Vec<Node>,
    source: &'static str,
) -> Result<(), CommandError> {
    let Some(sel) = editor.selection().cloned() else {
        return Ok(());
    };

    let insert_at = sel
        .focus
        .path
        .first()
        .map(|ix| ix + 1)
        .unwrap_or(editor.doc().children.len());

    let count = blocks.len();
    let mut ops: Vec<Op> = Vec::new();
    for (i, node) in blocks.into_iter().enumerate() {
        ops.push(Op::InsertNode {
            path: vec![insert_at + i],
            node,
        });
    }
    if ops.is_empty() {
        return Ok(());
    }

    // Land the caret in the last inserted block; selection normalization
    // resolves it to the nearest text leaf.
    let selection_after = Selection::collapsed(Point::new(vec![insert_at + count - 1, 0], 0));

    editor
        .apply(
            Transaction::new(ops)
                .selection_after(selection_after)
                .source(source),
        )
        .map_err(|e| CommandError::new(format!("Failed to insert pasted content: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_survives_malformed_markup() {
        for input in [
            "",
            "<",
            "<p",
            "<p><b>unclosed",
            "</div>stray close",
            "<!-- comment only -->",
            "<p attr=>odd</p>",
        ] {
            // Must not panic; content may be empty.
            let _ = parse_html(input);
        }
    }

    #[test]
    fn entities_decode() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&lt;p&gt;"), "<p>");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("tail &unknown; stays"), "tail &unknown; stays");
    }

    #[test]
    fn enumerator_stripping() {
        assert_eq!(strip_enumerator("1. First", ListKind::Numbered), "First");
        assert_eq!(strip_enumerator("12) Twelve", ListKind::Numbered), "Twelve");
        assert_eq!(strip_enumerator("No marker", ListKind::Numbered), "No marker");
        assert_eq!(strip_enumerator("· Bullet", ListKind::Bulleted), "Bullet");
        assert_eq!(strip_enumerator("- Dash", ListKind::Bulleted), "Dash");
    }
}
