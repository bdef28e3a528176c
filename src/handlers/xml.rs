//! A small editable XML tree.
//!
//! Project files are hand-edited and reviewed in diffs, so a rewrite must
//! leave everything it does not touch byte-for-byte intact. The tree keeps
//! raw start tags, raw (still escaped) text, comments and declarations, and
//! only re-serializes the parts that were changed.
//!
//! Element lookups match on the local name, so `metadata` finds both
//! `<metadata>` and `<nu:metadata>`.

use std::fs;
use std::path::{
    Path,
    PathBuf,
};

use anyhow::{
    Context,
    Result,
};
use quick_xml::Reader;
use quick_xml::escape::{
    partial_escape,
    unescape,
};
use quick_xml::events::{
    BytesStart,
    Event,
};

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Text exactly as it appears in the file, entities not expanded.
    Text(String),
    CData(String),
    Comment(String),
    Decl(String),
    PI(String),
    DocType(String),
}

impl Node {
    fn is_blank_text(&self) -> bool {
        matches!(self, Node::Text(t) if t.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    /// Start tag content between `<` and `>` (or `/>`).
    start: String,
    self_closing: bool,
    pub children: Vec<Node>,
}

impl Element {
    /// A new element without attributes or children.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            start: name.to_string(),
            self_closing: true,
            children: Vec::new(),
        }
    }

    /// A new element holding `text`.
    pub fn with_text(name: &str, text: &str) -> Self {
        let mut element = Self::new(name);
        element.set_text(text);
        element
    }

    fn from_start(start: &BytesStart<'_>, self_closing: bool) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.with_context(|| format!("Malformed attribute on <{}>", name))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            start: String::from_utf8_lossy(start).into_owned(),
            self_closing,
            children: Vec::new(),
        })
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn is(&self, name: &str) -> bool {
        self.local_name() == name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| local_name(key) == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attributes(&self) -> bool {
        !self.attributes.is_empty()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn has_elements(&self) -> bool {
        self.elements().next().is_some()
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.is(name))
    }

    /// Concatenated, unescaped text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(raw) => match unescape(raw) {
                    Ok(text) => out.push_str(&text),
                    Err(_) => out.push_str(raw),
                },
                Node::CData(data) => out.push_str(data),
                Node::Element(e) => e.collect_text(out),
                _ => {}
            }
        }
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        let escaped = partial_escape(text).replace("-&gt;", "->");
        self.children = vec![Node::Text(escaped)];
        self.open_up();
    }

    /// Turn `<a />` into `<a>` before it gains content.
    fn open_up(&mut self) {
        if self.self_closing {
            let trimmed = self.start.trim_end().len();
            self.start.truncate(trimmed);
            self.self_closing = false;
        }
    }

    /// Indentation of the first child element, if any child sits on its
    /// own line.
    fn child_indent(&self) -> Option<&str> {
        let mut previous: Option<&Node> = None;
        for node in &self.children {
            if let Node::Element(_) = node {
                return match previous {
                    Some(Node::Text(t)) if t.contains('\n') => {
                        t.rsplit('\n').next().map(|s| s.trim_end_matches('\r'))
                    }
                    _ => None,
                };
            }
            previous = Some(node);
        }
        None
    }

    /// Append `child` as the last element, on its own line.
    ///
    /// `depth` is the nesting depth of `self` (the root is 0).
    pub fn append_child(&mut self, child: Element, depth: usize, layout: &Layout) {
        if self.children.last().is_some_and(Node::is_blank_text) {
            self.children.pop();
        }
        self.children.push(Node::Text(layout.line(depth + 1)));
        self.children.push(Node::Element(child));
        self.children.push(Node::Text(layout.line(depth)));
        self.open_up();
    }

    /// Insert `child` before every other child, on its own line.
    pub fn prepend_child(&mut self, child: Element, depth: usize, layout: &Layout) {
        if !self.has_elements() {
            self.append_child(child, depth, layout);
            return;
        }
        self.children.insert(0, Node::Element(child));
        self.children.insert(0, Node::Text(layout.line(depth + 1)));
    }

    /// Insert `child` right after the first child element named `after`.
    /// Appends when there is no such element.
    pub fn insert_after(&mut self, after: &str, child: Element, depth: usize, layout: &Layout) {
        let position = self
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(e) if e.is(after)));
        match position {
            Some(index) => {
                self.children.insert(index + 1, Node::Element(child));
                self.children.insert(index + 1, Node::Text(layout.line(depth + 1)));
            }
            None => self.append_child(child, depth, layout),
        }
    }

    /// Remove every child element named `name` together with the whitespace
    /// that precedes it. Returns how many were removed.
    pub fn remove_children(&mut self, name: &str) -> usize {
        self.remove_where(|e| e.is(name))
    }

    fn remove_where(&mut self, mut predicate: impl FnMut(&Element) -> bool) -> usize {
        let mut removed = 0;
        let mut index = 0;
        while index < self.children.len() {
            let hit = matches!(&self.children[index], Node::Element(e) if predicate(e));
            if !hit {
                index += 1;
                continue;
            }
            self.children.remove(index);
            removed += 1;
            if index > 0 && self.children[index - 1].is_blank_text() {
                self.children.remove(index - 1);
                index -= 1;
            }
        }
        removed
    }

    /// Remove descendants that have no child elements, no attributes and no
    /// text, innermost first, so a parent emptied by the pass goes too.
    pub fn prune_empty_leaves(&mut self) -> usize {
        let mut removed = 0;
        for child in self.elements_mut() {
            removed += child.prune_empty_leaves();
        }
        removed += self.remove_where(Element::is_empty_leaf);
        removed
    }

    fn is_empty_leaf(&self) -> bool {
        !self.has_elements()
            && !self.has_attributes()
            && !self.children.iter().any(|n| matches!(n, Node::Comment(_)))
            && self.text().trim().is_empty()
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.start);
        if self.children.is_empty() && self.self_closing {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            write_node(node, out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(e) => e.write(out),
        Node::Text(raw) => out.push_str(raw),
        Node::CData(data) => {
            out.push_str("<![CDATA[");
            out.push_str(data);
            out.push_str("]]>");
        }
        Node::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        Node::Decl(d) | Node::PI(d) => {
            out.push_str("<?");
            out.push_str(d);
            out.push_str("?>");
        }
        Node::DocType(d) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(d.trim_start());
            out.push('>');
        }
    }
}

/// Line ending and indentation unit of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub newline: &'static str,
    pub unit: String,
}

impl Layout {
    /// Newline plus `depth` indentation units.
    pub fn line(&self, depth: usize) -> String {
        format!("{}{}", self.newline, self.unit.repeat(depth))
    }
}

/// A parsed XML file: the root element plus whatever surrounds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    prolog: Vec<Node>,
    root: Element,
    epilog: Vec<Node>,
    layout: Layout,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut prolog: Vec<Node> = Vec::new();
        let mut root: Option<Element> = None;
        let mut epilog: Vec<Node> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .with_context(|| format!("XML error at position {}", reader.buffer_position()))?;
            let node = match event {
                Event::Start(e) => {
                    stack.push(Element::from_start(&e, false)?);
                    continue;
                }
                Event::End(_) => Node::Element(stack.pop().context("Unbalanced end tag")?),
                Event::Empty(e) => Node::Element(Element::from_start(&e, true)?),
                Event::Text(e) => Node::Text(String::from_utf8_lossy(&e).into_owned()),
                Event::CData(e) => Node::CData(String::from_utf8_lossy(&e).into_owned()),
                Event::Comment(e) => Node::Comment(String::from_utf8_lossy(&e).into_owned()),
                Event::Decl(e) => Node::Decl(String::from_utf8_lossy(&e).into_owned()),
                Event::PI(e) => Node::PI(String::from_utf8_lossy(&e).into_owned()),
                Event::DocType(e) => Node::DocType(String::from_utf8_lossy(&e).into_owned()),
                Event::Eof => break,
            };
            match (stack.last_mut(), node) {
                (Some(parent), node) => parent.children.push(node),
                (None, Node::Element(element)) if root.is_none() => root = Some(element),
                (None, Node::Element(element)) => {
                    anyhow::bail!("Unexpected second root element <{}>", element.name)
                }
                (None, node) if root.is_none() => prolog.push(node),
                (None, node) => epilog.push(node),
            }
        }

        if let Some(open) = stack.last() {
            anyhow::bail!("Unclosed element <{}>", open.name);
        }
        let root = root.context("Document has no root element")?;
        let unit = match root.child_indent() {
            Some(unit) if !unit.is_empty() => unit.to_string(),
            _ => "  ".to_string(),
        };
        let layout = Layout {
            newline: if xml.contains("\r\n") { "\r\n" } else { "\n" },
            unit,
        };
        Ok(Self {
            prolog,
            root,
            epilog,
            layout,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&xml).with_context(|| format!("Failed to parse XML in {}", path.display()))
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Root element plus the layout, borrowed together for edits that
    /// insert new lines.
    pub fn root_and_layout(&mut self) -> (&mut Element, &Layout) {
        (&mut self.root, &self.layout)
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.prolog {
            write_node(node, &mut out);
        }
        self.root.write(&mut out);
        for node in &self.epilog {
            write_node(node, &mut out);
        }
        out
    }

    /// Write the document, keeping the previous file as `<file>.bak`.
    pub fn save_with_backup(&self, path: &Path) -> Result<()> {
        let backup = backup_path(path);
        if backup.exists() {
            fs::remove_file(&backup)
                .with_context(|| format!("Failed to remove {}", backup.display()))?;
        }
        fs::rename(path, &backup)
            .with_context(|| format!("Failed to back up {}", path.display()))?;
        fs::write(path, self.to_xml())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    name.into()
}
