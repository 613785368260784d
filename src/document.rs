//! Whole-document transform
//!
//! A document declares `<unit id value>` and `<segment id d>` elements next
//! to ordinary graphics. [`transform`] removes the declarations, resolves
//! them, then rewrites every `<path d>` and a fixed table of numeric
//! attributes in place.
//!
//! The tree itself is abstracted by [`DocumentTree`] so any DOM can be
//! plugged in; [`ElementTree`] is a small in-memory implementation.

use std::fmt::Write;

use crate::context::{Context, Options};
use crate::errors::Error;
use crate::expr::evaluate_list;
use crate::path::interpret_path;
use crate::units::{Segment, UnitDefinition};

/// Numeric attributes evaluated as expression lists: element, attribute and
/// the number of values (`None` for any number).
const NUMERIC_ATTRIBUTES: &[(&str, &str, Option<usize>)] = &[
    ("svg", "viewBox", Some(4)),
    ("svg", "width", Some(1)),
    ("svg", "height", Some(1)),
    ("rect", "x", Some(1)),
    ("rect", "y", Some(1)),
    ("rect", "width", Some(1)),
    ("rect", "height", Some(1)),
    ("rect", "rx", Some(1)),
    ("rect", "ry", Some(1)),
    ("circle", "r", Some(1)),
    ("circle", "cx", Some(1)),
    ("circle", "cy", Some(1)),
    ("ellipse", "rx", Some(1)),
    ("ellipse", "ry", Some(1)),
    ("ellipse", "cx", Some(1)),
    ("ellipse", "cy", Some(1)),
    ("line", "x1", Some(1)),
    ("line", "y1", Some(1)),
    ("line", "x2", Some(1)),
    ("line", "y2", Some(1)),
    ("image", "x", Some(1)),
    ("image", "y", Some(1)),
    ("image", "width", Some(1)),
    ("image", "height", Some(1)),
    ("pattern", "width", Some(1)),
    ("pattern", "height", Some(1)),
    ("polygon", "points", None),
    ("polyline", "points", None),
    ("textPath", "startOffset", Some(1)),
    ("path", "stroke-width", Some(1)),
    ("marker", "markerWidth", Some(1)),
    ("marker", "markerHeight", Some(1)),
    ("marker", "refX", Some(1)),
    ("marker", "refY", Some(1)),
];

/// The document operations the transform needs
pub trait DocumentTree {
    type Node: Copy;

    /// Elements with this tag, in document order
    fn elements_by_tag(&self, tag: &str) -> Vec<Self::Node>;

    fn attribute(&self, node: Self::Node, name: &str) -> Option<String>;

    fn set_attribute(&mut self, node: Self::Node, name: &str, value: String);

    /// Detach the element and its children from the document
    fn remove(&mut self, node: Self::Node);
}

fn required<T: DocumentTree>(
    tree: &T,
    node: T::Node,
    element: &'static str,
    attribute: &'static str,
) -> Result<String, Error> {
    tree.attribute(node, attribute)
        .ok_or(Error::MissingAttribute { element, attribute })
}

/// Expand all path syntax extensions of a document in place and return the
/// context that was used.
///
/// Stops at the first error; the tree may then be partially rewritten and
/// should be discarded.
pub fn transform<T: DocumentTree>(tree: &mut T, options: Options) -> Result<Context, Error> {
    let mut units = Vec::new();
    for node in tree.elements_by_tag("unit") {
        let id = required(tree, node, "unit", "id")?;
        let value = required(tree, node, "unit", "value")?;
        units.push(UnitDefinition::new(id, value));
        tree.remove(node);
    }

    let mut segments = Vec::new();
    for node in tree.elements_by_tag("segment") {
        let id = required(tree, node, "segment", "id")?;
        let pattern = required(tree, node, "segment", "d")?;
        segments.push(Segment::new(id, pattern));
        tree.remove(node);
    }

    crate::log::debug!(units = units.len(), segments = segments.len(), "collected definitions");
    let context = Context::build(units, segments, options)?;
    let precision = context.options().output_precision();

    for (index, node) in tree.elements_by_tag("path").into_iter().enumerate() {
        let Some(data) = tree.attribute(node, "d") else {
            crate::log::warn!(index, "path without d attribute");
            continue;
        };
        let state = interpret_path(&format!("path[{index}] d"), &data, &context)?;
        tree.set_attribute(node, "d", state.render(precision));
    }

    for &(tag, attribute, limit) in NUMERIC_ATTRIBUTES {
        for node in tree.elements_by_tag(tag) {
            if let Some(text) = tree.attribute(node, attribute) {
                let value = evaluate_list(&format!("{tag} {attribute}"), &text, &context, limit)?;
                tree.set_attribute(node, attribute, value);
            }
        }
    }

    Ok(context)
}

/// Handle to an element of an [`ElementTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(usize);

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<ElementId>,
    parent: Option<ElementId>,
}

/// Arena-backed element tree without text content
#[derive(Debug, Clone)]
pub struct ElementTree {
    elements: Vec<Element>,
}

impl ElementTree {
    pub fn new(root: &str) -> Self {
        Self {
            elements: vec![Element {
                tag: root.to_string(),
                attributes: Vec::new(),
                children: Vec::new(),
                parent: None,
            }],
        }
    }

    pub fn root(&self) -> ElementId {
        ElementId(0)
    }

    /// Add an element as the last child of `parent`.
    pub fn append(
        &mut self,
        parent: ElementId,
        tag: &str,
        attributes: &[(&str, &str)],
    ) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(Element {
            tag: tag.to_string(),
            attributes: attributes
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            children: Vec::new(),
            parent: Some(parent),
        });
        if let Some(parent) = self.elements.get_mut(parent.0) {
            parent.children.push(id);
        }
        id
    }

    pub fn tag(&self, id: ElementId) -> Option<&str> {
        self.elements.get(id.0).map(|element| element.tag.as_str())
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.elements.get(id.0).map_or(&[], |element| element.children.as_slice())
    }

    /// Serialize the elements reachable from the root. Childless elements
    /// are self-closing; attributes keep their insertion order.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_element(self.root(), &mut out);
        out
    }

    fn write_element(&self, id: ElementId, out: &mut String) {
        let Some(element) = self.elements.get(id.0) else {
            return;
        };
        out.push('<');
        out.push_str(&element.tag);
        for (name, value) in &element.attributes {
            let _ = write!(out, " {name}=\"{}\"", escape_attribute(value));
        }
        if element.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for &child in &element.children {
            self.write_element(child, out);
        }
        let _ = write!(out, "</{}>", element.tag);
    }

    fn walk(&self, id: ElementId, visit: &mut impl FnMut(ElementId, &Element)) {
        if let Some(element) = self.elements.get(id.0) {
            visit(id, element);
            for &child in &element.children {
                self.walk(child, visit);
            }
        }
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl DocumentTree for ElementTree {
    type Node = ElementId;

    fn elements_by_tag(&self, tag: &str) -> Vec<ElementId> {
        let mut found = Vec::new();
        self.walk(self.root(), &mut |id, element| {
            if element.tag == tag {
                found.push(id);
            }
        });
        found
    }

    fn attribute(&self, node: ElementId, name: &str) -> Option<String> {
        let element = self.elements.get(node.0)?;
        element
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    fn set_attribute(&mut self, node: ElementId, name: &str, value: String) {
        let Some(element) = self.elements.get_mut(node.0) else {
            return;
        };
        match element.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => element.attributes.push((name.to_string(), value)),
        }
    }

    fn remove(&mut self, node: ElementId) {
        let Some(parent) = self.elements.get(node.0).and_then(|element| element.parent) else {
            return;
        };
        if let Some(parent) = self.elements.get_mut(parent.0) {
            parent.children.retain(|&child| child != node);
        }
        if let Some(element) = self.elements.get_mut(node.0) {
            element.parent = None;
        }
    }
}
