//! Parsing, serialization and the handful of node edits the sanitizer needs,
//! over html5ever's reference-counted DOM.

use std::io;
use std::rc::Rc;

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::{Attribute, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Parse a fragment as if it were the contents of a `<div>`.
pub fn parse_fragment(html: &str) -> RcDom {
    let context = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from("div"));
    html5ever::parse_fragment(RcDom::default(), ParseOpts::default(), context, vec![])
        .one(html)
}

/// The synthetic `<html>` element that holds the parsed fragment's nodes.
pub fn fragment_root(dom: &RcDom) -> Option<Handle> {
    dom.document.children.borrow().first().cloned()
}

pub fn serialize_children(node: &Handle) -> io::Result<String> {
    let mut out = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..SerializeOpts::default()
    };
    serialize(&mut out, &SerializableHandle::from(node.clone()), opts)?;
    String::from_utf8(out).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn element_name(node: &Handle) -> Option<&QualName> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name),
        _ => None,
    }
}

/// Key an attribute is matched against the allow-list with.
///
/// Names are lowercased, since the parser camel-cases some SVG attributes
/// (`viewbox` becomes `viewBox`). Namespaced attributes get no key, apart
/// from an `xmlns` declaration.
pub fn attribute_key(name: &QualName) -> Option<String> {
    match &*name.ns {
        "" => Some(str::to_ascii_lowercase(&name.local)),
        XMLNS_NAMESPACE if &*name.local == "xmlns" => Some("xmlns".into()),
        _ => None,
    }
}

pub fn get_attribute(node: &Handle, key: &str) -> Option<String> {
    let NodeData::Element { attrs, .. } = &node.data else {
        return None;
    };
    let value = attrs.borrow().iter()
        .find(|attr| attribute_key(&attr.name).as_deref() == Some(key))
        .map(|attr| attr.value.to_string());
    value
}

pub fn remove_attribute(node: &Handle, key: &str) {
    retain_attributes(node, |attr| attribute_key(&attr.name).as_deref() != Some(key));
}

pub fn retain_attributes(node: &Handle, mut keep: impl FnMut(&Attribute) -> bool) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs.borrow_mut().retain(|attr| keep(attr));
    }
}

/// Detach every child of `node`, returning them in document order.
pub fn take_children(node: &Handle) -> Vec<Handle> {
    let children = std::mem::take(&mut *node.children.borrow_mut());
    for child in &children {
        child.parent.set(None);
    }
    children
}

pub fn append_child(parent: &Handle, child: &Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child.clone());
}

#[cfg(test)]
pub(crate) fn find_element(node: &Handle, tag: &str) -> Option<Handle> {
    if element_name(node).is_some_and(|name| &*name.local == tag) {
        return Some(node.clone());
    }
    let found = node.children.borrow().iter().find_map(|child| find_element(child, tag));
    found
}
