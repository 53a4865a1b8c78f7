use markup5ever_rcdom::{Handle, NodeData};

use crate::config::AllowListConfig;
use crate::dom;
use crate::transform::{Decision, SanitizeContext, Transformer};

/// Walks a parsed fragment, running the transformers on each element and
/// then the structural allow-list filter on whatever they left in place.
pub struct Sanitizer<'a> {
    config: AllowListConfig,
    transformers: Vec<Transformer<'a>>,
}

enum Visit {
    Keep,
    /// Drop the node but keep (and still visit) its children.
    Unwrap,
    Remove,
}

impl<'a> Sanitizer<'a> {
    pub fn new(config: AllowListConfig, transformers: Vec<Transformer<'a>>) -> Self {
        Self { config, transformers }
    }

    /// Clean everything below `root` in place, in document order.
    ///
    /// Children are detached before their parent's verdict is applied and
    /// re-attached to the nearest kept ancestor, so removals never disturb
    /// the part of the tree still to be walked.
    pub fn clean(&self, root: &Handle) {
        let mut stack = Vec::new();
        push_children(&mut stack, root, root);

        while let Some((node, parent)) = stack.pop() {
            match self.visit(&node) {
                Visit::Keep => {
                    dom::append_child(&parent, &node);
                    push_children(&mut stack, &node, &node);
                }
                Visit::Unwrap => push_children(&mut stack, &node, &parent),
                Visit::Remove => (),
            }
        }
    }

    fn visit(&self, node: &Handle) -> Visit {
        if let Some(name) = dom::element_name(node) {
            return self.visit_element(node, &name.local);
        }
        match node.data {
            NodeData::Text { .. } => Visit::Keep,
            // comments, doctypes, processing instructions
            _ => Visit::Remove,
        }
    }

    fn visit_element(&self, node: &Handle, tag: &str) -> Visit {
        let mut ctx = SanitizeContext { node, node_name: tag, is_allowlisted: false };

        for transformer in &self.transformers {
            if !transformer.applies_to(&ctx) {
                continue;
            }
            match transformer.evaluate(&ctx) {
                Decision::Pass => (),
                Decision::RemoveAttribute(attribute) => dom::remove_attribute(node, attribute),
                Decision::Allowlist => ctx.is_allowlisted = true,
                Decision::Unlink => return Visit::Remove,
            }
        }

        if ctx.is_allowlisted {
            return Visit::Keep;
        }

        if !self.config.allows_tag(tag) {
            if self.config.removes_contents(tag) {
                trace!("removing <{}> and its contents", tag);
                return Visit::Remove;
            }
            trace!("unwrapping <{}>", tag);
            return Visit::Unwrap;
        }

        self.config.retain_permitted(node, tag);
        Visit::Keep
    }
}

fn push_children(stack: &mut Vec<(Handle, Handle)>, node: &Handle, parent: &Handle) {
    let children = dom::take_children(node);
    stack.extend(children.into_iter().rev().map(|child| (child, parent.clone())));
}
