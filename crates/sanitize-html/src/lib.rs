#[macro_use]
extern crate tracing;

pub mod config;
pub mod dom;
pub mod engine;
pub mod transform;

use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Serialize, Deserialize};

pub use config::AllowListConfig;
pub use engine::Sanitizer;
pub use transform::{Decision, SanitizeContext, Transformer};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Hosts absolute image sources may point at. Empty turns image host
    /// checking off entirely.
    pub allowed_image_hosts: HashSet<String>,
}

impl Options {
    pub fn with_allowed_image_hosts<I, S>(hosts: I) -> Self
        where I: IntoIterator<Item = S>,
            S: Into<String>,
    {
        Self {
            allowed_image_hosts: hosts.into_iter().map(Into::into).collect(),
        }
    }
}

// Unwrapping can leave nestings the parser would never build (a heading
// inside a heading), which reparse differently. Passes repeat until the
// output reparses to itself.
const MAX_PASSES: usize = 4;

/// Sanitize one HTML fragment produced by the markdown renderer.
///
/// Never fails: anything that can't be understood is stripped.
#[tracing::instrument(skip_all, fields(len = dirty_html.len()))]
pub fn sanitize(dirty_html: &str, allowed_image_hosts: &HashSet<String>) -> String {
    let sanitizer = Sanitizer::new(AllowListConfig::authoring(), Transformer::for_hosts(allowed_image_hosts));

    let mut html = sanitize_pass(&sanitizer, dirty_html);
    for pass in 1..MAX_PASSES {
        let again = sanitize_pass(&sanitizer, &html);
        if again == html {
            break;
        }
        trace!("pass {} restructured the output", pass);
        html = again;
    }
    html
}

fn sanitize_pass(sanitizer: &Sanitizer<'_>, html: &str) -> String {
    let dom = dom::parse_fragment(html);
    let Some(root) = dom::fragment_root(&dom) else {
        return String::new();
    };

    sanitizer.clean(&root);

    match dom::serialize_children(&root) {
        Ok(html) => html,
        Err(e) => {
            warn!("Error serializing sanitized html: {}", e);
            String::new()
        }
    }
}

pub struct HtmlSanitizer<'a> {
    dirty_html: &'a str,
    options: Options,
}

impl<'a> HtmlSanitizer<'a> {
    pub fn new(dirty_html: &'a str, options: Options) -> Self {
        Self { dirty_html, options }
    }

    pub fn sanitize(&self) -> String {
        sanitize(self.dirty_html, &self.options.allowed_image_hosts)
    }

    pub fn sanitize_config(&self) -> AllowListConfig {
        AllowListConfig::authoring()
    }

    pub fn transformers(&self) -> Vec<Transformer<'_>> {
        Transformer::for_hosts(&self.options.allowed_image_hosts)
    }
}
