use std::collections::{HashMap, HashSet};

use markup5ever_rcdom::Handle;

use crate::dom;

/// Custom elements the renderer emits for embedded attachments.
pub const EMBED_ATTACHMENT: &str = "govspeak-embed-attachment";
pub const EMBED_ATTACHMENT_LINK: &str = "govspeak-embed-attachment-link";

/// Global attributes of the relaxed profile that ammonia's defaults leave out.
const RELAXED_GENERIC_ATTRIBUTES: [&str; 5] = ["class", "dir", "hidden", "id", "translate"];

/// Dropped together with their contents rather than unwrapped.
const REMOVE_CONTENTS_TAGS: [&str; 9] = [
    "iframe", "math", "noembed", "noframes", "noscript", "object", "plaintext", "template", "xmp",
];

/// Attributes whose values are URLs and must pass the scheme check.
const URL_ATTRIBUTES: [&str; 8] = [
    "action", "background", "cite", "formaction", "href", "longdesc", "poster", "src",
];

const DATA_ATTRIBUTE_PREFIX: &str = "data-";

/// Which elements, attributes and URL schemes survive sanitization.
///
/// Built fresh for every sanitize call and never mutated once built.
#[derive(Debug, Clone)]
pub struct AllowListConfig {
    tags: HashSet<&'static str>,
    tag_attributes: HashMap<&'static str, HashSet<&'static str>>,
    tag_attribute_prefixes: HashMap<&'static str, HashSet<&'static str>>,
    generic_attributes: HashSet<&'static str>,
    url_schemes: HashSet<&'static str>,
    clean_content_tags: HashSet<&'static str>,
}

impl AllowListConfig {
    /// Ammonia's default policy, widened to the relaxed profile.
    pub fn relaxed() -> Self {
        let base = ammonia::Builder::default();

        let mut generic_attributes = base.clone_generic_attributes();
        generic_attributes.extend(RELAXED_GENERIC_ATTRIBUTES);

        let mut tag_attributes = base.clone_tag_attributes();
        tag_attributes.entry("a").or_default().extend(["name", "rel"]);

        let mut clean_content_tags = base.clone_clean_content_tags();
        clean_content_tags.extend(REMOVE_CONTENTS_TAGS);

        Self {
            tags: base.clone_tags(),
            tag_attributes,
            tag_attribute_prefixes: HashMap::new(),
            generic_attributes,
            url_schemes: base.clone_url_schemes(),
            clean_content_tags,
        }
    }

    /// The relaxed policy plus the constructs authored content relies on:
    /// attachment embeds, inline SVG icons, data attributes and table cell
    /// alignment.
    pub fn authoring() -> Self {
        let mut config = Self::relaxed();

        config.tags.extend([EMBED_ATTACHMENT, EMBED_ATTACHMENT_LINK, "svg", "path"]);
        config.generic_attributes.extend(["role", "aria-label"]);

        for tag in ["a", "div"] {
            config.tag_attribute_prefixes.entry(tag).or_default().insert(DATA_ATTRIBUTE_PREFIX);
        }

        let with_generic = |extra: &[&'static str]| -> HashSet<&'static str> {
            config.generic_attributes.iter().chain(extra).copied().collect()
        };
        let svg = with_generic(&["xmlns", "width", "height", "viewbox", "focusable"]);
        let path = with_generic(&["fill", "d"]);
        config.tag_attributes.insert("svg", svg);
        config.tag_attributes.insert("path", path);

        // Policed by the table cell style transformer rather than dropped here.
        for tag in ["th", "td"] {
            config.tag_attributes.entry(tag).or_default().insert("style");
        }

        config.tag_attributes.insert(EMBED_ATTACHMENT, HashSet::from(["content-id"]));

        config
    }

    /// The narrow policy a trusted video embed is re-checked against.
    pub fn embedded_video() -> Self {
        let iframe = ["allowfullscreen", "frameborder", "height", "src", "width", "title", "allow"];
        Self {
            tags: HashSet::from(["iframe"]),
            tag_attributes: HashMap::from([("iframe", HashSet::from(iframe))]),
            tag_attribute_prefixes: HashMap::new(),
            generic_attributes: HashSet::new(),
            url_schemes: HashSet::from(["http", "https"]),
            clean_content_tags: HashSet::new(),
        }
    }

    pub fn allows_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Whether a disallowed `tag` takes its subtree with it, instead of
    /// having its children promoted.
    pub fn removes_contents(&self, tag: &str) -> bool {
        self.clean_content_tags.contains(tag)
    }

    /// `attribute` is a lowercased key, see [`dom::attribute_key`].
    pub fn allows_attribute(&self, tag: &str, attribute: &str) -> bool {
        self.generic_attributes.contains(attribute)
            || self.tag_attributes.get(tag).is_some_and(|set| set.contains(attribute))
            || self.tag_attribute_prefixes.get(tag).is_some_and(|prefixes| {
                prefixes.iter().any(|prefix| {
                    attribute.len() > prefix.len() && attribute.starts_with(prefix)
                })
            })
    }

    /// Relative URLs pass; absolute ones need an allowed scheme.
    pub fn allows_url(&self, value: &str) -> bool {
        match url::Url::parse(value) {
            Ok(url) => self.url_schemes.contains(url.scheme()),
            Err(url::ParseError::RelativeUrlWithoutBase) => true,
            Err(_) => false,
        }
    }

    /// Strip every attribute of `node` this policy doesn't permit on `tag`.
    pub fn retain_permitted(&self, node: &Handle, tag: &str) {
        dom::retain_attributes(node, |attr| {
            let Some(key) = dom::attribute_key(&attr.name) else {
                trace!("dropping namespaced attribute {:?} on <{}>", attr.name, tag);
                return false;
            };
            if !self.allows_attribute(tag, &key) {
                trace!("dropping attribute {} on <{}>", key, tag);
                return false;
            }
            if URL_ATTRIBUTES.contains(&key.as_str()) && !self.allows_url(&attr.value) {
                trace!("dropping {} with disallowed url on <{}>", key, tag);
                return false;
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authoring_adds_embed_and_icon_tags() {
        let config = AllowListConfig::authoring();
        for tag in [EMBED_ATTACHMENT, EMBED_ATTACHMENT_LINK, "svg", "path", "p", "table", "img"] {
            assert!(config.allows_tag(tag), "{tag} should be allowed");
        }
        assert!(!config.allows_tag("iframe"));
        assert!(!config.allows_tag("script"));
        assert!(!config.allows_tag("style"));
    }

    #[test]
    fn generic_attributes_apply_everywhere() {
        let config = AllowListConfig::authoring();
        for tag in ["p", "svg", "path", EMBED_ATTACHMENT] {
            assert!(config.allows_attribute(tag, "role"));
            assert!(config.allows_attribute(tag, "aria-label"));
            assert!(config.allows_attribute(tag, "class"));
        }
        assert!(!config.allows_attribute("p", "onclick"));
        assert!(!config.allows_attribute("p", "style"));
    }

    #[test]
    fn data_attributes_only_on_anchors_and_divs() {
        let config = AllowListConfig::authoring();
        assert!(config.allows_attribute("a", "data-module"));
        assert!(config.allows_attribute("div", "data-ecommerce-path"));
        assert!(!config.allows_attribute("div", "data-"));
        assert!(!config.allows_attribute("p", "data-module"));
        assert!(!config.allows_attribute("span", "data-module"));
    }

    #[test]
    fn svg_icons_keep_their_drawing_attributes() {
        let config = AllowListConfig::authoring();
        for attribute in ["xmlns", "width", "height", "viewbox", "focusable", "lang"] {
            assert!(config.allows_attribute("svg", attribute), "{attribute}");
        }
        assert!(config.allows_attribute("path", "d"));
        assert!(config.allows_attribute("path", "fill"));
        assert!(!config.allows_attribute("svg", "onload"));
        assert!(!config.allows_attribute("path", "onclick"));
    }

    #[test]
    fn table_cells_accept_style_for_later_policing() {
        let config = AllowListConfig::authoring();
        assert!(config.allows_attribute("td", "style"));
        assert!(config.allows_attribute("th", "style"));
        assert!(config.allows_attribute("td", "colspan"));
        assert!(!config.allows_attribute("tr", "style"));
    }

    #[test]
    fn attachment_embed_is_limited_to_content_id() {
        let config = AllowListConfig::authoring();
        assert!(config.allows_attribute(EMBED_ATTACHMENT, "content-id"));
        assert!(!config.allows_attribute(EMBED_ATTACHMENT, "data-x"));
        assert!(!config.allows_attribute(EMBED_ATTACHMENT, "src"));
        assert!(!config.allows_attribute(EMBED_ATTACHMENT_LINK, "content-id"));
    }

    #[test]
    fn urls_need_relative_or_known_scheme() {
        let config = AllowListConfig::authoring();
        assert!(config.allows_url("/guidance/x"));
        assert!(config.allows_url("#section-1"));
        assert!(config.allows_url("https://www.example.org/"));
        assert!(config.allows_url("mailto:someone@example.org"));
        assert!(!config.allows_url("javascript:alert(1)"));
        assert!(!config.allows_url("java\tscript:alert(1)"));
        assert!(!config.allows_url("http://[::1"));
    }

    #[test]
    fn embedded_video_policy_is_narrow() {
        let config = AllowListConfig::embedded_video();
        assert!(config.allows_tag("iframe"));
        assert!(!config.allows_tag("p"));
        for attribute in ["allowfullscreen", "frameborder", "height", "src", "width", "title", "allow"] {
            assert!(config.allows_attribute("iframe", attribute));
        }
        assert!(!config.allows_attribute("iframe", "class"));
        assert!(!config.allows_attribute("iframe", "srcdoc"));
        assert!(!config.allows_attribute("iframe", "onload"));
    }

    #[test]
    fn disallowed_script_like_tags_drop_their_contents() {
        let config = AllowListConfig::authoring();
        for tag in ["script", "style", "iframe", "noscript", "template"] {
            assert!(config.removes_contents(tag), "{tag}");
        }
        assert!(!config.removes_contents("font"));
    }
}
