//! Per-node rules that go beyond what the allow-list can say declaratively.

use std::collections::HashSet;
use std::sync::LazyLock;

use markup5ever_rcdom::Handle;
use regex::Regex;
use url::Url;

use crate::config::AllowListConfig;
use crate::dom;

// Table alignment as emitted by markdown renderers, and nothing else.
static TEXT_ALIGN_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^text-align:\s*(?:center|left|right)\s*$").expect("valid regex")
});

static TRUSTED_VIDEO_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?:)?//(?:www\.)?(?:youtube\.com|youtu\.be|youtube-nocookie\.com)/")
        .expect("valid regex")
});

/// Relative image sources are resolved against this to tell same-origin
/// paths apart from scheme-relative ones that name another host.
static RELATIVE_BASE: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://relative.invalid/").expect("valid base url")
});

/// What a transformer sees of the node being visited.
pub struct SanitizeContext<'a> {
    pub node: &'a Handle,
    pub node_name: &'a str,
    /// Set once an earlier transformer approved the node.
    pub is_allowlisted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pass,
    RemoveAttribute(&'static str),
    /// Exempt the node itself from the structural filter.
    Allowlist,
    /// Drop the node along with everything under it.
    Unlink,
}

#[derive(Debug, Clone)]
pub enum Transformer<'a> {
    TableCellStyle,
    EmbeddedVideo,
    ImageSource { allowed_hosts: &'a HashSet<String> },
}

impl Transformer<'_> {
    /// The transformers a sanitize call runs, in order. Image hosts are only
    /// checked when some are configured.
    pub fn for_hosts(allowed_image_hosts: &HashSet<String>) -> Vec<Transformer<'_>> {
        let mut transformers = vec![Transformer::TableCellStyle, Transformer::EmbeddedVideo];
        if !allowed_image_hosts.is_empty() {
            transformers.push(Transformer::ImageSource { allowed_hosts: allowed_image_hosts });
        }
        transformers
    }

    pub fn applies_to(&self, ctx: &SanitizeContext<'_>) -> bool {
        match self {
            Transformer::TableCellStyle => matches!(ctx.node_name, "td" | "th"),
            Transformer::EmbeddedVideo => ctx.node_name == "iframe" && !ctx.is_allowlisted,
            Transformer::ImageSource { .. } => ctx.node_name == "img",
        }
    }

    pub fn evaluate(&self, ctx: &SanitizeContext<'_>) -> Decision {
        if !self.applies_to(ctx) {
            return Decision::Pass;
        }
        match self {
            Transformer::TableCellStyle => check_cell_style(ctx),
            Transformer::EmbeddedVideo => check_video_embed(ctx),
            Transformer::ImageSource { allowed_hosts } => check_image_source(ctx, allowed_hosts),
        }
    }
}

fn check_cell_style(ctx: &SanitizeContext<'_>) -> Decision {
    match dom::get_attribute(ctx.node, "style") {
        Some(style) if !is_text_align_style(&style) => {
            debug!("removing style {:?} from <{}>", style, ctx.node_name);
            Decision::RemoveAttribute("style")
        }
        _ => Decision::Pass,
    }
}

fn is_text_align_style(style: &str) -> bool {
    TEXT_ALIGN_STYLE.is_match(style)
}

fn check_video_embed(ctx: &SanitizeContext<'_>) -> Decision {
    let Some(src) = dom::get_attribute(ctx.node, "src") else {
        return Decision::Pass;
    };
    if !is_trusted_video_src(&src) {
        return Decision::Pass;
    }
    // A trusted src alone must not carry arbitrary attributes through.
    AllowListConfig::embedded_video().retain_permitted(ctx.node, "iframe");
    // Fallback content is serialized as raw text; an embed has no use for it.
    dom::take_children(ctx.node);
    debug!("allowlisting video embed {:?}", src);
    Decision::Allowlist
}

pub fn is_trusted_video_src(src: &str) -> bool {
    TRUSTED_VIDEO_SRC.is_match(src)
}

fn check_image_source(ctx: &SanitizeContext<'_>, allowed_hosts: &HashSet<String>) -> Decision {
    let Some(src) = dom::get_attribute(ctx.node, "src") else {
        return Decision::Pass;
    };
    match ImageSource::classify(&src) {
        ImageSource::Relative => Decision::Pass,
        ImageSource::Remote(Some(host)) if allowed_hosts.contains(&host) => Decision::Pass,
        source => {
            debug!("removing image with untrusted source {:?} ({:?})", src, source);
            Decision::Unlink
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ImageSource {
    Relative,
    Remote(Option<String>),
    Malformed,
}

impl ImageSource {
    pub fn classify(src: &str) -> Self {
        match Url::parse(src) {
            Ok(url) => ImageSource::Remote(url.host_str().map(Into::into)),
            Err(url::ParseError::RelativeUrlWithoutBase) => match RELATIVE_BASE.join(src) {
                Ok(url) if url.host_str() == RELATIVE_BASE.host_str() => ImageSource::Relative,
                // `//host/x.png` and friends
                Ok(url) => ImageSource::Remote(url.host_str().map(Into::into)),
                Err(_) => ImageSource::Malformed,
            },
            Err(_) => ImageSource::Malformed,
        }
    }
}
