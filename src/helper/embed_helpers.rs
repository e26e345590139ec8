use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use url::Url;

const TERABOX_HOSTS: [&str; 4] = ["terabox.com", "1024terabox.com", "teraboxapp.com", "4funbox.com"];
const TERABOX_EMBED_BASE: &str = "https://www.1024terabox.com/sharing/embed";
const YOUTUBE_EMBED_BASE: &str = "https://www.youtube.com/embed/";
const YOUTUBE_ALLOW: &str =
    "accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture; web-share";
const TERABOX_SANDBOX: &str = "allow-scripts allow-same-origin allow-presentation";

/// Characters a URI component leaves unescaped: alphanumerics and `-_.!~*'()`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn youtube_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([^&?#/\s]+)")
            .expect("static YouTube pattern compiles")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbedVariant {
    YouTube { video_id: String },
    FileShareHost { embed_url: String },
    Other { original_url: String },
}

impl EmbedVariant {
    pub fn kind(&self) -> &'static str {
        match self {
            EmbedVariant::YouTube { .. } => "youtube",
            EmbedVariant::FileShareHost { .. } => "terabox",
            EmbedVariant::Other { .. } => "other",
        }
    }
}

/// Picks the embed strategy for a video link. First match wins: YouTube, then
/// the TeraBox family of hosts, then a plain link-out.
pub fn classify(url: &str) -> EmbedVariant {
    if let Some(caps) = youtube_pattern().captures(url) {
        if let Some(id) = caps.get(1) {
            return EmbedVariant::YouTube { video_id: id.as_str().to_string() };
        }
    }

    let lowered = url.to_lowercase();
    if TERABOX_HOSTS.iter().any(|host| lowered.contains(host)) {
        return EmbedVariant::FileShareHost { embed_url: terabox_embed_url(url) };
    }

    EmbedVariant::Other { original_url: url.to_string() }
}

/// Rewrites a share link carrying `surl` into the embed player URL; anything
/// else is returned untouched.
fn terabox_embed_url(url: &str) -> String {
    let surl = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "surl")
            .map(|(_, value)| value.into_owned())
    });

    match surl {
        Some(surl) if !surl.is_empty() => {
            format!("{}?surl={}&autoplay=0", TERABOX_EMBED_BASE, utf8_percent_encode(&surl, URI_COMPONENT))
        }
        _ => url.to_string(),
    }
}

/// Everything `partials/embed.html` needs to draw one video link.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedView {
    pub kind: &'static str,
    pub title: String,
    pub original_url: String,
    pub embed_url: Option<String>,
    pub caption: &'static str,
    pub open_label: &'static str,
    pub allow: Option<&'static str>,
    pub sandbox: Option<&'static str>,
}

impl EmbedView {
    pub fn for_link(url: &str, title: &str) -> Self {
        let variant = classify(url);
        let kind = variant.kind();
        match variant {
            EmbedVariant::YouTube { video_id } => EmbedView {
                kind,
                title: title.to_string(),
                original_url: url.to_string(),
                embed_url: Some(format!("{}{}", YOUTUBE_EMBED_BASE, video_id)),
                caption: "YouTube Video",
                open_label: "Open in YouTube",
                allow: Some(YOUTUBE_ALLOW),
                sandbox: None,
            },
            EmbedVariant::FileShareHost { embed_url } => EmbedView {
                kind,
                title: title.to_string(),
                original_url: url.to_string(),
                embed_url: Some(embed_url),
                caption: "TeraBox Video",
                open_label: "Open in TeraBox",
                allow: None,
                sandbox: Some(TERABOX_SANDBOX),
            },
            EmbedVariant::Other { original_url } => EmbedView {
                kind,
                title: title.to_string(),
                original_url,
                embed_url: None,
                caption: "Video",
                open_label: "Open Video",
                allow: None,
                sandbox: None,
            },
        }
    }

    /// Views for a post's links in their stored order, titled `<title> - Video <n>`.
    pub fn for_links(links: &[String], title: &str) -> Vec<Self> {
        links
            .iter()
            .enumerate()
            .map(|(i, link)| EmbedView::for_link(link, &format!("{} - Video {}", title, i + 1)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn youtube_id(url: &str) -> Option<String> {
        match classify(url) {
            EmbedVariant::YouTube { video_id } => Some(video_id),
            _ => None,
        }
    }

    #[test]
    fn youtube_shapes_yield_the_video_id() {
        assert_eq!(youtube_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(youtube_id("https://youtu.be/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(youtube_id("https://www.youtube.com/embed/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(youtube_id("HTTPS://YOUTU.BE/abc123").as_deref(), Some("abc123"));
    }

    #[test]
    fn youtube_id_stops_at_delimiters() {
        assert_eq!(youtube_id("https://www.youtube.com/watch?v=abc&t=10").as_deref(), Some("abc"));
        assert_eq!(youtube_id("https://youtu.be/abc?si=xyz").as_deref(), Some("abc"));
        assert_eq!(youtube_id("https://youtu.be/abc#t=1").as_deref(), Some("abc"));
    }

    #[test]
    fn youtube_view_embeds_the_id() {
        let view = EmbedView::for_link("https://youtu.be/dQw4w9WgXcQ", "Test Clip");
        assert_eq!(view.kind, "youtube");
        assert_eq!(view.embed_url.as_deref(), Some("https://www.youtube.com/embed/dQw4w9WgXcQ"));
        assert_eq!(view.open_label, "Open in YouTube");
    }

    #[test]
    fn terabox_with_surl_builds_embed_url() {
        let variant = classify("https://www.terabox.com/sharing/link?surl=abc_DEF-1");
        assert_eq!(
            variant,
            EmbedVariant::FileShareHost {
                embed_url: "https://www.1024terabox.com/sharing/embed?surl=abc_DEF-1&autoplay=0".to_string()
            }
        );
    }

    #[test]
    fn terabox_surl_is_percent_encoded() {
        match classify("https://teraboxapp.com/s/x?surl=a%2Fb") {
            EmbedVariant::FileShareHost { embed_url } => {
                assert_eq!(embed_url, "https://www.1024terabox.com/sharing/embed?surl=a%2Fb&autoplay=0")
            }
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn terabox_surl_keeps_uri_component_marks() {
        match classify("https://www.terabox.com/sharing/link?surl=a%20b~c") {
            EmbedVariant::FileShareHost { embed_url } => {
                assert_eq!(embed_url, "https://www.1024terabox.com/sharing/embed?surl=a%20b~c&autoplay=0")
            }
            other => panic!("unexpected variant {:?}", other),
        }
        match classify("https://terabox.com/s/x?surl=x(1)*y!z'w+q") {
            EmbedVariant::FileShareHost { embed_url } => {
                assert_eq!(embed_url, "https://www.1024terabox.com/sharing/embed?surl=x(1)*y!z'w%20q&autoplay=0")
            }
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn terabox_without_surl_keeps_original() {
        for url in ["https://4funbox.com/s/1abcdef", "https://1024TeraBox.com/s/1x?surl=", "terabox.com not a url"] {
            assert_eq!(classify(url), EmbedVariant::FileShareHost { embed_url: url.to_string() });
        }
        let view = EmbedView::for_link("https://4funbox.com/s/1abcdef", "t");
        assert_eq!(view.sandbox, Some("allow-scripts allow-same-origin allow-presentation"));
        assert_eq!(view.caption, "TeraBox Video");
    }

    #[test]
    fn other_links_have_no_iframe() {
        let url = "https://vimeo.com/12345";
        assert_eq!(classify(url), EmbedVariant::Other { original_url: url.to_string() });
        let view = EmbedView::for_link(url, "Clip");
        assert!(view.embed_url.is_none());
        assert_eq!(view.open_label, "Open Video");
        assert_eq!(view.original_url, url);
    }
}
