/// Channel url normalization and release link filtering for scraped pages.
///
/// Anchors on a channel page point at playlists, watch pages, shorts and
/// plenty of unrelated places. Only playlists and plain videos survive, and a
/// video that is shown as part of a playlist is folded into that playlist.
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use discog_shared::models::{Catalog, ReleaseDescriptor};

const SITE_ROOT: &str = "https://www.youtube.com";

/// Subdomain whose links never count as releases.
const EXCLUDED_HOST: &str = "music.youtube.com";

/// Channel tabs stripped when normalizing a channel url.
const CHANNEL_TABS: &[&str] = &[
    "releases",
    "videos",
    "about",
    "playlists",
    "featured",
    "streams",
    "shorts",
    "community",
];

/// Playlist ids of this length or shorter are mixes/radio lists, not releases.
const MIN_LIST_ID_LEN: usize = 11;

// ====== REGEX PATTERNS ======

static HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/@([^/?#]+)").unwrap());

static CHANNEL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/channel/([A-Za-z0-9_-]+)").unwrap());

static VIDEO_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

// ====== NORMALIZATION ======

/// Channel root url: no query, no fragment, no trailing tab segment.
///
/// `https://www.youtube.com/@artist/releases?view=0` -> `https://www.youtube.com/@artist`
pub fn channel_root_url(url: &str) -> String {
    let trimmed = url.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_string();
    };
    parsed.set_query(None);
    parsed.set_fragment(None);

    let mut segments: Vec<String> = parsed
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).map(String::from).collect())
        .unwrap_or_default();
    if segments.len() > 1 {
        if let Some(last) = segments.last() {
            if CHANNEL_TABS.contains(&last.as_str()) {
                segments.pop();
            }
        }
    }
    parsed.set_path(&segments.join("/"));

    parsed.as_str().trim_end_matches('/').to_string()
}

/// Channel name taken from the url itself (`@handle` or `channel/<id>`).
pub fn channel_handle(url: &str) -> Option<String> {
    HANDLE_RE
        .captures(url)
        .or_else(|| CHANNEL_ID_RE.captures(url))
        .map(|c| c[1].to_string())
        .filter(|h| !h.is_empty())
}

// ====== LINK CLASSIFICATION ======

/// What an anchor on the channel page points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateLink {
    /// A release-sized playlist; `video_id` is set when reached via a watch page.
    Playlist {
        list_id: String,
        video_id: Option<String>,
    },
    /// A standalone video.
    Video { video_id: String },
    /// Anything else.
    Ignored,
}

impl CandidateLink {
    pub fn url(&self) -> Option<String> {
        match self {
            CandidateLink::Playlist { list_id, .. } => {
                Some(format!("{}/playlist?list={}", SITE_ROOT, list_id))
            }
            CandidateLink::Video { video_id } => Some(format!("{}/watch?v={}", SITE_ROOT, video_id)),
            CandidateLink::Ignored => None,
        }
    }
}

/// Classify one href, relative or absolute.
pub fn classify_link(href: &str) -> CandidateLink {
    let Ok(base) = Url::parse(SITE_ROOT) else {
        return CandidateLink::Ignored;
    };
    let Ok(url) = base.join(href.trim()) else {
        return CandidateLink::Ignored;
    };

    let host = url.host_str().unwrap_or_default();
    let on_site = host == "youtube.com" || host.ends_with(".youtube.com");
    if !on_site || host == EXCLUDED_HOST || url.path().contains("/shorts/") {
        return CandidateLink::Ignored;
    }

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    let list_id = param("list").filter(|l| l.len() >= MIN_LIST_ID_LEN);
    let video_id = param("v").filter(|v| VIDEO_ID_RE.is_match(v));

    match url.path() {
        "/playlist" => match list_id {
            Some(list_id) => CandidateLink::Playlist { list_id, video_id: None },
            None => CandidateLink::Ignored,
        },
        "/watch" => match (list_id, video_id) {
            (Some(list_id), video_id) => CandidateLink::Playlist { list_id, video_id },
            (None, Some(video_id)) => CandidateLink::Video { video_id },
            (None, None) => CandidateLink::Ignored,
        },
        _ => CandidateLink::Ignored,
    }
}

/// Turn scraped hrefs into an ordered, deduplicated catalog of untitled releases.
///
/// Videos that appear anywhere on the page together with a playlist are
/// represented only by that playlist.
pub fn collect_release_links<I, S>(hrefs: I) -> Catalog
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let links: Vec<CandidateLink> = hrefs.into_iter().map(|h| classify_link(h.as_ref())).collect();

    let mut seen: HashSet<String> = links
        .iter()
        .filter_map(|l| match l {
            CandidateLink::Playlist { video_id: Some(v), .. } => Some(format!("video:{}", v)),
            _ => None,
        })
        .collect();

    let mut catalog = Catalog::new();
    for link in links {
        let key = match &link {
            CandidateLink::Playlist { list_id, .. } => format!("list:{}", list_id),
            CandidateLink::Video { video_id } => format!("video:{}", video_id),
            CandidateLink::Ignored => continue,
        };
        if !seen.insert(key) {
            continue;
        }
        if let Some(url) = link.url() {
            catalog.push(ReleaseDescriptor::untitled(url));
        }
    }
    catalog
}
