/// Filesystem naming rules: title sanitizing and collision-free directories.
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::manifest::TrackManifest;

static ALBUM_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Album - ").unwrap());

static PATH_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[:/]").unwrap());

static TOPIC_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*Topic\s*$").unwrap());

static UNSAFE_CHARS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/:*?"<>|]"#).unwrap());

/// Turn a release title into a directory name.
///
/// `"Album - Greatest Hits: Part 2/3"` becomes `"Greatest Hits - Part 2 -3"`.
pub fn sanitize_title(title: &str) -> String {
    let stripped = ALBUM_PREFIX_RE.replace(title, "");
    PATH_SEPARATOR_RE.replace_all(&stripped, " -").into_owned()
}

/// Clean a scraped channel heading: drop the "- Topic" marker and unsafe characters.
pub fn sanitize_channel_name(name: &str) -> String {
    let stripped = TOPIC_SUFFIX_RE.replace(name.trim(), "");
    UNSAFE_CHARS_RE
        .replace_all(&stripped, "_")
        .trim()
        .to_string()
}

/// Directory name for `title`, or `None` when the sanitized title is not a
/// single plain path component (empty, blank, `.` or `..`).
pub fn dir_name_for(title: &str) -> Option<String> {
    let name = sanitize_title(title);
    is_plain_component(&name).then_some(name)
}

fn is_plain_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    !name.trim().is_empty()
        && matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
}

/// Title used when a release has no usable title.
pub fn fallback_title(now: DateTime<Utc>) -> String {
    format!("Unknown_{}", now.timestamp())
}

/// `base (n)` next to `base`.
pub fn suffixed(base: &Path, n: usize) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(format!(" ({})", n));
    base.with_file_name(name)
}

/// First of `base`, `base (1)`, `base (2)`, ... for which `exists` is false.
pub fn collision_free_path(base: &Path, exists: impl Fn(&Path) -> bool) -> PathBuf {
    if !exists(base) {
        return base.to_path_buf();
    }
    let mut n = 1;
    loop {
        let candidate = suffixed(base, n);
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Create the target directory for a release under `root`.
///
/// Tries `name`, `name (1)`, ... with an atomic `create_dir`, so two jobs of
/// the same run can never claim the same path. An existing directory whose
/// manifest header names `source_url` belongs to this release and is reused.
pub fn claim_release_dir(root: &Path, name: &str, source_url: &str) -> io::Result<PathBuf> {
    if !is_plain_component(name) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{:?} is not a directory name", name),
        ));
    }
    std::fs::create_dir_all(root)?;
    let base = root.join(name);
    let mut candidate = base.clone();
    let mut n = 1;

    loop {
        if candidate.parent() != Some(root) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{:?} is outside {:?}", candidate, root),
            ));
        }
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if TrackManifest::source_url_in(&candidate).as_deref() == Some(source_url) {
                    return Ok(candidate);
                }
                candidate = suffixed(&base, n);
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
