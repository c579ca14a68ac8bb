//! Native-filename derivation, sanitization, and title prefixes.
//!
//! Everything here is a pure function of a URL or title string; the
//! assignment pass in [`super`] composes these into final on-disk names.

use url::Url;

use crate::resolver::nepis;

/// Words excluded when deriving a title prefix (matched case-insensitively).
pub const FILLER_WORDS: [&str; 9] = ["to", "the", "of", "and", "at", "in", "for", "a", "an"];

/// Number of title words a prefix is built from.
const PREFIX_WORD_COUNT: usize = 4;

/// Path extensions that mark a dynamic server endpoint rather than a file.
const DYNAMIC_ENDPOINT_EXTENSIONS: [&str; 5] = ["cfm", "exe", "aspx", "php", "jsp"];

/// Query parameters that carry a filename directly.
const FILENAME_QUERY_PARAMS: [&str; 2] = ["file", "filename"];

/// Query parameters that carry a numeric download identifier.
const ID_QUERY_PARAMS: [&str; 2] = ["p_download_id", "id"];

/// Sanitizes a filename for Windows/Unix compatibility.
///
/// Invalid characters (`< > : " / \ | ? *` and control characters) become
/// underscores, runs of underscores collapse to one, and leading/trailing
/// dots and spaces are stripped.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for ch in name.chars() {
        let mapped = match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        };
        if mapped == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(mapped);
            prev_underscore = false;
        }
    }
    out.trim_matches(['.', ' ']).to_string()
}

/// Derives the title prefix: the first four non-filler words, each
/// capitalized, concatenated.
///
/// Returns `None` when the title contains no usable words.
#[must_use]
pub fn title_prefix(title: &str) -> Option<String> {
    let words: Vec<&str> = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .filter(|w| !FILLER_WORDS.iter().any(|f| w.eq_ignore_ascii_case(f)))
        .take(PREFIX_WORD_COUNT)
        .collect();

    if words.is_empty() {
        return None;
    }

    let mut prefix = String::new();
    for word in words {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            prefix.extend(first.to_uppercase());
            prefix.push_str(chars.as_str().to_lowercase().as_str());
        }
    }
    let prefix = sanitize_filename(&prefix);
    (!prefix.is_empty()).then_some(prefix)
}

/// Derives the native filename implied by a URL, without any I/O.
///
/// Tried in order: a filename-bearing query parameter, the indirect host's
/// document key (its text keys name PDF assets), a dotted last path segment
/// that is not a dynamic endpoint, and a numeric download-id parameter.
/// Returns `None` when the URL implies no name at all; the caller falls back
/// to a record-derived name.
#[must_use]
pub fn native_filename(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;

    for (key, value) in parsed.query_pairs() {
        if FILENAME_QUERY_PARAMS
            .iter()
            .any(|p| key.eq_ignore_ascii_case(p))
            && value.contains('.')
        {
            let name = sanitize_filename(&value);
            if !name.is_empty() {
                return Some(name);
            }
        }
    }

    if nepis::is_nepis_url(url) {
        if let Some(dockey) = nepis::extract_dockey(url) {
            return Some(format!("{dockey}.pdf"));
        }
    }

    if let Some(segment) = last_path_segment(&parsed) {
        if let Some(dot) = segment.rfind('.') {
            let extension = segment[dot + 1..].to_lowercase();
            if !extension.is_empty()
                && !DYNAMIC_ENDPOINT_EXTENSIONS.contains(&extension.as_str())
            {
                let decoded = urlencoding::decode(&segment)
                    .map(|d| d.into_owned())
                    .unwrap_or(segment);
                let name = sanitize_filename(&decoded);
                if !name.is_empty() {
                    return Some(name);
                }
            }
        }
    }

    for (key, value) in parsed.query_pairs() {
        if ID_QUERY_PARAMS.iter().any(|p| key.eq_ignore_ascii_case(p))
            && !value.is_empty()
            && value.chars().all(|c| c.is_ascii_digit())
        {
            return Some(format!("download_{value}.bin"));
        }
    }

    None
}

/// Splits a filename into stem and extension (extension keeps its dot).
#[must_use]
pub fn split_stem_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

fn last_path_segment(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|s| !s.is_empty())
}
