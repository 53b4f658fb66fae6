//! Conversions between page names, storage slugs, and URL paths.
//!
//! A page is identified inside its region by its slug. Names are what people
//! type, slugs are what the database stores, and URL paths are names with
//! whitespace turned into underscores and everything else percent-encoded.

use crate::db::WikiError;
use unicode_normalization::UnicodeNormalization;

/// Punctuation kept by [`slugify`]. These characters carry meaning in page
/// names, so they contribute to a slug's uniqueness.
pub const SLUG_KEEP_CHARS: &str = "-.,'\"/!@$%&*()";

/// Prefix of attachment URLs embedded in page content.
pub const FILES_URL_PREFIX: &str = "_files/";

/// Cleans up a user-supplied page name.
///
/// Underscores become spaces (they namespace special URLs), `#` is removed
/// (it starts an anchor), and each `/`-separated part is trimmed. Parts that
/// would slugify to nothing are dropped.
pub fn normalize_name(name: &str) -> String {
    name.replace('_', " ")
        .replace('#', "")
        .split('/')
        .map(str::trim)
        .filter(|part| !slugify_segment(part).is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalizes a page name into the slug used for database lookups.
///
/// Deterministic and idempotent: `slugify(&slugify(x)) == slugify(x)`.
/// Decomposition runs before the name is split, so compatibility forms of
/// `/`, `#` and `_` (e.g. `／`) are treated like their ASCII counterparts.
pub fn slugify(name: &str) -> String {
    let decomposed: String = name.nfkd().collect();
    normalize_name(&decomposed)
        .split('/')
        .map(slugify_segment)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Slugifies a single path segment. A `/` never survives here; segment
/// boundaries are decided by the caller.
///
/// NFKD runs again after lowercasing because some lowercase mappings produce
/// composed characters.
fn slugify_segment(segment: &str) -> String {
    let decomposed: String = segment
        .nfkd()
        .collect::<String>()
        .to_lowercase()
        .nfkd()
        .collect();

    let mut slug = String::with_capacity(decomposed.len());
    let mut pending_space = false;
    for c in decomposed.chars() {
        if c == '_' || c.is_whitespace() {
            pending_space = true;
        } else if c != '/' && (c.is_alphanumeric() || SLUG_KEEP_CHARS.contains(c)) {
            if pending_space && !slug.is_empty() {
                slug.push(' ');
            }
            pending_space = false;
            slug.push(c);
        }
    }
    slug
}

/// Converts a page name to its canonical URL path.
///
/// Called once per rendered link, so whitespace is replaced character by
/// character rather than with a regex.
pub fn name_to_url(name: &str) -> String {
    let underscored: String = name
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '\t' | '\r' | '\n' => '_',
            other => other,
        })
        .collect();

    let mut url = String::with_capacity(underscored.len());
    let mut rest = underscored.as_str();
    while let Some(pos) = rest.find(|c: char| c == '/' || c == '#') {
        url.push_str(&urlencoding::encode(&rest[..pos]));
        url.push_str(&rest[pos..pos + 1]);
        rest = &rest[pos + 1..];
    }
    url.push_str(&urlencoding::encode(rest));
    url
}

/// Converts a URL path back to the page name it was generated from.
pub fn url_to_name(url: &str) -> String {
    let spaced = url.replace('+', " ");
    let decoded = urlencoding::decode_binary(spaced.as_bytes());
    String::from_utf8_lossy(&decoded)
        .replace('_', " ")
        .trim()
        .to_string()
}

/// Fails with [`WikiError::InvalidSlug`] unless `slug` is already canonical.
pub fn validate_slug(slug: &str) -> Result<(), WikiError> {
    if slugify(slug) != slug {
        return Err(WikiError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

/// Maps an attachment URL found in page content back to the file name.
///
/// Returns `None` when `src` does not point at an attachment.
pub fn file_url_to_name(src: &str) -> Option<String> {
    let encoded = src.strip_prefix(FILES_URL_PREFIX)?;
    let decoded = urlencoding::decode_binary(encoded.as_bytes());
    Some(String::from_utf8_lossy(&decoded).into_owned())
}
