//! Scanning of stored page HTML.

use crate::db::WikiError;
use crate::models::{Page, PageFile};
use crate::repo;
use crate::slug::{file_url_to_name, FILES_URL_PREFIX};
use regex::Regex;
use rusqlite::Connection;

/// Regex for the `src` attribute of `<img>` tags, quoted or bare.
fn img_src_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid regex")
    })
}

/// The `src` values of every `<img>` tag in `html`, in document order.
pub fn image_sources(html: &str) -> Vec<String> {
    img_src_re()
        .captures_iter(html)
        .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)).or_else(|| cap.get(3)))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .collect()
}

/// The first attachment of `page` that its content shows as an image.
///
/// Only `src` values under the attachment prefix count; anything else is
/// an external image.
pub fn highlight_image(conn: &Connection, page: &Page) -> Result<Option<PageFile>, WikiError> {
    let files = repo::list_page_files(conn, &page.region_id, &page.slug)?;
    if files.is_empty() {
        return Ok(None);
    }

    let found = image_sources(&page.content)
        .iter()
        .filter(|src| src.starts_with(FILES_URL_PREFIX))
        .filter_map(|src| file_url_to_name(src))
        .find_map(|name| files.iter().find(|f| f.name == name).cloned());
    Ok(found)
}
