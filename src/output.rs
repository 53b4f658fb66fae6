//! Output formatting for the wiki CLI.
//!
//! Two output modes:
//! - **JSON**: compact machine-readable output (default)
//! - **Pretty**: labeled fields for humans (enabled via `--pretty`)
//!
//! JSON output serializes the models directly, so its shape is whatever
//! `serde` derives for them.

use crate::models::{Page, PageFile, Redirect, Region, TagSet, Version};
use crate::rename::RenameOutcome;
use serde::Serialize;

/// Output mode for CLI results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Json,
    Pretty,
}

/// Serialize a value to compact JSON and print to stdout.
///
/// # Panics
///
/// Panics if serialization fails, which only happens for a broken
/// `Serialize` implementation.
pub fn print_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string(value).expect("failed to serialize to JSON");
    println!("{}", json);
}

pub fn print_pretty_region(region: &Region) {
    println!("Region:  {}", region.slug);
    println!("Name:    {}", region.full_name);
    println!("ID:      {}", region.id);
    println!("Created: {}", region.created_at);
}

pub fn print_pretty_regions(regions: &[Region]) {
    if regions.is_empty() {
        println!("(no regions)");
        return;
    }

    for region in regions {
        println!("{} | {}", region.slug, region.full_name);
    }
}

/// Print a page in human-readable format.
///
/// Format:
/// ```text
/// Name:    Lake Merritt
/// Slug:    lake merritt
/// URL:     /oakland/Lake_Merritt
/// ID:      <uuid>
/// Created: 2024-01-15T10:30:00Z
/// Updated: 2024-01-15T11:00:00Z
///
/// <content>
/// ```
pub fn print_pretty_page(page: &Page, region: &Region) {
    println!("Name:    {}", page.name);
    println!("Slug:    {}", page.slug);
    println!("URL:     {}", page.canonical_url(region));
    println!("ID:      {}", page.id.as_deref().unwrap_or("(unsaved)"));
    println!("Created: {}", page.created_at);
    println!("Updated: {}", page.updated_at);
    println!();
    println!("{}", page.content);
}

/// One page per line: `<slug> | <name>`.
pub fn print_pretty_pages(pages: &[Page]) {
    if pages.is_empty() {
        println!("(no pages)");
        return;
    }

    for page in pages {
        println!("{} | {}", page.slug, page.name);
    }
}

pub fn print_pretty_file(file: &PageFile) {
    println!("File:    {}", file.name);
    println!("Page:    {}", file.slug);
    println!("Type:    {} ({})", file.rough_type(), file.mime_type().unwrap_or("unknown"));
    println!("Size:    {} bytes", file.size);
    println!("Created: {}", file.created_at);
}

/// One attachment per line: `<name> | <rough type> | <size>`.
pub fn print_pretty_files(files: &[PageFile]) {
    if files.is_empty() {
        println!("(no files)");
        return;
    }

    for file in files {
        println!("{} | {} | {} bytes", file.name, file.rough_type(), file.size);
    }
}

/// Format: `<source> --> <destination_id>`
pub fn print_pretty_redirect(redirect: &Redirect) {
    println!("{} --> {}", redirect.source, redirect.destination_id);
}

pub fn print_pretty_redirects(redirects: &[Redirect]) {
    if redirects.is_empty() {
        println!("(no redirects)");
        return;
    }

    for redirect in redirects {
        print_pretty_redirect(redirect);
    }
}

pub fn print_pretty_tags(tag_set: Option<&TagSet>) {
    match tag_set {
        Some(set) if !set.tags.is_empty() => println!("Tags: {}", set.tags.join(", ")),
        _ => println!("Tags: (none)"),
    }
}

/// One version per line, newest first: `#<n> <created_at> <comment>`.
pub fn print_pretty_history(versions: &[Version]) {
    if versions.is_empty() {
        println!("(no history)");
        return;
    }

    for version in versions {
        println!(
            "#{} {} {}",
            version.version_number, version.created_at, version.comment
        );
    }
}

pub fn print_pretty_rename(outcome: &RenameOutcome) {
    println!("Renamed: {}", outcome.page.name);
    println!("Slug:    {}", outcome.page.slug);
    match &outcome.redirect {
        Some(redirect) => println!("Redirect: {} --> {}", redirect.source, outcome.page.slug),
        None => println!("Redirect: (none)"),
    }
    println!("Migrated: {}", outcome.migrated);
    println!("Skipped:  {}", outcome.skipped);
}

/// Generic output dispatcher that handles both JSON and Pretty modes.
///
/// # Example
///
/// ```ignore
/// let region = repo::get_region_by_slug(&conn, "main")?;
/// print(mode, &region, || print_pretty_region(&region));
/// ```
pub fn print<T: Serialize>(mode: OutputMode, value: &T, pretty_fn: impl FnOnce()) {
    match mode {
        OutputMode::Json => print_json(value),
        OutputMode::Pretty => pretty_fn(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_region() -> Region {
        Region {
            id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            slug: "oakland".to_string(),
            full_name: "Oakland".to_string(),
            created_at: "2024-01-15T10:00:00Z".to_string(),
        }
    }

    fn fixture_page() -> Page {
        Page {
            id: Some("660e8400-e29b-41d4-a716-446655440001".to_string()),
            region_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            name: "Lake Merritt".to_string(),
            slug: "lake merritt".to_string(),
            content: "<p>A tidal lagoon.</p>".to_string(),
            created_at: "2024-01-15T11:00:00Z".to_string(),
            updated_at: "2024-01-15T12:00:00Z".to_string(),
        }
    }

    fn fixture_file() -> PageFile {
        PageFile {
            id: Some("770e8400-e29b-41d4-a716-446655440002".to_string()),
            created_at: "2024-01-15T13:00:00Z".to_string(),
            ..PageFile::new(
                "550e8400-e29b-41d4-a716-446655440000",
                "lake merritt",
                "map.png",
                vec![0u8; 16],
            )
        }
    }

    fn fixture_redirect() -> Redirect {
        Redirect::new(
            "550e8400-e29b-41d4-a716-446655440000",
            "lake merritt park",
            "660e8400-e29b-41d4-a716-446655440001",
        )
    }

    #[test]
    fn test_page_json_fields() {
        let json = serde_json::to_string(&fixture_page()).expect("should serialize");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should parse");

        assert_eq!(parsed["name"], "Lake Merritt");
        assert_eq!(parsed["slug"], "lake merritt");
        assert_eq!(parsed["content"], "<p>A tidal lagoon.</p>");
    }

    #[test]
    fn test_unsaved_page_id_serializes_as_null() {
        let page = Page {
            id: None,
            ..fixture_page()
        };
        let parsed = serde_json::to_value(&page).expect("should serialize");
        assert!(parsed["id"].is_null());
    }

    #[test]
    fn test_file_json_has_size_but_no_blob() {
        let parsed = serde_json::to_value(fixture_file()).expect("should serialize");
        assert_eq!(parsed["size"], 16);
        assert!(parsed.get("file").is_none());
    }

    #[test]
    fn test_rename_outcome_json() {
        let outcome = RenameOutcome {
            page: fixture_page(),
            redirect: Some(fixture_redirect()),
            migrated: 2,
            skipped: 1,
        };
        let parsed = serde_json::to_value(&outcome).expect("should serialize");
        assert_eq!(parsed["page"]["slug"], "lake merritt");
        assert_eq!(parsed["redirect"]["source"], "lake merritt park");
        assert_eq!(parsed["migrated"], 2);
    }

    #[test]
    fn test_empty_collections_serialize() {
        let pages: Vec<Page> = vec![];
        let parsed = serde_json::to_value(&pages).expect("should serialize empty vec");
        assert_eq!(parsed, serde_json::json!([]));
    }

    #[test]
    fn test_output_mode_equality() {
        assert_eq!(OutputMode::Json, OutputMode::Json);
        assert_ne!(OutputMode::Json, OutputMode::Pretty);
    }

    #[test]
    fn test_print_json_mode_does_not_call_pretty_fn() {
        let region = fixture_region();
        print(OutputMode::Json, &region, || {
            panic!("pretty_fn should not be called in JSON mode");
        });
    }

    #[test]
    fn test_print_pretty_mode_calls_pretty_fn() {
        let region = fixture_region();
        let mut called = false;

        print(OutputMode::Pretty, &region, || {
            called = true;
        });

        assert!(called, "pretty_fn should be called in Pretty mode");
    }

    #[test]
    fn test_pretty_printers_do_not_panic() {
        let region = fixture_region();
        let page = fixture_page();
        print_pretty_region(&region);
        print_pretty_regions(&[region.clone()]);
        print_pretty_regions(&[]);
        print_pretty_page(&page, &region);
        print_pretty_pages(&[page.clone()]);
        print_pretty_pages(&[]);
        print_pretty_file(&fixture_file());
        print_pretty_files(&[fixture_file()]);
        print_pretty_files(&[]);
        print_pretty_redirects(&[fixture_redirect()]);
        print_pretty_redirects(&[]);
        print_pretty_tags(None);
        print_pretty_history(&[]);
        print_pretty_rename(&RenameOutcome {
            page,
            redirect: None,
            migrated: 0,
            skipped: 0,
        });
    }

    #[test]
    fn test_print_pretty_page_with_unicode_content_does_not_panic() {
        let page = Page {
            name: "Café 日本".to_string(),
            content: "<p>🌊 湖</p>".to_string(),
            ..fixture_page()
        };
        print_pretty_page(&page, &fixture_region());
    }
}
