//! Wiki CLI: manage regions, pages, attachments, redirects, and tags in a
//! local SQLite database.
//!
//! All output is JSON by default, with an optional `--pretty` flag for human
//! readability. Errors are printed to stderr as `{"error": "..."}`.

use clap::{Parser, Subcommand};
use std::io::{self, Read as _};
use std::path::PathBuf;
use std::process;
use wikipages::db::{self, WikiError};
use wikipages::models::Region;
use wikipages::output::{self, OutputMode};
use wikipages::slug::slugify;
use wikipages::related::RelationRegistry;
use wikipages::{content, history, rename, repo};

/// Region used when neither `--region` nor `$WIKI_REGION` is given. Created
/// on first use.
const DEFAULT_REGION: &str = "main";

/// Input size limits.
mod validation {
    use wikipages::db::WikiError;

    pub const MAX_REGION_SLUG_LEN: usize = 128;
    pub const MAX_NAME_LEN: usize = 255;
    pub const MAX_BODY_LEN: usize = 10_000_000; // 10 MB
    pub const MAX_FILE_LEN: usize = 50_000_000; // 50 MB
    pub const MAX_TAG_LEN: usize = 100;
    pub const MAX_TAGS_COUNT: usize = 50;
    pub const MAX_COMMENT_LEN: usize = 500;

    pub fn validate_region_slug(slug: &str) -> Result<(), WikiError> {
        if slug.is_empty() {
            return Err(WikiError::InvalidInput("Region slug must not be empty".to_string()));
        }
        if slug.len() > MAX_REGION_SLUG_LEN {
            return Err(WikiError::InvalidInput(format!(
                "Region slug too long (max {} characters)",
                MAX_REGION_SLUG_LEN
            )));
        }
        if !slug.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(WikiError::InvalidInput(
                "Region slug must start with a lowercase letter".to_string(),
            ));
        }
        if !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(WikiError::InvalidInput(
                "Region slug must contain only lowercase letters, digits, and hyphens".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_name(name: &str) -> Result<(), WikiError> {
        if name.trim().is_empty() {
            return Err(WikiError::InvalidInput("Name must not be empty".to_string()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(WikiError::InvalidInput(format!(
                "Name too long (max {} characters)",
                MAX_NAME_LEN
            )));
        }
        Ok(())
    }

    pub fn validate_body(body: &str) -> Result<(), WikiError> {
        if body.len() > MAX_BODY_LEN {
            return Err(WikiError::InvalidInput(format!(
                "Body too long (max {} bytes)",
                MAX_BODY_LEN
            )));
        }
        Ok(())
    }

    pub fn validate_file(bytes: &[u8]) -> Result<(), WikiError> {
        if bytes.len() > MAX_FILE_LEN {
            return Err(WikiError::InvalidInput(format!(
                "File too large (max {} bytes)",
                MAX_FILE_LEN
            )));
        }
        Ok(())
    }

    pub fn validate_tags(tags: &[String]) -> Result<(), WikiError> {
        if tags.len() > MAX_TAGS_COUNT {
            return Err(WikiError::InvalidInput(format!(
                "Too many tags (max {})",
                MAX_TAGS_COUNT
            )));
        }
        for tag in tags {
            if tag.len() > MAX_TAG_LEN {
                return Err(WikiError::InvalidInput(format!(
                    "Tag '{}' too long (max {} characters)",
                    tag, MAX_TAG_LEN
                )));
            }
        }
        Ok(())
    }

    pub fn validate_comment(comment: &str) -> Result<(), WikiError> {
        if comment.len() > MAX_COMMENT_LEN {
            return Err(WikiError::InvalidInput(format!(
                "Comment too long (max {} characters)",
                MAX_COMMENT_LEN
            )));
        }
        Ok(())
    }
}

/// A local wiki with slug-consistent page renames.
///
/// Pages are addressed by name; any spelling that slugifies to the same
/// slug finds the same page.
#[derive(Parser)]
#[command(name = "wikipages", version, about)]
struct Cli {
    /// Output in human-readable format instead of JSON.
    #[arg(long, global = true)]
    pretty: bool,

    /// Region to work in (default: $WIKI_REGION or "main").
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage regions (independent wikis in one database).
    Region {
        #[command(subcommand)]
        action: RegionAction,
    },
    /// Manage pages.
    Page {
        #[command(subcommand)]
        action: PageAction,
    },
    /// Manage files attached to pages.
    File {
        #[command(subcommand)]
        action: FileAction,
    },
    /// Manage redirects from old page names.
    Redirect {
        #[command(subcommand)]
        action: RedirectAction,
    },
    /// Manage page tags.
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Show version history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum RegionAction {
    /// Create a new region.
    Create {
        /// URL-friendly slug (e.g., "oakland").
        slug: String,
        /// Display name for the region.
        #[arg(long)]
        name: Option<String>,
    },
    /// List all regions.
    List,
    /// Get a region by slug.
    Get { slug: String },
    /// Delete a region (must have no pages).
    Delete { slug: String },
}

#[derive(Subcommand)]
enum PageAction {
    /// Create a new page.
    Create {
        name: String,
        /// Page content (HTML).
        #[arg(long)]
        body: Option<String>,
        /// Read content from stdin.
        #[arg(long)]
        stdin: bool,
    },
    /// Get a page by name.
    Get { name: String },
    /// Replace a page's content.
    Edit {
        name: String,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        stdin: bool,
        /// History comment for this edit.
        #[arg(long, default_value = "Edited")]
        comment: String,
    },
    /// Rename a page, leaving a redirect at the old name.
    Rename { name: String, new_name: String },
    /// List pages in the region.
    List,
    /// Delete a page.
    Delete { name: String },
    /// Show the attachment a page displays first.
    HighlightImage { name: String },
}

#[derive(Subcommand)]
enum FileAction {
    /// Attach a file to a page.
    Attach {
        /// Name of the owning page (it does not have to exist yet).
        page: String,
        /// Path of the file to upload.
        path: PathBuf,
        /// Store under this name instead of the file's own name.
        #[arg(long = "as")]
        as_name: Option<String>,
    },
    /// Show an attachment's metadata.
    Get { page: String, name: String },
    /// List a page's attachments.
    List { page: String },
    /// Delete an attachment.
    Delete { page: String, name: String },
}

#[derive(Subcommand)]
enum RedirectAction {
    /// Redirect an old page name to an existing page.
    Create { source: String, destination: String },
    /// List redirects in the region.
    List,
    /// Delete the redirect from a name.
    Delete { source: String },
}

#[derive(Subcommand)]
enum TagAction {
    /// Replace a page's tags.
    Set {
        page: String,
        /// Comma-separated tags.
        tags: String,
    },
    /// Show a page's tags.
    Get { page: String },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// History of the page at a name, including deleted and renamed-away pages.
    Page { name: String },
    /// History of an attachment.
    File { page: String, name: String },
}

/// Read body content from --body flag or --stdin.
fn read_body(body: &Option<String>, stdin: bool) -> Result<String, WikiError> {
    if stdin {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else if let Some(b) = body {
        Ok(b.clone())
    } else {
        Ok(String::new())
    }
}

/// Resolve the region slug from the CLI flag, the environment, or the default.
fn region_slug(cli: &Cli) -> String {
    cli.region
        .clone()
        .or_else(|| std::env::var("WIKI_REGION").ok())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// Look up the working region, creating the default region on first use.
fn resolve_region(conn: &rusqlite::Connection, slug: &str) -> Result<Region, WikiError> {
    match repo::get_region_by_slug(conn, slug) {
        Err(WikiError::NotFound(_)) if slug == DEFAULT_REGION => {
            log::info!("creating default region '{}'", DEFAULT_REGION);
            repo::create_region(conn, DEFAULT_REGION, "Main")
        }
        other => other,
    }
}

fn parse_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn run() -> Result<(), WikiError> {
    let cli = Cli::parse();
    let mode = if cli.pretty {
        OutputMode::Pretty
    } else {
        OutputMode::Json
    };

    let mut conn = db::open_connection()?;
    db::run_migrations(&mut conn)?;

    match &cli.command {
        Commands::Region { action } => run_region(&conn, mode, action),
        command => {
            let slug = region_slug(&cli);
            validation::validate_region_slug(&slug)?;
            let region = resolve_region(&conn, &slug)?;
            run_in_region(&conn, mode, &region, command)
        }
    }
}

fn run_in_region(
    conn: &rusqlite::Connection,
    mode: OutputMode,
    region: &Region,
    command: &Commands,
) -> Result<(), WikiError> {
    match command {
        Commands::Region { .. } => unreachable!("region commands are dispatched by run()"),

        // =====================================================================
        // Page commands
        // =====================================================================
        Commands::Page { action } => match action {
            PageAction::Create { name, body, stdin } => {
                validation::validate_name(name)?;
                let content = read_body(body, *stdin)?;
                validation::validate_body(&content)?;
                let page = repo::create_page(conn, &region.id, name, &content)?;
                output::print(mode, &page, || output::print_pretty_page(&page, region));
            }
            PageAction::Get { name } => {
                let page = repo::get_page_by_name(conn, &region.id, name)?;
                output::print(mode, &page, || output::print_pretty_page(&page, region));
            }
            PageAction::Edit {
                name,
                body,
                stdin,
                comment,
            } => {
                let content = read_body(body, *stdin)?;
                validation::validate_body(&content)?;
                validation::validate_comment(comment)?;
                let page = repo::get_page_by_name(conn, &region.id, name)?;
                let page = repo::update_page_content(conn, page.saved_id()?, &content, comment)?;
                output::print(mode, &page, || output::print_pretty_page(&page, region));
            }
            PageAction::Rename { name, new_name } => {
                validation::validate_name(new_name)?;
                let page = repo::get_page_by_name(conn, &region.id, name)?;
                let outcome = rename::rename_page_with(
                    conn,
                    &RelationRegistry::default(),
                    &page,
                    new_name,
                )?;
                output::print(mode, &outcome, || output::print_pretty_rename(&outcome));
            }
            PageAction::List => {
                let pages = repo::list_pages(conn, &region.id)?;
                output::print(mode, &pages, || output::print_pretty_pages(&pages));
            }
            PageAction::Delete { name } => {
                let page = repo::get_page_by_name(conn, &region.id, name)?;
                repo::delete_page(conn, page.saved_id()?)?;
                let msg = serde_json::json!({"deleted": page.slug});
                output::print(mode, &msg, || println!("Deleted page '{}'", page.name));
            }
            PageAction::HighlightImage { name } => {
                let page = repo::get_page_by_name(conn, &region.id, name)?;
                let image = content::highlight_image(conn, &page)?;
                output::print(mode, &image, || match &image {
                    Some(file) => output::print_pretty_file(file),
                    None => println!("(no image)"),
                });
            }
        },

        // =====================================================================
        // File commands
        // =====================================================================
        Commands::File { action } => match action {
            FileAction::Attach {
                page,
                path,
                as_name,
            } => {
                let bytes = std::fs::read(path)?;
                validation::validate_file(&bytes)?;
                let name = match as_name {
                    Some(n) => n.clone(),
                    None => path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .ok_or_else(|| {
                            WikiError::InvalidInput(format!(
                                "Cannot take a file name from '{}'",
                                path.display()
                            ))
                        })?,
                };
                validation::validate_name(&name)?;
                let file = repo::attach_file(conn, &region.id, &slugify(page), &name, bytes)?;
                output::print(mode, &file, || output::print_pretty_file(&file));
            }
            FileAction::Get { page, name } => {
                let file = repo::get_page_file(conn, &region.id, &slugify(page), name)?;
                output::print(mode, &file, || output::print_pretty_file(&file));
            }
            FileAction::List { page } => {
                let files = repo::list_page_files(conn, &region.id, &slugify(page))?;
                output::print(mode, &files, || output::print_pretty_files(&files));
            }
            FileAction::Delete { page, name } => {
                let file = repo::get_page_file(conn, &region.id, &slugify(page), name)?;
                if let Some(id) = &file.id {
                    repo::delete_page_file(conn, id)?;
                }
                let msg = serde_json::json!({"deleted": {"page": file.slug, "name": file.name}});
                output::print(mode, &msg, || {
                    println!("Deleted file '{}' from '{}'", file.name, file.slug)
                });
            }
        },

        // =====================================================================
        // Redirect commands
        // =====================================================================
        Commands::Redirect { action } => match action {
            RedirectAction::Create {
                source,
                destination,
            } => {
                let destination = repo::get_page_by_name(conn, &region.id, destination)?;
                let tx = conn.unchecked_transaction()?;
                let redirect =
                    repo::create_redirect(&tx, &slugify(source), &destination, "Redirect created")?;
                tx.commit()?;
                output::print(mode, &redirect, || output::print_pretty_redirect(&redirect));
            }
            RedirectAction::List => {
                let redirects = repo::list_redirects(conn, &region.id)?;
                output::print(mode, &redirects, || output::print_pretty_redirects(&redirects));
            }
            RedirectAction::Delete { source } => {
                let source = slugify(source);
                repo::delete_redirect(conn, &region.id, &source)?;
                let msg = serde_json::json!({"deleted": source});
                output::print(mode, &msg, || println!("Deleted redirect from '{}'", source));
            }
        },

        // =====================================================================
        // Tag commands
        // =====================================================================
        Commands::Tag { action } => match action {
            TagAction::Set { page, tags } => {
                let tags = parse_tags(tags);
                validation::validate_tags(&tags)?;
                let page = repo::get_page_by_name(conn, &region.id, page)?;
                let tag_set = repo::set_tags(conn, page.saved_id()?, &tags)?;
                output::print(mode, &tag_set, || output::print_pretty_tags(Some(&tag_set)));
            }
            TagAction::Get { page } => {
                let page = repo::get_page_by_name(conn, &region.id, page)?;
                let tag_set = repo::get_tag_set(conn, page.saved_id()?)?;
                output::print(mode, &tag_set, || output::print_pretty_tags(tag_set.as_ref()));
            }
        },

        // =====================================================================
        // History commands
        // =====================================================================
        Commands::History { action } => {
            let versions = match action {
                HistoryAction::Page { name } => {
                    history::page_history(conn, &region.id, &slugify(name))?
                }
                HistoryAction::File { page, name } => {
                    history::file_history(conn, &region.id, &slugify(page), name)?
                }
            };
            output::print(mode, &versions, || output::print_pretty_history(&versions));
        }
    }

    Ok(())
}

fn run_region(
    conn: &rusqlite::Connection,
    mode: OutputMode,
    action: &RegionAction,
) -> Result<(), WikiError> {
    match action {
        RegionAction::Create { slug, name } => {
            validation::validate_region_slug(slug)?;
            if let Some(n) = name {
                validation::validate_name(n)?;
            }
            let full_name = name.as_deref().unwrap_or(slug);
            let region = repo::create_region(conn, slug, full_name)?;
            output::print(mode, &region, || output::print_pretty_region(&region));
        }
        RegionAction::List => {
            let regions = repo::list_regions(conn)?;
            output::print(mode, &regions, || output::print_pretty_regions(&regions));
        }
        RegionAction::Get { slug } => {
            let region = repo::get_region_by_slug(conn, slug)?;
            output::print(mode, &region, || output::print_pretty_region(&region));
        }
        RegionAction::Delete { slug } => {
            repo::delete_region(conn, slug)?;
            let msg = serde_json::json!({"deleted": slug});
            output::print(mode, &msg, || println!("Deleted region '{}'", slug));
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        let error_json = serde_json::json!({
            "error": e.to_string()
        });
        eprintln!("{}", error_json);
        process::exit(1);
    }
}
