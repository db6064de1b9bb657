use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::{
    app::App,
    errors::ReaderError,
    library::BookId,
    reader::LoadOutcome,
    segment,
    sources::{SearchResult, SourceKind},
};

#[derive(Parser, Debug)]
#[command(version, about = "Search and read public-domain books", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search every enabled source
    Search {
        query: String,

        /// Comma separated sources, e.g. gutendex,wikisource
        #[clap(short, long)]
        sources: Option<String>,
    },
    /// Open a search result (as printed by `search`) and print a sector
    Read {
        /// Search result json, or @path to a file holding it
        #[clap(allow_hyphen_values = true)]
        result: String,

        #[clap(short, long)]
        user: Option<String>,

        /// Jump to this sector instead of the saved position
        #[clap(long)]
        sector: Option<usize>,

        /// Save the book to the user's library
        #[clap(long, default_value = "false")]
        bookmark: bool,
    },
    /// Open a web fallback link
    ReadUrl {
        url: String,

        #[clap(short, long, default_value = "Untitled")]
        title: String,

        #[clap(long)]
        sector: Option<usize>,
    },
    /// Segment a local text file and print sectors and toc
    Segment { path: String },
    /// Manage a user's library
    Library {
        #[clap(subcommand)]
        action: LibraryArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum LibraryArgs {
    List {
        #[clap(short, long)]
        user: String,
    },
    /// Add a search result to the library
    Add {
        #[clap(short, long)]
        user: String,

        #[clap(allow_hyphen_values = true)]
        result: String,
    },
    Remove {
        #[clap(short, long)]
        user: String,

        book_id: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn parse_sources(sources: &str) -> Result<Vec<SourceKind>> {
    sources
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<SourceKind>().map_err(anyhow::Error::from))
        .collect()
}

/// Unreadable formats get a hint instead of the bare error.
fn open_error(err: ReaderError) -> anyhow::Error {
    if err.is_unsupported_format() {
        anyhow!("{err}; download the book and open it in a dedicated reader")
    } else {
        err.into()
    }
}

fn parse_result(raw: &str) -> Result<SearchResult> {
    let json = match raw.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?
        }
        None => raw.to_string(),
    };
    serde_json::from_str(&json).context("not a search result")
}

pub fn handle_search(app: &App, query: &str, sources: Option<String>) -> Result<()> {
    let enabled = sources.as_deref().map(parse_sources).transpose()?;
    let response = app.manager.search_across_sources(query, enabled.as_deref());
    print_json(&response)
}

#[derive(Serialize)]
struct ReadOutput<'a> {
    book: &'a LoadOutcome,
    sector: Option<segment::Sector>,
}

pub fn handle_read(
    app: &App,
    result: &str,
    user: Option<String>,
    sector: Option<usize>,
    bookmark: bool,
) -> Result<()> {
    let result = parse_result(result)?;
    let session = app.session();

    let outcome = session
        .open_book(user.as_deref(), &result)
        .map_err(open_error)?;
    if bookmark && !session.view()?.map(|v| v.bookmarked).unwrap_or(false) {
        session.toggle_bookmark()?;
    }
    if let Some(sector) = sector {
        session.go_to(sector)?;
    }

    let outcome = match outcome {
        LoadOutcome::Loaded(_) => session.view()?.map(LoadOutcome::Loaded).unwrap_or(outcome),
        LoadOutcome::Superseded => outcome,
    };

    print_json(&ReadOutput {
        book: &outcome,
        sector: session.current_sector()?,
    })?;

    app.tracker.flush();
    for err in app.tracker.drain_errors() {
        log::warn!("{err}");
    }
    Ok(())
}

pub fn handle_read_url(app: &App, url: &str, title: &str, sector: Option<usize>) -> Result<()> {
    let session = app.session();
    let outcome = session
        .open_web_book(None, url, title)
        .map_err(open_error)?;
    if let Some(sector) = sector {
        session.go_to(sector)?;
    }

    print_json(&ReadOutput {
        book: &outcome,
        sector: session.current_sector()?,
    })
}

pub fn handle_segment(path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    print_json(&segment::segment(&content))
}

pub fn handle_library(app: &App, action: LibraryArgs) -> Result<()> {
    match action {
        LibraryArgs::List { user } => print_json(&app.library.list(&user)?),
        LibraryArgs::Add { user, result } => {
            let result = parse_result(&result)?;
            print_json(&app.library.add_book_to_library(&user, &result)?)
        }
        LibraryArgs::Remove { user, book_id } => {
            if !app
                .library
                .remove_book_from_library(&user, &BookId::from(book_id.as_str()))?
            {
                bail!("{book_id} is not in the library of {user}");
            }
            println!("1 item removed");
            Ok(())
        }
    }
}
