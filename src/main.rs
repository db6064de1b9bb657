use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod errors;
mod extract;
mod fallback;
mod library;
mod progress;
mod reader;
mod scrape;
mod segment;
mod sources;
mod storage;
#[cfg(test)]
mod tests;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lectern=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = cli::Args::parse();
    let _span = tracing::info_span!("lectern", command = ?args.command).entered();

    if let cli::Command::Segment { path } = &args.command {
        return cli::handle_segment(path);
    }

    let paths = app::AppPaths::from_env()?;
    let app = app::App::new(&paths)?;

    match args.command {
        cli::Command::Search { query, sources } => cli::handle_search(&app, &query, sources),
        cli::Command::Read {
            result,
            user,
            sector,
            bookmark,
        } => cli::handle_read(&app, &result, user, sector, bookmark),
        cli::Command::ReadUrl { url, title, sector } => {
            cli::handle_read_url(&app, &url, &title, sector)
        }
        cli::Command::Segment { path } => cli::handle_segment(&path),
        cli::Command::Library { action } => cli::handle_library(&app, action),
    }
}
