use anyhow::{anyhow, Context, Result};
use homedir::my_home;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    fallback::{DdgLiteSearch, WebBookFetcher, WebFallback},
    library::{BackendCsv, Library},
    progress::ProgressTracker,
    reader::ReaderSession,
    scrape::{HttpClient, HttpFetch, UrlPolicy},
    sources::SourceManager,
    storage,
};

pub struct AppPaths {
    pub base_path: String,
    pub library_path: String,
}

impl AppPaths {
    /// `$LECTERN_BASE_PATH`, or `~/.local/share/lectern`.
    pub fn from_env() -> Result<Self> {
        let base_path = match std::env::var("LECTERN_BASE_PATH") {
            Ok(path) => path,
            Err(_) => {
                let home = my_home()
                    .context("could not determine home directory")?
                    .ok_or_else(|| anyhow!("home directory path is empty"))?;
                format!("{}/.local/share/lectern", home.to_string_lossy())
            }
        };

        Ok(Self::at(&base_path))
    }

    pub fn at(base_path: &str) -> Self {
        Self {
            base_path: base_path.to_string(),
            library_path: format!("{base_path}/library"),
        }
    }
}

/// Everything wired from one configuration.
pub struct App {
    pub manager: Arc<SourceManager>,
    pub web: Arc<WebBookFetcher>,
    pub library: Library,
    pub tracker: Arc<ProgressTracker>,
}

impl App {
    pub fn new(paths: &AppPaths) -> Result<Self> {
        let config = Config::load_with(&paths.base_path)?;

        // adapters only reach allowlisted hosts; fallback links can be anywhere public
        let source_http: Arc<dyn HttpFetch> = Arc::new(HttpClient::new(
            &config.http,
            UrlPolicy::allowlisted(&config.http),
        )?);
        let open_http: Arc<dyn HttpFetch> =
            Arc::new(HttpClient::new(&config.http, UrlPolicy::open(&config.http))?);

        let fallback = WebFallback::new(
            Box::new(DdgLiteSearch::new(open_http.clone())),
            config.fallback.max_results,
        );
        let manager = Arc::new(SourceManager::with_defaults(
            &config,
            source_http,
            Some(fallback),
        ));
        let web = Arc::new(WebBookFetcher::new(open_http));

        let library_storage = storage::BackendLocal::new(&paths.library_path)
            .context("failed to create library directory")?;
        let library = Library::new(Arc::new(BackendCsv::new(Arc::new(library_storage))));

        let tracker = Arc::new(ProgressTracker::new(
            library.clone(),
            Duration::from_millis(config.progress.debounce_ms),
        )?);

        Ok(Self {
            manager,
            web,
            library,
            tracker,
        })
    }

    pub fn session(&self) -> ReaderSession {
        ReaderSession::new(
            self.manager.clone(),
            self.web.clone(),
            self.library.clone(),
            self.tracker.clone(),
        )
    }
}
