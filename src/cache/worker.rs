//! Cache worker: keeps the application shell and recently seen responses
//! available without a live network connection.
//!
//! The worker moves through install (pre-warm the manifest into a fresh
//! generation), activate (drop every stale generation, then take over
//! immediately), and a long-lived fetch phase that serves cache-first for
//! own-origin and whitelisted assets and stale-while-revalidate for
//! stylesheets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::storage::GenerationStore;
use super::types::{should_cache, Destination, Fetch, FetchError, FetchRequest, FetchResponse, Method};

/// Current cache generation. Bumping this string is the sole mechanism for
/// invalidating previously cached assets on the next activation.
pub const CACHE_GENERATION: &str = "dicoding-story-v2";

/// Third-party asset origins the fetch phase is allowed to intercept.
const ASSET_ORIGINS: &[&str] = &["https://cdnjs.cloudflare.com"];

/// Application shell and third-party assets pre-warmed during install.
/// Root-relative entries are resolved against the configured app origin.
const PRECACHE_MANIFEST: &[&str] = &[
  "/",
  "/index.html",
  "/src/css/styles.css",
  "/src/js/app.js",
  "/src/js/config.js",
  "/src/js/router.js",
  "/src/js/models/auth.js",
  "/src/js/models/story.js",
  "/src/js/presenters/auth.js",
  "/src/js/presenters/story.js",
  "/src/js/views/auth.js",
  "/src/js/views/story.js",
  "/src/js/views/ui.js",
  "/manifest.json",
  "https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.css",
  "https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.js",
];

/// Stylesheets whose failure would leave the shell unreadable. Fetched and
/// awaited before the rest of the manifest.
const CRITICAL_ASSETS: &[&str] = &[
  "/src/css/styles.css",
  "https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.css",
];

/// Served when the core stylesheet is unreachable and not cached.
const FALLBACK_STYLESHEET: &str = "\
body { font-family: Arial, sans-serif; margin: 0; padding: 20px; }\n\
.page { display: none; }\n\
.page.active { display: block; }\n\
.loading { text-align: center; padding: 20px; }\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
}

#[derive(Debug, Error)]
#[error("invalid lifecycle transition: {from:?} -> {to:?}")]
pub struct LifecycleError {
  pub from: WorkerState,
  pub to: WorkerState,
}

fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
  use WorkerState::*;

  matches!(
    (from, to),
    (Parsed, Installing)
      | (Installing, Installed)
      | (Installed, Activating)
      | (Activating, Activated)
  )
}

/// The cache worker. Generic over the network boundary and the generation
/// store so the fetch policies can be exercised without real traffic.
pub struct CacheWorker<F, S> {
  fetcher: F,
  store: Arc<S>,
  generation: String,
  app_origin: Url,
  state: Mutex<WorkerState>,
  claimed: AtomicBool,
}

impl<F, S> CacheWorker<F, S>
where
  F: Fetch + Clone + 'static,
  S: GenerationStore + 'static,
{
  pub fn new(fetcher: F, store: S, app_origin: Url) -> Self {
    Self {
      fetcher,
      store: Arc::new(store),
      generation: CACHE_GENERATION.to_string(),
      app_origin,
      state: Mutex::new(WorkerState::Parsed),
      claimed: AtomicBool::new(false),
    }
  }

  /// Override the generation name. Used by tests.
  #[cfg(test)]
  fn with_generation(mut self, generation: &str) -> Self {
    self.generation = generation.to_string();
    self
  }

  pub fn generation(&self) -> &str {
    &self.generation
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().expect("worker state lock poisoned")
  }

  /// Whether the worker has taken control of clients.
  pub fn is_claimed(&self) -> bool {
    self.claimed.load(Ordering::SeqCst)
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  fn transition(&self, to: WorkerState) -> Result<(), LifecycleError> {
    let mut state = self.state.lock().expect("worker state lock poisoned");
    if !is_valid_transition(*state, to) {
      return Err(LifecycleError { from: *state, to });
    }
    debug!(from = ?*state, ?to, "lifecycle transition");
    *state = to;
    Ok(())
  }

  /// Run install then activate. Install completes with skip-waiting
  /// semantics: the worker proceeds straight to activation instead of
  /// waiting for older instances to wind down.
  pub async fn startup(&self) -> Result<(), LifecycleError> {
    self.install().await?;
    self.activate()
  }

  /// Pre-warm the manifest into the current generation. Critical assets
  /// are awaited first; the rest are fetched concurrently with all-settled
  /// semantics. Individual failures never fail the install.
  pub async fn install(&self) -> Result<(), LifecycleError> {
    self.transition(WorkerState::Installing)?;

    let critical: Vec<String> = CRITICAL_ASSETS
      .iter()
      .filter_map(|entry| self.resolve(entry))
      .collect();
    futures::future::join_all(critical.iter().map(|url| self.precache_one(url))).await;

    let remaining: Vec<String> = PRECACHE_MANIFEST
      .iter()
      .filter(|entry| !CRITICAL_ASSETS.contains(entry))
      .filter_map(|entry| self.resolve(entry))
      .collect();
    futures::future::join_all(remaining.iter().map(|url| self.precache_one(url))).await;

    debug!(generation = %self.generation, "install completed");
    self.transition(WorkerState::Installed)
  }

  /// Delete every generation that is not current, then claim clients.
  pub fn activate(&self) -> Result<(), LifecycleError> {
    self.transition(WorkerState::Activating)?;

    match self.store.generations() {
      Ok(names) => {
        for name in names {
          if name != self.generation {
            debug!(stale = %name, "deleting old cache generation");
            if let Err(err) = self.store.delete_generation(&name) {
              warn!(generation = %name, %err, "failed to delete stale generation");
            }
          }
        }
      }
      Err(err) => warn!(%err, "could not enumerate cache generations"),
    }

    self.claimed.store(true, Ordering::SeqCst);
    self.transition(WorkerState::Activated)
  }

  fn resolve(&self, entry: &str) -> Option<String> {
    if entry.starts_with("http://") || entry.starts_with("https://") {
      return Some(entry.to_string());
    }
    match self.app_origin.join(entry) {
      Ok(url) => Some(url.to_string()),
      Err(err) => {
        warn!(%entry, %err, "unresolvable manifest entry");
        None
      }
    }
  }

  async fn precache_one(&self, url: &str) {
    let request = FetchRequest::get(url).with_destination(classify(url));
    match self.fetcher.fetch(&request).await {
      Ok(response) if response.status == 200 => {
        if let Err(err) = self.store.put(&self.generation, &request, &response) {
          warn!(%url, %err, "failed to pre-cache asset");
        }
      }
      Ok(response) => warn!(%url, status = response.status, "asset skipped during install"),
      Err(err) => warn!(%url, %err, "asset fetch failed during install"),
    }
  }

  /// The fetch phase. GET requests for stylesheets are served
  /// stale-while-revalidate; own-origin and whitelisted asset requests are
  /// served cache-first; everything else passes through untouched.
  pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
    if request.method != Method::Get {
      return self.fetcher.fetch(request).await;
    }

    if request.url.contains(".css") {
      return self.stale_while_revalidate(request).await;
    }

    if self.is_own_origin(&request.url) || is_asset_origin(&request.url) {
      return self.cache_first(request).await;
    }

    self.fetcher.fetch(request).await
  }

  fn is_own_origin(&self, url: &str) -> bool {
    match Url::parse(url) {
      Ok(parsed) => parsed.origin() == self.app_origin.origin(),
      Err(_) => false,
    }
  }

  fn cached(&self, request: &FetchRequest) -> Option<FetchResponse> {
    match self.store.get(&self.generation, request) {
      Ok(entry) => entry,
      Err(err) => {
        warn!(url = %request.url, %err, "cache read failed, treating as miss");
        None
      }
    }
  }

  /// Best-effort write-back. A failed write must never fail a response
  /// already being returned.
  fn store_response(&self, request: &FetchRequest, response: &FetchResponse) {
    if let Err(err) = self.store.put(&self.generation, request, response) {
      warn!(url = %request.url, %err, "cache write failed");
    }
  }

  async fn stale_while_revalidate(
    &self,
    request: &FetchRequest,
  ) -> Result<FetchResponse, FetchError> {
    if let Some(cached) = self.cached(request) {
      self.spawn_revalidation(request.clone());
      return Ok(cached);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.status == 200 {
          self.store_response(request, &response);
        }
        Ok(response)
      }
      Err(err) => {
        if request.url.contains("styles.css") {
          debug!(url = %request.url, "serving fallback stylesheet");
          return Ok(
            FetchResponse::new(200)
              .with_header("Content-Type", "text/css")
              .with_body(FALLBACK_STYLESHEET),
          );
        }
        Err(err)
      }
    }
  }

  /// Fire-and-forget refresh of a cached stylesheet. Errors are swallowed.
  fn spawn_revalidation(&self, request: FetchRequest) {
    let fetcher = self.fetcher.clone();
    let store = Arc::clone(&self.store);
    let generation = self.generation.clone();

    tokio::spawn(async move {
      match fetcher.fetch(&request).await {
        Ok(response) if response.status == 200 => {
          if let Err(err) = store.put(&generation, &request, &response) {
            warn!(url = %request.url, %err, "revalidation write failed");
          }
        }
        Ok(_) => {}
        Err(err) => debug!(url = %request.url, %err, "background revalidation failed"),
      }
    });
  }

  async fn cache_first(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
    if let Some(cached) = self.cached(request) {
      return Ok(cached);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if should_cache(&response) {
          self.store_response(request, &response);
        }
        Ok(response)
      }
      Err(err) => {
        // Last resort for navigations: the cached shell document.
        if request.destination == Destination::Document {
          if let Ok(index) = self.app_origin.join("/index.html") {
            let shell = FetchRequest::document(index.to_string());
            if let Some(cached) = self.cached(&shell) {
              return Ok(cached);
            }
          }
        }
        Err(err)
      }
    }
  }
}

fn is_asset_origin(url: &str) -> bool {
  ASSET_ORIGINS.iter().any(|origin| url.starts_with(origin))
}

fn classify(url: &str) -> Destination {
  if url.contains(".css") {
    Destination::Style
  } else if url.ends_with(".js") {
    Destination::Script
  } else if url.ends_with(".html") || url.ends_with('/') {
    Destination::Document
  } else {
    Destination::Other
  }
}
