mod cache;
mod config;
mod push;
mod store;
mod story;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing::warn;
use url::Url;

use cache::{CacheWorker, GenerationStore, HttpFetcher, SqliteGenerations, CACHE_GENERATION};
use config::Config;
use push::{PushGateway, UnsupportedPlatform};
use store::StoryStore;
use story::client::StoryClient;
use story::sync::{LoadOutcome, SyncCoordinator};
use story::types::GeoPoint;
use ui::ConsolePresenter;

#[derive(Parser, Debug)]
#[command(name = "cerita")]
#[command(about = "A terminal client for the Dicoding Story API with offline support")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cerita/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show the story feed (network first, saved stories when offline)
  Stories,
  /// Add a story with a photo and optional coordinates
  Add {
    description: String,

    /// Path to the photo to upload
    #[arg(long)]
    photo: PathBuf,

    #[arg(long, requires = "lon")]
    lat: Option<f64>,

    #[arg(long, requires = "lat")]
    lon: Option<f64>,
  },
  /// List stories saved in the local store
  Saved,
  /// Delete a saved story by id
  Delete { id: String },
  /// Subscribe to push notifications
  Subscribe,
  /// Unsubscribe from push notifications
  Unsubscribe,
  /// Fetch a URL through the offline cache
  Fetch { url: String },
  /// Render a push payload locally (JSON or plain text)
  Notify { payload: String },
  /// Show cache and local store status
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  init_logging();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  match args.command {
    Command::Stories => run_stories(&config).await,
    Command::Add {
      description,
      photo,
      lat,
      lon,
    } => run_add(&config, description, photo, lat, lon).await,
    Command::Saved => run_saved(),
    Command::Delete { id } => run_delete(&id),
    Command::Subscribe => run_subscribe(&config).await,
    Command::Unsubscribe => run_unsubscribe(&config).await,
    Command::Fetch { url } => run_fetch(&config, &url).await,
    Command::Notify { payload } => run_notify(&config, &payload),
    Command::Status => run_status(),
  }
}

async fn run_stories(config: &Config) -> Result<()> {
  // The cache worker warms the application shell in the background while
  // the feed loads; neither waits on the other.
  let worker = spawn_cache_worker(config);

  let client = StoryClient::new(config)?;
  let coordinator = SyncCoordinator::new(client, open_store());
  let outcome = coordinator.load_stories(&ConsolePresenter::new()).await;

  if let Some(handle) = worker {
    let _ = handle.await;
  }

  if outcome == LoadOutcome::Failed {
    std::process::exit(1);
  }
  Ok(())
}

async fn run_add(
  config: &Config,
  description: String,
  photo: PathBuf,
  lat: Option<f64>,
  lon: Option<f64>,
) -> Result<()> {
  let client = StoryClient::new(config)?;

  let bytes = std::fs::read(&photo)
    .map_err(|e| eyre!("Failed to read photo {}: {}", photo.display(), e))?;
  let photo_name = photo
    .file_name()
    .and_then(|name| name.to_str())
    .unwrap_or("photo.jpg");

  let location = match (lat, lon) {
    (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
    _ => None,
  };

  client
    .add_story(&description, bytes, photo_name, location)
    .await?;
  println!("Story added.");
  Ok(())
}

fn run_saved() -> Result<()> {
  let store = StoryStore::open()?;
  let stories = store.list()?;

  if stories.is_empty() {
    println!("No saved stories.");
    return Ok(());
  }

  for story in stories {
    let author = story.name.as_deref().unwrap_or("anonymous");
    println!("* [{}] {}: {}", story.id, author, story.description);
  }
  Ok(())
}

fn run_delete(id: &str) -> Result<()> {
  let store = StoryStore::open()?;
  store.delete(id)?;
  println!("Deleted story {id}.");
  Ok(())
}

async fn run_subscribe(config: &Config) -> Result<()> {
  let gateway = build_gateway(config)?;

  match gateway.subscribe().await {
    Ok(id) => println!("Subscribed to push notifications (id {id})."),
    Err(err) => eprintln!("Push subscription failed: {err}"),
  }
  Ok(())
}

async fn run_unsubscribe(config: &Config) -> Result<()> {
  let gateway = build_gateway(config)?;
  gateway.unsubscribe().await;
  println!("Unsubscribed from push notifications.");
  Ok(())
}

async fn run_fetch(config: &Config, url: &str) -> Result<()> {
  use std::io::Write;

  let origin = Url::parse(&config.app.origin)
    .map_err(|e| eyre!("Invalid app origin {}: {}", config.app.origin, e))?;
  let generations = SqliteGenerations::open()?;
  let worker = CacheWorker::new(HttpFetcher::new(origin.clone()), generations, origin);

  worker.startup().await?;
  let response = worker.handle_fetch(&cache::FetchRequest::get(url)).await?;

  eprintln!("{} ({} bytes)", response.status, response.body.len());
  std::io::stdout().write_all(&response.body)?;
  Ok(())
}

fn run_notify(config: &Config, payload: &str) -> Result<()> {
  let gateway = build_gateway(config)?;

  let notification = gateway.receive(payload.as_bytes(), &ui::ConsoleSink);
  gateway.handle_click(&notification, &ui::ConsoleSurface);
  Ok(())
}

fn run_status() -> Result<()> {
  println!("Current cache generation: {CACHE_GENERATION}");

  let generations = SqliteGenerations::open()?;
  let names = generations.generations()?;
  if names.is_empty() {
    println!("No cache generations on disk.");
  }
  for name in names {
    let marker = if name == CACHE_GENERATION { "current" } else { "stale" };
    println!("  {name}: {} entries ({marker})", generations.entry_count(&name)?);
  }

  let store = StoryStore::open()?;
  println!("Saved stories: {}", store.count()?);
  Ok(())
}

fn open_store() -> StoryStore {
  match StoryStore::open() {
    Ok(store) => store,
    Err(err) => {
      warn!(%err, "local store unavailable, continuing without it");
      StoryStore::detached()
    }
  }
}

fn spawn_cache_worker(config: &Config) -> Option<tokio::task::JoinHandle<()>> {
  let origin = match Url::parse(&config.app.origin) {
    Ok(origin) => origin,
    Err(err) => {
      warn!(%err, origin = %config.app.origin, "invalid app origin, skipping cache worker");
      return None;
    }
  };

  let generations = match SqliteGenerations::open() {
    Ok(generations) => generations,
    Err(err) => {
      warn!(%err, "cache storage unavailable, skipping cache worker");
      return None;
    }
  };

  let worker = CacheWorker::new(HttpFetcher::new(origin.clone()), generations, origin);
  Some(tokio::spawn(async move {
    match worker.startup().await {
      Ok(()) => {
        let entries = worker.store().entry_count(worker.generation()).unwrap_or(0);
        tracing::debug!(
          generation = %worker.generation(),
          entries,
          claimed = worker.is_claimed(),
          "cache worker active"
        );
      }
      Err(err) => warn!(%err, "cache worker failed to start"),
    }
  }))
}

fn build_gateway(config: &Config) -> Result<PushGateway<UnsupportedPlatform, StoryClient>> {
  let client = StoryClient::new(config)?;
  let mut gateway = PushGateway::new(UnsupportedPlatform, client);
  if let Some(path) = push::default_state_path() {
    gateway = gateway.with_state_file(path);
  }
  Ok(gateway)
}

fn init_logging() {
  use tracing_subscriber::{fmt, prelude::*, EnvFilter};

  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
    .init();
}
