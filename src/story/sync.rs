//! Sync coordinator: decides whether the feed shows live network data or
//! the local fallback, and keeps the local store warm with network results.

use std::future::Future;
use tracing::warn;

use crate::store::{StoreError, StoryStore};

use super::types::{SavedStory, StoryRecord};

/// Presentation contract. The UI (or a recording double in tests) receives
/// the loading bracket, the feed, the offline fallback, and errors.
pub trait StoryPresenter {
  fn show_loading(&self);
  fn hide_loading(&self);
  fn display_stories(&self, stories: &[StoryRecord]);
  fn display_offline_stories(&self, stories: &[SavedStory]);
  fn show_error(&self, message: &str);
  fn update_map(&self, stories: &[StoryRecord]);
}

/// The network collaborator for the feed.
pub trait FetchStories: Send + Sync {
  fn fetch_stories(&self) -> impl Future<Output = color_eyre::Result<Vec<StoryRecord>>> + Send;
}

/// The slice of the local store the coordinator needs.
pub trait OfflineStore: Send + Sync {
  /// Best-effort copy of a network record. `Ok(None)` means the store is
  /// not available.
  fn mirror(&self, record: &StoryRecord) -> Result<Option<i64>, StoreError>;

  /// Everything currently saved on-device.
  fn saved(&self) -> Result<Vec<SavedStory>, StoreError>;
}

impl OfflineStore for StoryStore {
  fn mirror(&self, record: &StoryRecord) -> Result<Option<i64>, StoreError> {
    self.insert(record)
  }

  fn saved(&self) -> Result<Vec<SavedStory>, StoreError> {
    self.list()
  }
}

/// What a load ended up showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
  /// Live network data, n stories.
  Live(usize),
  /// Local fallback, n stories.
  Offline(usize),
  /// No network and nothing saved locally.
  Failed,
}

/// Orchestrates "load stories": try the network, mirror successes into the
/// local store, fall back to the store when the network is unavailable.
pub struct SyncCoordinator<C, S> {
  client: C,
  store: S,
}

impl<C: FetchStories, S: OfflineStore> SyncCoordinator<C, S> {
  pub fn new(client: C, store: S) -> Self {
    Self { client, store }
  }

  pub async fn load_stories(&self, presenter: &impl StoryPresenter) -> LoadOutcome {
    presenter.show_loading();

    let outcome = match self.client.fetch_stories().await {
      Ok(stories) => {
        presenter.display_stories(&stories);
        presenter.update_map(&stories);
        self.mirror_all(&stories);
        LoadOutcome::Live(stories.len())
      }
      Err(err) => {
        presenter.show_error(&format!("Failed to load stories: {err}"));
        self.fall_back(presenter)
      }
    };

    presenter.hide_loading();
    outcome
  }

  /// Mirror records one at a time, in received order. A failure for a
  /// single record is logged and skipped so the rest still get cached.
  fn mirror_all(&self, stories: &[StoryRecord]) {
    for record in stories {
      if let Err(err) = self.store.mirror(record) {
        warn!(%err, description = %record.description, "failed to mirror story");
      }
    }
  }

  fn fall_back(&self, presenter: &impl StoryPresenter) -> LoadOutcome {
    match self.store.saved() {
      Ok(saved) if !saved.is_empty() => {
        presenter.display_offline_stories(&saved);
        LoadOutcome::Offline(saved.len())
      }
      Ok(_) => LoadOutcome::Failed,
      Err(err) => {
        warn!(%err, "local store unavailable during fallback");
        LoadOutcome::Failed
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::{Cell, RefCell};
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct OkFetcher(Vec<StoryRecord>);

  impl FetchStories for OkFetcher {
    async fn fetch_stories(&self) -> color_eyre::Result<Vec<StoryRecord>> {
      Ok(self.0.clone())
    }
  }

  struct FailFetcher;

  impl FetchStories for FailFetcher {
    async fn fetch_stories(&self) -> color_eyre::Result<Vec<StoryRecord>> {
      Err(color_eyre::eyre::eyre!("connection refused"))
    }
  }

  #[derive(Default)]
  struct RecordingPresenter {
    loading_started: Cell<usize>,
    loading_ended: Cell<usize>,
    displayed: RefCell<Vec<Vec<StoryRecord>>>,
    offline: RefCell<Vec<Vec<SavedStory>>>,
    errors: RefCell<Vec<String>>,
    map_updates: Cell<usize>,
  }

  impl StoryPresenter for RecordingPresenter {
    fn show_loading(&self) {
      self.loading_started.set(self.loading_started.get() + 1);
    }

    fn hide_loading(&self) {
      self.loading_ended.set(self.loading_ended.get() + 1);
    }

    fn display_stories(&self, stories: &[StoryRecord]) {
      self.displayed.borrow_mut().push(stories.to_vec());
    }

    fn display_offline_stories(&self, stories: &[SavedStory]) {
      self.offline.borrow_mut().push(stories.to_vec());
    }

    fn show_error(&self, message: &str) {
      self.errors.borrow_mut().push(message.to_string());
    }

    fn update_map(&self, _stories: &[StoryRecord]) {
      self.map_updates.set(self.map_updates.get() + 1);
    }
  }

  /// Wraps a real store and fails the nth mirror call.
  struct FailNthMirror {
    inner: StoryStore,
    calls: AtomicUsize,
    fail_at: usize,
  }

  impl FailNthMirror {
    fn new(inner: StoryStore, fail_at: usize) -> Self {
      Self {
        inner,
        calls: AtomicUsize::new(0),
        fail_at,
      }
    }
  }

  impl OfflineStore for FailNthMirror {
    fn mirror(&self, record: &StoryRecord) -> Result<Option<i64>, StoreError> {
      let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
      if call == self.fail_at {
        return Err(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
      }
      self.inner.insert(record)
    }

    fn saved(&self) -> Result<Vec<SavedStory>, StoreError> {
      self.inner.list()
    }
  }

  fn records(n: usize) -> Vec<StoryRecord> {
    (1..=n)
      .map(|i| StoryRecord::draft(format!("story {i}"), None))
      .collect()
  }

  #[tokio::test]
  async fn test_success_displays_and_mirrors() {
    let store = StoryStore::open_in_memory().unwrap();
    let coordinator = SyncCoordinator::new(OkFetcher(records(2)), store);
    let presenter = RecordingPresenter::default();

    let outcome = coordinator.load_stories(&presenter).await;

    assert_eq!(outcome, LoadOutcome::Live(2));
    assert_eq!(presenter.displayed.borrow().len(), 1);
    assert_eq!(presenter.map_updates.get(), 1);
    assert!(presenter.errors.borrow().is_empty());
    assert_eq!(presenter.loading_started.get(), 1);
    assert_eq!(presenter.loading_ended.get(), 1);

    let saved = coordinator.store.saved().unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].description, "story 1");
    assert_eq!(saved[1].description, "story 2");
  }

  #[tokio::test]
  async fn test_network_failure_falls_back_to_store() {
    let store = StoryStore::open_in_memory().unwrap();
    for record in records(3) {
      store.insert(&record).unwrap();
    }
    let coordinator = SyncCoordinator::new(FailFetcher, store);
    let presenter = RecordingPresenter::default();

    let outcome = coordinator.load_stories(&presenter).await;

    assert_eq!(outcome, LoadOutcome::Offline(3));
    assert_eq!(presenter.errors.borrow().len(), 1);
    assert_eq!(presenter.offline.borrow().len(), 1);
    assert_eq!(presenter.offline.borrow()[0].len(), 3);
    assert!(presenter.displayed.borrow().is_empty());
    assert_eq!(presenter.loading_ended.get(), 1);
  }

  #[tokio::test]
  async fn test_network_failure_with_empty_store_shows_only_error() {
    let coordinator = SyncCoordinator::new(FailFetcher, StoryStore::open_in_memory().unwrap());
    let presenter = RecordingPresenter::default();

    let outcome = coordinator.load_stories(&presenter).await;

    assert_eq!(outcome, LoadOutcome::Failed);
    assert_eq!(presenter.errors.borrow().len(), 1);
    assert!(presenter.offline.borrow().is_empty());
    assert_eq!(presenter.loading_ended.get(), 1);
  }

  #[tokio::test]
  async fn test_single_mirror_failure_does_not_stop_the_rest() {
    let store = FailNthMirror::new(StoryStore::open_in_memory().unwrap(), 3);
    let coordinator = SyncCoordinator::new(OkFetcher(records(5)), store);
    let presenter = RecordingPresenter::default();

    let outcome = coordinator.load_stories(&presenter).await;
    assert_eq!(outcome, LoadOutcome::Live(5));

    let descriptions: Vec<String> = coordinator
      .store
      .saved()
      .unwrap()
      .into_iter()
      .map(|s| s.description)
      .collect();
    assert_eq!(
      descriptions,
      vec!["story 1", "story 2", "story 4", "story 5"]
    );
  }

  #[tokio::test]
  async fn test_detached_store_mirrors_quietly() {
    let coordinator = SyncCoordinator::new(OkFetcher(records(2)), StoryStore::detached());
    let presenter = RecordingPresenter::default();

    let outcome = coordinator.load_stories(&presenter).await;
    assert_eq!(outcome, LoadOutcome::Live(2));
    assert!(presenter.errors.borrow().is_empty());
  }
}
