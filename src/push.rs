//! Push notification gateway: bridges the platform push service to
//! user-visible notifications and keeps the backend's subscription record
//! in sync.

use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Application server key used when creating a push subscription.
pub const APPLICATION_SERVER_KEY: &str =
  "BCCs2eonMI-6H2ctvFaWg-UYdDv387Vno_bzUzALpB442r2lCnsHmtrx8biyPi_E-1fSGABK_Qs_GlvPoJJqxbk";

/// Stable notification tag: repeated payloads replace the previous
/// notification instead of stacking.
pub const NOTIFICATION_TAG: &str = "dicoding-story";

const DEFAULT_TITLE: &str = "Dicoding Stories";
const DEFAULT_BODY: &str = "Something new is waiting on Dicoding Stories.";
const DEFAULT_ROUTE: &str = "/#home";

#[derive(Debug, Error)]
pub enum SubscriptionError {
  #[error("notification permission denied")]
  PermissionDenied,

  #[error("push platform error: {0}")]
  Platform(String),

  #[error("subscription backend error: {0}")]
  Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
  Granted,
  Denied,
}

/// A platform push subscription: endpoint plus opaque key material. Owned
/// by the push service; mirrored to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PushSubscription {
  pub endpoint: String,
  pub p256dh: String,
  pub auth: String,
}

/// The platform push service.
pub trait PushPlatform: Send + Sync {
  fn request_permission(&self) -> Permission;
  fn subscribe(&self, application_server_key: &str) -> Result<PushSubscription, SubscriptionError>;
  fn subscription(&self) -> Option<PushSubscription>;
  fn unsubscribe(&self) -> Result<(), SubscriptionError>;
}

/// The backend's subscription endpoints (implemented by the story client).
pub trait SubscriptionBackend: Send + Sync {
  /// Register a subscription, returning the backend's identifier for it.
  fn register(
    &self,
    subscription: &PushSubscription,
  ) -> impl Future<Output = Result<String, SubscriptionError>> + Send;

  fn remove(&self, endpoint: &str) -> impl Future<Output = Result<(), SubscriptionError>> + Send;
}

/// Renders notifications to the user.
pub trait NotificationSink {
  fn show(&self, notification: &Notification);
}

/// Open client views a notification click can target.
pub trait ClientSurface {
  fn close_notification(&self, tag: &str);

  /// Focus an existing view and post it the route. Returns false when no
  /// view is open.
  fn focus_existing(&self, route: &str) -> bool;

  fn open_new(&self, route: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub tag: String,
  pub require_interaction: bool,
  pub route: String,
}

/// Wire shape of a push payload. Anything that does not parse falls back
/// to plain text.
#[derive(Debug, Deserialize)]
struct PushMessage {
  title: Option<String>,
  options: Option<PushOptions>,
  #[allow(dead_code)]
  data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PushOptions {
  body: Option<String>,
}

/// Turn a raw push payload into the notification to render.
pub fn parse_push_payload(payload: &[u8]) -> Notification {
  let (title, body) = match serde_json::from_slice::<PushMessage>(payload) {
    Ok(message) => (
      message.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
      message
        .options
        .and_then(|options| options.body)
        .unwrap_or_else(|| DEFAULT_BODY.to_string()),
    ),
    Err(_) => (
      DEFAULT_TITLE.to_string(),
      String::from_utf8_lossy(payload).into_owned(),
    ),
  };

  Notification {
    title,
    body,
    tag: NOTIFICATION_TAG.to_string(),
    require_interaction: true,
    route: DEFAULT_ROUTE.to_string(),
  }
}

/// Subscribe/unsubscribe flows plus incoming payload handling.
pub struct PushGateway<P, B> {
  platform: P,
  backend: B,
  state_path: Option<PathBuf>,
  subscription_id: Mutex<Option<String>>,
}

impl<P: PushPlatform, B: SubscriptionBackend> PushGateway<P, B> {
  pub fn new(platform: P, backend: B) -> Self {
    Self {
      platform,
      backend,
      state_path: None,
      subscription_id: Mutex::new(None),
    }
  }

  /// Persist the backend subscription id to a state file, picking up any
  /// id left over from a previous run.
  pub fn with_state_file(mut self, path: PathBuf) -> Self {
    let existing = std::fs::read_to_string(&path)
      .ok()
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty());
    *self.subscription_id.lock().expect("gateway lock poisoned") = existing;
    self.state_path = Some(path);
    self
  }

  pub fn subscription_id(&self) -> Option<String> {
    self.subscription_id.lock().expect("gateway lock poisoned").clone()
  }

  /// Request permission, create a platform subscription, register it with
  /// the backend, and remember the returned identifier. Any failing step
  /// aborts the remaining ones; there is no retry.
  pub async fn subscribe(&self) -> Result<String, SubscriptionError> {
    if self.platform.request_permission() != Permission::Granted {
      return Err(SubscriptionError::PermissionDenied);
    }

    let subscription = self.platform.subscribe(APPLICATION_SERVER_KEY)?;
    debug!(endpoint = %subscription.endpoint, "push subscription created");

    let id = self.backend.register(&subscription).await?;
    self.remember(Some(id.clone()));
    Ok(id)
  }

  /// Remove the backend record first, then cancel the platform
  /// subscription, then clear the stored identifier. Step failures are
  /// logged but never block the following steps.
  pub async fn unsubscribe(&self) {
    let subscription = match self.platform.subscription() {
      Some(subscription) => subscription,
      None => {
        debug!("no active push subscription");
        return;
      }
    };

    if let Err(err) = self.backend.remove(&subscription.endpoint).await {
      warn!(%err, "backend unsubscribe failed");
    }

    if let Err(err) = self.platform.unsubscribe() {
      warn!(%err, "platform unsubscribe failed");
    }

    self.remember(None);
  }

  /// Render an incoming push payload.
  pub fn receive(&self, payload: &[u8], sink: &impl NotificationSink) -> Notification {
    let notification = parse_push_payload(payload);
    sink.show(&notification);
    notification
  }

  /// Close the notification, then focus an open view or open a new one at
  /// the notification's route.
  pub fn handle_click(&self, notification: &Notification, surface: &impl ClientSurface) {
    surface.close_notification(&notification.tag);
    if !surface.focus_existing(&notification.route) {
      surface.open_new(&notification.route);
    }
  }

  fn remember(&self, id: Option<String>) {
    *self.subscription_id.lock().expect("gateway lock poisoned") = id.clone();

    if let Some(path) = &self.state_path {
      let result = match id {
        Some(id) => std::fs::write(path, id),
        None => std::fs::remove_file(path),
      };
      if let Err(err) = result {
        debug!(%err, "could not update subscription state file");
      }
    }
  }
}

/// Default subscription state file location under the data directory.
pub fn default_state_path() -> Option<PathBuf> {
  let data_dir = dirs::data_dir().or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))?;
  Some(data_dir.join("cerita").join("subscription"))
}

/// Platform stub for environments without a push service. Permission is
/// always denied, so subscribe aborts before touching the backend.
pub struct UnsupportedPlatform;

impl PushPlatform for UnsupportedPlatform {
  fn request_permission(&self) -> Permission {
    Permission::Denied
  }

  fn subscribe(&self, _application_server_key: &str) -> Result<PushSubscription, SubscriptionError> {
    Err(SubscriptionError::Platform(
      "push is not supported in this environment".to_string(),
    ))
  }

  fn subscription(&self) -> Option<PushSubscription> {
    None
  }

  fn unsubscribe(&self) -> Result<(), SubscriptionError> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  struct MockPlatform {
    permission: Permission,
    subscription: Option<PushSubscription>,
    subscribe_fails: bool,
    unsubscribe_fails: bool,
    unsubscribed: AtomicUsize,
  }

  impl MockPlatform {
    fn granted() -> Self {
      Self {
        permission: Permission::Granted,
        subscription: Some(subscription()),
        subscribe_fails: false,
        unsubscribe_fails: false,
        unsubscribed: AtomicUsize::new(0),
      }
    }

    fn denied() -> Self {
      Self {
        permission: Permission::Denied,
        ..Self::granted()
      }
    }
  }

  impl PushPlatform for MockPlatform {
    fn request_permission(&self) -> Permission {
      self.permission
    }

    fn subscribe(&self, _key: &str) -> Result<PushSubscription, SubscriptionError> {
      if self.subscribe_fails {
        return Err(SubscriptionError::Platform("subscribe failed".to_string()));
      }
      self
        .subscription
        .clone()
        .ok_or_else(|| SubscriptionError::Platform("no subscription".to_string()))
    }

    fn subscription(&self) -> Option<PushSubscription> {
      self.subscription.clone()
    }

    fn unsubscribe(&self) -> Result<(), SubscriptionError> {
      self.unsubscribed.fetch_add(1, Ordering::SeqCst);
      if self.unsubscribe_fails {
        return Err(SubscriptionError::Platform("unsubscribe failed".to_string()));
      }
      Ok(())
    }
  }

  #[derive(Default)]
  struct MockBackend {
    registered: Arc<AtomicUsize>,
    removed: Arc<AtomicUsize>,
    register_fails: bool,
    remove_fails: bool,
  }

  impl SubscriptionBackend for MockBackend {
    async fn register(&self, _subscription: &PushSubscription) -> Result<String, SubscriptionError> {
      self.registered.fetch_add(1, Ordering::SeqCst);
      if self.register_fails {
        return Err(SubscriptionError::Backend("server error".to_string()));
      }
      Ok("sub-1".to_string())
    }

    async fn remove(&self, _endpoint: &str) -> Result<(), SubscriptionError> {
      self.removed.fetch_add(1, Ordering::SeqCst);
      if self.remove_fails {
        return Err(SubscriptionError::Backend("server error".to_string()));
      }
      Ok(())
    }
  }

  fn subscription() -> PushSubscription {
    PushSubscription {
      endpoint: "https://push.test/endpoint/1".to_string(),
      p256dh: "p256dh-material".to_string(),
      auth: "auth-material".to_string(),
    }
  }

  #[derive(Default)]
  struct RecordingSink {
    shown: RefCell<Vec<Notification>>,
  }

  impl NotificationSink for RecordingSink {
    fn show(&self, notification: &Notification) {
      self.shown.borrow_mut().push(notification.clone());
    }
  }

  #[derive(Default)]
  struct RecordingSurface {
    has_open_view: bool,
    closed: RefCell<Vec<String>>,
    focused: RefCell<Vec<String>>,
    opened: RefCell<Vec<String>>,
  }

  impl ClientSurface for RecordingSurface {
    fn close_notification(&self, tag: &str) {
      self.closed.borrow_mut().push(tag.to_string());
    }

    fn focus_existing(&self, route: &str) -> bool {
      if self.has_open_view {
        self.focused.borrow_mut().push(route.to_string());
      }
      self.has_open_view
    }

    fn open_new(&self, route: &str) {
      self.opened.borrow_mut().push(route.to_string());
    }
  }

  #[test]
  fn test_structured_payload_parses() {
    let payload = br#"{"title": "New story", "options": {"body": "Dimas posted a story"}}"#;
    let notification = parse_push_payload(payload);

    assert_eq!(notification.title, "New story");
    assert_eq!(notification.body, "Dimas posted a story");
    assert_eq!(notification.tag, NOTIFICATION_TAG);
    assert!(notification.require_interaction);
  }

  #[test]
  fn test_malformed_payload_falls_back_to_text() {
    let notification = parse_push_payload(b"plain text update");

    assert_eq!(notification.title, DEFAULT_TITLE);
    assert_eq!(notification.body, "plain text update");
  }

  #[test]
  fn test_missing_fields_use_defaults() {
    let notification = parse_push_payload(br#"{"data": {"x": 1}}"#);

    assert_eq!(notification.title, DEFAULT_TITLE);
    assert_eq!(notification.body, DEFAULT_BODY);
  }

  #[tokio::test]
  async fn test_subscribe_registers_and_stores_id() {
    let gateway = PushGateway::new(MockPlatform::granted(), MockBackend::default());

    let id = gateway.subscribe().await.unwrap();
    assert_eq!(id, "sub-1");
    assert_eq!(gateway.subscription_id().as_deref(), Some("sub-1"));
  }

  #[tokio::test]
  async fn test_subscribe_aborts_when_permission_denied() {
    let backend = MockBackend::default();
    let registered = Arc::clone(&backend.registered);
    let gateway = PushGateway::new(MockPlatform::denied(), backend);

    let err = gateway.subscribe().await.unwrap_err();
    assert!(matches!(err, SubscriptionError::PermissionDenied));
    assert_eq!(registered.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_subscribe_aborts_when_platform_fails() {
    let backend = MockBackend::default();
    let registered = Arc::clone(&backend.registered);
    let platform = MockPlatform {
      subscribe_fails: true,
      ..MockPlatform::granted()
    };
    let gateway = PushGateway::new(platform, backend);

    assert!(gateway.subscribe().await.is_err());
    assert_eq!(registered.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_subscribe_keeps_no_id_when_backend_fails() {
    let backend = MockBackend {
      register_fails: true,
      ..MockBackend::default()
    };
    let gateway = PushGateway::new(MockPlatform::granted(), backend);

    assert!(gateway.subscribe().await.is_err());
    assert_eq!(gateway.subscription_id(), None);
  }

  #[tokio::test]
  async fn test_unsubscribe_runs_all_steps() {
    let gateway = PushGateway::new(MockPlatform::granted(), MockBackend::default());
    gateway.subscribe().await.unwrap();

    gateway.unsubscribe().await;

    assert_eq!(gateway.platform.unsubscribed.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.backend.removed.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.subscription_id(), None);
  }

  #[tokio::test]
  async fn test_unsubscribe_continues_past_backend_failure() {
    let backend = MockBackend {
      remove_fails: true,
      ..MockBackend::default()
    };
    let gateway = PushGateway::new(MockPlatform::granted(), backend);
    gateway.subscribe().await.unwrap();

    gateway.unsubscribe().await;

    // The platform subscription is still cancelled and the id cleared.
    assert_eq!(gateway.platform.unsubscribed.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.subscription_id(), None);
  }

  #[tokio::test]
  async fn test_unsubscribe_without_subscription_skips_backend() {
    let backend = MockBackend::default();
    let removed = Arc::clone(&backend.removed);
    let platform = MockPlatform {
      subscription: None,
      ..MockPlatform::granted()
    };
    let gateway = PushGateway::new(platform, backend);

    gateway.unsubscribe().await;
    assert_eq!(removed.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_receive_renders_notification() {
    let gateway = PushGateway::new(MockPlatform::granted(), MockBackend::default());
    let sink = RecordingSink::default();

    gateway.receive(br#"{"title": "Hi"}"#, &sink);

    let shown = sink.shown.borrow();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Hi");
  }

  #[test]
  fn test_click_focuses_existing_view() {
    let gateway = PushGateway::new(MockPlatform::granted(), MockBackend::default());
    let surface = RecordingSurface {
      has_open_view: true,
      ..RecordingSurface::default()
    };
    let notification = parse_push_payload(b"{}");

    gateway.handle_click(&notification, &surface);

    assert_eq!(surface.closed.borrow().len(), 1);
    assert_eq!(surface.focused.borrow().as_slice(), [DEFAULT_ROUTE]);
    assert!(surface.opened.borrow().is_empty());
  }

  #[test]
  fn test_click_opens_new_view_when_none_open() {
    let gateway = PushGateway::new(MockPlatform::granted(), MockBackend::default());
    let surface = RecordingSurface::default();
    let notification = parse_push_payload(b"{}");

    gateway.handle_click(&notification, &surface);

    assert!(surface.focused.borrow().is_empty());
    assert_eq!(surface.opened.borrow().as_slice(), [DEFAULT_ROUTE]);
  }
}
