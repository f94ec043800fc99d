/// A point on the map. Both coordinates are always present; a story with a
/// partial coordinate pair is treated as having no location at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
  pub lat: f64,
  pub lon: f64,
}

/// A story as fetched from the network.
///
/// The server id is kept for display only and is never reused as a local
/// store key; the local store assigns its own identifier on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryRecord {
  pub server_id: Option<String>,
  pub name: Option<String>,
  pub description: String,
  pub photo_url: Option<String>,
  pub location: Option<GeoPoint>,
  pub created_at: Option<String>,
}

impl StoryRecord {
  /// A record built from the add-story form, before upload.
  pub fn draft(description: impl Into<String>, location: Option<GeoPoint>) -> Self {
    Self {
      server_id: None,
      name: None,
      description: description.into(),
      photo_url: None,
      location,
      created_at: None,
    }
  }
}

/// A story as it exists in the local store: the locally assigned key plus
/// the insert-time timestamp (epoch milliseconds).
#[derive(Debug, Clone, PartialEq)]
pub struct SavedStory {
  pub id: i64,
  pub name: Option<String>,
  pub description: String,
  pub photo_url: Option<String>,
  pub location: Option<GeoPoint>,
  pub timestamp: i64,
}
