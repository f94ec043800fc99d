//! Serde-deserializable types matching Dicoding Story API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::Deserialize;

use super::types::{GeoPoint, StoryRecord};

#[derive(Debug, Deserialize)]
pub struct ApiStory {
  pub id: String,
  pub name: Option<String>,
  #[serde(default)]
  pub description: String,
  #[serde(rename = "photoUrl")]
  pub photo_url: Option<String>,
  #[serde(rename = "createdAt")]
  pub created_at: Option<String>,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
}

impl ApiStory {
  pub fn into_record(self) -> StoryRecord {
    // A lone lat or lon is dropped; locations are all-or-nothing.
    let location = match (self.lat, self.lon) {
      (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
      _ => None,
    };

    StoryRecord {
      server_id: Some(self.id),
      name: self.name,
      description: self.description,
      photo_url: self.photo_url,
      location,
      created_at: self.created_at,
    }
  }
}

/// Response envelope shared by the story endpoints.
#[derive(Debug, Deserialize)]
pub struct ApiListResponse {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
  #[serde(rename = "listStory", default)]
  pub list_story: Vec<ApiStory>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMessageResponse {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
}

/// Response to a push subscription registration.
#[derive(Debug, Deserialize)]
pub struct ApiSubscribeResponse {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
  pub data: Option<ApiSubscriptionData>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSubscriptionData {
  pub id: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_list_response_deserializes() {
    let body = r#"{
      "error": false,
      "message": "Stories fetched successfully",
      "listStory": [
        {
          "id": "story-FvU4u0Vp2S3PMsFg",
          "name": "Dimas",
          "description": "Lorem Ipsum",
          "photoUrl": "https://story-api.dicoding.dev/images/stories/photos-1.jpg",
          "createdAt": "2022-01-08T06:34:18.598Z",
          "lat": -10.212,
          "lon": -16.002
        }
      ]
    }"#;

    let parsed: ApiListResponse = serde_json::from_str(body).unwrap();
    assert!(!parsed.error);
    assert_eq!(parsed.list_story.len(), 1);

    let record = parsed.list_story.into_iter().next().unwrap().into_record();
    assert_eq!(record.server_id.as_deref(), Some("story-FvU4u0Vp2S3PMsFg"));
    assert_eq!(record.name.as_deref(), Some("Dimas"));
    assert_eq!(record.location, Some(GeoPoint { lat: -10.212, lon: -16.002 }));
  }

  #[test]
  fn test_partial_coordinates_dropped() {
    let body = r#"{
      "id": "story-x",
      "name": "Ayu",
      "description": "no lon",
      "photoUrl": null,
      "createdAt": null,
      "lat": 1.5,
      "lon": null
    }"#;

    let story: ApiStory = serde_json::from_str(body).unwrap();
    let record = story.into_record();
    assert_eq!(record.location, None);
  }
}
