//! Dicoding Story API client.

use color_eyre::{eyre::eyre, Result};

use crate::config::Config;
use crate::push::{PushSubscription, SubscriptionBackend, SubscriptionError};

use super::api_types::{ApiListResponse, ApiMessageResponse, ApiSubscribeResponse};
use super::sync::FetchStories;
use super::types::{GeoPoint, StoryRecord};

/// Story API client wrapper. All calls carry the bearer token from the
/// environment.
#[derive(Clone)]
pub struct StoryClient {
  http: reqwest::Client,
  base_url: String,
  token: String,
}

impl StoryClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    Ok(Self {
      http: reqwest::Client::new(),
      base_url: config.api.url.trim_end_matches('/').to_string(),
      token,
    })
  }

  /// Upload a new story with a photo and optional coordinates.
  pub async fn add_story(
    &self,
    description: &str,
    photo: Vec<u8>,
    photo_name: &str,
    location: Option<GeoPoint>,
  ) -> Result<()> {
    let part = reqwest::multipart::Part::bytes(photo)
      .file_name(photo_name.to_string())
      .mime_str(guess_mime(photo_name))
      .map_err(|e| eyre!("Invalid photo mime type: {}", e))?;

    let mut form = reqwest::multipart::Form::new()
      .text("description", description.to_string())
      .part("photo", part);

    if let Some(point) = location {
      form = form
        .text("lat", point.lat.to_string())
        .text("lon", point.lon.to_string());
    }

    let response = self
      .http
      .post(format!("{}/stories", self.base_url))
      .bearer_auth(&self.token)
      .multipart(form)
      .send()
      .await
      .map_err(|e| eyre!("Failed to add story: {}", e))?;

    let status = response.status();
    let body: ApiMessageResponse = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse add-story response: {}", e))?;

    if !status.is_success() || body.error {
      return Err(eyre!(
        "Failed to add story: {}",
        non_empty(body.message).unwrap_or_else(|| status.to_string())
      ));
    }

    Ok(())
  }
}

impl FetchStories for StoryClient {
  async fn fetch_stories(&self) -> Result<Vec<StoryRecord>> {
    let url = format!("{}/stories?size=20&location=1", self.base_url);

    let response = self
      .http
      .get(&url)
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch stories: {}", e))?;

    let status = response.status();
    let body: ApiListResponse = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse stories response: {}", e))?;

    if !status.is_success() || body.error {
      return Err(eyre!(
        "Failed to fetch stories: {}",
        non_empty(body.message).unwrap_or_else(|| status.to_string())
      ));
    }

    Ok(body.list_story.into_iter().map(|s| s.into_record()).collect())
  }
}

impl SubscriptionBackend for StoryClient {
  async fn register(&self, subscription: &PushSubscription) -> Result<String, SubscriptionError> {
    let payload = serde_json::json!({
      "endpoint": subscription.endpoint,
      "keys": {
        "p256dh": subscription.p256dh,
        "auth": subscription.auth,
      },
    });

    let response = self
      .http
      .post(format!("{}/notifications/subscribe", self.base_url))
      .bearer_auth(&self.token)
      .json(&payload)
      .send()
      .await
      .map_err(|e| SubscriptionError::Backend(e.to_string()))?;

    let status = response.status();
    let body: ApiSubscribeResponse = response
      .json()
      .await
      .map_err(|e| SubscriptionError::Backend(e.to_string()))?;

    if !status.is_success() || body.error {
      return Err(SubscriptionError::Backend(
        non_empty(body.message).unwrap_or_else(|| status.to_string()),
      ));
    }

    body
      .data
      .map(|data| data.id)
      .ok_or_else(|| SubscriptionError::Backend("subscription id missing".to_string()))
  }

  async fn remove(&self, endpoint: &str) -> Result<(), SubscriptionError> {
    let payload = serde_json::json!({ "endpoint": endpoint });

    let response = self
      .http
      .delete(format!("{}/notifications/subscribe", self.base_url))
      .bearer_auth(&self.token)
      .json(&payload)
      .send()
      .await
      .map_err(|e| SubscriptionError::Backend(e.to_string()))?;

    if !response.status().is_success() {
      return Err(SubscriptionError::Backend(response.status().to_string()));
    }

    Ok(())
  }
}

fn guess_mime(file_name: &str) -> &'static str {
  let lower = file_name.to_lowercase();
  if lower.ends_with(".png") {
    "image/png"
  } else if lower.ends_with(".webp") {
    "image/webp"
  } else if lower.ends_with(".gif") {
    "image/gif"
  } else {
    "image/jpeg"
  }
}

fn non_empty(message: String) -> Option<String> {
  if message.is_empty() {
    None
  } else {
    Some(message)
  }
}
