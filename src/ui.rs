//! Console presenter: the terminal stand-in for the web views.

use chrono::DateTime;

use crate::push::{ClientSurface, Notification, NotificationSink};
use crate::story::sync::StoryPresenter;
use crate::story::types::{SavedStory, StoryRecord};

pub struct ConsolePresenter;

impl ConsolePresenter {
  pub fn new() -> Self {
    Self
  }
}

impl StoryPresenter for ConsolePresenter {
  fn show_loading(&self) {
    eprintln!("Loading stories...");
  }

  fn hide_loading(&self) {}

  fn display_stories(&self, stories: &[StoryRecord]) {
    if stories.is_empty() {
      println!("No stories yet.");
      return;
    }

    for story in stories {
      let author = story.name.as_deref().unwrap_or("anonymous");
      println!("* {}: {}", author, story.description);
      if let Some(photo) = &story.photo_url {
        println!("    photo {photo}");
      }
      if let Some(point) = story.location {
        println!("    at {:.4}, {:.4}", point.lat, point.lon);
      }
      if let Some(created) = &story.created_at {
        println!("    posted {created}");
      }
    }
  }

  fn display_offline_stories(&self, stories: &[SavedStory]) {
    println!("You appear to be offline. Showing saved stories:");
    for story in stories {
      let author = story.name.as_deref().unwrap_or("anonymous");
      println!("* [{}] {}: {}", story.id, author, story.description);
      if let Some(photo) = &story.photo_url {
        println!("    photo {photo}");
      }
      if let Some(point) = story.location {
        println!("    at {:.4}, {:.4}", point.lat, point.lon);
      }
      println!("    saved offline at {}", format_timestamp(story.timestamp));
    }
  }

  fn show_error(&self, message: &str) {
    eprintln!("Error: {message}");
  }

  fn update_map(&self, stories: &[StoryRecord]) {
    let located = stories.iter().filter(|s| s.location.is_some()).count();
    if located > 0 {
      println!("({located} stories carry map coordinates)");
    }
  }
}

/// Renders notifications as console lines.
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
  fn show(&self, notification: &Notification) {
    println!("[{}] {}", notification.title, notification.body);
    println!("  (tag {}, requires interaction)", notification.tag);
  }
}

/// Click target for a terminal session: there is never an open view to
/// focus, so a click always "opens" one.
pub struct ConsoleSurface;

impl ClientSurface for ConsoleSurface {
  fn close_notification(&self, _tag: &str) {}

  fn focus_existing(&self, _route: &str) -> bool {
    false
  }

  fn open_new(&self, route: &str) {
    println!("  (would open the app at {route})");
  }
}

fn format_timestamp(millis: i64) -> String {
  match DateTime::from_timestamp_millis(millis) {
    Some(datetime) => datetime.format("%Y-%m-%d %H:%M UTC").to_string(),
    None => millis.to_string(),
  }
}
