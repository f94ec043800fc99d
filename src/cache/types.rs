//! Core types for the response cache: the request/response model, the
//! `Fetch` trait implemented by the network boundary, and the predicate
//! deciding which responses are eligible for caching.

use std::future::Future;
use thiserror::Error;

/// Transient network failure. Always recoverable by falling back to the
/// cache or the local store; never fatal.
#[derive(Debug, Clone, Error)]
#[error("network fetch failed for {url}: {reason}")]
pub struct FetchError {
  pub url: String,
  pub reason: String,
}

impl FetchError {
  pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      reason: reason.into(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
    }
  }
}

/// What kind of resource a request is for, mirroring the request destination
/// the fetch layer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
  Document,
  Style,
  Script,
  Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
  pub method: Method,
  pub url: String,
  pub destination: Destination,
}

impl FetchRequest {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      destination: Destination::Other,
    }
  }

  pub fn document(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      destination: Destination::Document,
    }
  }

  pub fn stylesheet(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      destination: Destination::Style,
    }
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }
}

/// Response type as the platform fetch layer classifies it. Only `Basic`
/// (same-origin, non-opaque) responses are eligible for opportunistic
/// caching on the fetch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  Basic,
  Cors,
  Opaque,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseType::Basic => "basic",
      ResponseType::Cors => "cors",
      ResponseType::Opaque => "opaque",
    }
  }

  pub fn parse(value: &str) -> Self {
    match value {
      "basic" => ResponseType::Basic,
      "cors" => ResponseType::Cors,
      _ => ResponseType::Opaque,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
  pub status: u16,
  pub response_type: ResponseType,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl FetchResponse {
  pub fn new(status: u16) -> Self {
    Self {
      status,
      response_type: ResponseType::Basic,
      headers: Vec::new(),
      body: Vec::new(),
    }
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_type(mut self, response_type: ResponseType) -> Self {
    self.response_type = response_type;
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Only cache complete same-origin responses; opaque or partial
/// cross-origin bodies must not be stored from the fetch path.
pub fn should_cache(response: &FetchResponse) -> bool {
  response.status == 200 && response.response_type == ResponseType::Basic
}

/// The network boundary. Implemented over reqwest for real traffic and by
/// canned fetchers in tests.
pub trait Fetch: Send + Sync {
  fn fetch(
    &self,
    request: &FetchRequest,
  ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;
}
