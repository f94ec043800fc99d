//! reqwest-backed implementation of the network boundary.

use url::Url;

use super::types::{Fetch, FetchError, FetchRequest, FetchResponse, Method, ResponseType};

/// Real network fetcher. Responses to requests on the application's own
/// origin are classified `Basic`; everything else is `Cors`.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  app_origin: Url,
}

impl HttpFetcher {
  pub fn new(app_origin: Url) -> Self {
    Self {
      client: reqwest::Client::new(),
      app_origin,
    }
  }

  fn classify(&self, request_url: &str) -> ResponseType {
    match Url::parse(request_url) {
      Ok(parsed) if parsed.origin() == self.app_origin.origin() => ResponseType::Basic,
      Ok(_) => ResponseType::Cors,
      Err(_) => ResponseType::Opaque,
    }
  }
}

impl Fetch for HttpFetcher {
  async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Head => reqwest::Method::HEAD,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Delete => reqwest::Method::DELETE,
    };

    let response = self
      .client
      .request(method, &request.url)
      .send()
      .await
      .map_err(|e| FetchError::new(&request.url, e.to_string()))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| FetchError::new(&request.url, e.to_string()))?
      .to_vec();

    Ok(FetchResponse {
      status,
      response_type: self.classify(&request.url),
      headers,
      body,
    })
  }
}
