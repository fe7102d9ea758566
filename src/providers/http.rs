use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Send `request`, turning transport failures and non-2xx statuses into `ApiError`.
pub async fn send(request: RequestBuilder, method: &str, url: &str) -> Result<Response, ApiError> {
    let response = request.send().await.map_err(|source| ApiError::Request {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Http {
        method: method.to_string(),
        url: url.to_string(),
        status,
        body,
    })
}

pub async fn read_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
    response.json().await.map_err(|source| ApiError::Request {
        url: url.to_string(),
        source,
    })
}

/// The `rel="next"` target of a `Link` header, if any.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(reqwest::header::LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#);
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Some(target.to_string())
    })
}
