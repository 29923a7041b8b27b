#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for dstage
//!
//! This crate handles the HTTP traffic with the remote build server:
//! connection pooling, transport-level retries and a few helpers that turn
//! responses into text or typed errors.

mod client;

pub use client::{NetClient, NetConfig};

use dstage_errors::{Error, NetworkError};
use dstage_events::EventEmitter;
use reqwest::{Response, StatusCode};
use url::Url;

/// Fetch text content from a URL
///
/// # Errors
///
/// Returns an error if the HTTP request fails, the server returns an error status,
/// or the response body cannot be decoded as text.
pub async fn fetch_text(
    client: &NetClient,
    url: &str,
    events: &impl EventEmitter,
) -> Result<String, Error> {
    events.emit_debug(format!("GET {url}"));

    let response = client.get(url).await?;
    read_text(url, ensure_success(response)?).await
}

/// Fetch text content, treating `404 Not Found` as absent
///
/// # Errors
///
/// Returns an error for any failure other than a 404 response.
pub async fn fetch_text_optional(
    client: &NetClient,
    url: &str,
    events: &impl EventEmitter,
) -> Result<Option<String>, Error> {
    events.emit_debug(format!("GET {url}"));

    let response = client.get(url).await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    read_text(url, ensure_success(response)?).await.map(Some)
}

/// POST to a URL with query parameters and no body
///
/// # Errors
///
/// Returns an error if the request fails or the server returns an error status.
pub async fn post_query(
    client: &NetClient,
    url: &str,
    query: &[(&str, &str)],
    events: &impl EventEmitter,
) -> Result<(), Error> {
    events.emit_debug(format!("POST {url}"));

    let response = client.post_query(url, query).await?;
    ensure_success(response)?;
    Ok(())
}

/// Parse and validate a URL
///
/// # Errors
///
/// Returns an error if the URL string is malformed.
pub fn parse_url(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()).into())
}

/// Append a relative path to a base URL, keeping the base's own path
///
/// `http://ci/job/Worker` + `lastBuild/buildNumber` gives
/// `http://ci/job/Worker/lastBuild/buildNumber`.
///
/// # Errors
///
/// Returns an error if the base is not a valid URL.
pub fn join_url(base: &str, path: &str) -> Result<String, Error> {
    let mut base = parse_url(base)?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .map(String::from)
        .map_err(|e| NetworkError::InvalidUrl(e.to_string()).into())
}

fn ensure_success(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(NetworkError::HttpError {
            status: status.as_u16(),
            message: status.to_string(),
        }
        .into())
    }
}

async fn read_text(url: &str, response: Response) -> Result<String, Error> {
    response.text().await.map_err(|e| {
        NetworkError::InvalidResponse {
            url: url.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}
