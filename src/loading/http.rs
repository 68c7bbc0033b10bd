use crate::error::{BuildError, BuildResult};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const HTTP_TIMEOUT_SECS: u64 = 600;
const USER_AGENT: &str = concat!("dimorphism-site/", env!("CARGO_PKG_VERSION"));

pub fn build_client() -> BuildResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|source| BuildError::Http {
            url: "<client>".to_string(),
            source,
        })
}

/// Send the request and fail on any non-success status.
pub async fn send(url: &str, request: RequestBuilder) -> BuildResult<Response> {
    let resp = request.send().await.map_err(|source| BuildError::Http {
        url: url.to_string(),
        source,
    })?;
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(BuildError::HttpStatus {
            url: url.to_string(),
            status,
            body: body.chars().take(500).collect(),
        });
    }
    Ok(resp)
}

pub async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> BuildResult<T> {
    let resp = send(url, client.get(url)).await?;
    resp.json().await.map_err(|source| BuildError::Http {
        url: url.to_string(),
        source,
    })
}

pub async fn get_bytes(client: &Client, url: &str) -> BuildResult<Vec<u8>> {
    let resp = send(url, client.get(url)).await?;
    let bytes = resp.bytes().await.map_err(|source| BuildError::Http {
        url: url.to_string(),
        source,
    })?;
    Ok(bytes.to_vec())
}
