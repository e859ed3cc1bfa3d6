//! Thin HTTP layer shared by the provider, advisor and relay clients.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Issues a GET and decodes a JSON body, treating non-2xx statuses as errors.
pub async fn get_json<C, T>(client: &C, url: &str) -> Result<T>
where
    C: HttpClient + ?Sized,
    T: DeserializeOwned,
{
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);
    let resp = client.execute(req).await?;
    decode(resp).await
}

/// POSTs `body` as JSON and decodes a JSON response.
pub async fn post_json<C, B, T>(client: &C, url: &str, body: &B) -> Result<T>
where
    C: HttpClient + ?Sized,
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let resp = client.execute(json_request(url, body)?).await?;
    decode(resp).await
}

/// POSTs `body` as JSON, ignoring the response body.
pub async fn post<C, B>(client: &C, url: &str, body: &B) -> Result<()>
where
    C: HttpClient + ?Sized,
    B: Serialize + ?Sized,
{
    let resp = client.execute(json_request(url, body)?).await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow!("request returned status {}: {}", status, body));
    }
    Ok(())
}

fn json_request<B: Serialize + ?Sized>(url: &str, body: &B) -> Result<reqwest::Request> {
    let mut req = reqwest::Request::new(reqwest::Method::POST, url.parse()?);
    req.headers_mut().insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    *req.body_mut() = Some(serde_json::to_vec(body)?.into());
    Ok(req)
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow!("request returned status {}: {}", status, body));
    }

    resp.json::<T>()
        .await
        .map_err(|e| anyhow!("failed to parse response: {}", e))
}
