//! Google Gemini `generateContent` client.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Advisor;
use crate::fetch::auth::ApiKey;
use crate::fetch::{BasicClient, HttpClient, post_json};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(anyhow!("model returned no text"));
        }
        Ok(text)
    }
}

pub struct GeminiClient<C> {
    client: C,
    url: String,
}

impl GeminiClient<ApiKey<BasicClient>> {
    /// Client authenticated with the `x-goog-api-key` header.
    ///
    /// The transport timeout is a backstop; synthesis applies its own shorter
    /// deadline around every call.
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        let inner = BasicClient::new(Duration::from_secs(30))?;
        Ok(Self::with_client(
            ApiKey::header(inner, "x-goog-api-key", api_key)?,
            model,
        ))
    }
}

impl<C: HttpClient> GeminiClient<C> {
    pub fn with_client(client: C, model: &str) -> Self {
        Self {
            client,
            url: format!("{BASE_URL}/{model}:generateContent"),
        }
    }
}

#[async_trait]
impl<C: HttpClient> Advisor for GeminiClient<C> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };
        let response: GenerateResponse = post_json(&self.client, &self.url, &request).await?;
        response.into_text()
    }
}
