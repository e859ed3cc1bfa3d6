//! Generative routing advisor.
//!
//! The advisor's text output is untrusted: it may be prose, fenced JSON,
//! truncated, or simply wrong. Everything it returns passes through
//! [`AdvisorResult`] and is range-checked before use.

pub mod gemini;
pub mod prompt;
pub mod response;

pub use gemini::GeminiClient;
pub use response::{ReoptimizationAdvice, SynthesisAdvice};

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::error::AdvisorFailure;

/// Single-call text generation.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Outcome of asking the advisor anything.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisorResult<T> {
    Verified(T),
    Unusable(AdvisorFailure),
}

impl<T> AdvisorResult<T> {
    pub fn verified(self) -> Option<T> {
        match self {
            AdvisorResult::Verified(data) => Some(data),
            AdvisorResult::Unusable(_) => None,
        }
    }
}

/// Calls the advisor with a hard timeout. The timer is dropped as soon as the
/// call settles.
pub async fn ask(
    advisor: &dyn Advisor,
    prompt: &str,
    timeout: Duration,
) -> std::result::Result<String, AdvisorFailure> {
    match tokio::time::timeout(timeout, advisor.generate(prompt)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(AdvisorFailure::Transport(e.to_string())),
        Err(_) => Err(AdvisorFailure::Timeout(timeout)),
    }
}

/// Asks for a route ordering and validates it against `stop_count`.
#[tracing::instrument(skip(advisor, prompt))]
pub async fn advise_synthesis(
    advisor: &dyn Advisor,
    prompt: &str,
    stop_count: usize,
    timeout: Duration,
) -> AdvisorResult<SynthesisAdvice> {
    let result = match ask(advisor, prompt, timeout).await {
        Ok(text) => response::parse_synthesis(&text, stop_count),
        Err(failure) => AdvisorResult::Unusable(failure),
    };
    if let AdvisorResult::Unusable(failure) = &result {
        warn!(error = %failure, "Route advisor unusable, falling back");
    }
    result
}

/// Asks whether a live route should be recomputed.
#[tracing::instrument(skip(advisor, prompt))]
pub async fn advise_reoptimization(
    advisor: &dyn Advisor,
    prompt: &str,
    timeout: Duration,
) -> AdvisorResult<ReoptimizationAdvice> {
    let result = match ask(advisor, prompt, timeout).await {
        Ok(text) => response::parse_reoptimization(&text),
        Err(failure) => AdvisorResult::Unusable(failure),
    };
    if let AdvisorResult::Unusable(failure) = &result {
        warn!(error = %failure, "Re-optimization advisor unusable");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Slow;

    #[async_trait]
    impl Advisor for Slow {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("{}".to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl Advisor for Broken {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(anyhow!("quota exceeded"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ask_times_out() {
        let result = ask(&Slow, "p", Duration::from_secs(10)).await;
        assert_eq!(result, Err(AdvisorFailure::Timeout(Duration::from_secs(10))));
    }

    #[tokio::test]
    async fn test_transport_error_is_unusable() {
        let result = advise_synthesis(&Broken, "p", 2, Duration::from_secs(10)).await;
        assert!(matches!(
            result,
            AdvisorResult::Unusable(AdvisorFailure::Transport(_))
        ));
    }
}
