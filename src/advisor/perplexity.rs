/// Search-augmented guidance over the Perplexity chat completions API
use crate::{
    advisor::{Guidance, GuidanceProvider, TokenUsage, GUIDANCE_SYSTEM_PROMPT},
    config::AdvisorConfig,
    error::{ApiError, ApiResult},
    metrics,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const DEMO_CONTENT: &str =
    "This is a demo response. Please add your Perplexity API key for real-time threat intelligence.";
const DEMO_CITATION: &str = "https://example.com/cybersecurity-research";

pub struct PerplexityClient {
    http_client: Client,
    api_key: Option<String>,
    url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

impl PerplexityClient {
    pub fn new(config: &AdvisorConfig) -> ApiResult<Self> {
        if config.perplexity_api_key.is_none() {
            warn!("PERPLEXITY_API_KEY not set - guidance will use demo responses");
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key: config.perplexity_api_key.clone(),
            url: config.perplexity_url.clone(),
            model: config.perplexity_model.clone(),
        })
    }

    fn demo(&self) -> Guidance {
        Guidance {
            content: DEMO_CONTENT.to_string(),
            citations: vec![DEMO_CITATION.to_string()],
            model: self.model.clone(),
            usage: TokenUsage {
                prompt_tokens: 50,
                completion_tokens: 100,
                total_tokens: 150,
            },
            demo: true,
        }
    }

    async fn query(&self, api_key: &str, question: &str) -> ApiResult<Guidance> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": GUIDANCE_SYSTEM_PROMPT },
                { "role": "user", "content": question },
            ],
            "temperature": 0.2,
            "top_p": 0.9,
            "max_tokens": 1000,
            "return_related_questions": false,
            "search_recency_filter": "month",
            "stream": false,
        });

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Perplexity request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Upstream(format!(
                "Perplexity API error {}: {}",
                status, error_body
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Invalid Perplexity response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ApiError::Upstream("Perplexity returned no choices".to_string()))?;

        Ok(Guidance {
            content,
            citations: completion.citations,
            model: completion.model.unwrap_or_else(|| self.model.clone()),
            usage: completion.usage,
            demo: false,
        })
    }
}

#[async_trait]
impl GuidanceProvider for PerplexityClient {
    async fn guidance(&self, question: &str) -> ApiResult<Guidance> {
        let Some(api_key) = &self.api_key else {
            return Ok(self.demo());
        };

        let started = Instant::now();
        let result = self.query(api_key, question).await;
        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_upstream_call("perplexity", result.is_ok(), elapsed);

        match &result {
            Ok(guidance) => debug!(
                model = %guidance.model,
                citations = guidance.citations.len(),
                elapsed_secs = elapsed,
                "Guidance fetched"
            ),
            Err(e) => error!(error = %e, "Guidance request failed"),
        }

        result
    }
}
