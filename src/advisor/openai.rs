/// General analysis over the OpenAI chat completions API
use crate::{
    advisor::{analysis_prompt, Analysis, AnalysisProvider, Guidance},
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

pub struct OpenAiClient {
    http_client: Client,
    api_key: Option<String>,
    url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &AdvisorConfig) -> ApiResult<Self> {
        if config.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not set - analysis will use demo responses");
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key: config.openai_api_key.clone(),
            url: config.openai_url.clone(),
            model: config.openai_model.clone(),
        })
    }

    fn demo(&self, question: &str) -> Analysis {
        let content = format!(
            "**Demo Mode - Professional Cybersecurity Analysis**

**Question:** {question}

**Expert Analysis:**
This is a demonstration of our AI-powered cybersecurity consultant. With API keys configured, you would receive:

1. **Technical Explanation**: Detailed breakdown of the security concept or threat
2. **Risk Assessment**: Professional evaluation of potential impacts and likelihood
3. **Actionable Recommendations**: Step-by-step security measures and best practices
4. **Implementation Guide**: Practical steps for deployment
5. **Compliance Considerations**: Relevant regulatory and framework guidance

**Next Steps**: Add your OpenAI and Perplexity API keys to unlock the full analysis."
        );

        Analysis {
            content,
            model: self.model.clone(),
            demo: true,
        }
    }

    async fn complete(&self, api_key: &str, prompt: String) -> ApiResult<Analysis> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.3,
            "max_tokens": 1500,
        });

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Upstream(format!("OpenAI API error {}: {}", status, error_body)));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Invalid OpenAI response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ApiError::Upstream("OpenAI returned an empty answer".to_string()))?;

        Ok(Analysis {
            content,
            model: completion.model.unwrap_or_else(|| self.model.clone()),
            demo: false,
        })
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiClient {
    async fn analyze(&self, question: &str, guidance: &Guidance) -> ApiResult<Analysis> {
        let Some(api_key) = &self.api_key else {
            return Ok(self.demo(question));
        };

        let started = Instant::now();
        let result = self.complete(api_key, analysis_prompt(question, guidance)).await;
        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_upstream_call("openai", result.is_ok(), elapsed);

        match &result {
            Ok(analysis) => debug!(model = %analysis.model, elapsed_secs = elapsed, "Analysis completed"),
            Err(e) => error!(error = %e, "Analysis request failed"),
        }

        result
    }
}
