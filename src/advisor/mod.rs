/// External AI collaborators
///
/// The guidance provider is a search-augmented LLM returning content plus
/// citations; the analysis provider is a general LLM that rewrites the
/// question and guidance into the final answer. Both fall back to clearly
/// labelled demo output when no API key is configured.

pub mod openai;
pub mod perplexity;

pub use openai::OpenAiClient;
pub use perplexity::PerplexityClient;

use crate::error::ApiResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token accounting reported by the guidance model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(alias = "prompt_tokens")]
    pub prompt_tokens: u64,
    #[serde(alias = "completion_tokens")]
    pub completion_tokens: u64,
    #[serde(alias = "total_tokens")]
    pub total_tokens: u64,
}

/// Research-backed answer to the raw question
#[derive(Debug, Clone, PartialEq)]
pub struct Guidance {
    pub content: String,
    pub citations: Vec<String>,
    pub model: String,
    pub usage: TokenUsage,
    /// Placeholder produced without an API key
    pub demo: bool,
}

/// Final answer shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub content: String,
    pub model: String,
    pub demo: bool,
}

#[async_trait]
pub trait GuidanceProvider: Send + Sync {
    async fn guidance(&self, question: &str) -> ApiResult<Guidance>;
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, question: &str, guidance: &Guidance) -> ApiResult<Analysis>;
}

pub(crate) const GUIDANCE_SYSTEM_PROMPT: &str = "You are an expert cybersecurity consultant with deep knowledge of:
- Threat analysis and vulnerability assessment
- Security architecture and best practices
- Incident response and digital forensics
- Compliance frameworks (SOC2, ISO27001, NIST, etc.)
- Security tools and technologies
- Risk management and security governance

Provide comprehensive, actionable cybersecurity guidance. Include:
1. Clear explanation of the security concept or issue
2. Best practices and recommendations
3. Potential risks and mitigation strategies
4. Relevant compliance considerations
5. References to current threat landscape when applicable

Be precise, professional, and focus on practical implementation.";

/// Prompt handed to the analysis model
pub(crate) fn analysis_prompt(question: &str, guidance: &Guidance) -> String {
    let context = if guidance.content.is_empty() {
        String::new()
    } else {
        let research = serde_json::json!({
            "content": guidance.content,
            "citations": guidance.citations,
            "model": guidance.model,
        });
        format!("Additional research context: {}", research)
    };

    format!(
        "You are a senior cybersecurity analyst. Analyze this cybersecurity question and provide expert guidance.

Question: {question}

{context}

Provide a comprehensive analysis including:
1. Technical explanation
2. Risk assessment
3. Actionable recommendations
4. Implementation steps
5. Best practices

Format your response in a clear, professional manner suitable for both technical and non-technical audiences."
    )
}
