/// Network-backed tools: TLS probe, security-header scan and the combined
/// website scan. Every outbound call is bounded by the probe timeout.
use crate::error::{ApiError, ApiResult};
use reqwest::{header::HeaderMap, Client};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use tracing::debug;
use url::Url;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const SUSPICIOUS_TLDS: [&str; 4] = [".tk", ".ml", ".ga", ".cf"];

/// (header, weight, label)
const SECURITY_HEADERS: [(&str, u32, &str); 7] = [
    ("strict-transport-security", 20, "HSTS"),
    ("content-security-policy", 25, "CSP"),
    ("x-frame-options", 15, "X-Frame-Options"),
    ("x-content-type-options", 10, "X-Content-Type-Options"),
    ("referrer-policy", 10, "Referrer Policy"),
    ("permissions-policy", 10, "Permissions Policy"),
    ("x-xss-protection", 10, "XSS Protection"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslReport {
    pub domain: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadersReport {
    pub url: String,
    pub score: u32,
    pub headers: BTreeMap<String, String>,
    pub missing: Vec<String>,
    pub present: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reputation {
    pub reputation: String,
    pub risk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteReport {
    pub url: String,
    pub ssl: SslReport,
    pub headers: HeadersReport,
    pub reputation: Reputation,
    pub vulnerabilities: Vec<String>,
    pub score: u32,
    pub recommendations: Vec<String>,
}

/// HTTP prober shared by the network tools
#[derive(Clone)]
pub struct WebInspector {
    http_client: Client,
}

impl WebInspector {
    pub fn new() -> ApiResult<Self> {
        let http_client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .connect_timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    /// Complete a verified TLS handshake with the domain; never errors
    pub async fn check_ssl(&self, domain: &str) -> SslReport {
        let target = format!("https://{}/", domain);
        debug!(domain, "Probing TLS");

        match self.http_client.get(&target).send().await {
            Ok(response) => SslReport {
                domain: domain.to_string(),
                valid: true,
                status: Some(response.status().as_u16()),
                error: None,
                score: 100,
            },
            Err(e) => SslReport {
                domain: domain.to_string(),
                valid: false,
                status: None,
                error: Some(if e.is_timeout() {
                    "Connection timeout".to_string()
                } else {
                    e.to_string()
                }),
                score: 0,
            },
        }
    }

    /// HEAD the URL and weigh the security headers it returns
    pub async fn check_headers(&self, url: &str) -> ApiResult<HeadersReport> {
        let target = parse_web_url(url)?;
        let response = self
            .http_client
            .head(target.as_str())
            .send()
            .await
            .map_err(|e| ApiError::ToolFailure(format!("Security headers analysis failed: {}", e)))?;

        Ok(score_headers(url, response.headers()))
    }

    pub async fn scan_website(&self, url: &str) -> ApiResult<WebsiteReport> {
        let target = parse_web_url(url)?;
        let host = target
            .host_str()
            .ok_or_else(|| ApiError::Validation("URL has no host".to_string()))?
            .to_string();

        let (ssl, headers) = tokio::join!(self.check_ssl(&host), self.check_headers(url));
        let headers = headers?;
        let reputation = domain_reputation(&host);

        let mut score = 0;
        if ssl.valid {
            score += 30;
        }
        score += headers.score.min(40);
        if reputation.reputation == "Good" {
            score += 30;
        }

        let mut recommendations = Vec::new();
        if !ssl.valid {
            recommendations.push("Implement valid SSL certificate".to_string());
        }
        if !headers.missing.is_empty() {
            recommendations.push("Add missing security headers".to_string());
        }
        if reputation.reputation == "Poor" {
            recommendations.push("Consider domain reputation improvement".to_string());
        }

        Ok(WebsiteReport {
            url: url.to_string(),
            ssl,
            headers,
            reputation,
            vulnerabilities: Vec::new(),
            score: score.min(100),
            recommendations,
        })
    }
}

fn parse_web_url(raw: &str) -> ApiResult<Url> {
    let url = Url::parse(raw).map_err(|e| ApiError::Validation(format!("Invalid URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ApiError::Validation(format!("Unsupported URL scheme: {}", other))),
    }
}

/// Accept a bare hostname or a URL and return the hostname
pub fn normalize_domain(raw: &str) -> ApiResult<String> {
    let trimmed = raw.trim();
    if let Ok(url) = Url::parse(trimmed) {
        if let Some(host) = url.host_str() {
            return Ok(host.to_string());
        }
    }

    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid {
        return Err(ApiError::Validation(format!("Invalid domain: {}", raw)));
    }
    Ok(trimmed.to_lowercase())
}

pub fn score_headers(url: &str, headers: &HeaderMap) -> HeadersReport {
    let mut report = HeadersReport {
        url: url.to_string(),
        score: 0,
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        missing: Vec::new(),
        present: Vec::new(),
        recommendations: Vec::new(),
    };

    for (name, weight, label) in SECURITY_HEADERS {
        if headers.contains_key(name) {
            report.score += weight;
            report.present.push(label.to_string());
        } else {
            report.missing.push(label.to_string());
            report.recommendations.push(format!("Implement {} header", label));
        }
    }

    report
}

pub fn domain_reputation(host: &str) -> Reputation {
    let suspicious = SUSPICIOUS_TLDS.iter().any(|tld| host.ends_with(tld));
    Reputation {
        reputation: if suspicious { "Poor" } else { "Good" }.to_string(),
        risk: if suspicious { "High" } else { "Low" }.to_string(),
    }
}
