/// URL phishing heuristic
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use url::Url;

const SHORTENERS: [&str; 3] = ["bit.ly", "tinyurl", "t.co"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhishingAnalysis {
    pub url: String,
    pub risk_level: String,
    pub score: i32,
    pub indicators: Vec<String>,
    pub recommendations: Vec<String>,
}

pub fn analyze(raw: &str) -> ApiResult<PhishingAnalysis> {
    let parsed = Url::parse(raw).map_err(|e| ApiError::Validation(format!("Invalid URL: {}", e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ApiError::Validation("URL has no host".to_string()))?;

    let lowered = raw.to_lowercase();
    let mut score = 100;
    let mut indicators = Vec::new();

    let checks: [(bool, i32, &str); 4] = [
        (
            SHORTENERS.iter().any(|s| lowered.contains(s)),
            10,
            "URL shortener detected",
        ),
        (contains_ipv4(raw), 20, "IP address instead of domain"),
        (raw.contains('-'), 5, "Multiple hyphens in domain"),
        (raw.chars().any(|c| c.is_ascii_digit()), 2, "Numbers in domain"),
    ];
    for (hit, penalty, reason) in checks {
        if hit {
            score -= penalty;
            indicators.push(reason.to_string());
        }
    }

    if host.len() > 30 {
        score -= 15;
        indicators.push("Unusually long domain name".to_string());
    }

    let risk_level = match score {
        80.. => "Low",
        60..=79 => "Medium",
        40..=59 => "High",
        _ => "Very High",
    };

    let recommendations = if score < 80 {
        vec![
            "Exercise caution when visiting this URL".to_string(),
            "Verify the URL with the legitimate website".to_string(),
            "Check for HTTPS and valid SSL certificate".to_string(),
        ]
    } else {
        Vec::new()
    };

    Ok(PhishingAnalysis {
        url: raw.to_string(),
        risk_level: risk_level.to_string(),
        score,
        indicators,
        recommendations,
    })
}

/// Any dotted quad of 1-3 digit groups anywhere in the text
fn contains_ipv4(text: &str) -> bool {
    let bytes = text.as_bytes();
    (0..bytes.len()).any(|start| {
        let mut pos = start;
        for group in 0..4 {
            let digits = bytes[pos..].iter().take(3).take_while(|b| b.is_ascii_digit()).count();
            if digits == 0 {
                return false;
            }
            pos += digits;
            if group < 3 {
                if bytes.get(pos) != Some(&b'.') {
                    return false;
                }
                pos += 1;
            }
        }
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_domain_is_low_risk() {
        let analysis = analyze("https://example.com/login").unwrap();
        assert_eq!(analysis.score, 100);
        assert_eq!(analysis.risk_level, "Low");
        assert!(analysis.indicators.is_empty());
        assert!(analysis.recommendations.is_empty());
    }

    #[test]
    fn test_ip_host_is_penalised() {
        let analysis = analyze("http://192.168.10.4/secure-login").unwrap();
        // ip -20, hyphen -5, digits -2
        assert_eq!(analysis.score, 73);
        assert_eq!(analysis.risk_level, "Medium");
        assert_eq!(analysis.recommendations.len(), 3);
    }

    #[test]
    fn test_long_shortened_host() {
        let analysis = analyze("https://bit.ly.account-verification-center-secure.example").unwrap();
        // shortener -10, hyphen -5, long host -15
        assert_eq!(analysis.score, 70);
        assert!(analysis.indicators.contains(&"Unusually long domain name".to_string()));
    }

    #[test]
    fn test_invalid_url_is_bad_request() {
        assert!(matches!(analyze("not a url"), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_contains_ipv4() {
        assert!(contains_ipv4("http://10.0.0.1/"));
        assert!(!contains_ipv4("http://10.0.1/"));
        assert!(!contains_ipv4("example.com"));
    }
}
