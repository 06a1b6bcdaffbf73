/// Password strength heuristic
use serde::{Deserialize, Serialize};

const GUESSES_PER_SECOND: f64 = 1e9;
const COMMON_SEQUENCES: [&str; 4] = ["123", "abc", "qwe", "password"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordAnalysis {
    pub score: u32,
    pub strength: String,
    pub feedback: Vec<String>,
    pub entropy: f64,
    pub estimated_crack_time: String,
}

pub fn analyze(password: &str) -> PasswordAnalysis {
    let length = password.chars().count();
    let mut score = 0;
    let mut feedback = Vec::new();

    if length < 8 {
        feedback.push("Password should be at least 8 characters long".to_string());
    } else if length >= 12 {
        score += 20;
    } else {
        score += 10;
    }

    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());

    if has_lower {
        score += 10;
    }
    if has_upper {
        score += 10;
    }
    if has_digit {
        score += 10;
    }
    if has_symbol {
        score += 15;
    }

    if !has_triple_repeat(password) {
        score += 10;
    }
    let lowered = password.to_lowercase();
    if !COMMON_SEQUENCES.iter().any(|seq| lowered.contains(seq)) {
        score += 15;
    }

    let mut charset = 0u32;
    for (present, size) in [(has_lower, 26), (has_upper, 26), (has_digit, 10), (has_symbol, 32)] {
        if present {
            charset += size;
        }
    }
    let entropy = if charset == 0 {
        0.0
    } else {
        length as f64 * f64::from(charset).log2()
    };

    PasswordAnalysis {
        score,
        strength: strength_label(score).to_string(),
        feedback,
        entropy,
        estimated_crack_time: estimate_crack_time(entropy),
    }
}

fn has_triple_repeat(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

fn strength_label(score: u32) -> &'static str {
    match score {
        80.. => "Very Strong",
        60..=79 => "Strong",
        40..=59 => "Moderate",
        20..=39 => "Weak",
        _ => "Very Weak",
    }
}

/// Average time to brute force at a billion guesses per second
fn estimate_crack_time(entropy: f64) -> String {
    let seconds = 2f64.powf(entropy - 1.0) / GUESSES_PER_SECOND;

    if seconds < 60.0 {
        "Less than a minute".to_string()
    } else if seconds < 3_600.0 {
        format!("{} minutes", (seconds / 60.0).ceil())
    } else if seconds < 86_400.0 {
        format!("{} hours", (seconds / 3_600.0).ceil())
    } else if seconds < 31_536_000.0 {
        format!("{} days", (seconds / 86_400.0).ceil())
    } else {
        let years = (seconds / 31_536_000.0).ceil();
        if years < 1_000.0 {
            format!("{} years", years)
        } else {
            "Centuries".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_common_password_is_weak() {
        let analysis = analyze("abc123");
        // lower + digit + no triple repeat
        assert_eq!(analysis.score, 30);
        assert_eq!(analysis.strength, "Weak");
        assert_eq!(analysis.feedback.len(), 1);
        assert_eq!(analysis.estimated_crack_time, "Less than a minute");
    }

    #[test]
    fn test_long_mixed_password_is_very_strong() {
        let analysis = analyze("Tr0ub4dor&Horse!");
        assert_eq!(analysis.score, 90);
        assert_eq!(analysis.strength, "Very Strong");
        assert!(analysis.feedback.is_empty());
        assert!((analysis.entropy - 16.0 * 94f64.log2()).abs() < 1e-9);
        assert_eq!(analysis.estimated_crack_time, "Centuries");
    }

    #[test]
    fn test_repeats_and_sequences_cost_points() {
        let clean = analyze("zyxwvuts");
        let repeated = analyze("zzzwvuts");
        let sequence = analyze("password");
        assert_eq!(clean.score - repeated.score, 10);
        assert_eq!(clean.score - sequence.score, 15);
    }

    #[test]
    fn test_crack_time_bands() {
        assert_eq!(estimate_crack_time(10.0), "Less than a minute");
        // 2^40 / 1e9 ~ 1100s
        assert_eq!(estimate_crack_time(41.0), "19 minutes");
    }
}
