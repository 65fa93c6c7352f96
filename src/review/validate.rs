//! Content-quality gates for generated review text
//!
//! Three gates run in order: character-count range, banned-phrase scan, and
//! the lexicon-based tone score. The first failing gate rejects the draft;
//! nothing is persisted for a rejected draft. Character counts are by Unicode
//! code point, so multi-byte Hangul counts one per syllable.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::config::PromptSettings;

lazy_static! {
    /// Profanity and deceptive-offer language that disqualifies a draft
    static ref BANNED_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)씨발|병신|좆같").unwrap(),
        Regex::new(r"(?i)공짜").unwrap(),
        Regex::new(r"(?i)무료\s*증정").unwrap(),
        Regex::new(r"(?i)100%\s*환불").unwrap(),
        Regex::new(r"(?i)전액\s*환불").unwrap(),
        Regex::new(r"(?i)최저가\s*보장?").unwrap(),
    ];

    /// Word-ish tokens: ASCII alphanumerics and Hangul syllables
    static ref TOKEN_PATTERN: Regex = Regex::new(r"[a-z0-9가-힣]+").unwrap();
}

const POSITIVE_WORDS: &[&str] = &[
    "만족", "좋", "훌륭", "편리", "추천", "기분", "쓸만", "깔끔", "튼튼", "예쁘", "고급",
];

const NEGATIVE_WORDS: &[&str] = &[
    "불만", "별로", "싫", "불편", "문제", "최악", "짜증", "실망", "환불", "나쁘", "형편",
];

/// A content-quality gate rejection
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("review length {count} is outside the allowed range")]
    LengthOutOfRange { count: usize },

    #[error("review contains a banned phrase")]
    BannedPhrase,

    #[error("review tone score {score} is too low")]
    ToneScoreTooLow { score: f64 },
}

/// Measurements of a draft that passed every gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validated {
    pub tone_score: f64,
    pub char_count: usize,
}

/// Run all quality gates against a draft, in order
pub fn validate_review(text: &str, prompt: &PromptSettings) -> Result<Validated, ValidationError> {
    let char_count = text.chars().count();
    if char_count < prompt.min_length || char_count > prompt.max_length {
        return Err(ValidationError::LengthOutOfRange { count: char_count });
    }

    if BANNED_PATTERNS.iter().any(|pattern| pattern.is_match(text)) {
        return Err(ValidationError::BannedPhrase);
    }

    let tone_score = analyze_tone_score(text);
    if tone_score <= prompt.tone_score_threshold {
        return Err(ValidationError::ToneScoreTooLow { score: tone_score });
    }

    Ok(Validated {
        tone_score,
        char_count,
    })
}

/// Lexicon-based sentiment ratio in `[0, 1]`.
///
/// Each token counts for at most one lexicon, positive first. With Laplace
/// smoothing the score is `(positive + 1) / (positive + negative + 2)`,
/// rounded to two decimals; text with no sentiment tokens scores a neutral
/// `0.5`.
pub fn analyze_tone_score(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .collect();
    if tokens.is_empty() {
        return 0.5;
    }

    let mut positive = 0usize;
    let mut negative = 0usize;

    for token in &tokens {
        if POSITIVE_WORDS.iter().any(|word| token.contains(word)) {
            positive += 1;
        } else if NEGATIVE_WORDS.iter().any(|word| token.contains(word)) {
            negative += 1;
        }
    }

    if positive + negative == 0 {
        return 0.5;
    }

    let score = (positive + 1) as f64 / (positive + negative + 2) as f64;
    (score * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gates() -> PromptSettings {
        PromptSettings::default()
    }

    // 100-character positive review used as the passing baseline
    fn good_review() -> String {
        let base = "배송이 빨라서 원하는 날에 도착했고 품질도 만족스러워 인테리어에도 잘 어울려요 \
                    마감이 깔끔하고 재질이 튼튼해서 오래 쓸 수 있을 것 같아 주변에도 추천하고 싶은 제품입니다";
        let mut text = base.to_string();
        while text.chars().count() < 100 {
            text.push_str(" 좋아요");
        }
        text
    }

    #[test]
    fn test_passing_review() {
        let validated = validate_review(&good_review(), &gates()).unwrap();
        assert!(validated.tone_score > 0.4);
        assert!(validated.char_count >= 90);
    }

    #[test]
    fn test_length_counts_code_points_not_bytes() {
        // 90 Hangul syllables: 270 bytes but exactly at the minimum length
        let text = "좋".repeat(90);
        assert_eq!(text.len(), 270);

        let validated = validate_review(&text, &gates()).unwrap();
        assert_eq!(validated.char_count, 90);
    }

    #[test]
    fn test_too_short_rejected() {
        let result = validate_review("너무 짧은 후기", &gates());
        assert!(matches!(
            result,
            Err(ValidationError::LengthOutOfRange { count: 8 })
        ));
    }

    #[test]
    fn test_too_long_rejected() {
        let text = "좋".repeat(171);
        let result = validate_review(&text, &gates());
        assert!(matches!(
            result,
            Err(ValidationError::LengthOutOfRange { count: 171 })
        ));
    }

    #[test]
    fn test_banned_phrase_rejected() {
        let mut text = good_review();
        text.truncate(
            text.char_indices()
                .nth(95)
                .map(|(i, _)| i)
                .unwrap_or(text.len()),
        );
        text.push_str(" 최저가 보장!");

        assert_eq!(
            validate_review(&text, &gates()),
            Err(ValidationError::BannedPhrase)
        );
    }

    #[test]
    fn test_banned_phrase_with_whitespace_variant() {
        let mut text = "무난한 제품이었습니다 ".repeat(8);
        text.push_str("무료  증정 이벤트");
        let padded: String = text.chars().take(120).collect();

        assert_eq!(
            validate_review(&padded, &gates()),
            Err(ValidationError::BannedPhrase)
        );
    }

    #[test]
    fn test_negative_review_fails_tone_gate() {
        let mut text = "품질에 문제 가 많고 배송도 최악 이라 정말 실망 했습니다 짜증 나고 불편 해서 별로 였어요"
            .to_string();
        while text.chars().count() < 95 {
            text.push_str(" 나쁘다");
        }

        match validate_review(&text, &gates()) {
            Err(ValidationError::ToneScoreTooLow { score }) => assert!(score <= 0.4),
            other => panic!("expected tone rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_tone_score_neutral_without_sentiment() {
        assert_eq!(analyze_tone_score(""), 0.5);
        assert_eq!(analyze_tone_score("무난한 일반 제품 설명"), 0.5);
    }

    #[test]
    fn test_tone_score_smoothing() {
        // One positive, one negative token: (1 + 1) / (2 + 2) = 0.5
        assert_eq!(analyze_tone_score("품질은 만족 배송은 불만"), 0.5);

        // Two positives, no negative: (2 + 1) / (2 + 2) = 0.75
        assert_eq!(analyze_tone_score("만족 스럽고 깔끔 합니다"), 0.75);
    }

    #[test]
    fn test_token_counts_once_positive_first() {
        // "환불" is negative but "만족"-bearing tokens are positive; one of
        // each keeps the score at the 0.5 boundary
        let score = analyze_tone_score("환불 없이 만족");
        assert_eq!(score, 0.5);
    }
}
