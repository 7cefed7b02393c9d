//! Frequency-ranked keywords from positive and negative reviews.
use std::collections::HashMap;

use crate::api::Review;

const MIN_TOKEN_CHARS: usize = 2;
const MAX_TOKEN_CHARS: usize = 6;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReviewKeywords {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

impl ReviewKeywords {
    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

fn is_token_char(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7A3}') || c.is_ascii_alphanumeric() || c.is_whitespace()
}

/// Splits review text into Hangul/ASCII-alphanumeric words of 2 to 6
/// characters. Any other character acts as a separator.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| if is_token_char(c) { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|word| (MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS).contains(&word.chars().count()))
        .map(str::to_string)
        .collect()
}

/// Top `top` words from reviews rated 4+ and from reviews rated 2 or less.
pub fn extract_keywords<'a>(
    reviews: impl IntoIterator<Item = &'a Review>,
    top: usize,
) -> ReviewKeywords {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for review in reviews {
        let pool = if review.rating >= 4.0 {
            &mut positive
        } else if review.rating <= 2.0 {
            &mut negative
        } else {
            continue;
        };
        pool.extend(tokenize(&review.content));
    }
    ReviewKeywords {
        positive: rank(positive, top),
        negative: rank(negative, top),
    }
}

/// Descending frequency; ties keep first-seen order.
fn rank(words: Vec<String>, top: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (seen, word) in words.into_iter().enumerate() {
        counts.entry(word).or_insert((0, seen)).0 += 1;
    }
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|(_, (a_count, a_seen)), (_, (b_count, b_seen))| {
        b_count.cmp(a_count).then(a_seen.cmp(b_seen))
    });
    ranked.into_iter().take(top).map(|(word, _)| word).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: f64, content: &str) -> Review {
        Review {
            rating,
            content: content.to_string(),
            ..Review::default()
        }
    }

    #[test]
    fn tokenize_strips_punctuation_and_filters_length() {
        assert_eq!(
            tokenize("맛있어요!! 소스가,최고 a 가 abcdefg 2인분"),
            vec!["맛있어요", "소스가", "최고", "2인분"]
        );
        assert!(tokenize("!!! ...").is_empty());
    }

    #[test]
    fn ranks_by_frequency_with_first_seen_ties() {
        let reviews = vec![
            review(5.0, "소스가 맛있게 제육"),
            review(4.0, "맛있게 가격 소스가"),
            review(3.0, "보통 보통 보통"),
            review(1.0, "냄새가 상한 냄새가"),
            review(2.0, "상한"),
        ];
        let keywords = extract_keywords(&reviews, 6);
        assert_eq!(keywords.positive, vec!["소스가", "맛있게", "제육", "가격"]);
        assert_eq!(keywords.negative, vec!["냄새가", "상한"]);
        assert!(!keywords.positive.contains(&"보통".to_string()));
    }

    #[test]
    fn top_truncates_and_empty_input_is_empty() {
        let reviews = vec![review(5.0, "aa bb cc dd")];
        assert_eq!(extract_keywords(&reviews, 2).positive, vec!["aa", "bb"]);
        assert!(extract_keywords(&Vec::<Review>::new(), 6).is_empty());
    }
}
