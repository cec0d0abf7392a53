use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use newsflow_core::{normalize_text, Article, TrendMatch};
use serde::Serialize;
use tracing::{debug, info};

/// Dates and relative-day words that appear in trending queries without
/// saying anything about the topic.
pub const STOP_WORDS: &[&str] = &[
    "2023", "2024", "2025", "luni", "marti", "miercuri", "joi", "vineri", "sambata", "duminica",
    "ianuarie", "februarie", "martie", "aprilie", "mai", "iunie", "iulie", "august",
    "septembrie", "octombrie", "noiembrie", "decembrie", "zi", "an", "ani", "azi", "maine", "ieri",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Significant words appear in one sentence in keyword order.
    OrderedInSentence,
    /// Every significant word is a whole token somewhere in the article.
    #[default]
    UnorderedTokens,
}

impl FromStr for MatchPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordered" | "ordered_in_sentence" => Ok(Self::OrderedInSentence),
            "tokens" | "unordered" | "unordered_tokens" => Ok(Self::UnorderedTokens),
            other => bail!("unknown match policy `{other}` (expected `ordered` or `tokens`)"),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.strategy().name())
    }
}

impl MatchPolicy {
    pub fn strategy(self) -> &'static dyn MatchStrategy {
        match self {
            Self::OrderedInSentence => &OrderedInSentence,
            Self::UnorderedTokens => &UnorderedTokens,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// First matching article only.
    Single,
    /// First matching article as primary, every later match as related.
    #[default]
    Multi,
}

impl FromStr for MatchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multi" => Ok(Self::Multi),
            other => bail!("unknown match mode `{other}` (expected `single` or `multi`)"),
        }
    }
}

/// Normalized tokens longer than two characters, minus stop-words, in keyword order.
pub fn significant_words(keyword: &str) -> Vec<String> {
    normalize_text(keyword)
        .split_whitespace()
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Queries such as "a b c" made only of one- and two-letter words.
pub fn is_noise_keyword(keyword: &str) -> bool {
    let words: Vec<&str> = keyword.split_whitespace().collect();
    words.len() > 2 && words.iter().all(|w| w.chars().count() <= 2)
}

/// An article's text and intro, pre-normalized for both strategies.
#[derive(Debug)]
pub struct PreparedArticle<'a> {
    article: &'a Article,
    sentences: Vec<String>,
    tokens: HashSet<String>,
}

impl<'a> PreparedArticle<'a> {
    pub fn new(article: &'a Article) -> Self {
        let raw = format!("{} {}", article.text, article.intro);
        // Split before normalizing: normalization strips the terminators.
        let sentences = raw
            .split(['.', '!', '?'])
            .map(normalize_text)
            .filter(|s| !s.trim().is_empty())
            .collect();
        let tokens = normalize_text(&raw)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Self {
            article,
            sentences,
            tokens,
        }
    }

    pub fn article(&self) -> &'a Article {
        self.article
    }
}

pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `words` is never empty.
    fn matches(&self, words: &[String], article: &PreparedArticle<'_>) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct OrderedInSentence;

impl MatchStrategy for OrderedInSentence {
    fn name(&self) -> &'static str {
        "ordered"
    }

    fn matches(&self, words: &[String], article: &PreparedArticle<'_>) -> bool {
        article.sentences.iter().any(|sentence| {
            let mut from = 0;
            words.iter().all(|word| match sentence[from..].find(word.as_str()) {
                Some(offset) => {
                    from += offset;
                    true
                }
                None => false,
            })
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UnorderedTokens;

impl MatchStrategy for UnorderedTokens {
    fn name(&self) -> &'static str {
        "tokens"
    }

    fn matches(&self, words: &[String], article: &PreparedArticle<'_>) -> bool {
        words.iter().all(|word| article.tokens.contains(word))
    }
}

/// Correlates trending keywords with a corpus of articles. Corpus order is
/// significant: the first matching article becomes the primary.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendMatcher {
    policy: MatchPolicy,
    mode: MatchMode,
}

impl TrendMatcher {
    pub fn new(policy: MatchPolicy, mode: MatchMode) -> Self {
        Self { policy, mode }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn correlate(&self, keywords: &[String], corpus: &[Article]) -> Vec<TrendMatch> {
        let strategy = self.policy.strategy();
        let prepared: Vec<PreparedArticle<'_>> = corpus.iter().map(PreparedArticle::new).collect();
        let mut seen = HashSet::new();
        let mut matches = Vec::new();

        for keyword in keywords {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                continue;
            }
            if is_noise_keyword(keyword) {
                info!(keyword, "keyword ignored: every word is too short");
                continue;
            }
            let words = significant_words(keyword);
            if words.is_empty() {
                info!(keyword, "keyword ignored: no significant words");
                continue;
            }
            if !seen.insert(normalize_text(keyword)) {
                debug!(keyword, "duplicate keyword");
                continue;
            }

            let mut hits = prepared
                .iter()
                .filter(|article| strategy.matches(&words, article))
                .map(PreparedArticle::article);
            let Some(primary) = hits.next() else {
                info!(keyword, strategy = strategy.name(), "no article matched");
                continue;
            };
            let related: Vec<Article> = match self.mode {
                MatchMode::Single => Vec::new(),
                MatchMode::Multi => hits.cloned().collect(),
            };
            info!(keyword, primary = primary.id, related = related.len(), "keyword matched");
            matches.push(TrendMatch {
                keyword: keyword.to_string(),
                primary: primary.clone(),
                related,
            });
        }
        matches
    }
}
