//! Query intent classification
//!
//! Scores a free-text query against a declarative keyword table (Turkish
//! and English), applies conversation-continuity and client-hint bonuses,
//! and extracts structured parameters (columns, forecast horizon, segment
//! count) using the dataset schema.
//!
//! Text is case- and diacritic-folded before matching, so "KAPSAMLI",
//! "kapsamlı" and "kapsamli" are the same word.

use fuzzywuzzy::fuzz;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::dataset::Schema;
use crate::error::{Error, Result};
use crate::types::{Intent, Turn};

/// Keyword table: (intent, phrase, weight). A trailing `*` matches any
/// word suffix ("anomal*" covers "anomali", "anomalies", "anomaly").
const KEYWORDS: &[(Intent, &str, f64)] = &[
    // insights
    (Intent::Insights, "anomal*", 2.0),
    (Intent::Insights, "aykırı*", 2.0),
    (Intent::Insights, "outlier*", 2.0),
    (Intent::Insights, "olağandışı", 1.5),
    (Intent::Insights, "unusual", 1.5),
    (Intent::Insights, "kritik", 1.0),
    (Intent::Insights, "critical", 1.0),
    (Intent::Insights, "içgörü*", 1.0),
    (Intent::Insights, "insight*", 1.0),
    (Intent::Insights, "sapma*", 1.0),
    (Intent::Insights, "tespit*", 0.5),
    (Intent::Insights, "detect*", 0.5),
    // forecast
    (Intent::Forecast, "tahmin*", 2.0),
    (Intent::Forecast, "forecast*", 2.0),
    (Intent::Forecast, "predict*", 2.0),
    (Intent::Forecast, "trend*", 1.5),
    (Intent::Forecast, "gelecek", 1.5),
    (Intent::Forecast, "öngörü*", 1.5),
    (Intent::Forecast, "projeksiyon*", 1.5),
    (Intent::Forecast, "projection*", 1.5),
    (Intent::Forecast, "önümüzdeki", 1.0),
    (Intent::Forecast, "future", 1.0),
    (Intent::Forecast, "next", 0.5),
    // recommendations
    (Intent::Recommendations, "öneri*", 2.0),
    (Intent::Recommendations, "tavsiye*", 2.0),
    (Intent::Recommendations, "recommend*", 2.0),
    (Intent::Recommendations, "aksiyon*", 1.5),
    (Intent::Recommendations, "suggest*", 1.5),
    (Intent::Recommendations, "advice", 1.5),
    (Intent::Recommendations, "ne yapmal*", 1.5),
    (Intent::Recommendations, "what should", 1.5),
    (Intent::Recommendations, "action*", 1.0),
    (Intent::Recommendations, "strateji*", 1.0),
    (Intent::Recommendations, "strategy", 1.0),
    // comprehensive
    (Intent::Comprehensive, "kapsamlı", 2.0),
    (Intent::Comprehensive, "comprehensive", 2.0),
    (Intent::Comprehensive, "rapor*", 1.5),
    (Intent::Comprehensive, "report*", 1.5),
    (Intent::Comprehensive, "genel bakış", 1.5),
    (Intent::Comprehensive, "overview", 1.5),
    (Intent::Comprehensive, "full analysis", 1.5),
    (Intent::Comprehensive, "özet*", 1.0),
    (Intent::Comprehensive, "summar*", 1.0),
    (Intent::Comprehensive, "segment*", 1.0),
    (Intent::Comprehensive, "küme*", 1.0),
    (Intent::Comprehensive, "cluster*", 1.0),
    // qa
    (Intent::Qa, "nedir", 1.5),
    (Intent::Qa, "kaç", 1.5),
    (Intent::Qa, "ne kadar", 1.5),
    (Intent::Qa, "ortalama*", 1.5),
    (Intent::Qa, "what is", 1.5),
    (Intent::Qa, "how many", 1.5),
    (Intent::Qa, "how much", 1.5),
    (Intent::Qa, "average", 1.5),
    (Intent::Qa, "toplam*", 1.0),
    (Intent::Qa, "total", 1.0),
    (Intent::Qa, "mean", 1.0),
    (Intent::Qa, "median", 1.0),
    (Intent::Qa, "medyan", 1.0),
    (Intent::Qa, "maksimum", 1.0),
    (Intent::Qa, "minimum", 1.0),
];

/// Units that mark a number as a forecast horizon ("6 ay", "3 periods")
const HORIZON_PATTERN: &str = concat!(
    r"\b(\d+)\s*(?:",
    r"ay|aya|ayda|ayi|ayin|aylik|aylar|aylari|aylarda|",
    r"yil|yila|yilda|yili|yilin|yillik|yillar|yillari|",
    r"donem|donemde|donemi|donemlik|donemler|donemleri|",
    r"adim|adimda|adimi|adimlik|adimlar|",
    r"ceyrek|ceyrekte|ceyrekler|ceyrekleri|",
    r"hafta|haftada|haftayi|haftalik|haftalar|haftalari|",
    r"gun|gunde|gunu|gunluk|gunler|gunleri|",
    r"periods?|months?|years?|steps?|quarters?|weeks?|days?",
    r")\b",
);

/// Words that mark a number as a segment count ("4 küme", "3 clusters")
const SEGMENT_PATTERN: &str = r"(\d+)\s*(?:segment|cluster|kume|grup|group|cohort)\w*";

/// Explicit column references: `col`, "col" or “col”
const QUOTED_PATTERN: &str = r#"`([^`]+)`|"([^"]+)"|“([^”]+)”"#;

/// Minimum fuzzy ratio for a column suggestion
const SUGGESTION_MIN_RATIO: u8 = 50;

/// Parameters extracted from the query text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Schema columns mentioned in the query, in order of appearance
    pub columns: Vec<String>,
    /// Requested forecast horizon
    pub horizon: Option<usize>,
    /// Requested segment count
    pub segments: Option<usize>,
}

/// Result of classifying one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Intent to serve (comprehensive when ambiguous)
    pub intent: Intent,
    pub confidence: f64,
    /// No intent reached the minimum confidence
    pub ambiguous: bool,
    /// Every intent, best first
    pub ranked: Vec<(Intent, f64)>,
    pub params: QueryParams,
}

struct KeywordRule {
    intent: Intent,
    pattern: Regex,
    weight: f64,
}

/// Keyword-table intent classifier
pub struct IntentClassifier {
    config: ClassifierConfig,
    rules: Vec<KeywordRule>,
    horizon: Regex,
    segments: Regex,
    quoted: Regex,
}

impl IntentClassifier {
    /// Compile the keyword table
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let rules = KEYWORDS
            .iter()
            .map(|&(intent, phrase, weight)| {
                Ok(KeywordRule {
                    intent,
                    pattern: Regex::new(&phrase_pattern(phrase))?,
                    weight,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            rules,
            horizon: Regex::new(HORIZON_PATTERN)?,
            segments: Regex::new(SEGMENT_PATTERN)?,
            quoted: Regex::new(QUOTED_PATTERN)?,
        })
    }

    /// Classify a query given prior turns and the dataset schema
    pub fn classify(&self, query: &str, history: &[Turn], schema: &Schema) -> Result<Classification> {
        self.classify_with_hint(query, history, schema, None)
    }

    /// Classify with an optional client-side hint; the hint only adds a bonus
    pub fn classify_with_hint(
        &self,
        query: &str,
        history: &[Turn],
        schema: &Schema,
        hint: Option<Intent>,
    ) -> Result<Classification> {
        let folded = fold(query);
        let params = self.extract_params(query, &folded, schema)?;

        let mut evidence = vec![0.0_f64; Intent::ALL.len()];
        for rule in &self.rules {
            if rule.pattern.is_match(&folded) {
                evidence[slot(rule.intent)] += rule.weight;
            }
        }

        let saturation = self.config.saturation;
        let mut confidences: Vec<(Intent, f64)> = Intent::ALL
            .iter()
            .map(|&intent| {
                let w = evidence[slot(intent)];
                (intent, w / (w + saturation))
            })
            .collect();

        let word_count = query.split_whitespace().count();
        if let Some(last) = history.last() {
            if word_count <= self.config.follow_up_max_words {
                bump(&mut confidences, last.intent, self.config.continuity_bonus);
            }
        }
        if let Some(hint) = hint {
            bump(&mut confidences, hint, self.config.hint_bonus);
        }

        let recency = |intent: Intent| history.iter().rposition(|t| t.intent == intent);
        confidences.sort_by(|(a, ca), (b, cb)| {
            cb.total_cmp(ca)
                .then_with(|| recency(*b).cmp(&recency(*a)))
                .then_with(|| b.priority().cmp(&a.priority()))
        });

        let (best, best_confidence) = confidences[0];
        let ambiguous = best_confidence < self.config.min_confidence;
        let intent = if ambiguous { Intent::Comprehensive } else { best };

        tracing::debug!(
            intent = %intent,
            confidence = best_confidence,
            ambiguous,
            "Query classified"
        );

        Ok(Classification {
            intent,
            confidence: best_confidence,
            ambiguous,
            ranked: confidences,
            params,
        })
    }

    fn extract_params(&self, query: &str, folded: &str, schema: &Schema) -> Result<QueryParams> {
        let mut columns = mentioned_columns(folded, schema);

        for caps in self.quoted.captures_iter(query) {
            let Some(text) = caps.iter().skip(1).flatten().next().map(|m| m.as_str()) else {
                continue;
            };
            match resolve_column(text, schema) {
                Some(name) => {
                    if !columns.iter().any(|c| c == name) {
                        columns.push(name.to_string());
                    }
                }
                None => {
                    return Err(Error::UnknownColumn {
                        column: text.to_string(),
                        suggestion: suggest_column(text, schema),
                    });
                }
            }
        }

        Ok(QueryParams {
            columns,
            horizon: first_count(&self.horizon, folded),
            segments: first_count(&self.segments, folded),
        })
    }
}

fn slot(intent: Intent) -> usize {
    Intent::ALL
        .iter()
        .position(|&i| i == intent)
        .unwrap_or_default()
}

fn bump(confidences: &mut [(Intent, f64)], intent: Intent, bonus: f64) {
    if let Some((_, c)) = confidences.iter_mut().find(|(i, _)| *i == intent) {
        *c = (*c + bonus).min(1.0);
    }
}

/// Lowercase and strip Turkish diacritics
pub fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|&c| c != '\u{307}')
        .map(|c| match c {
            'ı' => 'i',
            'ş' => 's',
            'ğ' => 'g',
            'ü' => 'u',
            'ö' => 'o',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Word-boundary regex for a keyword phrase
fn phrase_pattern(phrase: &str) -> String {
    let folded = fold(phrase);
    let (stem, open_ended) = match folded.strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (folded.as_str(), false),
    };
    let body = regex::escape(stem).replace(' ', r"\s+");
    if open_ended {
        format!(r"\b{}\w*", body)
    } else {
        format!(r"\b{}\b", body)
    }
}

/// First positive count captured by `pattern`
fn first_count(pattern: &Regex, folded: &str) -> Option<usize> {
    pattern
        .captures_iter(folded)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
        .find(|&n| n > 0)
}

/// Schema columns named in the query, longest names claimed first
fn mentioned_columns(folded: &str, schema: &Schema) -> Vec<String> {
    let mut names: Vec<&str> = schema.names().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut found: Vec<(usize, String)> = Vec::new();

    for name in names {
        let needle = fold(name);
        let spaced = needle.replace('_', " ");
        let hit = find_word(folded, &needle, &claimed)
            .or_else(|| find_word(folded, &spaced, &claimed));
        if let Some(span) = hit {
            claimed.push(span);
            found.push((span.0, name.to_string()));
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, name)| name).collect()
}

/// First whole-word occurrence of `needle` not overlapping a claimed span
fn find_word(haystack: &str, needle: &str, claimed: &[(usize, usize)]) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    haystack.match_indices(needle).find_map(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));
        let free = claimed.iter().all(|&(s, e)| end <= s || start >= e);
        (before_ok && after_ok && free).then_some((start, end))
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn resolve_column<'a>(text: &str, schema: &'a Schema) -> Option<&'a str> {
    let wanted = fold(text.trim());
    schema.names().find(|name| fold(name) == wanted)
}

/// Closest schema column by fuzzy ratio
fn suggest_column(text: &str, schema: &Schema) -> Option<String> {
    let wanted = fold(text.trim());
    let mut best: Option<(&str, u8)> = None;
    for name in schema.names() {
        let ratio = fuzz::ratio(&wanted, &fold(name));
        if ratio >= SUGGESTION_MIN_RATIO && best.map_or(true, |(_, r)| ratio > r) {
            best = Some((name, ratio));
        }
    }
    best.map(|(name, _)| name.to_string())
}
