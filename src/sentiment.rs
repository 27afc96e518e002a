//! Text cleaning and lexicon-based polarity scoring
//!
//! Everything here is a pure function of its input: the lexicon and the
//! regexes are built once and only read afterwards, so scoring can run on
//! any number of tasks at the same time.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::data::{EnrichedRecord, RawRecord};

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z][a-z0-9+.-]*://\S+|\bwww\.\S+").expect("valid url regex")
});

static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\w+").expect("valid mention regex"));

static LEXICON: Lazy<Lexicon> = Lazy::new(Lexicon::new);

/// Factor applied to a polar word that follows a negator
const NEGATION_FACTOR: f64 = -0.5;

/// Strips mentions, URLs and punctuation from a post
///
/// Word order is preserved and runs of whitespace collapse to one space.
/// `clean(&clean(x)) == clean(x)` for every input.
pub fn clean(text: &str) -> String {
    let no_urls = URL_RE.replace_all(text, " ");
    let no_mentions = MENTION_RE.replace_all(&no_urls, " ");
    let alnum: String = no_mentions
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    alnum.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Polarity of a post in [-1.0, 1.0], 0.0 being neutral
///
/// Text that is empty after cleaning scores 0.0.
pub fn score(text: &str) -> f64 {
    LEXICON.polarity(&clean(text))
}

/// Turns a fetched post into a sentiment-scored row
pub fn enrich(raw: RawRecord) -> EnrichedRecord {
    let sentiment = score(&raw.text);
    EnrichedRecord {
        id: raw.id,
        length: raw.text.chars().count(),
        text: raw.text,
        created_at: raw.created_at,
        source: raw.source,
        likes: raw.likes,
        sentiment,
    }
}

/// Enriches a whole fetch batch, keeping its order
pub fn enrich_batch(raws: Vec<RawRecord>) -> Vec<EnrichedRecord> {
    raws.into_iter().map(enrich).collect()
}

/// General-purpose polarity lexicon with negators and intensifiers
struct Lexicon {
    words: HashMap<&'static str, f64>,
    negations: &'static [&'static str],
    intensifiers: HashMap<&'static str, f64>,
}

impl Lexicon {
    fn new() -> Self {
        let words: HashMap<&'static str, f64> = [
            // Positive
            ("good", 0.7),
            ("great", 0.8),
            ("excellent", 1.0),
            ("amazing", 0.6),
            ("awesome", 1.0),
            ("best", 1.0),
            ("better", 0.5),
            ("love", 0.5),
            ("loved", 0.7),
            ("lovely", 0.5),
            ("like", 0.2),
            ("nice", 0.6),
            ("happy", 0.8),
            ("glad", 0.5),
            ("thanks", 0.2),
            ("thank", 0.2),
            ("helpful", 0.5),
            ("fast", 0.2),
            ("easy", 0.4),
            ("fantastic", 0.4),
            ("wonderful", 1.0),
            ("perfect", 1.0),
            ("beautiful", 0.85),
            ("fun", 0.3),
            ("recommend", 0.4),
            ("enjoy", 0.4),
            ("enjoyed", 0.4),
            ("pleased", 0.5),
            ("impressive", 1.0),
            ("reliable", 0.4),
            ("friendly", 0.4),
            ("win", 0.8),
            ("exciting", 0.3),
            ("welcome", 0.8),
            ("resolved", 0.3),
            // Negative
            ("bad", -0.7),
            ("worse", -0.4),
            ("worst", -1.0),
            ("terrible", -1.0),
            ("awful", -1.0),
            ("horrible", -1.0),
            ("hate", -0.8),
            ("poor", -0.4),
            ("slow", -0.3),
            ("broken", -0.4),
            ("angry", -0.5),
            ("sad", -0.5),
            ("disappointed", -0.75),
            ("disappointing", -0.6),
            ("annoying", -0.8),
            ("useless", -0.5),
            ("wrong", -0.5),
            ("fail", -0.5),
            ("failed", -0.5),
            ("problem", -0.4),
            ("issue", -0.2),
            ("delay", -0.3),
            ("delayed", -0.3),
            ("rude", -0.3),
            ("never", -0.1),
            ("scam", -0.9),
            ("outage", -0.5),
            ("crash", -0.6),
            ("refund", -0.2),
            ("cancelled", -0.3),
            ("ridiculous", -0.3),
        ]
        .into_iter()
        .collect();

        let intensifiers: HashMap<&'static str, f64> = [
            ("very", 1.3),
            ("really", 1.2),
            ("extremely", 1.5),
            ("super", 1.3),
            ("so", 1.2),
            ("totally", 1.3),
            ("incredibly", 1.5),
            ("slightly", 0.5),
            ("somewhat", 0.7),
            ("quite", 1.1),
        ]
        .into_iter()
        .collect();

        let negations: &'static [&'static str] = &[
            "not", "no", "nothing", "nobody", "none", "neither", "nor", "cannot", "cant", "dont",
            "doesnt", "didnt", "isnt", "wasnt", "wont", "aren", "isn", "wasn", "don", "doesn",
            "didn", "couldn", "shouldn", "wouldn", "hardly", "barely",
        ];

        Self {
            words,
            negations,
            intensifiers,
        }
    }

    /// Averages the polarity of every polar word in already-cleaned text
    fn polarity(&self, cleaned: &str) -> f64 {
        let mut total = 0.0;
        let mut matched = 0usize;
        let mut negate = false;
        let mut multiplier = 1.0;

        for word in cleaned.split_whitespace() {
            let word = word.to_lowercase();

            if self.negations.contains(&word.as_str()) {
                negate = true;
                continue;
            }
            if let Some(mult) = self.intensifiers.get(word.as_str()) {
                multiplier = *mult;
                continue;
            }
            if let Some(polarity) = self.words.get(word.as_str()) {
                let mut value = polarity * multiplier;
                if negate {
                    value *= NEGATION_FACTOR;
                }
                total += value;
                matched += 1;
                negate = false;
                multiplier = 1.0;
            }
        }

        if matched == 0 {
            return 0.0;
        }
        (total / matched as f64).clamp(-1.0, 1.0)
    }
}
