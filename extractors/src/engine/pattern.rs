use regex::Regex;
use shared_types::{AbbreviationEngine, ExtractionError, RawAbbreviation, RawBatch};

const STRATEGY: &str = "pattern";
const MAX_SHORT_FORM_CHARS: usize = 10;

/// Pure Rust detector for `long form (SF)` constructions.
///
/// The long form is located by matching the short-form characters right to left
/// against the words preceding the parenthesis, the first character anchored at
/// a word start. Offsets are character positions in the document.
pub struct PatternEngine {
    candidate: Regex,
    buffer: String,
}

impl PatternEngine {
    pub fn new() -> Self {
        Self {
            candidate: Regex::new(r"\(([^()]{1,32})\)").expect("valid regex"),
            buffer: String::new(),
        }
    }

    fn detect(&self, text: &str) -> Vec<RawAbbreviation> {
        let mut found = Vec::new();

        for caps in self.candidate.captures_iter(text) {
            let Some(inner) = caps.get(1) else { continue };
            let short_form = inner.as_str().split([';', ',']).next().unwrap_or("").trim();
            if !is_short_form(short_form) {
                continue;
            }
            let sf_start = inner.start() + (inner.as_str().len() - inner.as_str().trim_start().len());

            let paren_start = inner.start() - 1;
            let window = candidate_window(&text[..paren_start], short_form);
            let Some(lf_rel) = best_long_form(short_form, window.text) else {
                continue;
            };
            let long_form = window.text[lf_rel..].trim();
            if long_form.chars().count() <= short_form.chars().count() {
                continue;
            }
            let lf_start = window.start + lf_rel;

            found.push(RawAbbreviation {
                short_form: Some(short_form.as_bytes().to_vec()),
                long_form: Some(long_form.as_bytes().to_vec()),
                strategy: Some(STRATEGY.as_bytes().to_vec()),
                short_form_offset: char_offset(text, sf_start),
                long_form_offset: char_offset(text, lf_start),
                precision: initial_coverage(short_form, long_form),
            });
        }

        found
    }
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AbbreviationEngine for PatternEngine {
    fn add_text(&mut self, text: &str) -> Result<(), ExtractionError> {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(text);
        Ok(())
    }

    fn fetch(&mut self, capacity: usize) -> Result<RawBatch, ExtractionError> {
        let text = std::mem::take(&mut self.buffer);
        let mut records = self.detect(&text);
        let reported_count = records.len() as i64;
        records.truncate(capacity);
        Ok(RawBatch {
            reported_count,
            records,
        })
    }

    fn name(&self) -> &str {
        STRATEGY
    }
}

fn is_short_form(candidate: &str) -> bool {
    let len = candidate.chars().count();
    (2..=MAX_SHORT_FORM_CHARS).contains(&len)
        && candidate.split_whitespace().count() <= 2
        && candidate.chars().next().is_some_and(char::is_alphanumeric)
        && candidate.chars().any(char::is_uppercase)
}

struct Window<'a> {
    text: &'a str,
    start: usize,
}

/// The last `min(|sf| + 5, 2 * |sf|)` words of the clause before the parenthesis
fn candidate_window<'a>(prefix: &'a str, short_form: &str) -> Window<'a> {
    let trimmed = prefix.trim_end();
    let clause_start = trimmed
        .rfind(['.', ';', '(', ')'])
        .map(|i| i + 1)
        .unwrap_or(0);
    let clause = &trimmed[clause_start..];

    let sf_len = short_form.chars().count();
    let max_words = (sf_len + 5).min(sf_len * 2);

    let mut word_starts = Vec::new();
    let mut prev_whitespace = true;
    for (index, ch) in clause.char_indices() {
        if !ch.is_whitespace() && prev_whitespace {
            word_starts.push(index);
        }
        prev_whitespace = ch.is_whitespace();
    }

    let first = word_starts.len().saturating_sub(max_words);
    let start = word_starts.get(first).copied().unwrap_or(clause.len());
    Window {
        text: &clause[start..],
        start: clause_start + start,
    }
}

fn lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Byte index in `window` where the long form starts
fn best_long_form(short_form: &str, window: &str) -> Option<usize> {
    let sf: Vec<char> = short_form.chars().map(lower).collect();
    let lf: Vec<(usize, char)> = window.char_indices().map(|(i, c)| (i, lower(c))).collect();

    let mut s = sf.len();
    let mut l = lf.len();
    while s > 0 {
        let c = sf[s - 1];
        if !c.is_alphanumeric() {
            s -= 1;
            continue;
        }
        loop {
            if l == 0 {
                return None;
            }
            let at_word_start = l == 1 || !lf[l - 2].1.is_alphanumeric();
            if lf[l - 1].1 == c && (s > 1 || at_word_start) {
                break;
            }
            l -= 1;
        }
        l -= 1;
        s -= 1;
    }

    lf.get(l).map(|(index, _)| *index)
}

/// Share of short-form characters that are initials of long-form words,
/// mapped onto [0.5, 0.95]
fn initial_coverage(short_form: &str, long_form: &str) -> f64 {
    let letters: Vec<char> = short_form
        .chars()
        .filter(|c| c.is_alphanumeric())
        .map(lower)
        .collect();
    if letters.is_empty() {
        return 0.5;
    }
    let mut initials = long_form
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter_map(|w| w.chars().next())
        .map(lower);

    let mut matched = 0usize;
    for letter in &letters {
        if initials.by_ref().any(|i| i == *letter) {
            matched += 1;
        }
    }

    0.5 + 0.45 * (matched as f64 / letters.len() as f64)
}

fn char_offset(text: &str, byte_index: usize) -> i32 {
    i32::try_from(text[..byte_index].chars().count()).unwrap_or(i32::MAX)
}
