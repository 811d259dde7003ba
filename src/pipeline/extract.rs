//! Structured field extraction from recognised text.
//!
//! Eight independent extractors, one per [`FieldCategory`], are described by
//! a single declarative rule table ([`RULES`]). Each rule names its category,
//! how it matches, and how a match is typed into a [`FieldKind`]. All rules
//! run concurrently on the blocking pool and are joined; a rule that panics
//! leaves its category empty and is logged, the other seven still report.
//!
//! ## Matching
//!
//! * **Patterns**: an ordered list of regexes. Hits within one category never
//!   overlap: text claimed by an earlier pattern cannot be re-matched by a
//!   later one, so `15/01/2025` is exactly one date. Results are in text order.
//! * **Keywords**: each whitespace token, lower-cased and stripped of
//!   surrounding punctuation, is tested against a bilingual
//!   (Indonesian/English) vocabulary. Repeats are kept unless
//!   [`ExtractionConfig::dedupe_keywords`] is set.
//! * **Line groups**: a run of lines that each split into several
//!   tab / multi-space separated segments is reported as one table block.
//!
//! None of this aims at full recall. The extractors are cheap heuristics over
//! noisy OCR output.

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::output::BoundingBox;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

// ── Public types ─────────────────────────────────────────────────────────────

/// The eight field collections of [`ExtractedData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Dates,
    Amounts,
    Materials,
    Personnel,
    Coordinates,
    Specifications,
    Signatures,
    Tables,
}

impl FieldCategory {
    pub const ALL: [FieldCategory; 8] = [
        FieldCategory::Dates,
        FieldCategory::Amounts,
        FieldCategory::Materials,
        FieldCategory::Personnel,
        FieldCategory::Coordinates,
        FieldCategory::Specifications,
        FieldCategory::Signatures,
        FieldCategory::Tables,
    ];

    /// Fixed confidence attached to every field of this category.
    pub fn confidence(self) -> f32 {
        match self {
            FieldCategory::Dates => 0.8,
            FieldCategory::Amounts => 0.85,
            FieldCategory::Materials => 0.7,
            FieldCategory::Personnel => 0.65,
            FieldCategory::Coordinates => 0.9,
            FieldCategory::Specifications => 0.8,
            FieldCategory::Signatures => 0.75,
            FieldCategory::Tables => 0.7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldCategory::Dates => "dates",
            FieldCategory::Amounts => "amounts",
            FieldCategory::Materials => "materials",
            FieldCategory::Personnel => "personnel",
            FieldCategory::Coordinates => "coordinates",
            FieldCategory::Specifications => "specifications",
            FieldCategory::Signatures => "signatures",
            FieldCategory::Tables => "tables",
        }
    }
}

impl fmt::Display for FieldCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// `yyyy-mm-dd`
    Iso,
    /// `dd/mm/yyyy` with `/`, `-` or `.` separators
    Numeric,
    /// `15 Januari 2025`, `3 Mar 2024`
    Textual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Idr,
    Usd,
    Eur,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateNotation {
    /// Degrees, minutes, seconds.
    Dms,
    /// Signed decimal `lat, lon` pair.
    Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecificationKind {
    /// A number with a physical unit.
    Measurement,
    /// A standards code such as `SNI 2847:2019`.
    Standard,
    /// A concrete grade such as `K-300`.
    Grade,
    /// A reinforcing bar mark such as `D13`.
    Rebar,
}

/// Category-specific typing of an extracted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Date {
        format: DateFormat,
    },
    Amount {
        currency: Currency,
        /// Numeric value, when the separators could be interpreted.
        amount: Option<f64>,
    },
    Material {
        keyword: String,
    },
    Personnel {
        role: String,
    },
    Coordinate {
        notation: CoordinateNotation,
        latitude: Option<f64>,
        longitude: Option<f64>,
    },
    Specification {
        kind: SpecificationKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        standard: Option<String>,
    },
    Signature {
        indicator: String,
        /// Box of the indicator's first word, when it could be found.
        location: Option<BoundingBox>,
    },
    Table {
        rows: usize,
        columns: usize,
    },
}

/// One extracted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    /// The matched text as it appears in the document.
    pub value: String,
    pub kind: FieldKind,
    pub confidence: f32,
}

/// The eight field collections of a completed job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub dates: Vec<ExtractedField>,
    pub amounts: Vec<ExtractedField>,
    pub materials: Vec<ExtractedField>,
    pub personnel: Vec<ExtractedField>,
    pub coordinates: Vec<ExtractedField>,
    pub specifications: Vec<ExtractedField>,
    pub signatures: Vec<ExtractedField>,
    pub tables: Vec<ExtractedField>,
}

impl ExtractedData {
    pub fn get(&self, category: FieldCategory) -> &[ExtractedField] {
        match category {
            FieldCategory::Dates => &self.dates,
            FieldCategory::Amounts => &self.amounts,
            FieldCategory::Materials => &self.materials,
            FieldCategory::Personnel => &self.personnel,
            FieldCategory::Coordinates => &self.coordinates,
            FieldCategory::Specifications => &self.specifications,
            FieldCategory::Signatures => &self.signatures,
            FieldCategory::Tables => &self.tables,
        }
    }

    fn slot_mut(&mut self, category: FieldCategory) -> &mut Vec<ExtractedField> {
        match category {
            FieldCategory::Dates => &mut self.dates,
            FieldCategory::Amounts => &mut self.amounts,
            FieldCategory::Materials => &mut self.materials,
            FieldCategory::Personnel => &mut self.personnel,
            FieldCategory::Coordinates => &mut self.coordinates,
            FieldCategory::Specifications => &mut self.specifications,
            FieldCategory::Signatures => &mut self.signatures,
            FieldCategory::Tables => &mut self.tables,
        }
    }

    /// Number of fields across all categories.
    pub fn total(&self) -> usize {
        FieldCategory::ALL.iter().map(|c| self.get(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Everything a rule may look at.
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    pub text: String,
    pub words: Vec<BoundingBox>,
    pub config: ExtractionConfig,
}

// ── Rule table ───────────────────────────────────────────────────────────────

/// How a rule finds candidate values.
pub enum Matcher {
    /// Ordered regexes; `classify` receives the index of the pattern that hit.
    /// Returning `None` drops the hit.
    Patterns {
        patterns: &'static Lazy<Vec<Regex>>,
        classify: fn(usize, &str, &ExtractionInput) -> Option<FieldKind>,
    },
    /// Per-token vocabulary membership.
    Keywords {
        vocabulary: &'static Lazy<HashSet<&'static str>>,
        classify: fn(&str) -> FieldKind,
    },
    /// Consecutive multi-column lines.
    LineGroups,
}

/// One extractor.
pub struct Rule {
    pub category: FieldCategory,
    pub matcher: Matcher,
}

impl Rule {
    /// Run the rule over `input`. Blocking.
    pub fn apply(&self, input: &ExtractionInput) -> Vec<ExtractedField> {
        let confidence = self.category.confidence();
        let field = |value: &str, kind: FieldKind| ExtractedField {
            value: value.to_string(),
            kind,
            confidence,
        };
        match &self.matcher {
            Matcher::Patterns { patterns, classify } => match_patterns(patterns, &input.text)
                .into_iter()
                .filter_map(|(idx, value)| classify(idx, value, input).map(|k| field(value, k)))
                .collect(),
            Matcher::Keywords {
                vocabulary,
                classify,
            } => match_keywords(vocabulary, &input.text, input.config.dedupe_keywords)
                .into_iter()
                .map(|(token, keyword)| field(token, classify(&keyword)))
                .collect(),
            Matcher::LineGroups => match_tables(
                &input.text,
                input.config.table_min_lines,
                input.config.table_min_segments,
            )
            .into_iter()
            .map(|t| field(&t.value, FieldKind::Table { rows: t.rows, columns: t.columns }))
            .collect(),
        }
    }
}

/// The eight extractors, in output order.
pub static RULES: [Rule; 8] = [
    Rule {
        category: FieldCategory::Dates,
        matcher: Matcher::Patterns {
            patterns: &DATE_PATTERNS,
            classify: classify_date,
        },
    },
    Rule {
        category: FieldCategory::Amounts,
        matcher: Matcher::Patterns {
            patterns: &AMOUNT_PATTERNS,
            classify: classify_amount,
        },
    },
    Rule {
        category: FieldCategory::Materials,
        matcher: Matcher::Keywords {
            vocabulary: &MATERIAL_KEYWORDS,
            classify: |keyword| FieldKind::Material {
                keyword: keyword.to_string(),
            },
        },
    },
    Rule {
        category: FieldCategory::Personnel,
        matcher: Matcher::Keywords {
            vocabulary: &PERSONNEL_KEYWORDS,
            classify: |role| FieldKind::Personnel {
                role: role.to_string(),
            },
        },
    },
    Rule {
        category: FieldCategory::Coordinates,
        matcher: Matcher::Patterns {
            patterns: &COORDINATE_PATTERNS,
            classify: classify_coordinate,
        },
    },
    Rule {
        category: FieldCategory::Specifications,
        matcher: Matcher::Patterns {
            patterns: &SPECIFICATION_PATTERNS,
            classify: classify_specification,
        },
    },
    Rule {
        category: FieldCategory::Signatures,
        matcher: Matcher::Patterns {
            patterns: &SIGNATURE_PATTERNS,
            classify: classify_signature,
        },
    },
    Rule {
        category: FieldCategory::Tables,
        matcher: Matcher::LineGroups,
    },
];

// ── Execution ────────────────────────────────────────────────────────────────

/// Run all extractors concurrently and collect their results.
///
/// Never fails: a category whose extractor panics is logged and left empty.
pub async fn extract(text: &str, words: &[BoundingBox], config: &ExtractionConfig) -> ExtractedData {
    run_rules(&RULES, text, words, config).await
}

/// [`extract`] over an arbitrary rule set.
pub async fn run_rules(
    rules: &'static [Rule],
    text: &str,
    words: &[BoundingBox],
    config: &ExtractionConfig,
) -> ExtractedData {
    let input = Arc::new(ExtractionInput {
        text: text.to_string(),
        words: words.to_vec(),
        config: config.clone(),
    });

    let tasks = rules.iter().map(|rule| {
        let input = Arc::clone(&input);
        async move {
            let outcome = tokio::task::spawn_blocking(move || rule.apply(&input)).await;
            (rule.category, outcome)
        }
    });

    let mut data = ExtractedData::default();
    for (category, outcome) in join_all(tasks).await {
        match outcome {
            Ok(fields) => {
                debug!("Extracted {} {}", fields.len(), category);
                data.slot_mut(category).extend(fields);
            }
            Err(e) => {
                let err = if e.is_cancelled() {
                    ExtractionError::Cancelled { category }
                } else {
                    ExtractionError::Panicked {
                        category,
                        detail: e.to_string(),
                    }
                };
                warn!("{}; continuing without {}", err, category);
            }
        }
    }
    data
}

/// Sequential, blocking variant of [`extract`]. Does not isolate panics.
pub fn extract_blocking(text: &str, words: &[BoundingBox], config: &ExtractionConfig) -> ExtractedData {
    let input = ExtractionInput {
        text: text.to_string(),
        words: words.to_vec(),
        config: config.clone(),
    };
    let mut data = ExtractedData::default();
    for rule in RULES.iter() {
        data.slot_mut(rule.category).extend(rule.apply(&input));
    }
    data
}

// ── Generic matchers ─────────────────────────────────────────────────────────

/// Non-overlapping hits of `patterns` in text order, as `(pattern index, text)`.
fn match_patterns<'t>(patterns: &[Regex], text: &'t str) -> Vec<(usize, &'t str)> {
    let mut claimed: Vec<(usize, usize, usize)> = Vec::new();
    for (idx, re) in patterns.iter().enumerate() {
        for m in re.find_iter(text) {
            let overlaps = claimed
                .iter()
                .any(|&(start, end, _)| m.start() < end && start < m.end());
            if !overlaps {
                claimed.push((m.start(), m.end(), idx));
            }
        }
    }
    claimed.sort_by_key(|&(start, _, _)| start);
    claimed
        .into_iter()
        .map(|(start, end, idx)| (idx, &text[start..end]))
        .collect()
}

/// Tokens found in `vocabulary`, as `(token as written, lower-cased keyword)`.
fn match_keywords<'t>(
    vocabulary: &HashSet<&'static str>,
    text: &'t str,
    dedupe: bool,
) -> Vec<(&'t str, String)> {
    let mut seen = HashSet::new();
    text.split_whitespace()
        .map(|raw| raw.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let keyword = token.to_lowercase();
            if !vocabulary.contains(keyword.as_str()) {
                return None;
            }
            if dedupe && !seen.insert(keyword.clone()) {
                return None;
            }
            Some((token, keyword))
        })
        .collect()
}

struct TableBlock {
    value: String,
    rows: usize,
    columns: usize,
}

static RE_CELL_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+| {2,}").unwrap());

fn segment_count(line: &str) -> usize {
    RE_CELL_SEPARATOR
        .split(line)
        .filter(|s| !s.trim().is_empty())
        .count()
}

fn match_tables(text: &str, min_lines: usize, min_segments: usize) -> Vec<TableBlock> {
    let mut tables = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    let mut columns = 0;

    let mut flush = |run: &mut Vec<&str>, columns: &mut usize| {
        if run.len() >= min_lines {
            tables.push(TableBlock {
                value: run.join("\n"),
                rows: run.len(),
                columns: *columns,
            });
        }
        run.clear();
        *columns = 0;
    };

    for line in text.lines() {
        let segments = segment_count(line);
        if segments >= min_segments {
            run.push(line);
            columns = columns.max(segments);
        } else {
            flush(&mut run, &mut columns);
        }
    }
    flush(&mut run, &mut columns);
    tables
}

// ── Dates ────────────────────────────────────────────────────────────────────

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap(),
        Regex::new(r"\b\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}\b").unwrap(),
        Regex::new(
            r"(?i)\b\d{1,2}\s+(?:jan(?:uari|uary)?|feb(?:ruari|ruary)?|mar(?:et|ch)?|apr(?:il)?|mei|may|jun(?:i|e)?|jul(?:i|y)?|agu(?:stus)?|aug(?:ust)?|sep(?:t(?:ember)?)?|okt(?:ober)?|oct(?:ober)?|nov(?:ember)?|des(?:ember)?|dec(?:ember)?)\.?\s+\d{4}\b",
        )
        .unwrap(),
    ]
});

fn classify_date(idx: usize, _value: &str, _input: &ExtractionInput) -> Option<FieldKind> {
    let format = match idx {
        0 => DateFormat::Iso,
        1 => DateFormat::Numeric,
        _ => DateFormat::Textual,
    };
    Some(FieldKind::Date { format })
}

// ── Amounts ──────────────────────────────────────────────────────────────────

static AMOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(?:\b(?:rp\.?|idr|usd|eur)|\$|€)\s?\d+(?:[.,]\d{3})*(?:[.,]\d{1,2})?\b").unwrap(),
        Regex::new(
            r"(?i)\b\d+(?:[.,]\d{3})*(?:[.,]\d{1,2})?\s?(?:rupiah|idr|usd|dollars?|eur|euros?)\b",
        )
        .unwrap(),
    ]
});

fn classify_amount(_idx: usize, value: &str, _input: &ExtractionInput) -> Option<FieldKind> {
    Some(FieldKind::Amount {
        currency: currency_of(value),
        amount: parse_amount(value),
    })
}

/// Currency named in `value`; rupiah when nothing else is recognisable.
pub fn currency_of(value: &str) -> Currency {
    let lower = value.to_lowercase();
    if lower.contains("usd") || lower.contains('$') || lower.contains("dollar") {
        Currency::Usd
    } else if lower.contains("eur") || lower.contains('€') {
        Currency::Eur
    } else {
        Currency::Idr
    }
}

/// Numeric value of an amount string.
///
/// The last `.`/`,` is a decimal separator when one or two digits follow it;
/// every other separator groups thousands. `Rp 1.000.000` → 1 000 000,
/// `USD 1,250.50` → 1250.5.
pub fn parse_amount(value: &str) -> Option<f64> {
    let numeric: String = value
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let numeric = numeric.trim_end_matches(['.', ',']);
    if numeric.is_empty() {
        return None;
    }

    let (int_part, frac_part) = match numeric.rfind(['.', ',']) {
        Some(pos) if (1..=2).contains(&(numeric.len() - pos - 1)) => {
            (&numeric[..pos], Some(&numeric[pos + 1..]))
        }
        _ => (numeric, None),
    };
    let mut digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    if let Some(frac) = frac_part {
        digits.push('.');
        digits.push_str(frac);
    }
    digits.parse().ok()
}

// ── Materials & personnel ────────────────────────────────────────────────────

static MATERIAL_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "semen", "cement", "beton", "concrete", "besi", "iron", "baja", "steel", "pasir",
        "sand", "kerikil", "gravel", "batu", "stone", "bata", "brick", "kayu", "timber",
        "wood", "triplek", "plywood", "keramik", "ceramic", "genteng", "roof", "pipa",
        "pipe", "kaca", "glass", "aspal", "asphalt", "mortar", "hebel", "wiremesh", "cat",
        "paint", "kabel", "cable", "paku", "nails", "tulangan", "rebar", "agregat",
        "aggregate", "bekisting", "formwork",
    ]
    .into_iter()
    .collect()
});

static PERSONNEL_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "mandor", "foreman", "tukang", "craftsman", "pekerja", "worker", "workers", "buruh",
        "laborer", "labourer", "pengawas", "supervisor", "pelaksana", "insinyur", "engineer",
        "arsitek", "architect", "kontraktor", "contractor", "konsultan", "consultant",
        "manajer", "manager", "operator", "surveyor", "drafter", "inspektur", "inspector",
        "direksi", "owner", "pemilik", "helper", "kenek",
    ]
    .into_iter()
    .collect()
});

// ── Coordinates ──────────────────────────────────────────────────────────────

static COORDINATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(
            r#"(\d{1,3})\s?°\s?(\d{1,2})\s?['′]\s?(\d{1,2}(?:[.,]\d+)?)(?:\s?(?:"|″|''))?(?:\s?(N|S|E|W|LU|LS|BT|BB)\b)?"#,
        )
        .unwrap(),
        // Four or more decimals: `12.500, 15.000` is a pair of thousands-grouped prices.
        Regex::new(r"-?\b(\d{1,2}\.\d{4,})\s?,\s?(-?\d{1,3}\.\d{4,})\b").unwrap(),
    ]
});

fn classify_coordinate(idx: usize, value: &str, _input: &ExtractionInput) -> Option<FieldKind> {
    let caps = COORDINATE_PATTERNS[idx].captures(value)?;
    if idx == 0 {
        let deg: f64 = caps[1].parse().ok()?;
        let min: f64 = caps[2].parse().ok()?;
        let sec: f64 = caps[3].replace(',', ".").parse().ok()?;
        if min >= 60.0 || sec >= 60.0 || deg > 180.0 {
            return None;
        }
        let decimal = deg + min / 60.0 + sec / 3600.0;
        let (latitude, longitude) = match caps.get(4).map(|m| m.as_str()) {
            Some("N") | Some("LU") => (Some(decimal), None),
            Some("S") | Some("LS") => (Some(-decimal), None),
            Some("E") | Some("BT") => (None, Some(decimal)),
            Some("W") | Some("BB") => (None, Some(-decimal)),
            _ => (None, None),
        };
        return Some(FieldKind::Coordinate {
            notation: CoordinateNotation::Dms,
            latitude,
            longitude,
        });
    }

    // The leading sign sits outside the capture so the word boundary still holds.
    let sign = if value.trim_start().starts_with('-') { -1.0 } else { 1.0 };
    let lat: f64 = sign * caps[1].parse::<f64>().ok()?;
    let lon: f64 = caps[2].parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some(FieldKind::Coordinate {
        notation: CoordinateNotation::Decimal,
        latitude: Some(lat),
        longitude: Some(lon),
    })
}

// ── Specifications ───────────────────────────────────────────────────────────

static SPECIFICATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b(SNI|ASTM|ISO|ACI|BS|EN|JIS)[\s-]?[A-Z]?\d+(?:[-:.]\d+)*\b").unwrap(),
        Regex::new(r"\bK-?\d{3}\b").unwrap(),
        Regex::new(r"\b[DØø]\d{1,2}\b").unwrap(),
        Regex::new(
            r"(?i)\b\d+(?:[.,]\d+)?\s?(m²|m³|(?:mm|cm|km|m2|m3|kg|ton|mpa|kn|psi|m)\b)",
        )
        .unwrap(),
    ]
});

fn classify_specification(idx: usize, value: &str, _input: &ExtractionInput) -> Option<FieldKind> {
    let (kind, unit, standard) = match idx {
        0 => {
            let caps = SPECIFICATION_PATTERNS[0].captures(value)?;
            (SpecificationKind::Standard, None, Some(caps[1].to_string()))
        }
        1 => (SpecificationKind::Grade, None, None),
        2 => (SpecificationKind::Rebar, None, None),
        _ => {
            let caps = SPECIFICATION_PATTERNS[3].captures(value)?;
            (SpecificationKind::Measurement, Some(canonical_unit(&caps[1])), None)
        }
    };
    Some(FieldKind::Specification {
        kind,
        unit,
        standard,
    })
}

fn canonical_unit(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "m2" | "m²" => "m²".to_string(),
        "m3" | "m³" => "m³".to_string(),
        "mpa" => "MPa".to_string(),
        "kn" => "kN".to_string(),
        other => other.to_string(),
    }
}

// ── Signatures ───────────────────────────────────────────────────────────────

static SIGNATURE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![Regex::new(
        r"(?i)\b(?:ttd|tanda\s+tangan|signature|signed|approved\s+by|disetujui(?:\s+oleh)?|diperiksa(?:\s+oleh)?|mengetahui|dibuat\s+oleh)\b",
    )
    .unwrap()]
});

fn classify_signature(_idx: usize, value: &str, input: &ExtractionInput) -> Option<FieldKind> {
    let indicator = value
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let first = indicator.split(' ').next().unwrap_or_default();
    let location = input
        .words
        .iter()
        .find(|w| {
            w.text
                .trim_matches(|c: char| !c.is_alphanumeric())
                .eq_ignore_ascii_case(first)
        })
        .cloned();
    Some(FieldKind::Signature {
        indicator,
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> ExtractedData {
        extract_blocking(text, &[], &ExtractionConfig::default())
    }

    #[test]
    fn numeric_date_matches_once() {
        let data = run("Tanggal: 15/01/2025");
        assert_eq!(data.dates.len(), 1);
        assert_eq!(data.dates[0].value, "15/01/2025");
        assert_eq!(data.dates[0].kind, FieldKind::Date { format: DateFormat::Numeric });
        assert!((data.dates[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn dates_in_all_formats_in_text_order() {
        let data = run("mulai 3 Januari 2025, selesai 2025-02-28, cek 01.03.25");
        let formats: Vec<_> = data
            .dates
            .iter()
            .map(|f| match &f.kind {
                FieldKind::Date { format } => *format,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            formats,
            vec![DateFormat::Textual, DateFormat::Iso, DateFormat::Numeric]
        );
    }

    #[test]
    fn rupiah_amount() {
        let data = run("Total biaya Rp 1.000.000 sudah dibayar");
        assert_eq!(data.amounts.len(), 1);
        assert_eq!(data.amounts[0].value, "Rp 1.000.000");
        assert_eq!(
            data.amounts[0].kind,
            FieldKind::Amount {
                currency: Currency::Idr,
                amount: Some(1_000_000.0)
            }
        );
    }

    #[test]
    fn prefixed_and_suffixed_currencies() {
        let data = run("USD 1,250.50 plus 300 euro and $45 and 2.500.000 rupiah");
        let currencies: Vec<_> = data
            .amounts
            .iter()
            .map(|f| match &f.kind {
                FieldKind::Amount { currency, .. } => *currency,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            currencies,
            vec![Currency::Usd, Currency::Eur, Currency::Usd, Currency::Idr]
        );
    }

    #[test]
    fn parse_amount_separators() {
        assert_eq!(parse_amount("Rp 1.000.000"), Some(1_000_000.0));
        assert_eq!(parse_amount("USD 1,250.50"), Some(1250.5));
        assert_eq!(parse_amount("Rp 2.500,75"), Some(2500.75));
        assert_eq!(parse_amount("$45"), Some(45.0));
        assert_eq!(parse_amount("rupiah"), None);
    }

    #[test]
    fn materials_keep_repeats_by_default() {
        let data = run("Semen 50 sak, pasir 2 truk, semen tambahan");
        let keywords: Vec<_> = data.materials.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(keywords, vec!["Semen", "pasir", "semen"]);
    }

    #[test]
    fn materials_dedupe_when_configured() {
        let config = ExtractionConfig {
            dedupe_keywords: true,
            ..Default::default()
        };
        let data = extract_blocking("Semen, pasir, semen.", &[], &config);
        assert_eq!(data.materials.len(), 2);
    }

    #[test]
    fn personnel_roles() {
        let data = run("Mandor: Budi. Site engineer: Ani (supervisor)");
        let roles: Vec<_> = data
            .personnel
            .iter()
            .map(|f| match &f.kind {
                FieldKind::Personnel { role } => role.as_str(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(roles, vec!["mandor", "engineer", "supervisor"]);
        assert!((data.personnel[0].confidence - 0.65).abs() < 1e-6);
    }

    #[test]
    fn decimal_coordinate_pair() {
        let data = run("Lokasi: -6.2088, 106.8456");
        assert_eq!(data.coordinates.len(), 1);
        match &data.coordinates[0].kind {
            FieldKind::Coordinate {
                notation,
                latitude,
                longitude,
            } => {
                assert_eq!(*notation, CoordinateNotation::Decimal);
                assert!((latitude.unwrap() + 6.2088).abs() < 1e-9);
                assert!((longitude.unwrap() - 106.8456).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dms_coordinate_with_hemisphere() {
        let data = run("Titik: 6°12'30\" S");
        assert_eq!(data.coordinates.len(), 1);
        match &data.coordinates[0].kind {
            FieldKind::Coordinate { latitude, .. } => {
                assert!((latitude.unwrap() + 6.208_333).abs() < 1e-5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn grouped_prices_are_not_coordinates() {
        let data = run("Harga: 12.500, 15.000 per sak");
        assert!(data.coordinates.is_empty(), "{:?}", data.coordinates);
    }

    #[test]
    fn dms_without_hemisphere_has_no_trailing_space() {
        let data = run("Titik 6°12'30\" dekat pos jaga");
        assert_eq!(data.coordinates.len(), 1);
        assert_eq!(data.coordinates[0].value, "6°12'30\"");

        let data = run("Titik 6°12'30 dekat pos jaga");
        assert_eq!(data.coordinates[0].value, "6°12'30");
    }

    #[test]
    fn specifications_of_each_kind() {
        let data = run("Beton K-300 sesuai SNI 2847:2019, tulangan D13 dan Ø10, tebal 150 mm, 25 MPa");
        let kinds: Vec<_> = data
            .specifications
            .iter()
            .map(|f| match &f.kind {
                FieldKind::Specification { kind, .. } => *kind,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                SpecificationKind::Grade,
                SpecificationKind::Standard,
                SpecificationKind::Rebar,
                SpecificationKind::Rebar,
                SpecificationKind::Measurement,
                SpecificationKind::Measurement,
            ]
        );
        assert!(matches!(
            &data.specifications[5].kind,
            FieldKind::Specification { unit: Some(u), .. } if u == "MPa"
        ));
    }

    #[test]
    fn signature_located_by_word_box() {
        let words = vec![BoundingBox {
            text: "Disetujui".into(),
            x: 400.0,
            y: 1800.0,
            width: 120.0,
            height: 30.0,
            confidence: 0.9,
        }];
        let data = extract_blocking(
            "Disetujui oleh:\n\n(Ir. Hasan)",
            &words,
            &ExtractionConfig::default(),
        );
        assert_eq!(data.signatures.len(), 1);
        match &data.signatures[0].kind {
            FieldKind::Signature {
                indicator,
                location,
            } => {
                assert_eq!(indicator, "disetujui oleh");
                assert_eq!(location.as_ref().map(|b| b.x), Some(400.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn three_tab_lines_make_one_table() {
        let text = "Item\tQty\tHarga\nSemen\t50\t65000\nPasir\t2\t300000\n\nCatatan akhir";
        let data = run(text);
        assert_eq!(data.tables.len(), 1);
        assert_eq!(
            data.tables[0].value,
            "Item\tQty\tHarga\nSemen\t50\t65000\nPasir\t2\t300000"
        );
        assert_eq!(
            data.tables[0].kind,
            FieldKind::Table {
                rows: 3,
                columns: 3
            }
        );
    }

    #[test]
    fn trailing_table_run_is_flushed() {
        let text = "Header\nA  B\nC  D\nE  F";
        assert_eq!(run(text).tables.len(), 1);
    }

    #[test]
    fn table_value_keeps_lines_verbatim() {
        let text = "A\tB  \nC\tD\nE\tF";
        let data = run(text);
        assert_eq!(data.tables.len(), 1);
        assert_eq!(data.tables[0].value, text);
    }

    #[test]
    fn two_lines_are_not_a_table() {
        let text = "A  B\nC  D\n\nE  F";
        assert!(run(text).tables.is_empty());
    }

    #[test]
    fn table_thresholds_are_configurable() {
        let config = ExtractionConfig {
            table_min_lines: 2,
            ..Default::default()
        };
        let data = extract_blocking("A  B\nC  D", &[], &config);
        assert_eq!(data.tables.len(), 1);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(run("").is_empty());
    }

    #[tokio::test]
    async fn concurrent_extract_matches_sequential() {
        let text = "15/01/2025 Rp 500.000 semen mandor K-300 ttd";
        let config = ExtractionConfig::default();
        let parallel = extract(text, &[], &config).await;
        assert_eq!(parallel, extract_blocking(text, &[], &config));
        assert_eq!(parallel.total(), 6);
    }

    static PANICKY_RULES: [Rule; 2] = [
        Rule {
            category: FieldCategory::Dates,
            matcher: Matcher::Patterns {
                patterns: &DATE_PATTERNS,
                classify: |_, _, _| panic!("classifier bug"),
            },
        },
        Rule {
            category: FieldCategory::Tables,
            matcher: Matcher::LineGroups,
        },
    ];

    #[tokio::test]
    async fn panicking_rule_leaves_only_its_category_empty() {
        let text = "15/01/2025\nA  B\nC  D\nE  F";
        let data = run_rules(&PANICKY_RULES, text, &[], &ExtractionConfig::default()).await;
        assert!(data.dates.is_empty());
        assert_eq!(data.tables.len(), 1);
    }
}
