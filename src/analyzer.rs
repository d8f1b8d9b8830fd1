//! Rule-based argument scoring.
//!
//! Every sub-score starts at a baseline and collects independent bonuses from a
//! fixed rule table, then is clamped to 0..=100. No I/O, no randomness: the
//! same text always yields the same `ScoreSet`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const BASELINE: i32 = 50;
const MIN_SCORE: i32 = 0;
const MAX_SCORE: i32 = 100;

/// Scores for one argument. `overall` is always derived from the four
/// sub-scores, so the only way to build one is through `from_parts`
/// (or deserialization, which goes through the same path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawScores")]
pub struct ScoreSet {
    clarity: u8,
    evidence: u8,
    logic: u8,
    persuasiveness: u8,
    overall: u8,
}

impl ScoreSet {
    /// Clamp each sub-score to 0..=100 and derive `overall`.
    ///
    /// `overall` rounds half up: the sum of four integers divided by four can
    /// only land on .0, .25, .5 or .75, and `(sum + 2) / 4` maps .5 upward.
    pub fn from_parts(clarity: i32, evidence: i32, logic: i32, persuasiveness: i32) -> Self {
        let clarity = clamp_score(clarity);
        let evidence = clamp_score(evidence);
        let logic = clamp_score(logic);
        let persuasiveness = clamp_score(persuasiveness);
        let sum = clarity + evidence + logic + persuasiveness;
        let overall = (sum + 2) / 4;

        Self {
            clarity: clarity as u8,
            evidence: evidence as u8,
            logic: logic as u8,
            persuasiveness: persuasiveness as u8,
            overall: overall as u8,
        }
    }

    pub fn clarity(&self) -> u8 {
        self.clarity
    }

    pub fn evidence(&self) -> u8 {
        self.evidence
    }

    pub fn logic(&self) -> u8 {
        self.logic
    }

    pub fn persuasiveness(&self) -> u8 {
        self.persuasiveness
    }

    pub fn overall(&self) -> u8 {
        self.overall
    }

    pub fn baseline() -> Self {
        Self::from_parts(BASELINE, BASELINE, BASELINE, BASELINE)
    }
}

fn clamp_score(value: i32) -> i32 {
    value.clamp(MIN_SCORE, MAX_SCORE)
}

/// Wire shape accepted when deserializing scores. Model replies sometimes use
/// fractional values; those are rounded before clamping. Any `overall` in the
/// input is ignored.
#[derive(Deserialize)]
struct RawScores {
    clarity: f64,
    evidence: f64,
    logic: f64,
    persuasiveness: f64,
}

impl From<RawScores> for ScoreSet {
    fn from(raw: RawScores) -> Self {
        // `as` saturates for out-of-range floats, clamping handles the rest.
        ScoreSet::from_parts(
            raw.clarity.round() as i32,
            raw.evidence.round() as i32,
            raw.logic.round() as i32,
            raw.persuasiveness.round() as i32,
        )
    }
}

// ── Rule table ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Clarity,
    Evidence,
    Logic,
    Persuasiveness,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// Strictly more than this many whitespace-separated words.
    MoreWordsThan(usize),
    /// Any of the listed keywords or phrases, whole words, any case.
    Markers(&'static [&'static str]),
    /// Any character from the list, anywhere in the text.
    AnyChar(&'static [char]),
    /// A percent sign or any decimal digit.
    Figures,
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    dimension: Dimension,
    trigger: Trigger,
    bonus: i32,
}

const fn rule(dimension: Dimension, trigger: Trigger, bonus: i32) -> Rule {
    Rule { dimension, trigger, bonus }
}

use Dimension::{Clarity, Evidence, Logic, Persuasiveness};
use Trigger::{AnyChar, Figures, Markers, MoreWordsThan};

const RULES: &[Rule] = &[
    // Clarity
    rule(Clarity, MoreWordsThan(10), 10),
    rule(Clarity, MoreWordsThan(30), 10),
    rule(Clarity, MoreWordsThan(50), 5),
    rule(Clarity, AnyChar(&['.', '!', '?']), 5),
    rule(
        Clarity,
        Markers(&["first", "second", "third", "finally", "therefore", "however", "moreover"]),
        10,
    ),
    // Evidence. "study" sits in both the evidentiary and the source group and
    // earns both bonuses.
    rule(
        Evidence,
        Markers(&["study", "research", "data", "statistics", "evidence", "according to", "study shows"]),
        20,
    ),
    rule(Evidence, Figures, 15),
    rule(Evidence, Markers(&["example", "instance", "case", "specifically"]), 10),
    rule(Evidence, Markers(&["source", "study", "report", "survey"]), 10),
    // Logic
    rule(
        Logic,
        Markers(&["because", "therefore", "thus", "consequently", "as a result", "due to"]),
        15,
    ),
    rule(Logic, Markers(&["if", "then", "when", "while", "although", "however"]), 10),
    rule(Logic, Markers(&["cause", "effect", "reason", "factor"]), 10),
    rule(Logic, MoreWordsThan(20), 5),
    // Persuasiveness
    rule(
        Persuasiveness,
        Markers(&["should", "must", "need to", "important", "critical", "essential"]),
        10,
    ),
    rule(Persuasiveness, Markers(&["clearly", "obviously", "certainly", "undoubtedly"]), 5),
    rule(
        Persuasiveness,
        Markers(&["benefit", "advantage", "improve", "better", "solution"]),
        10,
    ),
    rule(Persuasiveness, Markers(&["problem", "issue", "concern", "challenge"]), 5),
    rule(Persuasiveness, MoreWordsThan(25), 10),
];

/// One compiled matcher per rule, same order as `RULES`.
static MATCHERS: LazyLock<Vec<Option<Regex>>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|r| match r.trigger {
            Markers(markers) => Some(marker_regex(markers)),
            Figures => Some(Regex::new(r"[%0-9]").expect("figure pattern is valid")),
            _ => None,
        })
        .collect()
});

/// Build `(?i)\b(?:a|b|c d)\b` from a marker list. Phrases match across any
/// run of whitespace.
pub(crate) fn marker_regex(markers: &[&str]) -> Regex {
    let alternatives = markers
        .iter()
        .map(|m| {
            m.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternatives})\b")).expect("marker pattern is valid")
}

fn rule_fires(rule: &Rule, matcher: Option<&Regex>, text: &str, word_count: usize) -> bool {
    match rule.trigger {
        MoreWordsThan(n) => word_count > n,
        AnyChar(chars) => text.contains(chars),
        Markers(_) | Figures => matcher.is_some_and(|re| re.is_match(text)),
    }
}

/// Score an argument. Works for any input, including empty text.
pub fn analyze(argument: &str) -> ScoreSet {
    let word_count = argument.split_whitespace().count();

    let mut clarity = BASELINE;
    let mut evidence = BASELINE;
    let mut logic = BASELINE;
    let mut persuasiveness = BASELINE;

    for (rule, matcher) in RULES.iter().zip(MATCHERS.iter()) {
        if !rule_fires(rule, matcher.as_ref(), argument, word_count) {
            continue;
        }
        let slot = match rule.dimension {
            Clarity => &mut clarity,
            Evidence => &mut evidence,
            Logic => &mut logic,
            Persuasiveness => &mut persuasiveness,
        };
        *slot += rule.bonus;
    }

    ScoreSet::from_parts(clarity, evidence, logic, persuasiveness)
}
