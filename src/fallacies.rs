//! Logical fallacy classification.
//!
//! Three interchangeable classifiers sit behind `FallacyClassifier`:
//! the model-backed one (degrades to "no findings" on any failure), a
//! deterministic phrase-rule one, and one that never reports anything.

use crate::analyzer::marker_regex;
use crate::llm::{extract_json_span, CompletionRequest, LlmBackend, LlmError};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FallacyKind {
    #[serde(rename = "Ad Hominem")]
    AdHominem,
    #[serde(rename = "Straw Man")]
    StrawMan,
    #[serde(rename = "False Dichotomy")]
    FalseDichotomy,
    #[serde(rename = "Appeal to Authority")]
    AppealToAuthority,
    #[serde(rename = "Slippery Slope")]
    SlipperySlope,
    #[serde(rename = "Hasty Generalization")]
    HastyGeneralization,
    #[serde(rename = "Red Herring")]
    RedHerring,
    #[serde(rename = "Circular Reasoning")]
    CircularReasoning,
    #[serde(rename = "Appeal to Emotion")]
    AppealToEmotion,
    #[serde(rename = "False Cause")]
    FalseCause,
}

impl FallacyKind {
    pub fn all() -> [FallacyKind; 10] {
        [
            FallacyKind::AdHominem,
            FallacyKind::StrawMan,
            FallacyKind::FalseDichotomy,
            FallacyKind::AppealToAuthority,
            FallacyKind::SlipperySlope,
            FallacyKind::HastyGeneralization,
            FallacyKind::RedHerring,
            FallacyKind::CircularReasoning,
            FallacyKind::AppealToEmotion,
            FallacyKind::FalseCause,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            FallacyKind::AdHominem => "Ad Hominem",
            FallacyKind::StrawMan => "Straw Man",
            FallacyKind::FalseDichotomy => "False Dichotomy",
            FallacyKind::AppealToAuthority => "Appeal to Authority",
            FallacyKind::SlipperySlope => "Slippery Slope",
            FallacyKind::HastyGeneralization => "Hasty Generalization",
            FallacyKind::RedHerring => "Red Herring",
            FallacyKind::CircularReasoning => "Circular Reasoning",
            FallacyKind::AppealToEmotion => "Appeal to Emotion",
            FallacyKind::FalseCause => "False Cause",
        }
    }

    /// One-line gloss, used in prompts and as the description of pattern hits.
    pub fn gloss(&self) -> &'static str {
        match self {
            FallacyKind::AdHominem => "attacking the person rather than the argument",
            FallacyKind::StrawMan => "misrepresenting the opposing argument",
            FallacyKind::FalseDichotomy => "presenting only two options when more exist",
            FallacyKind::AppealToAuthority => "citing authority in place of evidence",
            FallacyKind::SlipperySlope => "asserting a chain reaction without justification",
            FallacyKind::HastyGeneralization => "drawing a broad conclusion from insufficient evidence",
            FallacyKind::RedHerring => "introducing an irrelevant distraction",
            FallacyKind::CircularReasoning => "a conclusion that assumes its own premise",
            FallacyKind::AppealToEmotion => "manipulating emotions instead of using logic",
            FallacyKind::FalseCause => "assuming a causal link from sequence or correlation",
        }
    }
}

impl fmt::Display for FallacyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FallacyKind {
    type Err = String;

    /// Case- and spacing-insensitive: "ad hominem", "Ad-Hominem" and
    /// "AD_HOMINEM" all resolve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_label(s);
        FallacyKind::all()
            .into_iter()
            .find(|kind| normalize_label(kind.label()) == wanted)
            .ok_or_else(|| format!("unknown fallacy type: {}", s))
    }
}

fn normalize_label(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallacyFinding {
    #[serde(rename = "type")]
    pub kind: FallacyKind,
    pub description: String,
    pub severity: Severity,
}

#[async_trait]
pub trait FallacyClassifier: Send + Sync {
    /// Findings for one argument. Never fails; "nothing found" and "could not
    /// check" both come back empty.
    async fn detect(&self, argument: &str) -> Vec<FallacyFinding>;
}

// ── Disabled ──

pub struct DisabledClassifier;

#[async_trait]
impl FallacyClassifier for DisabledClassifier {
    async fn detect(&self, _argument: &str) -> Vec<FallacyFinding> {
        Vec::new()
    }
}

// ── Model-backed ──

const DETECTION_SYSTEM_PROMPT: &str =
    "You are a strict debate judge who identifies logical fallacies. Respond only with JSON.";

pub struct DelegatedClassifier {
    backend: Option<Arc<dyn LlmBackend>>,
    model: Option<String>,
}

impl DelegatedClassifier {
    pub fn new(backend: Option<Arc<dyn LlmBackend>>, model: Option<String>) -> Self {
        Self { backend, model }
    }

    async fn try_detect(&self, argument: &str) -> Result<Vec<FallacyFinding>, LlmError> {
        let backend = self.backend.as_ref().ok_or(LlmError::MissingApiKey)?;
        let request = CompletionRequest::prompt(DETECTION_SYSTEM_PROMPT, &detection_prompt(argument))
            .with_sampling(0.3, 300)
            .with_model(self.model.clone());
        let text = backend.complete(request).await?;
        parse_findings(&text)
    }
}

#[async_trait]
impl FallacyClassifier for DelegatedClassifier {
    async fn detect(&self, argument: &str) -> Vec<FallacyFinding> {
        match self.try_detect(argument).await {
            Ok(findings) => findings,
            Err(LlmError::MissingApiKey) => {
                debug!("fallacy detection skipped: no backend configured");
                Vec::new()
            }
            Err(e @ LlmError::InvalidResponse(_)) => {
                warn!(error = %e, "fallacy detection reply was malformed");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "fallacy detection request failed");
                Vec::new()
            }
        }
    }
}

fn detection_prompt(argument: &str) -> String {
    let checklist = FallacyKind::all()
        .iter()
        .map(|k| format!("- {} ({})", k.label(), k.gloss()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze this debate argument for logical fallacies. Identify any fallacies present.

Common fallacies to check for:
{checklist}

Argument: "{argument}"

If fallacies are found, respond with a JSON array like:
[{{"type": "Ad Hominem", "description": "The argument attacks the person rather than addressing their point", "severity": "high"}}]

If no fallacies are found, respond with an empty array: []

Respond ONLY with valid JSON."#
    )
}

/// Parse a model reply into findings. The reply must contain a JSON array;
/// entries naming a fallacy outside the vocabulary, or carrying an unknown
/// severity, are dropped one by one.
fn parse_findings(text: &str) -> Result<Vec<FallacyFinding>, LlmError> {
    let json_str = extract_json_span(text.trim(), '[', ']')
        .ok_or_else(|| LlmError::InvalidResponse("no JSON array in reply".to_string()))?;
    let items: Vec<Value> =
        serde_json::from_str(json_str).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

    let findings = items
        .iter()
        .filter_map(|item| {
            let kind = item["type"].as_str()?.parse::<FallacyKind>().ok();
            let severity = item["severity"].as_str()?.parse::<Severity>().ok();
            match (kind, severity) {
                (Some(kind), Some(severity)) => Some(FallacyFinding {
                    kind,
                    description: item["description"].as_str().unwrap_or(kind.gloss()).to_string(),
                    severity,
                }),
                _ => {
                    debug!(item = %item, "dropping finding outside the vocabulary");
                    None
                }
            }
        })
        .collect();
    Ok(findings)
}

// ── Phrase rules ──

struct PatternRule {
    kind: FallacyKind,
    severity: Severity,
    phrases: &'static [&'static str],
    /// Extra raw patterns for shapes a phrase list can't express.
    patterns: &'static [&'static str],
}

const PATTERN_RULES: &[PatternRule] = &[
    PatternRule {
        kind: FallacyKind::AdHominem,
        severity: Severity::High,
        phrases: &["people like you", "you would say that", "coming from you"],
        patterns: &[
            r"(?i)\b(you|you're|your opponent|they)\s+(are\s+|is\s+)?(an?\s+)?(just\s+)?(idiot|idiots|stupid|ignorant|liar|liars|fool|fools|hypocrite|hypocrites|clueless|incompetent)\b",
        ],
    },
    PatternRule {
        kind: FallacyKind::StrawMan,
        severity: Severity::Medium,
        phrases: &[
            "so you're saying",
            "so you are saying",
            "so what you're saying",
            "so what you are saying",
            "you just want to",
            "you basically want",
        ],
        patterns: &[],
    },
    PatternRule {
        kind: FallacyKind::FalseDichotomy,
        severity: Severity::Medium,
        phrases: &[
            "only two options",
            "only two choices",
            "there is no other option",
            "there is no other choice",
            "there is no middle ground",
            "you're either with",
            "you are either with",
        ],
        patterns: &[r"(?i)\beither\s+we\b[^.?!]{1,80}\bor\s+we\b"],
    },
    PatternRule {
        kind: FallacyKind::AppealToAuthority,
        severity: Severity::Low,
        phrases: &[
            "experts say",
            "experts agree",
            "scientists say",
            "scientists agree",
            "authorities agree",
            "everyone knows",
        ],
        patterns: &[
            r"(?i)\b(?:a|one)\s+famous\s+(?:expert|scientist|doctor|professor|economist|philosopher)\s+(?:says|said|argues|argued|believes|believed)\b",
        ],
    },
    PatternRule {
        kind: FallacyKind::SlipperySlope,
        severity: Severity::Medium,
        phrases: &[
            "slippery slope",
            "next thing you know",
            "before you know it",
            "where does it end",
            "open the floodgates",
        ],
        patterns: &[r"(?i)\bwill\s+(inevitably|eventually|ultimately)\s+lead\s+to\b"],
    },
    PatternRule {
        kind: FallacyKind::HastyGeneralization,
        severity: Severity::Medium,
        phrases: &["all of them are", "they all are", "every single one of them"],
        patterns: &[
            r"(?i)\b(all|every)\s+(politicians|scientists|students|teachers|immigrants|kids|men|women|people|doctors|lawyers|activists)\s+(are|is)\b",
            r"(?i)\b(i|my)\s+(know|friend|cousin|uncle|aunt|neighbor|neighbour)\b[^.?!]{0,60}\bso\s+(all|every|everyone|nobody)\b",
        ],
    },
    PatternRule {
        kind: FallacyKind::RedHerring,
        severity: Severity::Low,
        phrases: &[
            "but what about",
            "that reminds me",
            "speaking of which",
            "let's not forget about",
            "the real issue is",
        ],
        patterns: &[],
    },
    PatternRule {
        kind: FallacyKind::CircularReasoning,
        severity: Severity::High,
        phrases: &["because it just is", "true by definition"],
        patterns: &[
            r"(?i)\b(is|are)\s+(true|right|wrong|good|bad)\s+because\s+(it|they)\s+(is|are)\s+(true|right|wrong|good|bad)\b",
        ],
    },
    PatternRule {
        kind: FallacyKind::AppealToEmotion,
        severity: Severity::Medium,
        phrases: &[
            "think of the children",
            "imagine how you would feel",
            "how would you feel if",
            "if you had a heart",
            "heartbreaking",
        ],
        patterns: &[],
    },
    PatternRule {
        kind: FallacyKind::FalseCause,
        severity: Severity::Medium,
        phrases: &["that proves it caused", "can't be a coincidence", "cannot be a coincidence"],
        patterns: &[
            r"(?i)\b(ever since|right after|shortly after|as soon as)\b[^.?!]{0,80}\b(started|began|increased|decreased|rose|fell|went up|went down|dropped|spiked)\b",
        ],
    },
];

struct CompiledPatternRule {
    kind: FallacyKind,
    severity: Severity,
    matchers: Vec<Regex>,
}

static COMPILED_RULES: LazyLock<Vec<CompiledPatternRule>> = LazyLock::new(|| {
    PATTERN_RULES
        .iter()
        .map(|rule| {
            let mut matchers = Vec::new();
            if !rule.phrases.is_empty() {
                matchers.push(marker_regex(rule.phrases));
            }
            for pattern in rule.patterns {
                matchers.push(Regex::new(pattern).expect("fallacy pattern is valid"));
            }
            CompiledPatternRule { kind: rule.kind, severity: rule.severity, matchers }
        })
        .collect()
});

/// Deterministic classifier: at most one finding per fallacy type, reported
/// in vocabulary order.
pub struct PatternClassifier;

impl PatternClassifier {
    pub fn classify(argument: &str) -> Vec<FallacyFinding> {
        COMPILED_RULES
            .iter()
            .filter_map(|rule| {
                let hit = rule.matchers.iter().find_map(|re| re.find(argument))?;
                Some(FallacyFinding {
                    kind: rule.kind,
                    description: format!(
                        "{}: \"{}\" suggests {}.",
                        rule.kind.label(),
                        hit.as_str(),
                        rule.kind.gloss()
                    ),
                    severity: rule.severity,
                })
            })
            .collect()
    }
}

#[async_trait]
impl FallacyClassifier for PatternClassifier {
    async fn detect(&self, argument: &str) -> Vec<FallacyFinding> {
        Self::classify(argument)
    }
}
