use crate::db::{AverageScores, UserAnalytics};
use serde::{Deserialize, Serialize};

/// Trailing window, in days, used for progress reports.
pub const ANALYTICS_WINDOW_DAYS: i64 = 30;

/// Averages below this earn a targeted tip.
const TIP_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl SkillLevel {
    pub fn from_overall(average_overall: f64) -> SkillLevel {
        if average_overall > 80.0 {
            SkillLevel::Expert
        } else if average_overall > 60.0 {
            SkillLevel::Advanced
        } else if average_overall > 40.0 {
            SkillLevel::Intermediate
        } else {
            SkillLevel::Beginner
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "Beginner",
            SkillLevel::Intermediate => "Intermediate",
            SkillLevel::Advanced => "Advanced",
            SkillLevel::Expert => "Expert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
    pub title: String,
    pub detail: String,
}

impl Tip {
    fn new(title: &str, detail: &str) -> Self {
        Self { title: title.to_string(), detail: detail.to_string() }
    }
}

pub fn tips(averages: &AverageScores) -> Vec<Tip> {
    let mut tips = Vec::new();
    if averages.evidence < TIP_THRESHOLD {
        tips.push(Tip::new(
            "Strengthen Your Evidence",
            "Back up your claims with credible sources and data to improve your evidence score",
        ));
    }
    if averages.logic < TIP_THRESHOLD {
        tips.push(Tip::new(
            "Watch for Logical Fallacies",
            "Review common fallacies and practice identifying them in your arguments",
        ));
    }
    if averages.clarity < TIP_THRESHOLD {
        tips.push(Tip::new(
            "Improve Clarity",
            "Structure your arguments more clearly with topic sentences and supporting points",
        ));
    }
    if tips.is_empty() {
        tips.push(Tip::new(
            "Keep Up the Great Work!",
            "Your scores are strong. Challenge yourself with more complex topics and tougher opponents",
        ));
    }
    tips
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub window_days: i64,
    #[serde(flatten)]
    pub analytics: UserAnalytics,
    pub skill_level: SkillLevel,
    pub tips: Vec<Tip>,
}

impl ProgressReport {
    pub fn from_analytics(analytics: UserAnalytics, window_days: i64) -> Self {
        let skill_level = SkillLevel::from_overall(analytics.average_scores.overall);
        let tips = tips(&analytics.average_scores);
        Self { window_days, analytics, skill_level, tips }
    }

    /// One-line summary for terminal output.
    pub fn headline(&self) -> String {
        format!(
            "{} | average overall {:.1} over the last {} days | {} debates, {} turns with fallacies",
            self.skill_level.label(),
            self.analytics.average_scores.overall,
            self.window_days,
            self.analytics.total_debates,
            self.analytics.total_fallacies,
        )
    }
}
