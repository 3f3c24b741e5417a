//! Lead scoring engine.
//!
//! Maps a questionnaire response to a score in `0..=100` and a [`LeadTier`].
//! Scoring is a pure function of the answers and a [`ScoringConfig`]; it does
//! no I/O and never fails.
//!
//! | category             | max | driven by                                 |
//! |----------------------|-----|-------------------------------------------|
//! | `budget`             | 30  | budget range, financing bonus             |
//! | `timeline`           | 20  | timeline                                  |
//! | `material_readiness` | 25  | development stage, material bonus         |
//! | `project_type`       | 15  | project type                              |
//! | `experience`         | 10  | previous credits                          |

use crate::models::{BudgetRange, DevelopmentStage, LeadTier, ProjectType, QuestionnaireAnswers, Timeline};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const MAX_SCORE: u32 = 100;

/// Per-category point caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryCaps {
    pub budget: u32,
    pub timeline: u32,
    pub material_readiness: u32,
    pub project_type: u32,
    pub experience: u32,
}

impl CategoryCaps {
    pub fn sum(&self) -> u32 {
        self.budget + self.timeline + self.material_readiness + self.project_type + self.experience
    }
}

/// Minimum total score for each tier. Anything below `cold` is unqualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierThresholds {
    pub hot: u32,
    pub warm: u32,
    pub cold: u32,
}

/// Weight tables and thresholds used by [`LeadScoringEngine`].
///
/// Lookups for a value missing from a table score 0, so new enum values never
/// break scoring. Keep `caps.sum() <= MAX_SCORE`; otherwise the total clamp
/// can make the breakdown disagree with the total.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub budget: HashMap<BudgetRange, u32>,
    pub timeline: HashMap<Timeline, u32>,
    pub development_stage: HashMap<DevelopmentStage, u32>,
    pub project_type: HashMap<ProjectType, u32>,
    /// Financing bonus is `financing_percentage / financing_step`, capped at `financing_bonus_cap`.
    pub financing_step: u32,
    pub financing_bonus_cap: u32,
    pub material_bonus: u32,
    pub experience_with_credits: u32,
    pub experience_without_credits: u32,
    pub caps: CategoryCaps,
    pub thresholds: TierThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            budget: HashMap::from([
                (BudgetRange::Studio, 30),
                (BudgetRange::High, 25),
                (BudgetRange::Mid, 20),
                (BudgetRange::Low, 12),
                (BudgetRange::Micro, 5),
                (BudgetRange::Undetermined, 3),
            ]),
            timeline: HashMap::from([
                (Timeline::Immediate, 20),
                (Timeline::OneToThreeMonths, 15),
                (Timeline::ThreeToSixMonths, 10),
                (Timeline::SixPlusMonths, 5),
                (Timeline::JustExploring, 2),
            ]),
            development_stage: HashMap::from([
                (DevelopmentStage::PackageReady, 25),
                (DevelopmentStage::Financing, 22),
                (DevelopmentStage::ScriptComplete, 20),
                (DevelopmentStage::PreProduction, 18),
                (DevelopmentStage::ScriptInProgress, 12),
                (DevelopmentStage::Treatment, 8),
                (DevelopmentStage::IdeaOnly, 3),
            ]),
            project_type: HashMap::from([
                (ProjectType::FeatureFilm, 15),
                (ProjectType::TvSeries, 14),
                (ProjectType::TvPilot, 12),
                (ProjectType::Documentary, 10),
                (ProjectType::Other, 8),
                (ProjectType::WebSeries, 6),
                (ProjectType::ShortFilm, 5),
            ]),
            financing_step: 20,
            financing_bonus_cap: 5,
            material_bonus: 3,
            experience_with_credits: 10,
            experience_without_credits: 3,
            caps: CategoryCaps {
                budget: 30,
                timeline: 20,
                material_readiness: 25,
                project_type: 15,
                experience: 10,
            },
            thresholds: TierThresholds {
                hot: 70,
                warm: 45,
                cold: 20,
            },
        }
    }
}

/// Points contributed by each category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub budget: u32,
    pub timeline: u32,
    pub material_readiness: u32,
    pub project_type: u32,
    pub experience: u32,
}

impl ScoreBreakdown {
    pub fn sum(&self) -> u32 {
        self.budget + self.timeline + self.material_readiness + self.project_type + self.experience
    }

    /// `(category, points)` pairs in display order.
    pub fn entries(&self) -> [(&'static str, u32); 5] {
        [
            ("budget", self.budget),
            ("timeline", self.timeline),
            ("material_readiness", self.material_readiness),
            ("project_type", self.project_type),
            ("experience", self.experience),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeadScoreResult {
    pub total_score: u32,
    pub tier: LeadTier,
    pub breakdown: ScoreBreakdown,
}

/// One category of [`ScoringCriteria`].
#[derive(Debug, Clone, Serialize)]
pub struct CategoryCriteria {
    pub max_points: u32,
    pub description: &'static str,
}

/// Static description of the scoring rules for admin display.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringCriteria {
    pub max_score: u32,
    pub categories: BTreeMap<&'static str, CategoryCriteria>,
    pub tiers: BTreeMap<&'static str, String>,
}

impl LeadTier {
    /// Ordering key: hot > warm > cold > unqualified.
    pub fn rank(&self) -> u8 {
        match self {
            LeadTier::Hot => 3,
            LeadTier::Warm => 2,
            LeadTier::Cold => 1,
            LeadTier::Unqualified | LeadTier::Unrecognized => 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeadScoringEngine {
    config: ScoringConfig,
}

impl LeadScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Scores one questionnaire response.
    pub fn calculate_score(&self, answers: &QuestionnaireAnswers) -> LeadScoreResult {
        let cfg = &self.config;

        let mut budget = lookup(&cfg.budget, &answers.budget_range);
        if answers.has_financing {
            let percentage = answers.financing_percentage.unwrap_or(0).clamp(0, 100) as u32;
            let bonus = (percentage / cfg.financing_step.max(1)).min(cfg.financing_bonus_cap);
            budget += bonus;
        }

        let mut material = lookup(&cfg.development_stage, &answers.development_stage);
        if answers.has_material {
            material += cfg.material_bonus;
        }

        let experience = if answers.previous_credits {
            cfg.experience_with_credits
        } else {
            cfg.experience_without_credits
        };

        let breakdown = ScoreBreakdown {
            budget: budget.min(cfg.caps.budget),
            timeline: lookup(&cfg.timeline, &answers.timeline).min(cfg.caps.timeline),
            material_readiness: material.min(cfg.caps.material_readiness),
            project_type: lookup(&cfg.project_type, &answers.project_type)
                .min(cfg.caps.project_type),
            experience: experience.min(cfg.caps.experience),
        };

        let total_score = breakdown.sum().min(MAX_SCORE);

        LeadScoreResult {
            total_score,
            tier: self.determine_tier(total_score),
            breakdown,
        }
    }

    pub fn determine_tier(&self, score: u32) -> LeadTier {
        let t = &self.config.thresholds;
        if score >= t.hot {
            LeadTier::Hot
        } else if score >= t.warm {
            LeadTier::Warm
        } else if score >= t.cold {
            LeadTier::Cold
        } else {
            LeadTier::Unqualified
        }
    }

    /// Serializes the category caps and tier cutoffs. Reads no live data.
    pub fn describe_criteria(&self) -> ScoringCriteria {
        let caps = &self.config.caps;
        let t = &self.config.thresholds;

        let categories = BTreeMap::from([
            (
                "budget",
                CategoryCriteria {
                    max_points: caps.budget,
                    description: "Financial capacity based on budget range and existing financing",
                },
            ),
            (
                "timeline",
                CategoryCriteria {
                    max_points: caps.timeline,
                    description: "How soon they need services",
                },
            ),
            (
                "material_readiness",
                CategoryCriteria {
                    max_points: caps.material_readiness,
                    description: "Development stage and whether they have materials",
                },
            ),
            (
                "project_type",
                CategoryCriteria {
                    max_points: caps.project_type,
                    description: "Type of project (feature, TV, etc.)",
                },
            ),
            (
                "experience",
                CategoryCriteria {
                    max_points: caps.experience,
                    description: "Previous credits and industry experience",
                },
            ),
        ]);

        let tiers = BTreeMap::from([
            (LeadTier::Hot.as_str(), format!("Score {}+", t.hot)),
            (
                LeadTier::Warm.as_str(),
                format!("Score {}-{}", t.warm, t.hot.saturating_sub(1)),
            ),
            (
                LeadTier::Cold.as_str(),
                format!("Score {}-{}", t.cold, t.warm.saturating_sub(1)),
            ),
            (
                LeadTier::Unqualified.as_str(),
                format!("Score below {}", t.cold),
            ),
        ]);

        ScoringCriteria {
            max_score: MAX_SCORE,
            categories,
            tiers,
        }
    }
}

fn lookup<K: std::hash::Hash + Eq>(table: &HashMap<K, u32>, key: &K) -> u32 {
    table.get(key).copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers() -> QuestionnaireAnswers {
        QuestionnaireAnswers {
            project_type: ProjectType::ShortFilm,
            project_title: None,
            project_logline: None,
            genre: None,
            development_stage: DevelopmentStage::IdeaOnly,
            has_material: false,
            material_types: None,
            budget_range: BudgetRange::Mid,
            has_financing: false,
            financing_percentage: None,
            timeline: Timeline::JustExploring,
            services_needed: None,
            previous_credits: false,
            credits_description: None,
            how_did_you_hear: None,
            additional_notes: None,
        }
    }

    #[test]
    fn test_tier_boundaries() {
        let engine = LeadScoringEngine::default();
        assert_eq!(engine.determine_tier(100), LeadTier::Hot);
        assert_eq!(engine.determine_tier(70), LeadTier::Hot);
        assert_eq!(engine.determine_tier(69), LeadTier::Warm);
        assert_eq!(engine.determine_tier(45), LeadTier::Warm);
        assert_eq!(engine.determine_tier(44), LeadTier::Cold);
        assert_eq!(engine.determine_tier(20), LeadTier::Cold);
        assert_eq!(engine.determine_tier(19), LeadTier::Unqualified);
        assert_eq!(engine.determine_tier(0), LeadTier::Unqualified);
    }

    #[test]
    fn test_financing_bonus() {
        let engine = LeadScoringEngine::default();
        let mut a = answers();
        a.has_financing = true;

        a.financing_percentage = Some(100);
        assert_eq!(engine.calculate_score(&a).breakdown.budget, 25);

        a.financing_percentage = Some(0);
        assert_eq!(engine.calculate_score(&a).breakdown.budget, 20);

        a.financing_percentage = None;
        assert_eq!(engine.calculate_score(&a).breakdown.budget, 20);

        a.financing_percentage = Some(59);
        assert_eq!(engine.calculate_score(&a).breakdown.budget, 22);
    }

    #[test]
    fn test_financing_ignored_without_flag() {
        let engine = LeadScoringEngine::default();
        let mut a = answers();
        a.financing_percentage = Some(100);
        assert_eq!(engine.calculate_score(&a).breakdown.budget, 20);
    }

    #[test]
    fn test_budget_clamped_to_cap() {
        let engine = LeadScoringEngine::default();
        let mut a = answers();
        a.budget_range = BudgetRange::Studio;
        a.has_financing = true;
        a.financing_percentage = Some(100);
        assert_eq!(engine.calculate_score(&a).breakdown.budget, 30);
    }

    #[test]
    fn test_material_bonus() {
        let engine = LeadScoringEngine::default();
        let mut a = answers();
        a.has_material = true;
        assert_eq!(engine.calculate_score(&a).breakdown.material_readiness, 6);

        a.development_stage = DevelopmentStage::PackageReady;
        assert_eq!(engine.calculate_score(&a).breakdown.material_readiness, 25);
    }

    #[test]
    fn test_experience_is_binary() {
        let engine = LeadScoringEngine::default();
        let mut a = answers();
        assert_eq!(engine.calculate_score(&a).breakdown.experience, 3);
        a.previous_credits = true;
        assert_eq!(engine.calculate_score(&a).breakdown.experience, 10);
    }

    #[test]
    fn test_full_profile_scores_hot() {
        let engine = LeadScoringEngine::default();
        let a = QuestionnaireAnswers {
            budget_range: BudgetRange::Studio,
            has_financing: true,
            financing_percentage: Some(60),
            timeline: Timeline::Immediate,
            development_stage: DevelopmentStage::ScriptComplete,
            has_material: true,
            project_type: ProjectType::FeatureFilm,
            previous_credits: true,
            ..answers()
        };

        let result = engine.calculate_score(&a);
        assert_eq!(
            result.breakdown,
            ScoreBreakdown {
                budget: 30,
                timeline: 20,
                material_readiness: 23,
                project_type: 15,
                experience: 10,
            }
        );
        assert_eq!(result.total_score, 98);
        assert_eq!(result.tier, LeadTier::Hot);
    }

    #[test]
    fn test_minimal_profile_is_unqualified() {
        let engine = LeadScoringEngine::default();
        let a = QuestionnaireAnswers {
            budget_range: BudgetRange::Undetermined,
            timeline: Timeline::JustExploring,
            ..answers()
        };
        // 3 + 2 + 3 + 5 + 3
        let result = engine.calculate_score(&a);
        assert_eq!(result.total_score, 16);
        assert_eq!(result.tier, LeadTier::Unqualified);
    }

    #[test]
    fn test_unrecognized_values_score_zero() {
        let engine = LeadScoringEngine::default();
        let a = QuestionnaireAnswers {
            budget_range: BudgetRange::Unrecognized,
            timeline: Timeline::Unrecognized,
            development_stage: DevelopmentStage::Unrecognized,
            project_type: ProjectType::Unrecognized,
            ..answers()
        };
        let result = engine.calculate_score(&a);
        assert_eq!(result.breakdown.budget, 0);
        assert_eq!(result.breakdown.timeline, 0);
        assert_eq!(result.breakdown.material_readiness, 0);
        assert_eq!(result.breakdown.project_type, 0);
        assert_eq!(result.total_score, 3);
    }

    #[test]
    fn test_alternate_tables() {
        let mut config = ScoringConfig::default();
        config.timeline.remove(&Timeline::JustExploring);
        config.thresholds = TierThresholds {
            hot: 30,
            warm: 20,
            cold: 10,
        };
        let engine = LeadScoringEngine::new(config);

        let result = engine.calculate_score(&answers());
        assert_eq!(result.breakdown.timeline, 0);
        // 20 + 0 + 3 + 5 + 3
        assert_eq!(result.total_score, 31);
        assert_eq!(result.tier, LeadTier::Hot);
    }

    #[test]
    fn test_default_caps_fit_max_score() {
        assert!(ScoringConfig::default().caps.sum() <= MAX_SCORE);
    }

    #[test]
    fn test_describe_criteria() {
        let criteria = LeadScoringEngine::default().describe_criteria();
        assert_eq!(criteria.max_score, 100);
        assert_eq!(criteria.categories["budget"].max_points, 30);
        assert_eq!(criteria.categories["material_readiness"].max_points, 25);
        assert_eq!(criteria.tiers["hot"], "Score 70+");
        assert_eq!(criteria.tiers["warm"], "Score 45-69");
        assert_eq!(criteria.tiers["cold"], "Score 20-44");
        assert_eq!(criteria.tiers["unqualified"], "Score below 20");
    }

    #[test]
    fn test_tier_rank_order() {
        assert!(LeadTier::Hot.rank() > LeadTier::Warm.rank());
        assert!(LeadTier::Warm.rank() > LeadTier::Cold.rank());
        assert!(LeadTier::Cold.rank() > LeadTier::Unqualified.rank());
    }
}
