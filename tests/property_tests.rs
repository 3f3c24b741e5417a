/// Property-based tests using proptest
/// Tests invariants of the scoring engine that should hold for all inputs
use pitchdeck_leads_api::models::{
    BudgetRange, DevelopmentStage, LeadTier, ProjectType, QuestionnaireAnswers, Timeline,
};
use pitchdeck_leads_api::scoring::{LeadScoringEngine, ScoringConfig, MAX_SCORE};
use proptest::prelude::*;
use proptest::sample::select;

fn with_unknown<T: Copy>(all: &[T], unknown: T) -> Vec<T> {
    let mut values = all.to_vec();
    values.push(unknown);
    values
}

fn answers_strategy() -> impl Strategy<Value = QuestionnaireAnswers> {
    (
        select(with_unknown(ProjectType::ALL, ProjectType::Unrecognized)),
        select(with_unknown(DevelopmentStage::ALL, DevelopmentStage::Unrecognized)),
        select(with_unknown(BudgetRange::ALL, BudgetRange::Unrecognized)),
        select(with_unknown(Timeline::ALL, Timeline::Unrecognized)),
        any::<bool>(),
        any::<bool>(),
        proptest::option::of(-50i32..=150),
        any::<bool>(),
    )
        .prop_map(
            |(
                project_type,
                development_stage,
                budget_range,
                timeline,
                has_material,
                has_financing,
                financing_percentage,
                previous_credits,
            )| QuestionnaireAnswers {
                project_type,
                project_title: None,
                project_logline: None,
                genre: None,
                development_stage,
                has_material,
                material_types: None,
                budget_range,
                has_financing,
                financing_percentage,
                timeline,
                services_needed: None,
                previous_credits,
                credits_description: None,
                how_did_you_hear: None,
                additional_notes: None,
            },
        )
}

// Property: score and breakdown stay within their caps
proptest! {
    #[test]
    fn score_is_bounded_and_components_capped(answers in answers_strategy()) {
        let engine = LeadScoringEngine::default();
        let caps = engine.config().caps;
        let result = engine.calculate_score(&answers);

        prop_assert!(result.total_score <= MAX_SCORE);
        prop_assert!(result.breakdown.budget <= caps.budget);
        prop_assert!(result.breakdown.timeline <= caps.timeline);
        prop_assert!(result.breakdown.material_readiness <= caps.material_readiness);
        prop_assert!(result.breakdown.project_type <= caps.project_type);
        prop_assert!(result.breakdown.experience <= caps.experience);
        // Default tables never need the total clamp
        prop_assert_eq!(result.total_score, result.breakdown.sum());
    }

    #[test]
    fn scoring_is_deterministic(answers in answers_strategy()) {
        let engine = LeadScoringEngine::default();
        prop_assert_eq!(engine.calculate_score(&answers), engine.calculate_score(&answers));
    }

    #[test]
    fn tier_matches_thresholds(answers in answers_strategy()) {
        let engine = LeadScoringEngine::default();
        let result = engine.calculate_score(&answers);
        let expected = match result.total_score {
            70..=100 => LeadTier::Hot,
            45..=69 => LeadTier::Warm,
            20..=44 => LeadTier::Cold,
            _ => LeadTier::Unqualified,
        };
        prop_assert_eq!(result.tier, expected);
    }

    #[test]
    fn financing_never_lowers_budget(mut answers in answers_strategy()) {
        let engine = LeadScoringEngine::default();
        answers.has_financing = false;
        let without = engine.calculate_score(&answers).breakdown.budget;
        answers.has_financing = true;
        let with = engine.calculate_score(&answers).breakdown.budget;
        prop_assert!(with >= without);
        prop_assert!(with - without <= 5);
    }
}

// Property: tier assignment is monotonic in the score
proptest! {
    #[test]
    fn tier_is_monotonic(a in 0u32..=100, b in 0u32..=100) {
        let engine = LeadScoringEngine::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(engine.determine_tier(low).rank() <= engine.determine_tier(high).rank());
    }

    #[test]
    fn inflated_tables_still_clamp_total(answers in answers_strategy()) {
        let mut config = ScoringConfig::default();
        config.caps.budget = 60;
        config.caps.timeline = 60;
        config.budget.insert(BudgetRange::Studio, 60);
        config.timeline.insert(Timeline::Immediate, 60);
        let engine = LeadScoringEngine::new(config);
        prop_assert!(engine.calculate_score(&answers).total_score <= MAX_SCORE);
    }
}

// Property: enum decoding never panics and unknown text maps to Unrecognized
proptest! {
    #[test]
    fn enum_decoding_never_panics(text in "\\PC*") {
        let tier = LeadTier::from(text.as_str());
        if !LeadTier::ALL.iter().any(|t| t.as_str() == text) {
            prop_assert_eq!(tier, LeadTier::Unrecognized);
        }
        let json = serde_json::to_string(&text).unwrap();
        let decoded: Result<Timeline, _> = serde_json::from_str(&json);
        prop_assert!(decoded.is_ok());
    }
}
