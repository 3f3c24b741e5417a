use crate::config::Config;
use crate::db_storage::LeadStore;
use crate::errors::AppError;
use crate::material_store::{self, MaterialStore};
use crate::models::{
    BudgetRange, DevelopmentStage, LeadContact, LeadTier, NewSubmission, ProjectType,
    QuestionnaireAnswers, Submission, SubmissionType, Timeline,
};
use crate::notifier::Notifier;
use crate::scoring::LeadScoringEngine;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const IDEA_MIN_CHARS: usize = 50;
pub const IDEA_MAX_CHARS: usize = 5000;

/// The questionnaire form: contact fields plus project answers.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionnaireSubmission {
    #[serde(flatten)]
    pub contact: LeadContact,
    #[serde(flatten)]
    pub answers: QuestionnaireAnswers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    UploadMaterial,
    SubmitIdea,
}

/// Response after questionnaire submission.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionnaireReceipt {
    pub lead_id: i64,
    pub score: u32,
    pub tier: LeadTier,
    pub message: String,
    pub next_step: NextStep,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionItem {
    pub value: String,
    pub label: String,
}

impl OptionItem {
    fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }

    /// Label derived from the value: `feature_film` -> `Feature Film`.
    fn titled(value: &str) -> Self {
        let label = value
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        Self::new(value, &label)
    }
}

/// Dropdown values for the questionnaire form.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionnaireOptions {
    pub project_types: Vec<OptionItem>,
    pub development_stages: Vec<OptionItem>,
    pub budget_ranges: Vec<OptionItem>,
    pub timelines: Vec<OptionItem>,
    pub services: Vec<OptionItem>,
}

fn budget_label(budget: BudgetRange) -> &'static str {
    match budget {
        BudgetRange::Micro => "Under $100K",
        BudgetRange::Low => "$100K - $500K",
        BudgetRange::Mid => "$500K - $2M",
        BudgetRange::High => "$2M - $10M",
        BudgetRange::Studio => "$10M+",
        BudgetRange::Undetermined | BudgetRange::Unrecognized => "Not Yet Determined",
    }
}

fn timeline_label(timeline: Timeline) -> &'static str {
    match timeline {
        Timeline::Immediate => "Ready to Start Now",
        Timeline::OneToThreeMonths => "1-3 Months",
        Timeline::ThreeToSixMonths => "3-6 Months",
        Timeline::SixPlusMonths => "6+ Months",
        Timeline::JustExploring | Timeline::Unrecognized => "Just Exploring Options",
    }
}

pub fn questionnaire_options() -> QuestionnaireOptions {
    QuestionnaireOptions {
        project_types: ProjectType::ALL
            .iter()
            .map(|p| OptionItem::titled(p.as_str()))
            .collect(),
        development_stages: DevelopmentStage::ALL
            .iter()
            .map(|d| OptionItem::titled(d.as_str()))
            .collect(),
        budget_ranges: BudgetRange::ALL
            .iter()
            .map(|b| OptionItem::new(b.as_str(), budget_label(*b)))
            .collect(),
        timelines: Timeline::ALL
            .iter()
            .map(|t| OptionItem::new(t.as_str(), timeline_label(*t)))
            .collect(),
        services: [
            ("script_coverage", "Script Coverage"),
            ("development_notes", "Development Notes"),
            ("packaging", "Packaging Assistance"),
            ("pitch_deck_review", "Pitch Deck Review"),
            ("market_analysis", "Market Analysis"),
            ("financing_strategy", "Financing Strategy"),
        ]
        .iter()
        .map(|(value, label)| OptionItem::new(value, label))
        .collect(),
    }
}

/// Checks an email address against a simplified RFC 5322 pattern.
pub fn is_valid_email(email: &str) -> Result<bool, AppError> {
    let email_regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .map_err(|e| AppError::InternalError(format!("Invalid email pattern: {}", e)))?;

    Ok(email_regex.is_match(email))
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::Validation(if min == 0 {
            format!("{} must be at most {} characters", field, max)
        } else {
            format!("{} must be between {} and {} characters", field, min, max)
        }));
    }
    Ok(())
}

fn check_optional_len(field: &str, value: &Option<String>, max: usize) -> Result<(), AppError> {
    match value {
        Some(v) => check_len(field, v, 0, max),
        None => Ok(()),
    }
}

fn check_recognized(field: &str, recognized: bool) -> Result<(), AppError> {
    if recognized {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid {}", field)))
    }
}

/// Normalizes and validates contact fields in place.
pub fn validate_contact(contact: &mut LeadContact) -> Result<(), AppError> {
    contact.email = contact.email.trim().to_lowercase();
    contact.first_name = contact.first_name.trim().to_string();
    contact.last_name = contact.last_name.trim().to_string();

    if !is_valid_email(&contact.email)? {
        tracing::warn!("❌ Invalid email format: {}", contact.email);
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    check_len("first_name", &contact.first_name, 1, 100)?;
    check_len("last_name", &contact.last_name, 1, 100)?;
    check_optional_len("phone", &contact.phone, 50)?;
    check_optional_len("company", &contact.company, 255)?;
    Ok(())
}

/// Validates the project answers.
pub fn validate_answers(answers: &QuestionnaireAnswers) -> Result<(), AppError> {
    check_recognized("project_type", answers.project_type.is_recognized())?;
    check_recognized("development_stage", answers.development_stage.is_recognized())?;
    check_recognized("budget_range", answers.budget_range.is_recognized())?;
    check_recognized("timeline", answers.timeline.is_recognized())?;

    check_optional_len("project_title", &answers.project_title, 255)?;
    check_optional_len("project_logline", &answers.project_logline, 500)?;
    check_optional_len("genre", &answers.genre, 100)?;

    if let Some(pct) = answers.financing_percentage {
        if !(0..=100).contains(&pct) {
            return Err(AppError::Validation(
                "financing_percentage must be between 0 and 100".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validates a free-text idea and returns it trimmed.
pub fn validate_idea(idea_description: &str) -> Result<String, AppError> {
    let idea = idea_description.trim();
    check_len("idea_description", idea, IDEA_MIN_CHARS, IDEA_MAX_CHARS)?;
    Ok(idea.to_string())
}

/// Stores the questionnaire, scores the lead and sends the welcome message.
///
/// The welcome message is best-effort; its failure never fails the submission.
pub async fn submit_questionnaire(
    store: &dyn LeadStore,
    engine: &LeadScoringEngine,
    notifier: &dyn Notifier,
    mut submission: QuestionnaireSubmission,
) -> Result<QuestionnaireReceipt, AppError> {
    validate_contact(&mut submission.contact)?;
    validate_answers(&submission.answers)?;

    let score = engine.calculate_score(&submission.answers);
    tracing::debug!(
        "Scored questionnaire for {}: {} ({:?})",
        submission.contact.email,
        score.total_score,
        score.breakdown
    );

    let (lead, _response) = store
        .save_questionnaire(&submission.contact, &submission.answers, &score)
        .await?;

    tracing::info!(
        "Questionnaire received for lead {} (score: {}, tier: {})",
        lead.id,
        score.total_score,
        score.tier
    );

    if let Err(e) = notifier.send_welcome(&lead).await {
        tracing::warn!("Failed to send welcome message to lead {}: {}", lead.id, e);
    }

    let (next_step, message) = if submission.answers.has_material {
        (
            NextStep::UploadMaterial,
            "Thank you! Please upload your material on the next page.",
        )
    } else {
        (
            NextStep::SubmitIdea,
            "Thank you! Please describe your idea on the next page.",
        )
    };

    Ok(QuestionnaireReceipt {
        lead_id: lead.id,
        score: score.total_score,
        tier: score.tier,
        message: message.to_string(),
        next_step,
    })
}

/// A material file received from the upload form.
#[derive(Debug, Clone)]
pub struct MaterialUpload {
    pub lead_id: i64,
    pub submission_type: String,
    pub original_filename: String,
    pub bytes: Vec<u8>,
}

async fn require_lead(store: &dyn LeadStore, lead_id: i64) -> Result<(), AppError> {
    match store.find_lead(lead_id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound("Lead not found".to_string())),
    }
}

/// Validates, stores and records an uploaded material file.
pub async fn accept_material(
    store: &dyn LeadStore,
    materials: &dyn MaterialStore,
    config: &Config,
    upload: MaterialUpload,
) -> Result<Submission, AppError> {
    require_lead(store, upload.lead_id).await?;

    let submission_type = SubmissionType::from(upload.submission_type.as_str());
    if !submission_type.accepts_upload() {
        return Err(AppError::Validation(
            "Invalid submission type. Must be one of: script, treatment, pitch_deck, other"
                .to_string(),
        ));
    }

    let mime_type = material_store::check_material(
        &upload.bytes,
        &upload.original_filename,
        config.max_file_size_bytes(),
        config.max_file_size_mb,
        &config.allowed_file_types,
    )?;

    let stored_filename = material_store::stored_filename(
        upload.lead_id,
        submission_type,
        &upload.original_filename,
    );
    let file_path = materials.save(&stored_filename, &upload.bytes).await?;

    let inserted = store
        .insert_submission(&NewSubmission {
            lead_id: upload.lead_id,
            submission_type,
            original_filename: Some(upload.original_filename),
            stored_filename: Some(stored_filename),
            file_path: Some(file_path.clone()),
            file_size_bytes: upload.bytes.len() as i64,
            mime_type: mime_type.to_string(),
            idea_description: None,
        })
        .await;

    // No row points at the file once the insert fails
    let submission = match inserted {
        Ok(submission) => submission,
        Err(e) => {
            if let Err(cleanup) = materials.remove(&file_path).await {
                tracing::warn!("Failed to remove orphaned material {}: {}", file_path, cleanup);
            }
            return Err(e);
        }
    };

    tracing::info!(
        "Material uploaded for lead {} (submission: {}, type: {}, {} bytes, {})",
        submission.lead_id,
        submission.id,
        submission.submission_type,
        submission.file_size_bytes,
        submission.mime_type
    );

    Ok(submission)
}

/// Records a free-text idea as a submission of type `idea`.
pub async fn accept_idea(
    store: &dyn LeadStore,
    lead_id: i64,
    idea_description: &str,
) -> Result<Submission, AppError> {
    require_lead(store, lead_id).await?;
    let idea = validate_idea(idea_description)?;

    let submission = store
        .insert_submission(&NewSubmission {
            lead_id,
            submission_type: SubmissionType::Idea,
            original_filename: None,
            stored_filename: None,
            file_path: None,
            file_size_bytes: 0,
            mime_type: material_store::TEXT.to_string(),
            idea_description: Some(idea),
        })
        .await?;

    tracing::info!("Idea submitted for lead {} (submission: {})", lead_id, submission.id);
    Ok(submission)
}
