/// Intake and lead administration tests against the in-memory store
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pitchdeck_leads_api::config::{Config, DEFAULT_ALLOWED_FILE_TYPES};
use pitchdeck_leads_api::db_storage::LeadStore;
use pitchdeck_leads_api::errors::AppError;
use pitchdeck_leads_api::intake::{
    accept_idea, accept_material, submit_questionnaire, MaterialUpload, NextStep,
    QuestionnaireSubmission,
};
use pitchdeck_leads_api::material_store::LocalMaterialStore;
use pitchdeck_leads_api::memory_store::InMemoryLeadStore;
use pitchdeck_leads_api::models::{
    AnalysisResult, BudgetRange, DevelopmentStage, Lead, LeadContact, LeadFilter, LeadPage,
    LeadStats, LeadStatus, LeadTier, NewAnalysisResult, NewSubmission, ProjectType,
    QuestionnaireAnswers, QuestionnaireResponse, Submission, SubmissionType, Timeline,
};
use pitchdeck_leads_api::notifier::{Delivery, DisabledNotifier, Notifier};
use pitchdeck_leads_api::scoring::{LeadScoreResult, LeadScoringEngine};

/// Helper function to create a test config
fn create_test_config(upload_dir: &str) -> Config {
    Config {
        database_url: "postgres://localhost/test".to_string(),
        port: 8000,
        cors_origins: vec!["http://localhost:3000".to_string()],
        upload_dir: upload_dir.to_string(),
        max_file_size_mb: 1,
        allowed_file_types: DEFAULT_ALLOWED_FILE_TYPES
            .iter()
            .map(|t| t.to_string())
            .collect(),
        analysis_service_url: "http://localhost:8001/analyze".to_string(),
        analysis_health_url: "http://localhost:8001/health".to_string(),
        analysis_api_key: None,
        analysis_timeout_secs: 30,
        analysis_claim_ttl_secs: 600,
        mail_relay_url: None,
        mail_relay_api_key: None,
        mail_from: "noreply@pitchdecks.com".to_string(),
    }
}

fn temp_upload_dir() -> String {
    std::env::temp_dir()
        .join(format!("pitchdeck-intake-{}", uuid::Uuid::new_v4().simple()))
        .to_string_lossy()
        .into_owned()
}

/// Fails every notification.
struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn send_welcome(&self, _lead: &Lead) -> Result<Delivery, AppError> {
        Err(AppError::ExternalApiError("relay down".to_string()))
    }

    async fn send_analysis_results(
        &self,
        _lead: &Lead,
        _analysis: &AnalysisResult,
    ) -> Result<Delivery, AppError> {
        Err(AppError::ExternalApiError("relay down".to_string()))
    }
}

fn hot_submission(email: &str) -> QuestionnaireSubmission {
    QuestionnaireSubmission {
        contact: LeadContact {
            email: email.to_string(),
            first_name: "Marta".to_string(),
            last_name: "Reyes".to_string(),
            company: Some("Northlight Pictures".to_string()),
            utm_source: Some("newsletter".to_string()),
            ..LeadContact::default()
        },
        answers: QuestionnaireAnswers {
            project_type: ProjectType::FeatureFilm,
            project_title: Some("Low Tide".to_string()),
            project_logline: None,
            genre: Some("drama".to_string()),
            development_stage: DevelopmentStage::ScriptComplete,
            has_material: true,
            material_types: None,
            budget_range: BudgetRange::Studio,
            has_financing: true,
            financing_percentage: Some(60),
            timeline: Timeline::Immediate,
            services_needed: None,
            previous_credits: true,
            credits_description: None,
            how_did_you_hear: None,
            additional_notes: None,
        },
    }
}

fn cold_submission(email: &str) -> QuestionnaireSubmission {
    let mut submission = hot_submission(email);
    submission.answers.has_material = false;
    submission.answers.has_financing = false;
    submission.answers.financing_percentage = None;
    submission.answers.budget_range = BudgetRange::Micro;
    submission.answers.timeline = Timeline::JustExploring;
    submission.answers.development_stage = DevelopmentStage::IdeaOnly;
    submission.answers.project_type = ProjectType::ShortFilm;
    submission.answers.previous_credits = false;
    submission
}

#[tokio::test]
async fn test_questionnaire_scores_and_stores_hot_lead() {
    let store = InMemoryLeadStore::new();
    let engine = LeadScoringEngine::default();

    let receipt = submit_questionnaire(
        &store,
        &engine,
        &DisabledNotifier,
        hot_submission("  Marta@Northlight.COM "),
    )
    .await
    .unwrap();

    assert_eq!(receipt.score, 98);
    assert_eq!(receipt.tier, LeadTier::Hot);
    assert_eq!(receipt.next_step, NextStep::UploadMaterial);
    assert_eq!(
        receipt.message,
        "Thank you! Please upload your material on the next page."
    );

    let lead = store.find_lead(receipt.lead_id).await.unwrap().unwrap();
    assert_eq!(lead.email, "marta@northlight.com");
    assert_eq!(lead.score, 98);
    assert_eq!(lead.tier, LeadTier::Hot);
    assert_eq!(lead.status, LeadStatus::New);

    let questionnaire = store
        .find_questionnaire(receipt.lead_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(questionnaire.answers.financing_percentage, Some(60));
}

#[tokio::test]
async fn test_resubmission_replaces_questionnaire_and_keeps_attribution() {
    let store = InMemoryLeadStore::new();
    let engine = LeadScoringEngine::default();

    let first = submit_questionnaire(&store, &engine, &DisabledNotifier, hot_submission("marta@northlight.com"))
        .await
        .unwrap();

    let mut again = cold_submission("marta@northlight.com");
    again.contact.utm_source = Some("paid_search".to_string());
    let second = submit_questionnaire(&store, &engine, &DisabledNotifier, again)
        .await
        .unwrap();

    assert_eq!(first.lead_id, second.lead_id);
    assert_eq!(second.next_step, NextStep::SubmitIdea);
    assert!(second.score < first.score);

    let lead = store.find_lead(second.lead_id).await.unwrap().unwrap();
    assert_eq!(lead.score as u32, second.score);
    assert_eq!(lead.tier, second.tier);
    assert_eq!(lead.utm_source.as_deref(), Some("newsletter"));

    let questionnaire = store
        .find_questionnaire(second.lead_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(questionnaire.answers.budget_range, BudgetRange::Micro);
    assert_eq!(store.list_leads(&LeadFilter::default()).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_invalid_email_stores_nothing() {
    let store = InMemoryLeadStore::new();
    let err = submit_questionnaire(
        &store,
        &LeadScoringEngine::default(),
        &DisabledNotifier,
        hot_submission("not-an-email"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(store.list_leads(&LeadFilter::default()).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_unrecognized_answer_is_rejected() {
    let store = InMemoryLeadStore::new();
    let mut submission = hot_submission("odd@example.com");
    submission.answers.timeline = Timeline::Unrecognized;

    let err = submit_questionnaire(&store, &LeadScoringEngine::default(), &DisabledNotifier, submission)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_welcome_failure_does_not_fail_submission() {
    let store = InMemoryLeadStore::new();
    let receipt = submit_questionnaire(
        &store,
        &LeadScoringEngine::default(),
        &BrokenNotifier,
        cold_submission("quiet@example.com"),
    )
    .await
    .unwrap();

    assert!(store.find_lead(receipt.lead_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_material_upload_validation() {
    let store = InMemoryLeadStore::new();
    let upload_dir = temp_upload_dir();
    let config = create_test_config(&upload_dir);
    let materials = LocalMaterialStore::new(&upload_dir);
    let receipt = submit_questionnaire(
        &store,
        &LeadScoringEngine::default(),
        &DisabledNotifier,
        hot_submission("marta@northlight.com"),
    )
    .await
    .unwrap();

    let upload = |lead_id: i64, kind: &str, bytes: Vec<u8>| MaterialUpload {
        lead_id,
        submission_type: kind.to_string(),
        original_filename: "Low Tide.pdf".to_string(),
        bytes,
    };

    let err = accept_material(&store, &materials, &config, upload(999, "script", b"%PDF-1.4".to_vec()))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = accept_material(&store, &materials, &config, upload(receipt.lead_id, "idea", b"%PDF-1.4".to_vec()))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Validation error: Invalid submission type. Must be one of: script, treatment, pitch_deck, other"
    );

    let oversized = vec![b'a'; 1024 * 1024 + 1];
    let err = accept_material(&store, &materials, &config, upload(receipt.lead_id, "script", oversized))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Validation error: File too large. Maximum size is 1MB");

    let err = accept_material(&store, &materials, &config, upload(receipt.lead_id, "script", vec![0x00, 0xFF, 0x13]))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Validation error: File type not allowed: application/octet-stream"
    );

    assert!(store.list_submissions(receipt.lead_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_material_upload_is_stored() {
    let store = InMemoryLeadStore::new();
    let upload_dir = temp_upload_dir();
    let config = create_test_config(&upload_dir);
    let materials = LocalMaterialStore::new(&upload_dir);
    let receipt = submit_questionnaire(
        &store,
        &LeadScoringEngine::default(),
        &DisabledNotifier,
        hot_submission("marta@northlight.com"),
    )
    .await
    .unwrap();

    let bytes = b"%PDF-1.4 low tide deck".to_vec();
    let submission = accept_material(
        &store,
        &materials,
        &config,
        MaterialUpload {
            lead_id: receipt.lead_id,
            submission_type: "pitch_deck".to_string(),
            original_filename: "Low Tide.PDF".to_string(),
            bytes: bytes.clone(),
        },
    )
    .await
    .unwrap();

    assert_eq!(submission.submission_type, SubmissionType::PitchDeck);
    assert_eq!(submission.mime_type, "application/pdf");
    assert_eq!(submission.file_size_bytes, bytes.len() as i64);
    assert_eq!(submission.original_filename.as_deref(), Some("Low Tide.PDF"));
    assert!(!submission.is_processed);

    let stored_name = submission.stored_filename.clone().unwrap();
    assert!(stored_name.starts_with(&format!("{}_pitch_deck_", receipt.lead_id)));
    assert!(stored_name.ends_with(".pdf"));

    let path = submission.file_path.clone().unwrap();
    assert_eq!(tokio::fs::read(&path).await.unwrap(), bytes);
}

#[tokio::test]
async fn test_idea_submission() {
    let store = InMemoryLeadStore::new();
    let receipt = submit_questionnaire(
        &store,
        &LeadScoringEngine::default(),
        &DisabledNotifier,
        cold_submission("ideas@example.com"),
    )
    .await
    .unwrap();

    let err = accept_idea(&store, receipt.lead_id, "Too short to pitch.")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let idea = "  Two rival lighthouse keepers discover they are guarding the same island \
                from opposite centuries.  ";
    let submission = accept_idea(&store, receipt.lead_id, idea).await.unwrap();
    assert_eq!(submission.submission_type, SubmissionType::Idea);
    assert_eq!(submission.mime_type, "text/plain");
    assert_eq!(submission.idea_description.as_deref(), Some(idea.trim()));
    assert_eq!(submission.file_path, None);
}

#[tokio::test]
async fn test_lead_list_filters_and_pagination() {
    let store = InMemoryLeadStore::new();
    let engine = LeadScoringEngine::default();
    for i in 0..5 {
        submit_questionnaire(&store, &engine, &DisabledNotifier, hot_submission(&format!("hot{}@example.com", i)))
            .await
            .unwrap();
    }
    for i in 0..3 {
        submit_questionnaire(&store, &engine, &DisabledNotifier, cold_submission(&format!("cold{}@example.com", i)))
            .await
            .unwrap();
    }

    let page = store
        .list_leads(&LeadFilter {
            page: 2,
            per_page: 2,
            tier: Some(LeadTier::Hot),
            ..LeadFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.leads.len(), 2);
    assert!(page.leads.iter().all(|l| l.tier == LeadTier::Hot));
    // Newest first: page 2 holds hot2 and hot1
    assert_eq!(page.leads[0].email, "hot2@example.com");

    let page = store
        .list_leads(&LeadFilter {
            search: Some("COLD1".to_string()),
            ..LeadFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.leads[0].email, "cold1@example.com");
}

#[tokio::test]
async fn test_stats_and_status_updates() {
    let store = InMemoryLeadStore::new();
    let engine = LeadScoringEngine::default();
    let hot = submit_questionnaire(&store, &engine, &DisabledNotifier, hot_submission("hot@example.com"))
        .await
        .unwrap();
    submit_questionnaire(&store, &engine, &DisabledNotifier, cold_submission("cold@example.com"))
        .await
        .unwrap();

    let now = Utc::now();
    let lead = store
        .update_lead_status(hot.lead_id, LeadStatus::Contacted, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lead.status, LeadStatus::Contacted);
    assert_eq!(lead.last_contacted_at, Some(now));

    let later = now + ChronoDuration::minutes(5);
    let lead = store
        .update_lead_status(hot.lead_id, LeadStatus::Qualified, later)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lead.last_contacted_at, Some(now));
    assert_eq!(lead.updated_at, later);

    assert!(store
        .update_lead_status(999, LeadStatus::Lost, now)
        .await
        .unwrap()
        .is_none());

    let stats = store.lead_stats(Utc::now()).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_tier["hot"], 1);
    assert_eq!(stats.by_tier["warm"], 0);
    assert_eq!(stats.by_status["qualified"], 1);
    assert_eq!(stats.by_status["new"], 1);
    assert_eq!(stats.last_7_days, 2);

    let stats = store
        .lead_stats(Utc::now() + ChronoDuration::days(8))
        .await
        .unwrap();
    assert_eq!(stats.last_7_days, 0);
}

/// Delegates to the in-memory store but refuses every submission insert.
#[derive(Default)]
struct RejectingInsertStore {
    inner: InMemoryLeadStore,
}

#[async_trait]
impl LeadStore for RejectingInsertStore {
    async fn create_lead(&self, contact: &LeadContact) -> Result<Lead, AppError> {
        self.inner.create_lead(contact).await
    }

    async fn find_lead(&self, lead_id: i64) -> Result<Option<Lead>, AppError> {
        self.inner.find_lead(lead_id).await
    }

    async fn save_questionnaire(
        &self,
        contact: &LeadContact,
        answers: &QuestionnaireAnswers,
        score: &LeadScoreResult,
    ) -> Result<(Lead, QuestionnaireResponse), AppError> {
        self.inner.save_questionnaire(contact, answers, score).await
    }

    async fn find_questionnaire(
        &self,
        lead_id: i64,
    ) -> Result<Option<QuestionnaireResponse>, AppError> {
        self.inner.find_questionnaire(lead_id).await
    }

    async fn insert_submission(&self, _submission: &NewSubmission) -> Result<Submission, AppError> {
        Err(AppError::InternalError("insert rejected".to_string()))
    }

    async fn find_submission(&self, submission_id: i64) -> Result<Option<Submission>, AppError> {
        self.inner.find_submission(submission_id).await
    }

    async fn list_submissions(&self, lead_id: i64) -> Result<Vec<Submission>, AppError> {
        self.inner.list_submissions(lead_id).await
    }

    async fn has_pending_submission(&self, lead_id: i64) -> Result<bool, AppError> {
        self.inner.has_pending_submission(lead_id).await
    }

    async fn complete_analysis(
        &self,
        result: &NewAnalysisResult,
        processed_at: DateTime<Utc>,
    ) -> Result<AnalysisResult, AppError> {
        self.inner.complete_analysis(result, processed_at).await
    }

    async fn fail_analysis(
        &self,
        submission_id: i64,
        error: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.inner.fail_analysis(submission_id, error, processed_at).await
    }

    async fn mark_analysis_sent(
        &self,
        analysis_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.inner.mark_analysis_sent(analysis_id, sent_at).await
    }

    async fn find_analysis(&self, analysis_id: i64) -> Result<Option<AnalysisResult>, AppError> {
        self.inner.find_analysis(analysis_id).await
    }

    async fn list_analyses(&self, lead_id: i64) -> Result<Vec<AnalysisResult>, AppError> {
        self.inner.list_analyses(lead_id).await
    }

    async fn has_analysis_for_submission(&self, submission_id: i64) -> Result<bool, AppError> {
        self.inner.has_analysis_for_submission(submission_id).await
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<LeadPage, AppError> {
        self.inner.list_leads(filter).await
    }

    async fn lead_stats(&self, now: DateTime<Utc>) -> Result<LeadStats, AppError> {
        self.inner.lead_stats(now).await
    }

    async fn update_lead_status(
        &self,
        lead_id: i64,
        status: LeadStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Lead>, AppError> {
        self.inner.update_lead_status(lead_id, status, now).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn test_failed_insert_removes_stored_material() {
    let store = RejectingInsertStore::default();
    let upload_dir = temp_upload_dir();
    let config = create_test_config(&upload_dir);
    let materials = LocalMaterialStore::new(&upload_dir);
    let receipt = submit_questionnaire(
        &store,
        &LeadScoringEngine::default(),
        &DisabledNotifier,
        hot_submission("marta@northlight.com"),
    )
    .await
    .unwrap();

    let err = accept_material(
        &store,
        &materials,
        &config,
        MaterialUpload {
            lead_id: receipt.lead_id,
            submission_type: "script".to_string(),
            original_filename: "Low Tide.pdf".to_string(),
            bytes: b"%PDF-1.4 low tide".to_vec(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InternalError(_)));

    // The file was written, then removed again
    let mut entries = tokio::fs::read_dir(&upload_dir).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}
