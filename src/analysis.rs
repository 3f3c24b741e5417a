use crate::analysis_client::{AnalysisContent, AnalysisRequest, AnalysisService};
use crate::db_storage::LeadStore;
use crate::errors::AppError;
use crate::material_store::MaterialStore;
use crate::models::{AnalysisResult, NewAnalysisResult, Submission, SubmissionType};
use crate::notifier::{Delivery, Notifier};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Acknowledgment returned by [`AnalysisOrchestrator::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    /// A background run was started.
    Processing,
    /// A run for this lead is still in flight; nothing new was started.
    AlreadyProcessing,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerAck {
    pub status: TriggerStatus,
    pub message: String,
}

/// Result of the best-effort notification after a successful analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationOutcome {
    Delivered(Delivery),
    /// The notifier failed; the analysis is kept regardless.
    Failed(String),
}

/// How one orchestration run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Lead or questionnaire missing. Nothing was recorded.
    NotEligible { reason: &'static str },
    /// The analysis was stored and the submission, if any, marked processed.
    Completed {
        analysis_id: i64,
        notification: NotificationOutcome,
    },
    /// The collaborator failed. Only the submission records the error.
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Pending,
    Processing,
    Complete,
}

/// Answer of the status query. `analysis` is the most recent result when complete.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStatusReport {
    pub lead_id: i64,
    pub status: AnalysisState,
    pub analysis: Option<AnalysisResult>,
}

/// Sequences fetch, analyze, store and notify for one lead.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    store: Arc<dyn LeadStore>,
    analysis: Arc<dyn AnalysisService>,
    materials: Arc<dyn MaterialStore>,
    notifier: Arc<dyn Notifier>,
    /// Leads with a run in flight, keyed by lead id, valued by claim time.
    in_flight: Cache<i64, DateTime<Utc>>,
}

impl AnalysisOrchestrator {
    /// Creates a new orchestrator.
    ///
    /// `claim_ttl` bounds how long a lead stays claimed if a run never
    /// releases it.
    pub fn new(
        store: Arc<dyn LeadStore>,
        analysis: Arc<dyn AnalysisService>,
        materials: Arc<dyn MaterialStore>,
        notifier: Arc<dyn Notifier>,
        claim_ttl: Duration,
    ) -> Self {
        let in_flight = Cache::builder()
            .time_to_live(claim_ttl)
            .max_capacity(10_000)
            .build();

        Self {
            store,
            analysis,
            materials,
            notifier,
            in_flight,
        }
    }

    pub fn store(&self) -> &Arc<dyn LeadStore> {
        &self.store
    }

    pub fn analysis_service(&self) -> &Arc<dyn AnalysisService> {
        &self.analysis
    }

    pub async fn is_in_flight(&self, lead_id: i64) -> bool {
        self.in_flight.contains_key(&lead_id)
    }

    /// Validates existence synchronously, then runs the analysis in the background.
    ///
    /// # Errors
    ///
    /// `NotFound` when the lead, or the given submission of that lead, does not exist.
    pub async fn trigger(
        &self,
        lead_id: i64,
        submission_id: Option<i64>,
    ) -> Result<TriggerAck, AppError> {
        if self.store.find_lead(lead_id).await?.is_none() {
            return Err(AppError::NotFound("Lead not found".to_string()));
        }

        if let Some(id) = submission_id {
            let belongs = self
                .store
                .find_submission(id)
                .await?
                .is_some_and(|s| s.lead_id == lead_id);
            if !belongs {
                return Err(AppError::NotFound("Submission not found".to_string()));
            }
        }

        let claim = self.in_flight.entry(lead_id).or_insert(Utc::now()).await;
        if !claim.is_fresh() {
            let seconds_ago = (Utc::now() - *claim.value()).num_seconds();
            tracing::warn!(
                "⏭ Analysis for lead {} already in flight (claimed {} seconds ago)",
                lead_id,
                seconds_ago
            );
            return Ok(TriggerAck {
                status: TriggerStatus::AlreadyProcessing,
                message: format!(
                    "Analysis already in progress (started {} seconds ago). Check status endpoint for results.",
                    seconds_ago
                ),
            });
        }

        let orchestrator = self.clone();
        tokio::spawn(async move {
            match orchestrator.process(lead_id, submission_id).await {
                Ok(outcome) => {
                    tracing::info!("Analysis run for lead {} finished: {:?}", lead_id, outcome)
                }
                Err(e) => tracing::error!("Analysis run for lead {} aborted: {}", lead_id, e),
            }
            orchestrator.in_flight.invalidate(&lead_id).await;
        });

        Ok(TriggerAck {
            status: TriggerStatus::Processing,
            message: "Analysis started. Check status endpoint for results.".to_string(),
        })
    }

    /// Runs one analysis to completion.
    ///
    /// Collaborator failures are recorded as state and reported in the
    /// outcome; only storage errors are returned as `Err`.
    pub async fn process(
        &self,
        lead_id: i64,
        submission_id: Option<i64>,
    ) -> Result<ProcessOutcome, AppError> {
        // Step 1: Resolve lead and questionnaire
        let Some(lead) = self.store.find_lead(lead_id).await? else {
            tracing::info!("Lead {} no longer exists, skipping analysis", lead_id);
            return Ok(ProcessOutcome::NotEligible {
                reason: "lead not found",
            });
        };
        let Some(questionnaire) = self.store.find_questionnaire(lead_id).await? else {
            tracing::info!("Lead {} has no questionnaire yet, skipping analysis", lead_id);
            return Ok(ProcessOutcome::NotEligible {
                reason: "questionnaire not found",
            });
        };

        // Step 2: Resolve submission content
        let submission = match submission_id {
            Some(id) => self
                .store
                .find_submission(id)
                .await?
                .filter(|s| s.lead_id == lead_id),
            None => None,
        };
        if submission_id.is_some() && submission.is_none() {
            tracing::warn!(
                "Submission {:?} not resolvable for lead {}, analyzing without content",
                submission_id,
                lead_id
            );
        }
        let content = match &submission {
            Some(s) => self.load_content(s).await,
            None => AnalysisContent::Empty,
        };

        // Step 3: Build request
        let answers = &questionnaire.answers;
        let request = AnalysisRequest {
            lead_id,
            submission_id: submission.as_ref().map(|s| s.id),
            submission_type: submission
                .as_ref()
                .map(|s| s.submission_type)
                .unwrap_or(SubmissionType::Idea),
            content,
            project_type: answers.project_type,
            genre: answers.genre.clone(),
            logline: answers.project_logline.clone(),
        };

        // Step 4: Call the analysis software
        tracing::info!("Step 4: Requesting analysis for lead {}", lead_id);
        let response = self.analysis.request_analysis(&request).await;

        // Step 5: Record failure on the submission only
        if !response.success {
            let error = response
                .error
                .unwrap_or_else(|| "Unknown error from analysis software".to_string());
            tracing::warn!("Analysis failed for lead {}: {}", lead_id, error);
            if let Some(s) = &submission {
                self.store.fail_analysis(s.id, &error, Utc::now()).await?;
            }
            return Ok(ProcessOutcome::Failed { error });
        }

        // Step 6: Store result and mark submission processed together
        let stored = self
            .store
            .complete_analysis(
                &NewAnalysisResult {
                    lead_id,
                    submission_id: request.submission_id,
                    analysis_type: response.analysis_type,
                    raw_response: response.raw_response,
                    summary: response.summary,
                    strengths: response.strengths,
                    weaknesses: response.weaknesses,
                    market_potential: response.market_potential,
                },
                Utc::now(),
            )
            .await?;
        tracing::info!("✓ Stored analysis {} for lead {}", stored.id, lead_id);

        // Step 7: Best-effort notification
        let notification = match self.notifier.send_analysis_results(&lead, &stored).await {
            Ok(Delivery::Sent) => {
                if let Err(e) = self.store.mark_analysis_sent(stored.id, Utc::now()).await {
                    tracing::warn!("Failed to mark analysis {} as sent: {}", stored.id, e);
                }
                NotificationOutcome::Delivered(Delivery::Sent)
            }
            Ok(Delivery::Skipped) => NotificationOutcome::Delivered(Delivery::Skipped),
            Err(e) => {
                tracing::warn!("Failed to notify lead {}: {}", lead_id, e);
                NotificationOutcome::Failed(e.to_string())
            }
        };

        Ok(ProcessOutcome::Completed {
            analysis_id: stored.id,
            notification,
        })
    }

    async fn load_content(&self, submission: &Submission) -> AnalysisContent {
        if let Some(idea) = submission
            .idea_description
            .as_ref()
            .filter(|i| !i.trim().is_empty())
        {
            return AnalysisContent::Idea(idea.clone());
        }

        let Some(path) = submission.file_path.as_deref() else {
            return AnalysisContent::Empty;
        };

        match self.materials.load(path).await {
            Ok(bytes) => {
                tracing::debug!(
                    "Loaded {} bytes of material for submission {}",
                    bytes.len(),
                    submission.id
                );
                AnalysisContent::Material(bytes)
            }
            Err(e) => {
                tracing::warn!(
                    "Material for submission {} unavailable, analyzing without content: {}",
                    submission.id,
                    e
                );
                AnalysisContent::Empty
            }
        }
    }

    /// `complete` when an analysis exists, `processing` when a submission
    /// awaits analysis, `pending` otherwise. An unknown lead reads as `pending`.
    pub async fn analysis_status(&self, lead_id: i64) -> Result<AnalysisStatusReport, AppError> {
        let latest = self.store.list_analyses(lead_id).await?.into_iter().next();
        let status = if latest.is_some() {
            AnalysisState::Complete
        } else if self.store.has_pending_submission(lead_id).await? {
            AnalysisState::Processing
        } else {
            AnalysisState::Pending
        };

        Ok(AnalysisStatusReport {
            lead_id,
            status,
            analysis: latest,
        })
    }
}
