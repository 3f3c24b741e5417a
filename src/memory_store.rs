use crate::db_storage::LeadStore;
use crate::errors::AppError;
use crate::models::{
    AnalysisResult, Lead, LeadContact, LeadFilter, LeadPage, LeadStats, LeadStatus, LeadTier,
    NewAnalysisResult, NewSubmission, QuestionnaireAnswers, QuestionnaireResponse, Submission,
};
use crate::scoring::LeadScoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    leads: BTreeMap<i64, Lead>,
    questionnaires: HashMap<i64, QuestionnaireResponse>,
    submissions: BTreeMap<i64, Submission>,
    analyses: BTreeMap<i64, AnalysisResult>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process [`LeadStore`] for tests and local runs without PostgreSQL.
///
/// Every operation holds one lock for its whole duration, so grouped writes
/// are atomic to readers.
#[derive(Default)]
pub struct InMemoryLeadStore {
    tables: RwLock<Tables>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_lead(id: i64, contact: &LeadContact, now: DateTime<Utc>) -> Lead {
    Lead {
        id,
        email: contact.email.clone(),
        first_name: contact.first_name.clone(),
        last_name: contact.last_name.clone(),
        phone: contact.phone.clone(),
        company: contact.company.clone(),
        score: 0,
        tier: LeadTier::Unqualified,
        status: LeadStatus::New,
        created_at: now,
        updated_at: now,
        last_contacted_at: None,
        utm_source: contact.utm_source.clone(),
        utm_medium: contact.utm_medium.clone(),
        utm_campaign: contact.utm_campaign.clone(),
        referrer: contact.referrer.clone(),
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn create_lead(&self, contact: &LeadContact) -> Result<Lead, AppError> {
        let mut tables = self.tables.write().await;
        if tables.leads.values().any(|l| l.email == contact.email) {
            return Err(AppError::Validation(
                "A lead with this email already exists".to_string(),
            ));
        }
        let id = tables.next_id();
        let lead = new_lead(id, contact, Utc::now());
        tables.leads.insert(id, lead.clone());
        Ok(lead)
    }

    async fn find_lead(&self, lead_id: i64) -> Result<Option<Lead>, AppError> {
        Ok(self.tables.read().await.leads.get(&lead_id).cloned())
    }

    async fn save_questionnaire(
        &self,
        contact: &LeadContact,
        answers: &QuestionnaireAnswers,
        score: &LeadScoreResult,
    ) -> Result<(Lead, QuestionnaireResponse), AppError> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;

        let existing = tables
            .leads
            .values()
            .find(|l| l.email == contact.email)
            .map(|l| l.id);
        let lead_id = match existing {
            Some(id) => id,
            None => {
                let id = tables.next_id();
                tables.leads.insert(id, new_lead(id, contact, now));
                id
            }
        };

        let lead = match tables.leads.get_mut(&lead_id) {
            Some(lead) => {
                lead.first_name = contact.first_name.clone();
                lead.last_name = contact.last_name.clone();
                lead.phone = contact.phone.clone();
                lead.company = contact.company.clone();
                lead.score = score.total_score as i32;
                lead.tier = score.tier;
                lead.updated_at = now;
                lead.clone()
            }
            None => {
                return Err(AppError::InternalError(format!(
                    "Lead {} vanished during questionnaire save",
                    lead_id
                )))
            }
        };

        let response = QuestionnaireResponse {
            id: tables.next_id(),
            lead_id,
            answers: answers.clone(),
            submitted_at: now,
        };
        tables.questionnaires.insert(lead_id, response.clone());

        Ok((lead, response))
    }

    async fn find_questionnaire(
        &self,
        lead_id: i64,
    ) -> Result<Option<QuestionnaireResponse>, AppError> {
        Ok(self.tables.read().await.questionnaires.get(&lead_id).cloned())
    }

    async fn insert_submission(&self, submission: &NewSubmission) -> Result<Submission, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.leads.contains_key(&submission.lead_id) {
            return Err(AppError::NotFound("Lead not found".to_string()));
        }
        let stored = Submission {
            id: tables.next_id(),
            lead_id: submission.lead_id,
            submission_type: submission.submission_type,
            original_filename: submission.original_filename.clone(),
            stored_filename: submission.stored_filename.clone(),
            file_path: submission.file_path.clone(),
            file_size_bytes: submission.file_size_bytes,
            mime_type: submission.mime_type.clone(),
            idea_description: submission.idea_description.clone(),
            is_processed: false,
            processing_error: None,
            uploaded_at: Utc::now(),
            processed_at: None,
        };
        tables.submissions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_submission(&self, submission_id: i64) -> Result<Option<Submission>, AppError> {
        Ok(self.tables.read().await.submissions.get(&submission_id).cloned())
    }

    async fn list_submissions(&self, lead_id: i64) -> Result<Vec<Submission>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .values()
            .rev()
            .filter(|s| s.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn has_pending_submission(&self, lead_id: i64) -> Result<bool, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .values()
            .any(|s| s.lead_id == lead_id && !s.is_processed))
    }

    async fn complete_analysis(
        &self,
        result: &NewAnalysisResult,
        processed_at: DateTime<Utc>,
    ) -> Result<AnalysisResult, AppError> {
        let mut tables = self.tables.write().await;
        let stored = AnalysisResult {
            id: tables.next_id(),
            lead_id: result.lead_id,
            submission_id: result.submission_id,
            analysis_type: result.analysis_type.clone(),
            raw_response: result.raw_response.clone(),
            summary: result.summary.clone(),
            strengths: result.strengths.clone(),
            weaknesses: result.weaknesses.clone(),
            market_potential: result.market_potential.clone(),
            is_sent_to_lead: false,
            sent_at: None,
            created_at: processed_at,
        };
        if let Some(submission) = result
            .submission_id
            .and_then(|id| tables.submissions.get_mut(&id))
        {
            submission.is_processed = true;
            submission.processing_error = None;
            submission.processed_at = Some(processed_at);
        }
        tables.analyses.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn fail_analysis(
        &self,
        submission_id: i64,
        error: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(submission) = tables.submissions.get_mut(&submission_id) {
            submission.is_processed = true;
            submission.processing_error = Some(error.to_string());
            submission.processed_at = Some(processed_at);
        }
        Ok(())
    }

    async fn mark_analysis_sent(
        &self,
        analysis_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(analysis) = tables.analyses.get_mut(&analysis_id) {
            analysis.is_sent_to_lead = true;
            analysis.sent_at = Some(sent_at);
        }
        Ok(())
    }

    async fn find_analysis(&self, analysis_id: i64) -> Result<Option<AnalysisResult>, AppError> {
        Ok(self.tables.read().await.analyses.get(&analysis_id).cloned())
    }

    async fn list_analyses(&self, lead_id: i64) -> Result<Vec<AnalysisResult>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .analyses
            .values()
            .rev()
            .filter(|a| a.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn has_analysis_for_submission(&self, submission_id: i64) -> Result<bool, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .analyses
            .values()
            .any(|a| a.submission_id == Some(submission_id)))
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<LeadPage, AppError> {
        let tables = self.tables.read().await;
        let matching: Vec<&Lead> = tables
            .leads
            .values()
            .rev()
            .filter(|l| filter.tier.map_or(true, |t| l.tier == t))
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .filter(|l| filter.matches_search(l))
            .collect();

        let total = matching.len() as u64;
        let leads = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.per_page as usize)
            .cloned()
            .collect();

        Ok(LeadPage::new(leads, total, filter))
    }

    async fn lead_stats(&self, now: DateTime<Utc>) -> Result<LeadStats, AppError> {
        let tables = self.tables.read().await;
        let since = now - Duration::days(7);
        let mut stats = LeadStats::empty();
        for lead in tables.leads.values() {
            stats.total += 1;
            *stats.by_tier.entry(lead.tier.to_string()).or_insert(0) += 1;
            *stats.by_status.entry(lead.status.to_string()).or_insert(0) += 1;
            if lead.created_at >= since {
                stats.last_7_days += 1;
            }
        }
        Ok(stats)
    }

    async fn update_lead_status(
        &self,
        lead_id: i64,
        status: LeadStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Lead>, AppError> {
        let mut tables = self.tables.write().await;
        Ok(tables.leads.get_mut(&lead_id).map(|lead| {
            lead.status = status;
            lead.updated_at = now;
            if status == LeadStatus::Contacted {
                lead.last_contacted_at = Some(now);
            }
            lead.clone()
        }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
