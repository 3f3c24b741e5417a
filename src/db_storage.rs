use crate::errors::{AppError, ResultExt};
use crate::models::{
    AnalysisResult, Lead, LeadContact, LeadFilter, LeadPage, LeadStats, LeadStatus, LeadTier,
    NewAnalysisResult, NewSubmission, QuestionnaireAnswers, QuestionnaireResponse, Submission,
};
use crate::scoring::LeadScoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

/// Persistence collaborator for leads and everything they own.
///
/// Methods that touch several rows run atomically: readers never observe a
/// questionnaire without its score, or a processed submission without its
/// analysis result.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Creates a bare lead. A duplicate email is a validation error.
    async fn create_lead(&self, contact: &LeadContact) -> Result<Lead, AppError>;

    async fn find_lead(&self, lead_id: i64) -> Result<Option<Lead>, AppError>;

    /// Upserts the lead by email, replaces its questionnaire response and
    /// records the new score snapshot.
    async fn save_questionnaire(
        &self,
        contact: &LeadContact,
        answers: &QuestionnaireAnswers,
        score: &LeadScoreResult,
    ) -> Result<(Lead, QuestionnaireResponse), AppError>;

    async fn find_questionnaire(
        &self,
        lead_id: i64,
    ) -> Result<Option<QuestionnaireResponse>, AppError>;

    async fn insert_submission(&self, submission: &NewSubmission) -> Result<Submission, AppError>;

    async fn find_submission(&self, submission_id: i64) -> Result<Option<Submission>, AppError>;

    /// Submissions of a lead, newest first.
    async fn list_submissions(&self, lead_id: i64) -> Result<Vec<Submission>, AppError>;

    /// True when the lead has at least one submission awaiting analysis.
    async fn has_pending_submission(&self, lead_id: i64) -> Result<bool, AppError>;

    /// Stores a successful analysis and marks its submission processed.
    async fn complete_analysis(
        &self,
        result: &NewAnalysisResult,
        processed_at: DateTime<Utc>,
    ) -> Result<AnalysisResult, AppError>;

    /// Marks a submission processed with the failure message.
    async fn fail_analysis(
        &self,
        submission_id: i64,
        error: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn mark_analysis_sent(
        &self,
        analysis_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn find_analysis(&self, analysis_id: i64) -> Result<Option<AnalysisResult>, AppError>;

    /// Analysis results of a lead, newest first.
    async fn list_analyses(&self, lead_id: i64) -> Result<Vec<AnalysisResult>, AppError>;

    async fn has_analysis_for_submission(&self, submission_id: i64) -> Result<bool, AppError>;

    /// Filtered page of leads, newest first.
    async fn list_leads(&self, filter: &LeadFilter) -> Result<LeadPage, AppError>;

    async fn lead_stats(&self, now: DateTime<Utc>) -> Result<LeadStats, AppError>;

    /// Updates the status; moving to `contacted` stamps `last_contacted_at`.
    async fn update_lead_status(
        &self,
        lead_id: i64,
        status: LeadStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Lead>, AppError>;

    /// Cheap connectivity check for the detailed health endpoint.
    async fn ping(&self) -> Result<(), AppError>;
}

const LEAD_COLUMNS: &str = "id, email, first_name, last_name, phone, company, score, tier, status, \
     created_at, updated_at, last_contacted_at, utm_source, utm_medium, utm_campaign, referrer";

const QUESTIONNAIRE_COLUMNS: &str = "id, lead_id, project_type, project_title, project_logline, \
     genre, development_stage, has_material, material_types, budget_range, has_financing, \
     financing_percentage, timeline, services_needed, previous_credits, credits_description, \
     how_did_you_hear, additional_notes, submitted_at";

const SUBMISSION_COLUMNS: &str = "id, lead_id, submission_type, original_filename, \
     stored_filename, file_path, file_size_bytes, mime_type, idea_description, is_processed, \
     processing_error, uploaded_at, processed_at";

const ANALYSIS_COLUMNS: &str = "id, lead_id, submission_id, analysis_type, raw_response, summary, \
     strengths, weaknesses, market_potential, is_sent_to_lead, sent_at, created_at";

fn lead_from_row(row: &PgRow) -> Result<Lead, sqlx::Error> {
    Ok(Lead {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        company: row.try_get("company")?,
        score: row.try_get("score")?,
        tier: LeadTier::from(row.try_get::<&str, _>("tier")?),
        status: LeadStatus::from(row.try_get::<&str, _>("status")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_contacted_at: row.try_get("last_contacted_at")?,
        utm_source: row.try_get("utm_source")?,
        utm_medium: row.try_get("utm_medium")?,
        utm_campaign: row.try_get("utm_campaign")?,
        referrer: row.try_get("referrer")?,
    })
}

fn questionnaire_from_row(row: &PgRow) -> Result<QuestionnaireResponse, sqlx::Error> {
    Ok(QuestionnaireResponse {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        answers: QuestionnaireAnswers {
            project_type: row.try_get::<&str, _>("project_type")?.into(),
            project_title: row.try_get("project_title")?,
            project_logline: row.try_get("project_logline")?,
            genre: row.try_get("genre")?,
            development_stage: row.try_get::<&str, _>("development_stage")?.into(),
            has_material: row.try_get("has_material")?,
            material_types: row.try_get("material_types")?,
            budget_range: row.try_get::<&str, _>("budget_range")?.into(),
            has_financing: row.try_get("has_financing")?,
            financing_percentage: row.try_get("financing_percentage")?,
            timeline: row.try_get::<&str, _>("timeline")?.into(),
            services_needed: row.try_get("services_needed")?,
            previous_credits: row.try_get("previous_credits")?,
            credits_description: row.try_get("credits_description")?,
            how_did_you_hear: row.try_get("how_did_you_hear")?,
            additional_notes: row.try_get("additional_notes")?,
        },
        submitted_at: row.try_get("submitted_at")?,
    })
}

fn submission_from_row(row: &PgRow) -> Result<Submission, sqlx::Error> {
    Ok(Submission {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        submission_type: row.try_get::<&str, _>("submission_type")?.into(),
        original_filename: row.try_get("original_filename")?,
        stored_filename: row.try_get("stored_filename")?,
        file_path: row.try_get("file_path")?,
        file_size_bytes: row.try_get("file_size_bytes")?,
        mime_type: row.try_get("mime_type")?,
        idea_description: row.try_get("idea_description")?,
        is_processed: row.try_get("is_processed")?,
        processing_error: row.try_get("processing_error")?,
        uploaded_at: row.try_get("uploaded_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

/// Reads a JSONB string array; anything else is treated as absent.
fn string_list(value: Option<Value>) -> Option<Vec<String>> {
    value.and_then(|v| serde_json::from_value(v).ok())
}

fn analysis_from_row(row: &PgRow) -> Result<AnalysisResult, sqlx::Error> {
    Ok(AnalysisResult {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        submission_id: row.try_get("submission_id")?,
        analysis_type: row.try_get("analysis_type")?,
        raw_response: row.try_get("raw_response")?,
        summary: row.try_get("summary")?,
        strengths: string_list(row.try_get("strengths")?),
        weaknesses: string_list(row.try_get("weaknesses")?),
        market_potential: row.try_get("market_potential")?,
        is_sent_to_lead: row.try_get("is_sent_to_lead")?,
        sent_at: row.try_get("sent_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn list_value(items: &Option<Vec<String>>) -> Option<Value> {
    items.as_ref().map(|list| Value::from(list.clone()))
}

fn push_lead_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &'a LeadFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(tier) = filter.tier {
        builder.push(" AND tier = ").push_bind(tier.as_str());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(term) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", term);
        builder
            .push(" AND (email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR company ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// PostgreSQL implementation of [`LeadStore`].
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn create_lead(&self, contact: &LeadContact) -> Result<Lead, AppError> {
        let sql = format!(
            r#"
            INSERT INTO leads (email, first_name, last_name, phone, company,
                               utm_source, utm_medium, utm_campaign, referrer)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        let result = sqlx::query(&sql)
            .bind(&contact.email)
            .bind(&contact.first_name)
            .bind(&contact.last_name)
            .bind(&contact.phone)
            .bind(&contact.company)
            .bind(&contact.utm_source)
            .bind(&contact.utm_medium)
            .bind(&contact.utm_campaign)
            .bind(&contact.referrer)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => Ok(lead_from_row(&row)?),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                AppError::Validation("A lead with this email already exists".to_string()),
            ),
            Err(e) => Err(AppError::DatabaseError(e)),
        }
    }

    async fn find_lead(&self, lead_id: i64) -> Result<Option<Lead>, AppError> {
        let sql = format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(lead_from_row).transpose()?)
    }

    async fn save_questionnaire(
        &self,
        contact: &LeadContact,
        answers: &QuestionnaireAnswers,
        score: &LeadScoreResult,
    ) -> Result<(Lead, QuestionnaireResponse), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin questionnaire transaction")?;

        // Step 1: Upsert lead by email with the new score snapshot
        let sql = format!(
            r#"
            INSERT INTO leads (email, first_name, last_name, phone, company,
                               utm_source, utm_medium, utm_campaign, referrer, score, tier)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (email) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                phone = EXCLUDED.phone,
                company = EXCLUDED.company,
                score = EXCLUDED.score,
                tier = EXCLUDED.tier,
                updated_at = now()
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&contact.email)
            .bind(&contact.first_name)
            .bind(&contact.last_name)
            .bind(&contact.phone)
            .bind(&contact.company)
            .bind(&contact.utm_source)
            .bind(&contact.utm_medium)
            .bind(&contact.utm_campaign)
            .bind(&contact.referrer)
            .bind(score.total_score as i32)
            .bind(score.tier.as_str())
            .fetch_one(&mut *tx)
            .await
            .context("Failed to upsert lead")?;
        let lead = lead_from_row(&row)?;

        // Step 2: Replace the previous response
        sqlx::query("DELETE FROM questionnaire_responses WHERE lead_id = $1")
            .bind(lead.id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete previous questionnaire")?;

        let sql = format!(
            r#"
            INSERT INTO questionnaire_responses (
                lead_id, project_type, project_title, project_logline, genre,
                development_stage, has_material, material_types, budget_range,
                has_financing, financing_percentage, timeline, services_needed,
                previous_credits, credits_description, how_did_you_hear, additional_notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            QUESTIONNAIRE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(lead.id)
            .bind(answers.project_type.as_str())
            .bind(&answers.project_title)
            .bind(&answers.project_logline)
            .bind(&answers.genre)
            .bind(answers.development_stage.as_str())
            .bind(answers.has_material)
            .bind(&answers.material_types)
            .bind(answers.budget_range.as_str())
            .bind(answers.has_financing)
            .bind(answers.financing_percentage)
            .bind(answers.timeline.as_str())
            .bind(&answers.services_needed)
            .bind(answers.previous_credits)
            .bind(&answers.credits_description)
            .bind(&answers.how_did_you_hear)
            .bind(&answers.additional_notes)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to insert questionnaire")?;
        let response = questionnaire_from_row(&row)?;

        tx.commit()
            .await
            .context("Failed to commit questionnaire transaction")?;

        tracing::info!(
            "Stored questionnaire for lead {} (score: {}, tier: {})",
            lead.id,
            lead.score,
            lead.tier
        );

        Ok((lead, response))
    }

    async fn find_questionnaire(
        &self,
        lead_id: i64,
    ) -> Result<Option<QuestionnaireResponse>, AppError> {
        let sql = format!(
            "SELECT {} FROM questionnaire_responses WHERE lead_id = $1",
            QUESTIONNAIRE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(questionnaire_from_row).transpose()?)
    }

    async fn insert_submission(&self, submission: &NewSubmission) -> Result<Submission, AppError> {
        let sql = format!(
            r#"
            INSERT INTO submissions (lead_id, submission_type, original_filename, stored_filename,
                                     file_path, file_size_bytes, mime_type, idea_description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SUBMISSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(submission.lead_id)
            .bind(submission.submission_type.as_str())
            .bind(&submission.original_filename)
            .bind(&submission.stored_filename)
            .bind(&submission.file_path)
            .bind(submission.file_size_bytes)
            .bind(&submission.mime_type)
            .bind(&submission.idea_description)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to insert submission for lead {}", submission.lead_id))?;
        Ok(submission_from_row(&row)?)
    }

    async fn find_submission(&self, submission_id: i64) -> Result<Option<Submission>, AppError> {
        let sql = format!("SELECT {} FROM submissions WHERE id = $1", SUBMISSION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(submission_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(submission_from_row).transpose()?)
    }

    async fn list_submissions(&self, lead_id: i64) -> Result<Vec<Submission>, AppError> {
        let sql = format!(
            "SELECT {} FROM submissions WHERE lead_id = $1 ORDER BY uploaded_at DESC, id DESC",
            SUBMISSION_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(lead_id).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(submission_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn has_pending_submission(&self, lead_id: i64) -> Result<bool, AppError> {
        let pending: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM submissions WHERE lead_id = $1 AND is_processed = false)",
        )
        .bind(lead_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(pending)
    }

    async fn complete_analysis(
        &self,
        result: &NewAnalysisResult,
        processed_at: DateTime<Utc>,
    ) -> Result<AnalysisResult, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin analysis transaction")?;

        let sql = format!(
            r#"
            INSERT INTO analysis_results (lead_id, submission_id, analysis_type, raw_response,
                                          summary, strengths, weaknesses, market_potential)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            ANALYSIS_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(result.lead_id)
            .bind(result.submission_id)
            .bind(&result.analysis_type)
            .bind(&result.raw_response)
            .bind(&result.summary)
            .bind(list_value(&result.strengths))
            .bind(list_value(&result.weaknesses))
            .bind(&result.market_potential)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to insert analysis result")?;
        let stored = analysis_from_row(&row)?;

        if let Some(submission_id) = result.submission_id {
            sqlx::query(
                r#"
                UPDATE submissions
                SET is_processed = true, processing_error = NULL, processed_at = $2
                WHERE id = $1
                "#,
            )
            .bind(submission_id)
            .bind(processed_at)
            .execute(&mut *tx)
            .await
            .context("Failed to mark submission processed")?;
        }

        tx.commit()
            .await
            .context("Failed to commit analysis transaction")?;

        Ok(stored)
    }

    async fn fail_analysis(
        &self,
        submission_id: i64,
        error: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE submissions
            SET is_processed = true, processing_error = $2, processed_at = $3
            WHERE id = $1
            "#,
        )
        .bind(submission_id)
        .bind(error)
        .bind(processed_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record error on submission {}", submission_id))?;
        Ok(())
    }

    async fn mark_analysis_sent(
        &self,
        analysis_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE analysis_results SET is_sent_to_lead = true, sent_at = $2 WHERE id = $1")
            .bind(analysis_id)
            .bind(sent_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_analysis(&self, analysis_id: i64) -> Result<Option<AnalysisResult>, AppError> {
        let sql = format!("SELECT {} FROM analysis_results WHERE id = $1", ANALYSIS_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(analysis_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(analysis_from_row).transpose()?)
    }

    async fn list_analyses(&self, lead_id: i64) -> Result<Vec<AnalysisResult>, AppError> {
        let sql = format!(
            "SELECT {} FROM analysis_results WHERE lead_id = $1 ORDER BY created_at DESC, id DESC",
            ANALYSIS_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(lead_id).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(analysis_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn has_analysis_for_submission(&self, submission_id: i64) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM analysis_results WHERE submission_id = $1)",
        )
        .bind(submission_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<LeadPage, AppError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM leads");
        push_lead_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count leads")?;

        let mut page = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM leads", LEAD_COLUMNS));
        push_lead_filters(&mut page, filter);
        page.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(filter.per_page))
            .push(" OFFSET ")
            .push_bind(filter.offset() as i64);
        let rows = page
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list leads")?;

        let leads = rows
            .iter()
            .map(lead_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LeadPage::new(leads, total.max(0) as u64, filter))
    }

    async fn lead_stats(&self, now: DateTime<Utc>) -> Result<LeadStats, AppError> {
        let mut stats = LeadStats::empty();

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
            .fetch_one(&self.pool)
            .await?;
        stats.total = total.max(0) as u64;

        let tiers: Vec<(String, i64)> =
            sqlx::query_as("SELECT tier, COUNT(*) FROM leads GROUP BY tier")
                .fetch_all(&self.pool)
                .await?;
        for (tier, count) in tiers {
            stats.by_tier.insert(tier, count.max(0) as u64);
        }

        let statuses: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM leads GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        for (status, count) in statuses {
            stats.by_status.insert(status, count.max(0) as u64);
        }

        let recent: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE created_at >= $1")
            .bind(now - Duration::days(7))
            .fetch_one(&self.pool)
            .await?;
        stats.last_7_days = recent.max(0) as u64;

        Ok(stats)
    }

    async fn update_lead_status(
        &self,
        lead_id: i64,
        status: LeadStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Lead>, AppError> {
        let sql = format!(
            r#"
            UPDATE leads
            SET status = $2,
                updated_at = $3,
                last_contacted_at = CASE WHEN $4 THEN $3 ELSE last_contacted_at END
            WHERE id = $1
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(lead_id)
            .bind(status.as_str())
            .bind(now)
            .bind(status == LeadStatus::Contacted)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(lead_from_row).transpose()?)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
