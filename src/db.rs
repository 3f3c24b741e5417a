use sqlx::{postgres::PgPoolOptions, PgPool};

/// Service tables, created in dependency order.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS leads (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        phone TEXT,
        company TEXT,
        score INTEGER NOT NULL DEFAULT 0,
        tier TEXT NOT NULL DEFAULT 'unqualified',
        status TEXT NOT NULL DEFAULT 'new',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_contacted_at TIMESTAMPTZ,
        utm_source TEXT,
        utm_medium TEXT,
        utm_campaign TEXT,
        referrer TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_leads_created_at ON leads (created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS questionnaire_responses (
        id BIGSERIAL PRIMARY KEY,
        lead_id BIGINT NOT NULL UNIQUE REFERENCES leads (id) ON DELETE CASCADE,
        project_type TEXT NOT NULL,
        project_title TEXT,
        project_logline TEXT,
        genre TEXT,
        development_stage TEXT NOT NULL,
        has_material BOOLEAN NOT NULL DEFAULT false,
        material_types JSONB,
        budget_range TEXT NOT NULL,
        has_financing BOOLEAN NOT NULL DEFAULT false,
        financing_percentage INTEGER,
        timeline TEXT NOT NULL,
        services_needed JSONB,
        previous_credits BOOLEAN NOT NULL DEFAULT false,
        credits_description TEXT,
        how_did_you_hear TEXT,
        additional_notes TEXT,
        submitted_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS submissions (
        id BIGSERIAL PRIMARY KEY,
        lead_id BIGINT NOT NULL REFERENCES leads (id) ON DELETE CASCADE,
        submission_type TEXT NOT NULL,
        original_filename TEXT,
        stored_filename TEXT,
        file_path TEXT,
        file_size_bytes BIGINT NOT NULL DEFAULT 0,
        mime_type TEXT NOT NULL,
        idea_description TEXT,
        is_processed BOOLEAN NOT NULL DEFAULT false,
        processing_error TEXT,
        uploaded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        processed_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_submissions_lead_id ON submissions (lead_id)",
    r#"
    CREATE TABLE IF NOT EXISTS analysis_results (
        id BIGSERIAL PRIMARY KEY,
        lead_id BIGINT NOT NULL REFERENCES leads (id) ON DELETE CASCADE,
        submission_id BIGINT REFERENCES submissions (id) ON DELETE SET NULL,
        analysis_type TEXT NOT NULL DEFAULT 'high_level',
        raw_response JSONB NOT NULL DEFAULT '{}'::jsonb,
        summary TEXT,
        strengths JSONB,
        weaknesses JSONB,
        market_potential TEXT,
        is_sent_to_lead BOOLEAN NOT NULL DEFAULT false,
        sent_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_analysis_results_lead_id ON analysis_results (lead_id, created_at DESC)",
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates the service tables if they do not exist yet.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Database schema ready ({} statements)", SCHEMA.len());
        Ok(())
    }
}
