use crate::config::Config;
use crate::errors::AppError;
use crate::models::{AnalysisResult, Lead};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// What happened to a notification that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// The relay accepted the message.
    Sent,
    /// Notifications are disabled; nothing was sent.
    Skipped,
}

/// Notification collaborator. Callers treat every error as best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_welcome(&self, lead: &Lead) -> Result<Delivery, AppError>;

    async fn send_analysis_results(
        &self,
        lead: &Lead,
        analysis: &AnalysisResult,
    ) -> Result<Delivery, AppError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

pub fn welcome_subject(lead: &Lead) -> String {
    format!("Welcome {} - We've Received Your Submission", lead.first_name)
}

pub fn analysis_subject(lead: &Lead) -> String {
    format!("Your Project Analysis is Ready - {}", lead.first_name)
}

pub fn welcome_body(lead: &Lead) -> String {
    format!(
        "Hi {},\n\n\
         We've received your project information and our team is reviewing it.\n\n\
         Here's what happens next:\n\
         1. Our analysis software will review your submission\n\
         2. You'll receive a high-level analysis within 24-48 hours\n\
         3. A team member may reach out for additional details\n\n\
         In the meantime, if you have any questions, feel free to reply to this email.\n\n\
         Best regards,\nThe Team\n",
        lead.first_name
    )
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn analysis_body(lead: &Lead, analysis: &AnalysisResult) -> String {
    let mut body = format!(
        "Hi {},\n\nGreat news! We've completed the initial analysis of your project. \
         Here's what we found:\n\nSummary\n{}\n",
        lead.first_name,
        analysis
            .summary
            .as_deref()
            .unwrap_or("Analysis complete. See details below.")
    );

    let sections = [
        ("Strengths", &analysis.strengths),
        ("Areas for Improvement", &analysis.weaknesses),
    ];
    for (title, items) in sections {
        if let Some(items) = items.as_ref().filter(|i| !i.is_empty()) {
            let _ = write!(body, "\n{}\n", title);
            for item in items {
                let _ = writeln!(body, "- {}", item);
            }
        }
    }

    if let Some(potential) = analysis.market_potential.as_deref() {
        let _ = write!(body, "\nMarket Potential\n{}\n", title_case(potential));
    }

    body.push_str(
        "\nWhat's Next?\n\
         This is a high-level analysis. A comprehensive deep-dive covers detailed script \
         coverage, market positioning strategy, packaging recommendations and distribution \
         pathway analysis. We'd love to schedule a call to discuss your project further.\n\n\
         Best regards,\nThe Team\n",
    );
    body
}

/// Sends mail through an HTTP relay that accepts `{from, to, subject, text}`.
pub struct MailRelayNotifier {
    client: reqwest::Client,
    relay_url: String,
    api_key: Option<String>,
    from: String,
}

impl MailRelayNotifier {
    pub fn new(relay_url: String, api_key: Option<String>, from: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::ExternalApiError(format!("Failed to create mail client: {}", e)))?;

        Ok(Self {
            client,
            relay_url,
            api_key,
            from,
        })
    }

    async fn deliver(&self, to: &str, subject: String, text: String) -> Result<Delivery, AppError> {
        let message = MailMessage {
            from: self.from.clone(),
            to: to.to_string(),
            subject,
            text,
        };

        let mut request = self.client.post(&self.relay_url).json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        request.send().await?.error_for_status()?;

        tracing::info!("✓ Sent '{}' to {}", message.subject, message.to);
        Ok(Delivery::Sent)
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    async fn send_welcome(&self, lead: &Lead) -> Result<Delivery, AppError> {
        self.deliver(&lead.email, welcome_subject(lead), welcome_body(lead))
            .await
    }

    async fn send_analysis_results(
        &self,
        lead: &Lead,
        analysis: &AnalysisResult,
    ) -> Result<Delivery, AppError> {
        self.deliver(
            &lead.email,
            analysis_subject(lead),
            analysis_body(lead, analysis),
        )
        .await
    }
}

/// Used when no relay is configured.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send_welcome(&self, lead: &Lead) -> Result<Delivery, AppError> {
        tracing::debug!("Notifications disabled, skipping welcome for lead {}", lead.id);
        Ok(Delivery::Skipped)
    }

    async fn send_analysis_results(
        &self,
        lead: &Lead,
        _analysis: &AnalysisResult,
    ) -> Result<Delivery, AppError> {
        tracing::debug!("Notifications disabled, skipping results for lead {}", lead.id);
        Ok(Delivery::Skipped)
    }
}

pub fn notifier_from_config(config: &Config) -> Result<Arc<dyn Notifier>, AppError> {
    match &config.mail_relay_url {
        Some(url) => Ok(Arc::new(MailRelayNotifier::new(
            url.clone(),
            config.mail_relay_api_key.clone(),
            config.mail_from.clone(),
        )?)),
        None => Ok(Arc::new(DisabledNotifier)),
    }
}
