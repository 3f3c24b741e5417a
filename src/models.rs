use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Declares a text-backed enum stored as `TEXT` and exchanged as a JSON string.
///
/// Any value not listed decodes to `Unrecognized`, so rows written by a newer
/// release (or a hand-edited database) never fail to load.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A value this release does not know about.
            Unrecognized,
        }

        impl $name {
            /// Every known variant, in declaration order.
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )+ ];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                    $name::Unrecognized => "unrecognized",
                }
            }

            pub fn is_recognized(&self) -> bool {
                !matches!(self, $name::Unrecognized)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                match value {
                    $( $text => $name::$variant, )+
                    _ => $name::Unrecognized,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Ok($name::from(raw.as_str()))
            }
        }
    };
}

text_enum! {
    /// Lead quality tier derived from the total score.
    pub enum LeadTier {
        Hot => "hot",
        Warm => "warm",
        Cold => "cold",
        Unqualified => "unqualified",
    }
}

text_enum! {
    /// Lead pipeline status managed by the sales team.
    pub enum LeadStatus {
        New => "new",
        Contacted => "contacted",
        Qualified => "qualified",
        ProposalSent => "proposal_sent",
        Negotiating => "negotiating",
        Converted => "converted",
        Lost => "lost",
    }
}

text_enum! {
    /// Type of film/TV project.
    pub enum ProjectType {
        FeatureFilm => "feature_film",
        TvSeries => "tv_series",
        TvPilot => "tv_pilot",
        Documentary => "documentary",
        ShortFilm => "short_film",
        WebSeries => "web_series",
        Other => "other",
    }
}

text_enum! {
    /// Current stage of the project.
    pub enum DevelopmentStage {
        IdeaOnly => "idea_only",
        Treatment => "treatment",
        ScriptInProgress => "script_in_progress",
        ScriptComplete => "script_complete",
        PackageReady => "package_ready",
        Financing => "financing",
        PreProduction => "pre_production",
    }
}

text_enum! {
    /// Budget range for the project.
    pub enum BudgetRange {
        /// Under $100K
        Micro => "under_100k",
        /// $100K - $500K
        Low => "100k_500k",
        /// $500K - $2M
        Mid => "500k_2m",
        /// $2M - $10M
        High => "2m_10m",
        /// $10M+
        Studio => "10m_plus",
        Undetermined => "undetermined",
    }
}

text_enum! {
    /// How soon the lead needs services.
    pub enum Timeline {
        Immediate => "immediate",
        OneToThreeMonths => "1_3_months",
        ThreeToSixMonths => "3_6_months",
        SixPlusMonths => "6_plus_months",
        JustExploring => "just_exploring",
    }
}

text_enum! {
    /// Kind of material (or idea) attached to a submission.
    pub enum SubmissionType {
        Script => "script",
        Treatment => "treatment",
        PitchDeck => "pitch_deck",
        Other => "other",
        Idea => "idea",
    }
}

impl SubmissionType {
    /// Types accepted for file uploads; `idea` is only created by the idea endpoint.
    pub fn accepts_upload(&self) -> bool {
        matches!(
            self,
            SubmissionType::Script
                | SubmissionType::Treatment
                | SubmissionType::PitchDeck
                | SubmissionType::Other
        )
    }
}

// ============ Domain Models ============

/// A prospective client who submitted the questionnaire. Aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    /// Snapshot of the latest computed score.
    pub score: i32,
    /// Snapshot of the latest computed tier.
    pub tier: LeadTier,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub referrer: Option<String>,
}

/// Contact and attribution fields used to create or update a lead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadContact {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
}

/// The project answers of one questionnaire submission.
///
/// This is the input of the scoring engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireAnswers {
    pub project_type: ProjectType,
    #[serde(default)]
    pub project_title: Option<String>,
    #[serde(default)]
    pub project_logline: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,

    pub development_stage: DevelopmentStage,
    #[serde(default)]
    pub has_material: bool,
    #[serde(default)]
    pub material_types: Option<Value>,

    pub budget_range: BudgetRange,
    #[serde(default)]
    pub has_financing: bool,
    /// 0-100; only meaningful when `has_financing` is set.
    #[serde(default)]
    pub financing_percentage: Option<i32>,

    pub timeline: Timeline,
    #[serde(default)]
    pub services_needed: Option<Value>,

    #[serde(default)]
    pub previous_credits: bool,
    #[serde(default)]
    pub credits_description: Option<String>,

    #[serde(default)]
    pub how_did_you_hear: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
}

/// Immutable snapshot of one lead's intake. Resubmission replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireResponse {
    pub id: i64,
    pub lead_id: i64,
    #[serde(flatten)]
    pub answers: QuestionnaireAnswers,
    pub submitted_at: DateTime<Utc>,
}

/// Uploaded material or free-text idea tied to a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub lead_id: i64,
    pub submission_type: SubmissionType,
    pub original_filename: Option<String>,
    pub stored_filename: Option<String>,
    pub file_path: Option<String>,
    pub file_size_bytes: i64,
    pub mime_type: String,
    pub idea_description: Option<String>,
    pub is_processed: bool,
    pub processing_error: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Fields of a submission before it is stored.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub lead_id: i64,
    pub submission_type: SubmissionType,
    pub original_filename: Option<String>,
    pub stored_filename: Option<String>,
    pub file_path: Option<String>,
    pub file_size_bytes: i64,
    pub mime_type: String,
    pub idea_description: Option<String>,
}

/// Normalized response of the analysis collaborator, tied to a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: i64,
    pub lead_id: i64,
    pub submission_id: Option<i64>,
    pub analysis_type: String,
    /// Full payload as returned by the collaborator, kept for audit.
    pub raw_response: Value,
    pub summary: Option<String>,
    pub strengths: Option<Vec<String>>,
    pub weaknesses: Option<Vec<String>>,
    pub market_potential: Option<String>,
    pub is_sent_to_lead: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields of an analysis result before it is stored.
#[derive(Debug, Clone)]
pub struct NewAnalysisResult {
    pub lead_id: i64,
    pub submission_id: Option<i64>,
    pub analysis_type: String,
    pub raw_response: Value,
    pub summary: Option<String>,
    pub strengths: Option<Vec<String>>,
    pub weaknesses: Option<Vec<String>>,
    pub market_potential: Option<String>,
}

// ============ Admin Query Models ============

/// Filters and pagination for the lead list.
#[derive(Debug, Clone, Deserialize)]
pub struct LeadFilter {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub tier: Option<LeadTier>,
    pub status: Option<LeadStatus>,
    pub search: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl Default for LeadFilter {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
            tier: None,
            status: None,
            search: None,
        }
    }
}

impl LeadFilter {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// Case-insensitive match over email, names and company.
    pub fn matches_search(&self, lead: &Lead) -> bool {
        let Some(term) = self.search.as_deref().filter(|s| !s.is_empty()) else {
            return true;
        };
        let term = term.to_lowercase();
        [
            Some(lead.email.as_str()),
            Some(lead.first_name.as_str()),
            Some(lead.last_name.as_str()),
            lead.company.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&term))
    }
}

/// One page of the lead list.
#[derive(Debug, Clone, Serialize)]
pub struct LeadPage {
    pub leads: Vec<Lead>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl LeadPage {
    pub fn new(leads: Vec<Lead>, total: u64, filter: &LeadFilter) -> Self {
        let per_page = u64::from(filter.per_page.max(1));
        Self {
            leads,
            total,
            page: filter.page,
            per_page: filter.per_page,
            total_pages: total.div_ceil(per_page),
        }
    }
}

/// Dashboard counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LeadStats {
    pub total: u64,
    pub by_tier: std::collections::BTreeMap<String, u64>,
    pub by_status: std::collections::BTreeMap<String, u64>,
    pub last_7_days: u64,
}

impl LeadStats {
    /// Stats with every known tier and status present at zero.
    pub fn empty() -> Self {
        Self {
            total: 0,
            by_tier: LeadTier::ALL
                .iter()
                .map(|t| (t.as_str().to_string(), 0))
                .collect(),
            by_status: LeadStatus::ALL
                .iter()
                .map(|s| (s.as_str().to_string(), 0))
                .collect(),
            last_7_days: 0,
        }
    }
}
