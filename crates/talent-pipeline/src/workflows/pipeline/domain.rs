use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier wrapper for applications tracked through a pipeline.
    ApplicationId
);
numeric_id!(
    /// Identifier of the job posting an application belongs to.
    JobId
);
numeric_id!(
    /// Identifier of a platform user (applicant, company staff, PESO officer).
    UserId
);
numeric_id!(
    /// Identifier of a company account.
    CompanyId
);
numeric_id!(
    /// Identifier of one pipeline stage row.
    StageId
);

/// Namespace owning a stage catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Owner {
    /// The shared default catalog. Immutable once seeded.
    Global,
    Company(CompanyId),
}

impl Owner {
    pub const fn company_id(self) -> Option<CompanyId> {
        match self {
            Owner::Global => None,
            Owner::Company(id) => Some(id),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Global => write!(f, "global"),
            Owner::Company(id) => write!(f, "company:{id}"),
        }
    }
}

/// One named step in an owner's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: StageId,
    pub owner: Owner,
    pub slug: String,
    pub name: String,
    pub position: u32,
    pub is_terminal: bool,
    pub active: bool,
}

/// Stage definition before it is stored under an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTemplate {
    pub slug: String,
    pub name: String,
    pub position: u32,
    pub is_terminal: bool,
    pub active: bool,
}

impl StageTemplate {
    pub fn new(slug: &str, name: &str, position: u32, is_terminal: bool) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            position,
            is_terminal,
            active: true,
        }
    }
}

impl From<&PipelineStage> for StageTemplate {
    fn from(stage: &PipelineStage) -> Self {
        Self {
            slug: stage.slug.clone(),
            name: stage.name.clone(),
            position: stage.position,
            is_terminal: stage.is_terminal,
            active: stage.active,
        }
    }
}

/// The stage set every owner starts from unless a seed file overrides it.
pub fn default_stage_templates() -> Vec<StageTemplate> {
    vec![
        StageTemplate::new("applied", "Applied", 1, false),
        StageTemplate::new("screening", "Screening", 2, false),
        StageTemplate::new("assessment", "Assessment", 3, false),
        StageTemplate::new("interview", "Interview", 4, false),
        StageTemplate::new("offer", "Offer", 5, false),
        StageTemplate::new("hired", "Hired", 6, true),
        StageTemplate::new("rejected", "Rejected", 7, true),
        StageTemplate::new("declined", "Declined", 8, true),
        StageTemplate::new("withdrawn", "Withdrawn", 9, true),
    ]
}

/// Outcome family of a terminal stage, inferred from its slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalFamily {
    Hired,
    Rejected,
    Declined,
    Withdrawn,
}

impl TerminalFamily {
    pub fn classify(slug: &str) -> Self {
        let slug = slug.to_ascii_lowercase();
        if slug.contains("hire") {
            Self::Hired
        } else if slug.contains("withdraw") {
            Self::Withdrawn
        } else if slug.contains("declin") {
            Self::Declined
        } else {
            Self::Rejected
        }
    }
}

/// Coarse status bucket kept alongside the stage for simple filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Hired,
    Rejected,
    Declined,
    OfferAccepted,
    OfferDeclined,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Hired => "hired",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Declined => "declined",
            ApplicationStatus::OfferAccepted => "offer_accepted",
            ApplicationStatus::OfferDeclined => "offer_declined",
        }
    }
}

/// Status implied by a stage. Invoked after every transition.
pub fn derive_status(slug: &str, is_terminal: bool) -> ApplicationStatus {
    if !is_terminal {
        return ApplicationStatus::Pending;
    }

    match TerminalFamily::classify(slug) {
        TerminalFamily::Hired => ApplicationStatus::Hired,
        TerminalFamily::Declined | TerminalFamily::Withdrawn => ApplicationStatus::Declined,
        TerminalFamily::Rejected => ApplicationStatus::Rejected,
    }
}

/// The entity moved through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub job_id: JobId,
    /// Owner of the job posting; selects the governing stage catalog.
    pub job_owner: Owner,
    pub applicant_id: UserId,
    pub stage: String,
    pub status: ApplicationStatus,
    /// Incremented on every committed mutation.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a candidate applies to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub job_id: JobId,
    pub job_owner: Owner,
    pub applicant_id: UserId,
}

/// Which side of the hiring relationship a caller acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Employer,
    Applicant,
}

/// Platform roles as asserted by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Company,
    Graduate,
    Institution,
    Peso,
    Guest,
}

impl ActorRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "company" | "employer" => Some(Self::Company),
            "graduate" | "applicant" => Some(Self::Graduate),
            "institution" => Some(Self::Institution),
            "peso" | "admin" => Some(Self::Peso),
            "guest" | "" => Some(Self::Guest),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::Company => "company",
            ActorRole::Graduate => "graduate",
            ActorRole::Institution => "institution",
            ActorRole::Peso => "peso",
            ActorRole::Guest => "guest",
        }
    }
}

/// Identity and associations of the caller for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: Option<UserId>,
    pub role: ActorRole,
    pub company_id: Option<CompanyId>,
}

impl ActorContext {
    pub const fn guest() -> Self {
        Self {
            user_id: None,
            role: ActorRole::Guest,
            company_id: None,
        }
    }

    pub const fn company(user_id: UserId, company_id: CompanyId) -> Self {
        Self {
            user_id: Some(user_id),
            role: ActorRole::Company,
            company_id: Some(company_id),
        }
    }

    pub const fn graduate(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            role: ActorRole::Graduate,
            company_id: None,
        }
    }

    pub const fn peso(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            role: ActorRole::Peso,
            company_id: None,
        }
    }

    /// Side whose action table applies when this caller looks at an application.
    pub fn party(&self) -> Party {
        match self.role {
            ActorRole::Graduate => Party::Applicant,
            _ => Party::Employer,
        }
    }

    /// Whether the caller may act for `party` on `application`.
    pub fn may_act(&self, application: &Application, party: Party) -> bool {
        match party {
            Party::Applicant => {
                self.role == ActorRole::Graduate && self.user_id == Some(application.applicant_id)
            }
            Party::Employer => match self.role {
                ActorRole::Peso => true,
                ActorRole::Company => match (self.company_id, application.job_owner) {
                    (Some(own), Owner::Company(job_company)) => own == job_company,
                    _ => false,
                },
                _ => false,
            },
        }
    }
}
