// Domain types shared by every crate: AI systems in the inventory, the
// risk tiers they are classified into, and the assessment records produced
// by the analysis pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Risk tiers
// ---------------------------------------------------------------------------

/// EU AI Act risk tier. Variants are declared from least to most severe so
/// that the derived ordering can be used to compare tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Limited,
    High,
    Unacceptable,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Minimal,
        RiskLevel::Limited,
        RiskLevel::High,
        RiskLevel::Unacceptable,
    ];

    /// Parse a free-form risk label as produced by an LLM or typed by a user.
    ///
    /// Accepts "High", "high-risk", "HIGH_RISK", "Prohibited", "low",
    /// "transparency risk" and similar. The first word that names a tier
    /// wins; words such as "risk", "level" or "tier" are ignored.
    pub fn parse_loose(s: &str) -> Option<Self> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .find_map(|w| match w.as_str() {
                "unacceptable" | "prohibited" | "banned" => Some(RiskLevel::Unacceptable),
                "high" => Some(RiskLevel::High),
                "limited" | "transparency" => Some(RiskLevel::Limited),
                "minimal" | "low" | "none" => Some(RiskLevel::Minimal),
                _ => None,
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Limited => "limited",
            RiskLevel::High => "high",
            RiskLevel::Unacceptable => "unacceptable",
        }
    }

    /// Human-readable label used in reports and generated documents.
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "Minimal risk",
            RiskLevel::Limited => "Limited risk",
            RiskLevel::High => "High risk",
            RiskLevel::Unacceptable => "Unacceptable risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Compliance controls
// ---------------------------------------------------------------------------

/// A single compliance measure an operator can declare as in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    RiskManagement,
    DataGovernance,
    TechnicalDocumentation,
    RecordKeeping,
    TransparencyNotice,
    HumanOversight,
    AccuracyTesting,
    Cybersecurity,
    QualityManagement,
    ConformityAssessment,
    PostMarketMonitoring,
    EuDatabaseRegistration,
}

impl Control {
    pub const ALL: [Control; 12] = [
        Control::RiskManagement,
        Control::DataGovernance,
        Control::TechnicalDocumentation,
        Control::RecordKeeping,
        Control::TransparencyNotice,
        Control::HumanOversight,
        Control::AccuracyTesting,
        Control::Cybersecurity,
        Control::QualityManagement,
        Control::ConformityAssessment,
        Control::PostMarketMonitoring,
        Control::EuDatabaseRegistration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Control::RiskManagement => "risk_management",
            Control::DataGovernance => "data_governance",
            Control::TechnicalDocumentation => "technical_documentation",
            Control::RecordKeeping => "record_keeping",
            Control::TransparencyNotice => "transparency_notice",
            Control::HumanOversight => "human_oversight",
            Control::AccuracyTesting => "accuracy_testing",
            Control::Cybersecurity => "cybersecurity",
            Control::QualityManagement => "quality_management",
            Control::ConformityAssessment => "conformity_assessment",
            Control::PostMarketMonitoring => "post_market_monitoring",
            Control::EuDatabaseRegistration => "eu_database_registration",
        }
    }
}

/// Measures the operator has declared for a system. Missing keys in a
/// system file deserialize as `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceControls {
    pub risk_management: bool,
    pub data_governance: bool,
    pub technical_documentation: bool,
    pub record_keeping: bool,
    pub transparency_notice: bool,
    pub human_oversight: bool,
    pub accuracy_testing: bool,
    pub cybersecurity: bool,
    pub quality_management: bool,
    pub conformity_assessment: bool,
    pub post_market_monitoring: bool,
    pub eu_database_registration: bool,
}

impl ComplianceControls {
    pub fn has(&self, control: Control) -> bool {
        match control {
            Control::RiskManagement => self.risk_management,
            Control::DataGovernance => self.data_governance,
            Control::TechnicalDocumentation => self.technical_documentation,
            Control::RecordKeeping => self.record_keeping,
            Control::TransparencyNotice => self.transparency_notice,
            Control::HumanOversight => self.human_oversight,
            Control::AccuracyTesting => self.accuracy_testing,
            Control::Cybersecurity => self.cybersecurity,
            Control::QualityManagement => self.quality_management,
            Control::ConformityAssessment => self.conformity_assessment,
            Control::PostMarketMonitoring => self.post_market_monitoring,
            Control::EuDatabaseRegistration => self.eu_database_registration,
        }
    }

    /// Controls that are declared as in place, in canonical order.
    pub fn in_place(&self) -> Vec<Control> {
        Control::ALL.into_iter().filter(|c| self.has(*c)).collect()
    }
}

// ---------------------------------------------------------------------------
// AI system inventory entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSystem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub purpose: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub data_types: Vec<String>,
    #[serde(default)]
    pub deployment_context: Option<String>,
    #[serde(default)]
    pub user_facing: bool,
    #[serde(default)]
    pub automated_decisions: bool,
    #[serde(default)]
    pub controls: ComplianceControls,
    pub created_at: DateTime<Utc>,
}

impl AiSystem {
    /// Create a new inventory entry with a fresh id and the current time.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            purpose: purpose.into(),
            sector: None,
            data_types: Vec::new(),
            deployment_context: None,
            user_facing: false,
            automated_decisions: false,
            controls: ComplianceControls::default(),
            created_at: Utc::now(),
        }
    }

    /// All free-text fields joined by newlines, used for keyword scanning.
    pub fn profile_text(&self) -> String {
        let mut parts: Vec<&str> = vec![&self.name, &self.description, &self.purpose];
        if let Some(sector) = &self.sector {
            parts.push(sector);
        }
        if let Some(ctx) = &self.deployment_context {
            parts.push(ctx);
        }
        parts.extend(self.data_types.iter().map(String::as_str));
        parts.join("\n")
    }
}

/// Input shape for registering a system from a TOML or JSON file. The id
/// and creation time are assigned on registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAiSystem {
    pub name: String,
    pub description: String,
    pub purpose: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub data_types: Vec<String>,
    #[serde(default)]
    pub deployment_context: Option<String>,
    #[serde(default)]
    pub user_facing: bool,
    #[serde(default)]
    pub automated_decisions: bool,
    #[serde(default)]
    pub controls: ComplianceControls,
}

impl From<NewAiSystem> for AiSystem {
    fn from(n: NewAiSystem) -> Self {
        let mut system = AiSystem::new(n.name, n.description, n.purpose);
        system.sector = n.sector;
        system.data_types = n.data_types;
        system.deployment_context = n.deployment_context;
        system.user_facing = n.user_facing;
        system.automated_decisions = n.automated_decisions;
        system.controls = n.controls;
        system
    }
}

// ---------------------------------------------------------------------------
// Assessment records
// ---------------------------------------------------------------------------

/// Where the final classification of an assessment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    DeepSeek,
    Gemini,
    SearchAugmented,
    RuleBased,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSource::DeepSeek => "deep_seek",
            AnalysisSource::Gemini => "gemini",
            AnalysisSource::SearchAugmented => "search_augmented",
            AnalysisSource::RuleBased => "rule_based",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    pub article: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceGap {
    pub control: String,
    pub article: String,
    pub action: String,
    pub priority: GapPriority,
}

/// Documents the platform can generate for a classified system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    TechnicalDocumentation,
    RiskManagementPlan,
    DataGovernanceReport,
    TransparencyNotice,
    ConformityDeclaration,
    HumanOversightProcedure,
    PostMarketMonitoringPlan,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 7] = [
        DocumentKind::TechnicalDocumentation,
        DocumentKind::RiskManagementPlan,
        DocumentKind::DataGovernanceReport,
        DocumentKind::TransparencyNotice,
        DocumentKind::ConformityDeclaration,
        DocumentKind::HumanOversightProcedure,
        DocumentKind::PostMarketMonitoringPlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::TechnicalDocumentation => "technical_documentation",
            DocumentKind::RiskManagementPlan => "risk_management_plan",
            DocumentKind::DataGovernanceReport => "data_governance_report",
            DocumentKind::TransparencyNotice => "transparency_notice",
            DocumentKind::ConformityDeclaration => "conformity_declaration",
            DocumentKind::HumanOversightProcedure => "human_oversight_procedure",
            DocumentKind::PostMarketMonitoringPlan => "post_market_monitoring_plan",
        }
    }

    pub fn from_str_kind(s: &str) -> Option<Self> {
        DocumentKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn title(&self) -> &'static str {
        match self {
            DocumentKind::TechnicalDocumentation => "Technical Documentation",
            DocumentKind::RiskManagementPlan => "Risk Management Plan",
            DocumentKind::DataGovernanceReport => "Data Governance Report",
            DocumentKind::TransparencyNotice => "Transparency Notice",
            DocumentKind::ConformityDeclaration => "EU Declaration of Conformity",
            DocumentKind::HumanOversightProcedure => "Human Oversight Procedure",
            DocumentKind::PostMarketMonitoringPlan => "Post-Market Monitoring Plan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: String,
    pub system_id: String,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub categories: Vec<String>,
    pub reasoning: String,
    pub obligations: Vec<Obligation>,
    pub recommendations: Vec<String>,
    pub required_documents: Vec<DocumentKind>,
    pub compliance_score: u8,
    pub gaps: Vec<ComplianceGap>,
    pub source: AnalysisSource,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
