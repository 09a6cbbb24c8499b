// Obligations, required controls and documents per risk tier, compliance
// scoring against declared controls, and assembly of the final assessment.

use chrono::Utc;

use aiact_core::domain::{
    AiSystem, AnalysisSource, ComplianceGap, Control, DocumentKind, GapPriority, Obligation,
    RiskAssessment, RiskLevel,
};

use crate::rules::RuleClassification;

/// Confidence assumed when a model names a tier but gives no confidence.
pub const DEFAULT_MODEL_CONFIDENCE: f64 = 0.7;

// ---------------------------------------------------------------------------
// Obligations
// ---------------------------------------------------------------------------

fn obligation(article: &str, title: &str, description: &str) -> Obligation {
    Obligation {
        article: article.to_string(),
        title: title.to_string(),
        description: description.to_string(),
    }
}

pub fn obligations_for(level: RiskLevel) -> Vec<Obligation> {
    match level {
        RiskLevel::Unacceptable => vec![obligation(
            "Art. 5",
            "Prohibited AI practice",
            "The system falls under a prohibited practice and must not be placed on the \
             market, put into service or used in the Union. Cease operation.",
        )],
        RiskLevel::High => vec![
            obligation(
                "Art. 9",
                "Risk management system",
                "Establish, document and maintain a risk management process across the lifecycle.",
            ),
            obligation(
                "Art. 10",
                "Data and data governance",
                "Training, validation and test data must be relevant, representative and examined for bias.",
            ),
            obligation(
                "Art. 11",
                "Technical documentation",
                "Draw up Annex IV technical documentation before placing on the market.",
            ),
            obligation(
                "Art. 12",
                "Record-keeping",
                "Enable automatic logging of events over the system's lifetime.",
            ),
            obligation(
                "Art. 13",
                "Transparency and information to deployers",
                "Provide instructions for use describing capabilities and limitations.",
            ),
            obligation(
                "Art. 14",
                "Human oversight",
                "Design the system so natural persons can effectively oversee and override it.",
            ),
            obligation(
                "Art. 15",
                "Accuracy, robustness and cybersecurity",
                "Achieve and declare appropriate accuracy and resilience against errors and attacks.",
            ),
            obligation(
                "Art. 17",
                "Quality management system",
                "Operate a documented quality management system.",
            ),
            obligation(
                "Art. 43",
                "Conformity assessment",
                "Complete the applicable conformity assessment procedure before deployment.",
            ),
            obligation(
                "Art. 49",
                "Registration",
                "Register the system in the EU database for high-risk AI systems.",
            ),
            obligation(
                "Art. 72",
                "Post-market monitoring",
                "Collect and analyse performance data throughout the system's lifetime.",
            ),
        ],
        RiskLevel::Limited => vec![obligation(
            "Art. 50",
            "Transparency obligations",
            "Inform people that they are interacting with an AI system and mark synthetic \
             content as artificially generated.",
        )],
        RiskLevel::Minimal => vec![obligation(
            "Art. 95",
            "Voluntary codes of conduct",
            "No mandatory requirements. Adopting voluntary codes of conduct is encouraged.",
        )],
    }
}

// ---------------------------------------------------------------------------
// Controls and documents
// ---------------------------------------------------------------------------

pub fn required_controls(level: RiskLevel) -> Vec<Control> {
    match level {
        RiskLevel::High => Control::ALL.to_vec(),
        RiskLevel::Limited => vec![
            Control::TechnicalDocumentation,
            Control::TransparencyNotice,
            Control::HumanOversight,
        ],
        RiskLevel::Minimal | RiskLevel::Unacceptable => Vec::new(),
    }
}

pub fn required_documents(level: RiskLevel, user_facing: bool) -> Vec<DocumentKind> {
    match level {
        RiskLevel::High => DocumentKind::ALL
            .into_iter()
            .filter(|k| user_facing || *k != DocumentKind::TransparencyNotice)
            .collect(),
        RiskLevel::Limited => vec![
            DocumentKind::TechnicalDocumentation,
            DocumentKind::TransparencyNotice,
        ],
        RiskLevel::Minimal | RiskLevel::Unacceptable => Vec::new(),
    }
}

fn control_article(control: Control, level: RiskLevel) -> &'static str {
    match control {
        Control::RiskManagement => "Art. 9",
        Control::DataGovernance => "Art. 10",
        Control::TechnicalDocumentation => "Art. 11",
        Control::RecordKeeping => "Art. 12",
        Control::TransparencyNotice if level == RiskLevel::Limited => "Art. 50",
        Control::TransparencyNotice => "Art. 13",
        Control::HumanOversight => "Art. 14",
        Control::AccuracyTesting | Control::Cybersecurity => "Art. 15",
        Control::QualityManagement => "Art. 17",
        Control::ConformityAssessment => "Art. 43",
        Control::EuDatabaseRegistration => "Art. 49",
        Control::PostMarketMonitoring => "Art. 72",
    }
}

fn control_action(control: Control) -> &'static str {
    match control {
        Control::RiskManagement => "Set up a documented risk management process",
        Control::DataGovernance => "Document data sources and run bias examinations on training data",
        Control::TechnicalDocumentation => "Prepare technical documentation for the system",
        Control::RecordKeeping => "Enable automatic event logging and define retention",
        Control::TransparencyNotice => "Publish a notice disclosing AI use to affected persons",
        Control::HumanOversight => "Assign trained staff with authority to override outputs",
        Control::AccuracyTesting => "Define accuracy metrics and test against them before release",
        Control::Cybersecurity => "Assess and mitigate adversarial and data-poisoning threats",
        Control::QualityManagement => "Introduce a quality management system",
        Control::ConformityAssessment => "Complete the conformity assessment procedure",
        Control::PostMarketMonitoring => "Set up a post-market monitoring plan",
        Control::EuDatabaseRegistration => "Register the system in the EU database",
    }
}

fn gap_priority(level: RiskLevel) -> GapPriority {
    match level {
        RiskLevel::Unacceptable => GapPriority::Critical,
        RiskLevel::High => GapPriority::High,
        RiskLevel::Limited => GapPriority::Medium,
        RiskLevel::Minimal => GapPriority::Low,
    }
}

// ---------------------------------------------------------------------------
// Compliance scoring
// ---------------------------------------------------------------------------

/// Score the declared controls against what `level` requires.
///
/// Returns a 0..=100 score and one gap per missing control. A prohibited
/// system scores 0 with a single critical gap, since no control satisfies it.
pub fn assess_compliance(system: &AiSystem, level: RiskLevel) -> (u8, Vec<ComplianceGap>) {
    if level == RiskLevel::Unacceptable {
        let gap = ComplianceGap {
            control: "prohibited_practice".to_string(),
            article: "Art. 5".to_string(),
            action: "Discontinue the system or redesign it so it no longer performs a prohibited practice"
                .to_string(),
            priority: GapPriority::Critical,
        };
        return (0, vec![gap]);
    }

    let required = required_controls(level);
    if required.is_empty() {
        return (100, Vec::new());
    }

    let priority = gap_priority(level);
    let gaps: Vec<ComplianceGap> = required
        .iter()
        .filter(|c| !system.controls.has(**c))
        .map(|c| ComplianceGap {
            control: c.as_str().to_string(),
            article: control_article(*c, level).to_string(),
            action: control_action(*c).to_string(),
            priority,
        })
        .collect();

    let satisfied = required.len() - gaps.len();
    let score = (100.0 * satisfied as f64 / required.len() as f64).round() as u8;
    (score, gaps)
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Combine a model's verdict with the rule classification.
///
/// Without a model tier the rules decide. With `enforce_floor`, a more
/// severe rule tier overrides the model once the rule confidence reaches
/// `floor_min_confidence`.
pub fn reconcile(
    llm_level: Option<RiskLevel>,
    llm_confidence: Option<f64>,
    rules: &RuleClassification,
    enforce_floor: bool,
    floor_min_confidence: f64,
) -> (RiskLevel, f64) {
    let Some(level) = llm_level else {
        return (rules.level, rules.confidence);
    };
    let confidence = llm_confidence
        .unwrap_or(DEFAULT_MODEL_CONFIDENCE)
        .clamp(0.0, 1.0);

    if enforce_floor && rules.level > level && rules.confidence >= floor_min_confidence {
        return (rules.level, rules.confidence);
    }
    (level, confidence)
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// The verdict that goes into an assessment, whatever produced it.
#[derive(Debug, Clone)]
pub struct Finding {
    pub level: RiskLevel,
    pub confidence: f64,
    pub categories: Vec<String>,
    pub reasoning: String,
    pub recommendations: Vec<String>,
    pub source: AnalysisSource,
}

/// Build a full assessment for `system` from a finding. Obligations and
/// required documents follow from the tier; gap actions are appended to
/// the recommendations.
pub fn build_assessment(system: &AiSystem, finding: Finding) -> RiskAssessment {
    let (compliance_score, gaps) = assess_compliance(system, finding.level);

    let mut recommendations = Vec::new();
    for rec in finding
        .recommendations
        .into_iter()
        .chain(gaps.iter().map(|g| format!("{} ({})", g.action, g.article)))
    {
        let rec = rec.trim().to_string();
        if !rec.is_empty() && !recommendations.contains(&rec) {
            recommendations.push(rec);
        }
    }
    if recommendations.is_empty() && finding.level == RiskLevel::Minimal {
        recommendations.push("Consider adopting a voluntary code of conduct (Art. 95)".to_string());
    }

    RiskAssessment {
        id: uuid::Uuid::new_v4().to_string(),
        system_id: system.id.clone(),
        risk_level: finding.level,
        confidence: finding.confidence.clamp(0.0, 1.0),
        categories: finding.categories,
        reasoning: finding.reasoning,
        obligations: obligations_for(finding.level),
        recommendations,
        required_documents: required_documents(finding.level, system.user_facing),
        compliance_score,
        gaps,
        source: finding.source,
        created_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn rules(level: RiskLevel, confidence: f64) -> RuleClassification {
        RuleClassification {
            level,
            confidence,
            score_by_level: BTreeMap::new(),
            matched: Vec::new(),
        }
    }

    #[test]
    fn high_risk_obligations_cover_core_articles() {
        let articles: Vec<String> = obligations_for(RiskLevel::High)
            .into_iter()
            .map(|o| o.article)
            .collect();
        for a in ["Art. 9", "Art. 14", "Art. 15", "Art. 43", "Art. 49", "Art. 72"] {
            assert!(articles.iter().any(|x| x == a), "missing {a}");
        }
        assert_eq!(obligations_for(RiskLevel::Limited)[0].article, "Art. 50");
        assert_eq!(obligations_for(RiskLevel::Minimal)[0].article, "Art. 95");
        assert_eq!(obligations_for(RiskLevel::Unacceptable)[0].article, "Art. 5");
    }

    #[test]
    fn required_controls_per_tier() {
        assert_eq!(required_controls(RiskLevel::High).len(), 12);
        assert_eq!(
            required_controls(RiskLevel::Limited),
            vec![
                Control::TechnicalDocumentation,
                Control::TransparencyNotice,
                Control::HumanOversight
            ]
        );
        assert!(required_controls(RiskLevel::Minimal).is_empty());
        assert!(required_controls(RiskLevel::Unacceptable).is_empty());
    }

    #[test]
    fn transparency_notice_only_for_user_facing_high_risk() {
        let internal = required_documents(RiskLevel::High, false);
        assert_eq!(internal.len(), 6);
        assert!(!internal.contains(&DocumentKind::TransparencyNotice));

        let public = required_documents(RiskLevel::High, true);
        assert_eq!(public.len(), 7);

        assert_eq!(
            required_documents(RiskLevel::Limited, false),
            vec![
                DocumentKind::TechnicalDocumentation,
                DocumentKind::TransparencyNotice
            ]
        );
        assert!(required_documents(RiskLevel::Unacceptable, true).is_empty());
    }

    #[test]
    fn compliance_score_counts_satisfied_controls() {
        let mut system = AiSystem::new("s", "d", "p");
        system.controls.transparency_notice = true;

        let (score, gaps) = assess_compliance(&system, RiskLevel::Limited);
        assert_eq!(score, 33);
        assert_eq!(gaps.len(), 2);
        assert!(gaps.iter().all(|g| g.priority == GapPriority::Medium));
        assert_eq!(gaps[0].control, "technical_documentation");
        assert_eq!(gaps[0].article, "Art. 11");

        let (score, gaps) = assess_compliance(&system, RiskLevel::High);
        // 1 of 12.
        assert_eq!(score, 8);
        assert_eq!(gaps.len(), 11);
        assert!(gaps.iter().all(|g| g.priority == GapPriority::High));
    }

    #[test]
    fn fully_controlled_limited_system_scores_100() {
        let mut system = AiSystem::new("s", "d", "p");
        system.controls.transparency_notice = true;
        system.controls.human_oversight = true;
        system.controls.technical_documentation = true;
        let (score, gaps) = assess_compliance(&system, RiskLevel::Limited);
        assert_eq!(score, 100);
        assert!(gaps.is_empty());
    }

    #[test]
    fn minimal_and_unacceptable_edge_scores() {
        let system = AiSystem::new("s", "d", "p");
        assert_eq!(assess_compliance(&system, RiskLevel::Minimal), (100, vec![]));

        let (score, gaps) = assess_compliance(&system, RiskLevel::Unacceptable);
        assert_eq!(score, 0);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].priority, GapPriority::Critical);
    }

    #[test]
    fn reconcile_without_model_uses_rules() {
        let r = rules(RiskLevel::Limited, 0.7);
        assert_eq!(reconcile(None, Some(0.9), &r, true, 0.6), (RiskLevel::Limited, 0.7));
    }

    #[test]
    fn reconcile_floor_raises_model_tier() {
        let r = rules(RiskLevel::High, 0.8);
        assert_eq!(
            reconcile(Some(RiskLevel::Limited), Some(0.9), &r, true, 0.6),
            (RiskLevel::High, 0.8)
        );
    }

    #[test]
    fn reconcile_floor_needs_confident_rules() {
        let r = rules(RiskLevel::High, 0.55);
        assert_eq!(
            reconcile(Some(RiskLevel::Limited), Some(0.9), &r, true, 0.6),
            (RiskLevel::Limited, 0.9)
        );
    }

    #[test]
    fn reconcile_without_floor_trusts_model() {
        let r = rules(RiskLevel::Unacceptable, 0.95);
        assert_eq!(
            reconcile(Some(RiskLevel::Minimal), None, &r, false, 0.6),
            (RiskLevel::Minimal, DEFAULT_MODEL_CONFIDENCE)
        );
    }

    #[test]
    fn reconcile_never_lowers_model_tier() {
        let r = rules(RiskLevel::Minimal, 0.6);
        assert_eq!(
            reconcile(Some(RiskLevel::High), Some(0.8), &r, true, 0.6),
            (RiskLevel::High, 0.8)
        );
    }

    #[test]
    fn build_assessment_fills_derived_fields() {
        let mut system = AiSystem::new("HireBot", "Ranks CVs", "Recruitment");
        system.user_facing = true;
        system.controls.human_oversight = true;

        let a = build_assessment(
            &system,
            Finding {
                level: RiskLevel::High,
                confidence: 1.4,
                categories: vec!["Employment".into()],
                reasoning: "Screens applicants.".into(),
                recommendations: vec!["Run a bias audit".into(), "Run a bias audit".into()],
                source: AnalysisSource::DeepSeek,
            },
        );

        assert_eq!(a.system_id, system.id);
        assert_eq!(a.confidence, 1.0);
        assert_eq!(a.obligations.len(), 11);
        assert_eq!(a.required_documents.len(), 7);
        assert_eq!(a.compliance_score, 8);
        assert_eq!(a.gaps.len(), 11);
        assert_eq!(a.recommendations[0], "Run a bias audit");
        // Duplicate dropped, one recommendation per gap appended.
        assert_eq!(a.recommendations.len(), 12);
        assert!(a.recommendations.iter().any(|r| r.ends_with("(Art. 49)")));
    }

    #[test]
    fn minimal_assessment_gets_default_recommendation() {
        let system = AiSystem::new("Spam", "Filters spam", "Email");
        let a = build_assessment(
            &system,
            Finding {
                level: RiskLevel::Minimal,
                confidence: 0.6,
                categories: vec![],
                reasoning: String::new(),
                recommendations: vec![],
                source: AnalysisSource::RuleBased,
            },
        );
        assert_eq!(a.compliance_score, 100);
        assert!(a.required_documents.is_empty());
        assert_eq!(a.recommendations.len(), 1);
        assert!(a.recommendations[0].contains("Art. 95"));
    }
}
