// Markdown compliance documents generated from a system and its latest
// assessment.

use chrono::Utc;

use aiact_core::domain::{AiSystem, Control, DocumentKind, RiskAssessment, RiskLevel};
use aiact_core::{AppError, AppResult};

use crate::assessment::required_controls;

/// Prohibited systems cannot be documented into compliance.
pub fn ensure_documentable(system: &AiSystem, assessment: &RiskAssessment) -> AppResult<()> {
    if assessment.risk_level == RiskLevel::Unacceptable {
        return Err(AppError::validation(
            "risk_level",
            format!(
                "{} is classified as a prohibited practice (Art. 5); no compliance documents can be generated",
                system.name
            ),
        ));
    }
    Ok(())
}

/// Render `kind` for `system` as Markdown.
pub fn generate(
    kind: DocumentKind,
    system: &AiSystem,
    assessment: &RiskAssessment,
) -> AppResult<String> {
    ensure_documentable(system, assessment)?;

    let mut doc = header(kind, system, assessment);
    let body = match kind {
        DocumentKind::TechnicalDocumentation => technical_documentation(system, assessment),
        DocumentKind::RiskManagementPlan => risk_management_plan(assessment),
        DocumentKind::DataGovernanceReport => data_governance_report(system),
        DocumentKind::TransparencyNotice => transparency_notice(system),
        DocumentKind::ConformityDeclaration => conformity_declaration(system, assessment),
        DocumentKind::HumanOversightProcedure => human_oversight_procedure(system),
        DocumentKind::PostMarketMonitoringPlan => post_market_monitoring_plan(system, assessment),
    };
    doc.push_str(&body);
    Ok(doc)
}

fn header(kind: DocumentKind, system: &AiSystem, assessment: &RiskAssessment) -> String {
    format!(
        "# {title}\n\n\
         | Field | Value |\n\
         |---|---|\n\
         | System | {name} |\n\
         | System ID | {id} |\n\
         | Risk level | {level} |\n\
         | Assessment | {assessment_id} ({source}) |\n\
         | Generated | {date} |\n\n",
        title = kind.title(),
        name = system.name,
        id = system.id,
        level = assessment.risk_level.label(),
        assessment_id = assessment.id,
        source = assessment.source.as_str(),
        date = Utc::now().format("%Y-%m-%d"),
    )
}

fn or_unspecified(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("Not specified")
}

fn checkbox(done: bool) -> &'static str {
    if done {
        "[x]"
    } else {
        "[ ]"
    }
}

fn bullet_list(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return format!("{empty}\n");
    }
    items.iter().map(|i| format!("- {i}\n")).collect()
}

// ---------------------------------------------------------------------------
// Document bodies
// ---------------------------------------------------------------------------

fn technical_documentation(system: &AiSystem, assessment: &RiskAssessment) -> String {
    let mut out = String::new();

    out.push_str("## 1. General description (Annex IV(1))\n\n");
    out.push_str(&format!("{}\n\n", system.description));
    out.push_str(&format!("- Intended purpose: {}\n", system.purpose));
    out.push_str(&format!("- Sector: {}\n", or_unspecified(&system.sector)));
    out.push_str(&format!(
        "- Deployment context: {}\n",
        or_unspecified(&system.deployment_context)
    ));
    out.push_str(&format!(
        "- Interacts directly with people: {}\n\n",
        if system.user_facing { "yes" } else { "no" }
    ));

    out.push_str("## 2. Development and data (Annex IV(2))\n\n");
    out.push_str(&bullet_list(&system.data_types, "No data types declared."));
    out.push('\n');

    out.push_str("## 3. Monitoring, functioning and control (Annex IV(3))\n\n");
    out.push_str(&format!(
        "Human oversight: {}. Record-keeping: {}.\n\n",
        if system.controls.human_oversight { "in place" } else { "not yet in place" },
        if system.controls.record_keeping { "in place" } else { "not yet in place" },
    ));

    out.push_str("## 4. Risk classification\n\n");
    out.push_str(&format!(
        "Classified as **{}** with confidence {:.0}%.\n\n{}\n\n",
        assessment.risk_level.label(),
        assessment.confidence * 100.0,
        assessment.reasoning
    ));
    if !assessment.categories.is_empty() {
        out.push_str(&bullet_list(&assessment.categories, ""));
        out.push('\n');
    }

    out.push_str("## 5. Applicable requirements\n\n");
    for o in &assessment.obligations {
        out.push_str(&format!("- {} {}: {}\n", o.article, o.title, o.description));
    }
    out
}

fn risk_management_plan(assessment: &RiskAssessment) -> String {
    let mut out = String::new();
    out.push_str("## Risk register (Art. 9)\n\n");
    if assessment.gaps.is_empty() {
        out.push_str("No open compliance gaps at the time of assessment.\n\n");
    } else {
        out.push_str("| # | Control | Article | Priority | Mitigation |\n|---|---|---|---|---|\n");
        for (i, gap) in assessment.gaps.iter().enumerate() {
            out.push_str(&format!(
                "| {} | {} | {} | {:?} | {} |\n",
                i + 1,
                gap.control,
                gap.article,
                gap.priority,
                gap.action
            ));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "Current compliance score: {}%.\n\n",
        assessment.compliance_score
    ));
    out.push_str("## Review cycle\n\n");
    out.push_str("Re-run the assessment after every substantial modification and at least annually.\n");
    out
}

fn data_governance_report(system: &AiSystem) -> String {
    let mut out = String::new();
    out.push_str("## Data categories processed (Art. 10)\n\n");
    out.push_str(&bullet_list(&system.data_types, "No data types declared."));
    out.push('\n');

    let special: Vec<&String> = system
        .data_types
        .iter()
        .filter(|d| {
            let d = d.to_lowercase();
            ["biometric", "health", "ethnic", "religio", "political", "sexual"]
                .iter()
                .any(|s| d.contains(s))
        })
        .collect();
    out.push_str("## Special categories of personal data\n\n");
    if special.is_empty() {
        out.push_str("None identified.\n\n");
    } else {
        for d in special {
            out.push_str(&format!(
                "- {d}: processing requires a legal basis under Art. 10(5) and GDPR Art. 9\n"
            ));
        }
        out.push('\n');
    }

    out.push_str("## Governance status\n\n");
    out.push_str(&format!(
        "- {} Data governance practices documented\n",
        checkbox(system.controls.data_governance)
    ));
    out.push_str("- [ ] Bias examination of training, validation and test data\n");
    out.push_str("- [ ] Data provenance recorded for every source\n");
    out
}

fn transparency_notice(system: &AiSystem) -> String {
    let mut out = String::new();
    out.push_str("## Notice to users (Art. 50)\n\n");
    out.push_str(&format!(
        "> You are interacting with **{}**, an artificial intelligence system. {} \
         Its outputs are generated automatically and may contain errors.",
        system.name, system.purpose
    ));
    if system.automated_decisions {
        out.push_str(" You may request review of any decision by a human.");
    }
    out.push_str("\n\n## Placement\n\n");
    out.push_str("Show this notice before or at the first interaction, in a clear and distinguishable manner.\n");
    out
}

fn conformity_declaration(system: &AiSystem, assessment: &RiskAssessment) -> String {
    let mut out = String::new();
    out.push_str("## Declaration (Annex V)\n\n");
    out.push_str(&format!("1. AI system name and type: {}\n", system.name));
    out.push_str("2. Provider name and address: ____________________\n");
    out.push_str("3. This declaration is issued under the sole responsibility of the provider.\n");
    out.push_str(&format!(
        "4. The AI system is in conformity with Regulation (EU) 2024/1689 (classified {}).\n",
        assessment.risk_level.label().to_lowercase()
    ));
    out.push_str("5. Harmonised standards or common specifications applied: ____________________\n");
    out.push_str(&format!(
        "6. Conformity assessment procedure completed: {}\n",
        if system.controls.conformity_assessment { "yes" } else { "no" }
    ));
    out.push_str("7. Place and date of issue, signature: ____________________\n\n");

    let missing: Vec<&str> = required_controls(assessment.risk_level)
        .into_iter()
        .filter(|c| !system.controls.has(*c))
        .map(|c| c.as_str())
        .collect();
    if !missing.is_empty() {
        out.push_str(&format!(
            "**Not ready for signature.** Missing controls: {}.\n",
            missing.join(", ")
        ));
    }
    out
}

fn human_oversight_procedure(system: &AiSystem) -> String {
    let mut out = String::new();
    out.push_str("## Oversight measures (Art. 14)\n\n");
    out.push_str(&format!(
        "- {} Designated overseers with competence, training and authority\n",
        checkbox(system.controls.has(Control::HumanOversight))
    ));
    out.push_str("- [ ] Overseers can interpret outputs and know the system's limitations\n");
    out.push_str("- [ ] Procedure to disregard, override or reverse an output\n");
    out.push_str("- [ ] Stop button or equivalent procedure to halt the system safely\n\n");
    if system.automated_decisions {
        out.push_str("## Automated decisions\n\n");
        out.push_str(
            "Decisions affecting natural persons must be reviewable by an overseer before they take effect \
             or on request afterwards.\n",
        );
    }
    out
}

fn post_market_monitoring_plan(system: &AiSystem, assessment: &RiskAssessment) -> String {
    let mut out = String::new();
    out.push_str("## Monitoring plan (Art. 72)\n\n");
    out.push_str("| Activity | Frequency |\n|---|---|\n");
    out.push_str("| Review accuracy and drift metrics | Monthly |\n");
    out.push_str("| Review user complaints and incident reports | Monthly |\n");
    out.push_str("| Re-run risk assessment | Annually or after substantial modification |\n\n");
    out.push_str("## Serious incident reporting (Art. 73)\n\n");
    out.push_str("Report serious incidents to the market surveillance authority without undue delay.\n\n");
    out.push_str(&format!(
        "Status: monitoring {}; current compliance score {}%.\n",
        if system.controls.post_market_monitoring { "active" } else { "not yet active" },
        assessment.compliance_score
    ));
    out
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
