// Plain-text rendering for terminal output. JSON output bypasses this module
// and serializes the domain types directly.

use aiact_core::domain::{AiSystem, RiskAssessment};
use aiact_llm::ChainEvent;

pub fn system_row(system: &AiSystem, latest: Option<&RiskAssessment>) -> String {
    let tier = latest
        .map(|a| format!("{} ({}%)", a.risk_level, a.compliance_score))
        .unwrap_or_else(|| "not assessed".to_string());
    format!("{}  {:<32}  {}", system.id, system.name, tier)
}

pub fn system_details(system: &AiSystem) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} ({})\n", system.name, system.id));
    out.push_str(&format!("  Description: {}\n", system.description));
    out.push_str(&format!("  Purpose:     {}\n", system.purpose));
    if let Some(sector) = &system.sector {
        out.push_str(&format!("  Sector:      {sector}\n"));
    }
    if !system.data_types.is_empty() {
        out.push_str(&format!("  Data:        {}\n", system.data_types.join(", ")));
    }
    let controls: Vec<&str> = system.controls.in_place().iter().map(|c| c.as_str()).collect();
    out.push_str(&format!(
        "  Controls:    {}\n",
        if controls.is_empty() {
            "none".to_string()
        } else {
            controls.join(", ")
        }
    ));
    out
}

pub fn assessment(a: &RiskAssessment) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Risk level:  {} (confidence {:.0}%, source {})\n",
        a.risk_level.label(),
        a.confidence * 100.0,
        a.source.as_str()
    ));
    out.push_str(&format!(
        "Compliance:  {}% ({} open gaps)\n",
        a.compliance_score,
        a.gaps.len()
    ));
    if !a.categories.is_empty() {
        out.push_str(&format!("Categories:  {}\n", a.categories.join("; ")));
    }
    out.push_str(&format!("Assessed:    {}\n", a.created_at.format("%Y-%m-%d %H:%M UTC")));

    out.push_str("\nReasoning:\n");
    for line in a.reasoning.lines() {
        out.push_str(&format!("  {line}\n"));
    }

    out.push_str("\nObligations:\n");
    for o in &a.obligations {
        out.push_str(&format!("  - {} {}\n", o.article, o.title));
    }

    if !a.recommendations.is_empty() {
        out.push_str("\nRecommendations:\n");
        for r in &a.recommendations {
            out.push_str(&format!("  - {r}\n"));
        }
    }

    if !a.required_documents.is_empty() {
        let docs: Vec<&str> = a.required_documents.iter().map(|d| d.as_str()).collect();
        out.push_str(&format!("\nRequired documents: {}\n", docs.join(", ")));
    }
    out
}

pub fn chain_event(event: &ChainEvent) -> String {
    match event {
        ChainEvent::Attempt { provider } => format!("... asking {provider}"),
        ChainEvent::Failed { provider, message } => format!("    {provider} failed: {message}"),
        ChainEvent::Succeeded { provider } => format!("    {provider} answered"),
    }
}
