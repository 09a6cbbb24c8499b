// Prompt templates for the model providers and the query for the search
// stage.
//
// The classification prompt hands the model the system profile, declared
// controls and the rule-based pre-screen, so the model argues with concrete
// evidence instead of classifying from scratch.

use aiact_core::domain::{AiSystem, Control};

use crate::rules::RuleClassification;

const MAX_QUERY_CHARS: usize = 150;

// ---------------------------------------------------------------------------
// System prompt
// ---------------------------------------------------------------------------

pub fn system_prompt() -> String {
    "You are a regulatory analyst specialising in the EU Artificial Intelligence Act \
     (Regulation (EU) 2024/1689).\n\
     \n\
     Classify the AI system you are given into exactly one risk tier:\n\
     - unacceptable: a prohibited practice under Article 5\n\
     - high: an Annex III use case or a safety component under Article 6(1) and Annex I\n\
     - limited: transparency obligations under Article 50 only\n\
     - minimal: none of the above\n\
     \n\
     Answer with a single JSON object and nothing else, using these keys:\n\
     {\"risk_level\": \"unacceptable|high|limited|minimal\", \"confidence\": 0.0-1.0, \
     \"categories\": [string], \"reasoning\": string, \"obligations\": [string], \
     \"recommendations\": [string]}\n\
     \n\
     Cite articles or annex points in obligations. Keep reasoning under 120 words. \
     When evidence is ambiguous, choose the more severe tier and lower the confidence."
        .to_string()
}

// ---------------------------------------------------------------------------
// Classification prompt
// ---------------------------------------------------------------------------

pub fn build_classification_prompt(system: &AiSystem, rules: &RuleClassification) -> String {
    let mut prompt = String::with_capacity(1536);

    // Section 1: SYSTEM PROFILE
    prompt.push_str("## SYSTEM PROFILE\n");
    prompt.push_str(&format!("Name: {}\n", system.name));
    prompt.push_str(&format!("Description: {}\n", system.description));
    prompt.push_str(&format!("Intended purpose: {}\n", system.purpose));
    if let Some(sector) = &system.sector {
        prompt.push_str(&format!("Sector: {sector}\n"));
    }
    if let Some(ctx) = &system.deployment_context {
        prompt.push_str(&format!("Deployment context: {ctx}\n"));
    }
    if !system.data_types.is_empty() {
        prompt.push_str(&format!("Data processed: {}\n", system.data_types.join(", ")));
    }
    prompt.push_str(&format!(
        "Interacts directly with people: {} | Makes automated decisions: {}\n\n",
        yes_no(system.user_facing),
        yes_no(system.automated_decisions),
    ));

    // Section 2: DECLARED CONTROLS
    prompt.push_str("## DECLARED CONTROLS\n");
    let in_place = system.controls.in_place();
    if in_place.is_empty() {
        prompt.push_str("None declared.\n\n");
    } else {
        let names: Vec<&str> = in_place.iter().map(Control::as_str).collect();
        prompt.push_str(&format!("{}\n\n", names.join(", ")));
    }

    // Section 3: RULE-BASED PRE-SCREEN
    prompt.push_str("## RULE-BASED PRE-SCREEN\n");
    prompt.push_str(&format!(
        "Indicated tier: {} (confidence {:.2})\n",
        rules.level, rules.confidence
    ));
    if rules.matched.is_empty() {
        prompt.push_str("No rule categories matched.\n");
    } else {
        for m in &rules.matched {
            prompt.push_str(&format!(
                "- [{}] {} ({}), score {:.1}, keywords: {}\n",
                m.level,
                m.title,
                m.article,
                m.score,
                m.keywords.join(", ")
            ));
        }
    }
    prompt.push('\n');

    // Section 4: INSTRUCTION
    prompt.push_str(
        "## TASK\n\
         Classify this system under the EU AI Act. The pre-screen is keyword based and may \
         miss context; confirm or correct it. Respond with the JSON object only.\n",
    );

    prompt
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

// ---------------------------------------------------------------------------
// Search query
// ---------------------------------------------------------------------------

/// Short query for the search stage: the purpose and sector, prefixed so
/// results come from AI Act material. Cut at a word boundary.
pub fn build_search_query(system: &AiSystem) -> String {
    let mut query = format!("EU AI Act risk classification {}", system.purpose);
    if let Some(sector) = &system.sector {
        query.push(' ');
        query.push_str(sector);
    }

    let mut out = String::new();
    for word in query.split_whitespace() {
        let extra = if out.is_empty() { word.len() } else { word.len() + 1 };
        if out.len() + extra > MAX_QUERY_CHARS {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleClassifier;
    use aiact_core::config::ClassificationConfig;

    fn classifier() -> RuleClassifier {
        RuleClassifier::new(&ClassificationConfig {
            unacceptable_threshold: 2.0,
            high_threshold: 2.0,
            limited_threshold: 1.5,
            floor_min_confidence: 0.6,
        })
    }

    #[test]
    fn system_prompt_demands_json_keys() {
        let p = system_prompt();
        for key in [
            "risk_level",
            "confidence",
            "categories",
            "reasoning",
            "obligations",
            "recommendations",
        ] {
            assert!(p.contains(key), "missing {key}");
        }
        assert!(p.contains("EU Artificial Intelligence Act"));
    }

    #[test]
    fn classification_prompt_has_all_sections() {
        let mut system = AiSystem::new(
            "HireBot",
            "Ranks CVs of job applicants",
            "Recruitment screening",
        );
        system.sector = Some("Human resources".into());
        system.data_types = vec!["CV text".into(), "contact details".into()];
        system.automated_decisions = true;
        system.controls.human_oversight = true;

        let rules = classifier().classify(&system);
        let p = build_classification_prompt(&system, &rules);

        assert!(p.contains("## SYSTEM PROFILE"));
        assert!(p.contains("Name: HireBot"));
        assert!(p.contains("Sector: Human resources"));
        assert!(p.contains("Data processed: CV text, contact details"));
        assert!(p.contains("Makes automated decisions: yes"));
        assert!(p.contains("## DECLARED CONTROLS\nhuman_oversight"));
        assert!(p.contains("Indicated tier: high"));
        assert!(p.contains("Employment and workers management (Annex III(4))"));
        assert!(p.contains("## TASK"));
    }

    #[test]
    fn classification_prompt_without_matches_or_controls() {
        let system = AiSystem::new("Spam", "Filters spam", "Email filtering");
        let rules = classifier().classify(&system);
        let p = build_classification_prompt(&system, &rules);
        assert!(p.contains("None declared."));
        assert!(p.contains("No rule categories matched."));
        assert!(!p.contains("Sector:"));
    }

    #[test]
    fn search_query_uses_purpose_and_sector() {
        let mut system = AiSystem::new("HireBot", "d", "CV  screening\nfor hiring");
        system.sector = Some("HR".into());
        assert_eq!(
            build_search_query(&system),
            "EU AI Act risk classification CV screening for hiring HR"
        );
    }

    #[test]
    fn search_query_is_cut_at_word_boundary() {
        let system = AiSystem::new("x", "d", "word ".repeat(100));
        let q = build_search_query(&system);
        assert!(q.len() <= MAX_QUERY_CHARS);
        assert!(q.ends_with("word"));
    }
}
