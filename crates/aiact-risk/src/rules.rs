// Keyword rule tables for the EU AI Act and the scorer that classifies a
// system against them.
//
// Each category carries weighted keywords. A system's profile text is
// lowercased and scanned for each keyword on word boundaries; a category's
// score is the sum of its matched weights plus structured-signal bonuses.
// The system lands in the most severe tier whose best category reaches that
// tier's threshold.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::{debug, warn};

use aiact_core::config::ClassificationConfig;
use aiact_core::domain::{AiSystem, RiskLevel};

// ---------------------------------------------------------------------------
// Rule tables
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RuleCategory {
    pub id: &'static str,
    pub title: &'static str,
    pub level: RiskLevel,
    pub article: &'static str,
    pub keywords: &'static [(&'static str, f64)],
}

const BIOMETRIC_DATA_BONUS: f64 = 1.0;
const AUTOMATED_DECISION_BONUS: f64 = 0.5;
const USER_FACING_BONUS: f64 = 0.5;

pub static CATEGORIES: &[RuleCategory] = &[
    // Article 5: prohibited practices
    RuleCategory {
        id: "subliminal_manipulation",
        title: "Subliminal or manipulative techniques",
        level: RiskLevel::Unacceptable,
        article: "Art. 5(1)(a)",
        keywords: &[
            ("subliminal", 2.0),
            ("manipulative techniques", 1.5),
            ("behavioural manipulation", 1.5),
            ("behavioral manipulation", 1.5),
            ("dark patterns", 1.0),
        ],
    },
    RuleCategory {
        id: "exploiting_vulnerabilities",
        title: "Exploitation of vulnerabilities",
        level: RiskLevel::Unacceptable,
        article: "Art. 5(1)(b)",
        keywords: &[
            ("exploit vulnerabilities", 2.0),
            ("exploiting vulnerabilities", 2.0),
            ("exploits vulnerabilities", 2.0),
            ("vulnerable groups", 1.0),
            ("targets children", 1.0),
        ],
    },
    RuleCategory {
        id: "social_scoring",
        title: "Social scoring",
        level: RiskLevel::Unacceptable,
        article: "Art. 5(1)(c)",
        keywords: &[
            ("social scoring", 2.0),
            ("social score", 2.0),
            ("citizen score", 2.0),
            ("trustworthiness score", 1.5),
            ("social behaviour rating", 1.5),
        ],
    },
    RuleCategory {
        id: "predictive_policing",
        title: "Crime prediction based on profiling",
        level: RiskLevel::Unacceptable,
        article: "Art. 5(1)(d)",
        keywords: &[
            ("predictive policing", 2.0),
            ("crime prediction", 1.5),
            ("predict criminal", 1.5),
            ("likelihood of offending", 1.5),
        ],
    },
    RuleCategory {
        id: "facial_scraping",
        title: "Untargeted scraping of facial images",
        level: RiskLevel::Unacceptable,
        article: "Art. 5(1)(e)",
        keywords: &[
            ("untargeted scraping", 2.0),
            ("scrape facial images", 2.0),
            ("scraping facial images", 2.0),
            ("facial image scraping", 2.0),
            ("facial recognition database", 1.0),
        ],
    },
    RuleCategory {
        id: "workplace_emotion_recognition",
        title: "Emotion recognition in the workplace or education",
        level: RiskLevel::Unacceptable,
        article: "Art. 5(1)(f)",
        keywords: &[
            ("emotion recognition in the workplace", 2.0),
            ("workplace emotion", 2.0),
            ("employee emotions", 2.0),
            ("emotions of employees", 2.0),
            ("student emotions", 2.0),
            ("emotions of students", 2.0),
        ],
    },
    RuleCategory {
        id: "sensitive_biometric_categorisation",
        title: "Biometric categorisation of sensitive traits",
        level: RiskLevel::Unacceptable,
        article: "Art. 5(1)(g)",
        keywords: &[
            ("infer sexual orientation", 2.0),
            ("infer political opinions", 2.0),
            ("infer religious beliefs", 2.0),
            ("infer race", 2.0),
            ("biometric categorisation", 1.0),
            ("biometric categorization", 1.0),
        ],
    },
    RuleCategory {
        id: "realtime_remote_biometric_identification",
        title: "Real-time remote biometric identification in public spaces",
        level: RiskLevel::Unacceptable,
        article: "Art. 5(1)(h)",
        keywords: &[
            ("real-time remote biometric identification", 2.0),
            ("live facial recognition", 2.0),
            ("real-time facial recognition", 1.5),
            ("publicly accessible spaces", 1.0),
            ("mass surveillance", 1.5),
        ],
    },
    // Annex III and Annex I: high risk
    RuleCategory {
        id: "biometrics",
        title: "Biometric identification and categorisation",
        level: RiskLevel::High,
        article: "Annex III(1)",
        keywords: &[
            ("biometric identification", 2.0),
            ("facial recognition", 1.5),
            ("face recognition", 1.5),
            ("biometric", 1.0),
            ("fingerprint", 1.0),
            ("iris scan", 1.0),
            ("voice identification", 1.0),
        ],
    },
    RuleCategory {
        id: "critical_infrastructure",
        title: "Critical infrastructure",
        level: RiskLevel::High,
        article: "Annex III(2)",
        keywords: &[
            ("critical infrastructure", 2.0),
            ("power grid", 1.5),
            ("water supply", 1.5),
            ("gas supply", 1.5),
            ("traffic management", 1.5),
            ("road traffic", 1.0),
            ("electricity", 1.0),
            ("heating", 0.5),
        ],
    },
    RuleCategory {
        id: "education",
        title: "Education and vocational training",
        level: RiskLevel::High,
        article: "Annex III(3)",
        keywords: &[
            ("student assessment", 1.5),
            ("exam proctoring", 1.5),
            ("proctoring", 1.0),
            ("admissions", 1.0),
            ("admission", 1.0),
            ("grading", 1.0),
            ("exams", 1.0),
            ("exam", 1.0),
            ("learning outcomes", 1.0),
            ("educational institution", 1.0),
            ("students", 0.5),
        ],
    },
    RuleCategory {
        id: "employment",
        title: "Employment and workers management",
        level: RiskLevel::High,
        article: "Annex III(4)",
        keywords: &[
            ("recruitment", 1.0),
            ("recruiting", 1.0),
            ("hiring", 1.0),
            ("job applicants", 1.0),
            ("cvs", 1.0),
            ("cv", 1.0),
            ("resumes", 1.0),
            ("resume", 1.0),
            ("employee performance", 1.5),
            ("task allocation", 1.0),
            ("termination", 1.0),
            ("promotion decisions", 1.0),
            ("candidates", 0.5),
        ],
    },
    RuleCategory {
        id: "essential_services",
        title: "Access to essential private and public services",
        level: RiskLevel::High,
        article: "Annex III(5)",
        keywords: &[
            ("credit scoring", 2.0),
            ("credit score", 2.0),
            ("creditworthiness", 2.0),
            ("life insurance", 1.5),
            ("health insurance", 1.5),
            ("insurance pricing", 1.5),
            ("public benefits", 1.5),
            ("social benefits", 1.5),
            ("emergency calls", 1.5),
            ("emergency dispatch", 1.5),
            ("loans", 1.0),
            ("loan", 1.0),
        ],
    },
    RuleCategory {
        id: "law_enforcement",
        title: "Law enforcement",
        level: RiskLevel::High,
        article: "Annex III(6)",
        keywords: &[
            ("law enforcement", 1.5),
            ("criminal investigation", 1.5),
            ("evidence reliability", 1.5),
            ("recidivism", 1.5),
            ("polygraph", 1.5),
            ("police", 1.0),
        ],
    },
    RuleCategory {
        id: "migration_border",
        title: "Migration, asylum and border control",
        level: RiskLevel::High,
        article: "Annex III(7)",
        keywords: &[
            ("border control", 2.0),
            ("asylum", 1.5),
            ("visa applications", 1.5),
            ("visa application", 1.5),
            ("immigration", 1.0),
            ("migration", 1.0),
        ],
    },
    RuleCategory {
        id: "justice_democracy",
        title: "Administration of justice and democratic processes",
        level: RiskLevel::High,
        article: "Annex III(8)",
        keywords: &[
            ("judicial", 1.5),
            ("court decisions", 1.5),
            ("sentencing", 1.5),
            ("voting behaviour", 1.5),
            ("voting behavior", 1.5),
            ("dispute resolution", 1.0),
            ("elections", 1.0),
            ("election", 1.0),
            ("voters", 1.0),
        ],
    },
    RuleCategory {
        id: "safety_component",
        title: "Safety component of a regulated product",
        level: RiskLevel::High,
        article: "Art. 6(1), Annex I",
        keywords: &[
            ("safety component", 2.0),
            ("medical devices", 2.0),
            ("medical device", 2.0),
            ("autonomous driving", 2.0),
            ("autonomous vehicle", 2.0),
            ("aviation", 1.5),
            ("diagnosis", 1.0),
            ("diagnostic", 1.0),
            ("machinery", 1.0),
            ("toys", 1.0),
        ],
    },
    // Article 50: transparency obligations
    RuleCategory {
        id: "conversational_agent",
        title: "System interacting directly with people",
        level: RiskLevel::Limited,
        article: "Art. 50(1)",
        keywords: &[
            ("chatbot", 1.5),
            ("chat bot", 1.5),
            ("virtual assistant", 1.5),
            ("voice assistant", 1.5),
            ("conversational", 1.0),
            ("customer support", 0.5),
        ],
    },
    RuleCategory {
        id: "synthetic_content",
        title: "Synthetic content and deepfakes",
        level: RiskLevel::Limited,
        article: "Art. 50(2), 50(4)",
        keywords: &[
            ("deepfakes", 2.0),
            ("deepfake", 2.0),
            ("synthetic media", 1.5),
            ("image generation", 1.5),
            ("voice cloning", 1.5),
            ("synthetic voice", 1.5),
            ("generated images", 1.0),
            ("text generation", 1.0),
            ("generative", 1.0),
        ],
    },
    RuleCategory {
        id: "emotion_recognition",
        title: "Emotion recognition or biometric categorisation disclosure",
        level: RiskLevel::Limited,
        article: "Art. 50(3)",
        keywords: &[
            ("emotion recognition", 1.5),
            ("emotion detection", 1.5),
            ("biometric categorisation", 1.5),
            ("biometric categorization", 1.5),
            ("sentiment analysis", 0.5),
        ],
    },
];

pub fn category(id: &str) -> Option<&'static RuleCategory> {
    CATEGORIES.iter().find(|c| c.id == id)
}

// ---------------------------------------------------------------------------
// Classification result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMatch {
    pub id: &'static str,
    pub title: &'static str,
    pub level: RiskLevel,
    pub article: &'static str,
    pub score: f64,
    pub keywords: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleClassification {
    pub level: RiskLevel,
    pub confidence: f64,
    /// Best category score per tier (Minimal is never scored).
    pub score_by_level: BTreeMap<RiskLevel, f64>,
    /// Matched categories, most severe tier first, then by score.
    pub matched: Vec<CategoryMatch>,
}

impl RuleClassification {
    /// Matches in the classified tier.
    pub fn decisive(&self) -> impl Iterator<Item = &CategoryMatch> {
        self.matched.iter().filter(move |m| m.level == self.level)
    }

    /// Titles of the matches that decided the tier.
    pub fn category_titles(&self) -> Vec<String> {
        self.decisive().map(|m| m.title.to_string()).collect()
    }

    /// One-paragraph explanation used when no model answer is available.
    pub fn reasoning(&self) -> String {
        let decisive: Vec<String> = self
            .decisive()
            .map(|m| {
                format!(
                    "{} ({}; matched: {})",
                    m.title,
                    m.article,
                    if m.keywords.is_empty() {
                        "declared data types".to_string()
                    } else {
                        m.keywords.join(", ")
                    }
                )
            })
            .collect();

        if decisive.is_empty() {
            return "Rule-based screening found no indicators of prohibited, high-risk or \
                    transparency-relevant use. The system is treated as minimal risk."
                .to_string();
        }
        format!(
            "Rule-based screening classified the system as {} based on: {}.",
            self.level.label().to_lowercase(),
            decisive.join("; ")
        )
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// A category with its keywords compiled to word-boundary patterns.
struct CompiledCategory {
    category: &'static RuleCategory,
    keywords: Vec<(Regex, &'static str, f64)>,
}

pub struct RuleClassifier {
    thresholds: ClassificationConfig,
    categories: Vec<CompiledCategory>,
}

impl RuleClassifier {
    pub fn new(thresholds: &ClassificationConfig) -> Self {
        let categories = CATEGORIES
            .iter()
            .map(|category| {
                let keywords = category
                    .keywords
                    .iter()
                    .filter_map(|&(kw, weight)| match keyword_pattern(kw) {
                        Ok(re) => Some((re, kw, weight)),
                        Err(e) => {
                            warn!(category = category.id, keyword = kw, "skipping keyword: {e}");
                            None
                        }
                    })
                    .collect();
                CompiledCategory { category, keywords }
            })
            .collect();
        Self {
            thresholds: thresholds.clone(),
            categories,
        }
    }

    fn threshold(&self, level: RiskLevel) -> f64 {
        match level {
            RiskLevel::Unacceptable => self.thresholds.unacceptable_threshold,
            RiskLevel::High => self.thresholds.high_threshold,
            RiskLevel::Limited => self.thresholds.limited_threshold,
            RiskLevel::Minimal => 0.0,
        }
    }

    pub fn classify(&self, system: &AiSystem) -> RuleClassification {
        self.classify_with_context(system, "")
    }

    /// Classify with extra evidence (e.g. a search digest) appended to the
    /// profile text. Structured signals come from `system` only.
    pub fn classify_with_context(&self, system: &AiSystem, context: &str) -> RuleClassification {
        let mut text = system.profile_text().to_lowercase();
        if !context.trim().is_empty() {
            text.push('\n');
            text.push_str(&context.to_lowercase());
        }
        let biometric_data = system
            .data_types
            .iter()
            .any(|d| d.to_lowercase().contains("biometric"));

        let mut matched = Vec::new();
        for compiled in &self.categories {
            let cat = compiled.category;
            let hits: Vec<(&'static str, f64)> = compiled
                .keywords
                .iter()
                .filter(|(re, _, _)| re.is_match(&text))
                .map(|(_, kw, weight)| (*kw, *weight))
                .collect();

            let mut score: f64 = hits.iter().map(|(_, w)| w).sum();
            if cat.id == "biometrics" && biometric_data {
                score += BIOMETRIC_DATA_BONUS;
            }
            if !hits.is_empty() {
                if cat.level == RiskLevel::High && system.automated_decisions {
                    score += AUTOMATED_DECISION_BONUS;
                }
                if cat.id == "conversational_agent" && system.user_facing {
                    score += USER_FACING_BONUS;
                }
            }

            if score > 0.0 {
                matched.push(CategoryMatch {
                    id: cat.id,
                    title: cat.title,
                    level: cat.level,
                    article: cat.article,
                    score,
                    keywords: hits.into_iter().map(|(kw, _)| kw).collect(),
                });
            }
        }
        matched.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then(b.score.total_cmp(&a.score))
                .then(a.id.cmp(b.id))
        });

        let mut score_by_level = BTreeMap::new();
        for level in [RiskLevel::Limited, RiskLevel::High, RiskLevel::Unacceptable] {
            let best = matched
                .iter()
                .filter(|m| m.level == level)
                .map(|m| m.score)
                .fold(0.0_f64, f64::max);
            score_by_level.insert(level, best);
        }

        let decided = [RiskLevel::Unacceptable, RiskLevel::High, RiskLevel::Limited]
            .into_iter()
            .find_map(|level| {
                let threshold = self.threshold(level);
                let best = matched
                    .iter()
                    .filter(|m| m.level == level)
                    .max_by(|a, b| a.score.total_cmp(&b.score))?;
                (best.score >= threshold).then(|| {
                    let confidence = 0.5
                        + 0.1 * (best.score - threshold)
                        + 0.05 * best.keywords.len() as f64;
                    (level, confidence.min(0.95))
                })
            });

        let (level, confidence) = decided.unwrap_or_else(|| {
            let limited = score_by_level
                .get(&RiskLevel::Limited)
                .copied()
                .unwrap_or(0.0);
            let confidence = 0.6 - 0.1 * (limited / self.thresholds.limited_threshold);
            (RiskLevel::Minimal, confidence.clamp(0.3, 0.6))
        });

        debug!(
            system = %system.name,
            %level,
            confidence,
            matched = matched.len(),
            "rule classification"
        );

        RuleClassification {
            level,
            confidence,
            score_by_level,
            matched,
        }
    }
}

/// Matches `keyword` as a whole phrase: word boundaries on both ends.
fn keyword_pattern(keyword: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\b{}\b", regex::escape(keyword)))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn thresholds() -> ClassificationConfig {
        ClassificationConfig {
            unacceptable_threshold: 2.0,
            high_threshold: 2.0,
            limited_threshold: 1.5,
            floor_min_confidence: 0.6,
        }
    }

    fn classifier() -> RuleClassifier {
        RuleClassifier::new(&thresholds())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn tables_are_well_formed() {
        let mut ids = HashSet::new();
        for cat in CATEGORIES {
            assert!(ids.insert(cat.id), "duplicate category id {}", cat.id);
            assert!(!cat.keywords.is_empty(), "{} has no keywords", cat.id);
            assert_ne!(cat.level, RiskLevel::Minimal);
            for (kw, weight) in cat.keywords {
                assert_eq!(*kw, kw.to_lowercase(), "keyword not lowercase: {kw}");
                assert!(*weight > 0.0);
            }
        }
        assert!(category("biometrics").is_some());
        assert!(category("conversational_agent").is_some());
    }

    #[test]
    fn phrase_matching_respects_word_boundaries() {
        let matches = |text: &str, kw: &str| keyword_pattern(kw).unwrap().is_match(text);
        assert!(matches("upload a cv.", "cv"));
        assert!(matches("cv", "cv"));
        assert!(!matches("the scv module", "cv"));
        assert!(!matches("cvs", "cv"));
        assert!(matches("uses real-time remote data", "real-time"));
        assert!(!matches("examples only", "exam"));
        assert!(matches("an example, then an exam", "exam"));
    }

    #[test]
    fn every_keyword_compiles() {
        let classifier = RuleClassifier::new(&thresholds());
        let compiled: usize = classifier.categories.iter().map(|c| c.keywords.len()).sum();
        let declared: usize = CATEGORIES.iter().map(|c| c.keywords.len()).sum();
        assert_eq!(compiled, declared);
    }

    #[test]
    fn social_scoring_is_unacceptable() {
        let system = AiSystem::new(
            "CitizenRank",
            "Assigns a social score to every citizen based on behaviour",
            "Social scoring for municipal services",
        );
        let result = classifier().classify(&system);
        assert_eq!(result.level, RiskLevel::Unacceptable);
        // 4.0 score, two keywords.
        assert!(approx(result.confidence, 0.8), "got {}", result.confidence);
        assert_eq!(result.category_titles(), vec!["Social scoring"]);
        assert!(approx(result.score_by_level[&RiskLevel::Unacceptable], 4.0));
    }

    #[test]
    fn recruitment_screening_is_high_risk() {
        let mut system = AiSystem::new(
            "HireBot",
            "Ranks CVs of job applicants",
            "Recruitment screening and hiring recommendations",
        );
        system.automated_decisions = true;

        let result = classifier().classify(&system);
        assert_eq!(result.level, RiskLevel::High);
        let top = result.decisive().next().unwrap();
        assert_eq!(top.id, "employment");
        assert!(approx(top.score, 4.5));
        assert_eq!(top.keywords.len(), 4);
        assert!(approx(result.confidence, 0.95));
    }

    #[test]
    fn automated_decisions_only_boost_matched_categories() {
        let mut system = AiSystem::new("Mail filter", "Filters spam email", "Email spam filtering");
        system.automated_decisions = true;
        let result = classifier().classify(&system);
        assert_eq!(result.level, RiskLevel::Minimal);
        assert!(result.matched.is_empty());
    }

    #[test]
    fn customer_chatbot_is_limited() {
        let mut system = AiSystem::new(
            "Support chat",
            "Answers customer questions",
            "Customer support chatbot on our website",
        );
        system.user_facing = true;

        let result = classifier().classify(&system);
        assert_eq!(result.level, RiskLevel::Limited);
        let top = result.decisive().next().unwrap();
        assert_eq!(top.id, "conversational_agent");
        assert!(approx(top.score, 2.5));
        assert!(approx(result.confidence, 0.7), "got {}", result.confidence);
    }

    #[test]
    fn nothing_matched_is_minimal_with_default_confidence() {
        let system = AiSystem::new("Mail filter", "Filters spam email", "Email spam filtering");
        let result = classifier().classify(&system);
        assert_eq!(result.level, RiskLevel::Minimal);
        assert!(approx(result.confidence, 0.6));
        assert!(result.reasoning().contains("minimal risk"));
    }

    #[test]
    fn weak_limited_signal_lowers_minimal_confidence() {
        let system = AiSystem::new(
            "Helpdesk router",
            "Routes tickets for customer support",
            "Ticket triage",
        );
        let result = classifier().classify(&system);
        assert_eq!(result.level, RiskLevel::Minimal);
        // 0.5 limited score against a 1.5 threshold.
        assert!(approx(result.confidence, 0.6 - 0.1 / 3.0));
    }

    #[test]
    fn biometric_data_type_adds_to_biometrics() {
        let mut system = AiSystem::new("DoorAccess", "Unlocks office doors", "Building access control");
        system.data_types = vec!["biometric templates".into()];

        let result = classifier().classify(&system);
        assert_eq!(result.level, RiskLevel::High);
        let top = result.decisive().next().unwrap();
        assert_eq!(top.id, "biometrics");
        assert!(approx(top.score, 2.0));
        assert!(approx(result.confidence, 0.55));
    }

    #[test]
    fn keyword_counts_once_per_category() {
        let system = AiSystem::new("Loan bot", "loan loan loan", "loan approvals");
        let result = classifier().classify(&system);
        let m = result.matched.iter().find(|m| m.id == "essential_services").unwrap();
        assert!(approx(m.score, 1.0));
        assert_eq!(result.level, RiskLevel::Minimal);
    }

    #[test]
    fn search_context_can_raise_the_tier() {
        let system = AiSystem::new("Scorer", "Scores applicants", "Financial decisions");
        let plain = classifier().classify(&system);
        assert_eq!(plain.level, RiskLevel::Minimal);

        let digest = "- Annex III: Credit scoring of natural persons is high-risk (https://x)";
        let augmented = classifier().classify_with_context(&system, digest);
        assert_eq!(augmented.level, RiskLevel::High);
        assert!(augmented.reasoning().contains("credit scoring"));
    }

    #[test]
    fn most_severe_tier_wins() {
        let system = AiSystem::new(
            "CityCam",
            "Live facial recognition across publicly accessible spaces",
            "Mass surveillance for law enforcement",
        );
        let result = classifier().classify(&system);
        assert_eq!(result.level, RiskLevel::Unacceptable);
        assert_eq!(result.matched[0].level, RiskLevel::Unacceptable);
        assert!(result
            .matched
            .iter()
            .any(|m| m.level == RiskLevel::High && m.id == "law_enforcement"));
    }

    #[test]
    fn classification_is_deterministic() {
        let mut system = AiSystem::new(
            "Tutor",
            "Conversational tutor that grades exams",
            "Student assessment",
        );
        system.user_facing = true;
        let a = classifier().classify(&system);
        let b = classifier().classify(&system);
        assert_eq!(a, b);
    }
}
