// AnalysisService: the risk-classification pipeline.
//
// analyze() pre-screens a system with the keyword rules, asks the provider
// chain for a verdict, and falls back to the rules whenever the chain is
// exhausted or its answer names no tier. A search digest is not a verdict;
// it is folded into the rule classifier as extra evidence.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use aiact_core::config::Config;
use aiact_core::db::Database;
use aiact_core::domain::{AiSystem, AnalysisSource, DocumentKind, RiskAssessment};
use aiact_core::{AppError, AppResult};
use aiact_llm::parse::parse_analysis;
use aiact_llm::{ChainEvent, Completion, CompletionRequest, ProviderChain, ProviderKind};
use aiact_risk::assessment::{build_assessment, reconcile, Finding};
use aiact_risk::{documents, prompt, RuleClassification, RuleClassifier};

pub struct AnalysisService {
    config: Config,
    chain: ProviderChain,
    classifier: RuleClassifier,
    db: Arc<Database>,
}

impl AnalysisService {
    pub fn new(config: Config, chain: ProviderChain, db: Arc<Database>) -> Self {
        let classifier = RuleClassifier::new(&config.classification);
        Self {
            config,
            chain,
            classifier,
            db,
        }
    }

    /// Open the configured database and build the provider chain from the
    /// configured credentials.
    pub fn from_config(config: Config) -> AppResult<Self> {
        let db = Arc::new(Database::open(&config.db_path)?);
        let chain = ProviderChain::from_config(&config);
        if chain.is_empty() {
            warn!("no analysis providers configured; assessments will be rule-based");
        }
        Ok(Self::new(config, chain, db))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        self.chain.kinds()
    }

    // -- inventory --

    pub fn register_system(&self, system: AiSystem) -> AppResult<AiSystem> {
        if system.name.trim().is_empty() {
            return Err(AppError::validation("name", "must not be empty"));
        }
        if system.description.trim().is_empty() {
            return Err(AppError::validation("description", "must not be empty"));
        }
        self.db.insert_system(&system)?;
        info!(id = %system.id, name = %system.name, "registered AI system");
        Ok(system)
    }

    pub fn get_system(&self, id: &str) -> AppResult<AiSystem> {
        self.db
            .get_system(id)?
            .ok_or_else(|| AppError::not_found("AI system", id))
    }

    pub fn list_systems(&self) -> AppResult<Vec<AiSystem>> {
        self.db.list_systems()
    }

    pub fn delete_system(&self, id: &str) -> AppResult<()> {
        if !self.db.delete_system(id)? {
            return Err(AppError::not_found("AI system", id));
        }
        info!(id, "deleted AI system");
        Ok(())
    }

    pub fn latest_assessment(&self, system_id: &str) -> AppResult<Option<RiskAssessment>> {
        self.db.latest_assessment(system_id)
    }

    // -- analysis --

    /// Classify a stored system through the provider chain, record the
    /// assessment and return it. Provider progress is reported on `events`.
    pub async fn analyze(
        &self,
        system_id: &str,
        events: Option<&mpsc::Sender<ChainEvent>>,
    ) -> AppResult<RiskAssessment> {
        let system = self.get_system(system_id)?;
        let rules = self.classifier.classify(&system);

        let request = CompletionRequest {
            system: prompt::system_prompt(),
            user: prompt::build_classification_prompt(&system, &rules),
            max_tokens: self.config.analysis.max_tokens,
            temperature: self.config.analysis.temperature,
            search_query: Some(prompt::build_search_query(&system)),
        };

        let finding = match self.chain.complete(&request, events).await {
            Ok(completion) => self.finding_from_completion(&system, &rules, completion),
            Err(e) => {
                warn!(system = %system.name, "{e}; using rule-based classification");
                None
            }
        }
        .unwrap_or_else(|| rule_finding(&rules));

        let assessment = build_assessment(&system, finding);
        self.db.record_assessment(&assessment)?;
        info!(
            system = %system.name,
            level = %assessment.risk_level,
            source = assessment.source.as_str(),
            score = assessment.compliance_score,
            "assessment recorded"
        );
        Ok(assessment)
    }

    fn finding_from_completion(
        &self,
        system: &AiSystem,
        rules: &RuleClassification,
        completion: Completion,
    ) -> Option<Finding> {
        let floor = self.config.analysis.enforce_rule_floor;
        let floor_min = self.config.classification.floor_min_confidence;

        let source = match completion.provider {
            ProviderKind::DeepSeek => AnalysisSource::DeepSeek,
            ProviderKind::Gemini => AnalysisSource::Gemini,
            ProviderKind::GoogleSearch => {
                let augmented = self
                    .classifier
                    .classify_with_context(system, &completion.text);
                let (level, confidence) =
                    reconcile(Some(augmented.level), Some(augmented.confidence), rules, floor, floor_min);
                return Some(Finding {
                    level,
                    confidence,
                    categories: augmented.category_titles(),
                    reasoning: format!(
                        "{}\n\nSources consulted:\n{}",
                        augmented.reasoning(),
                        completion.text
                    ),
                    recommendations: Vec::new(),
                    source: AnalysisSource::SearchAugmented,
                });
            }
        };

        let parsed = parse_analysis(&completion.text);
        let Some(model_level) = parsed.risk_level else {
            warn!(
                provider = %completion.provider,
                "answer names no risk tier; using rule-based classification"
            );
            return None;
        };

        let (level, confidence) =
            reconcile(Some(model_level), parsed.confidence, rules, floor, floor_min);

        let mut reasoning = parsed
            .reasoning
            .unwrap_or_else(|| format!("{} classified the system as {model_level}.", completion.provider));
        if level != model_level {
            info!(%model_level, %level, "rule floor raised the model's tier");
            reasoning.push_str(&format!(
                "\n\nRule floor applied: {}",
                rules.reasoning()
            ));
        }

        let categories = if parsed.categories.is_empty() || level != model_level {
            rules.category_titles()
        } else {
            parsed.categories
        };

        Some(Finding {
            level,
            confidence,
            categories,
            reasoning,
            recommendations: parsed.recommendations,
            source,
        })
    }

    /// Rules-only assessment. Nothing is persisted and no provider is called.
    pub fn classify_only(&self, system: &AiSystem) -> RiskAssessment {
        let rules = self.classifier.classify(system);
        build_assessment(system, rule_finding(&rules))
    }

    // -- documents --

    /// Generate and store every document the latest assessment requires.
    pub fn generate_documents(&self, system_id: &str) -> AppResult<Vec<(DocumentKind, String)>> {
        let system = self.get_system(system_id)?;
        let assessment = self
            .db
            .latest_assessment(system_id)?
            .ok_or_else(|| AppError::not_found("risk assessment", system_id))?;
        documents::ensure_documentable(&system, &assessment)?;

        let mut generated = Vec::with_capacity(assessment.required_documents.len());
        for kind in &assessment.required_documents {
            let content = documents::generate(*kind, &system, &assessment)?;
            self.db.save_document(system_id, *kind, &content)?;
            generated.push((*kind, content));
        }
        info!(system = %system.name, count = generated.len(), "documents generated");
        Ok(generated)
    }
}

fn rule_finding(rules: &RuleClassification) -> Finding {
    Finding {
        level: rules.level,
        confidence: rules.confidence,
        categories: rules.category_titles(),
        reasoning: rules.reasoning(),
        recommendations: Vec::new(),
        source: AnalysisSource::RuleBased,
    }
}
