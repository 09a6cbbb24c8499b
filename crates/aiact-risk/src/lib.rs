// EU AI Act domain logic that needs no network: the keyword rule tables and
// classifier, obligations and compliance scoring per tier, prompt
// construction for the model providers, and Markdown document generation.

pub mod assessment;
pub mod documents;
pub mod prompt;
pub mod rules;

pub use rules::{CategoryMatch, RuleClassification, RuleClassifier};
