pub mod batch;
pub mod binding;
pub mod engine;
pub mod export;
pub mod identity;
pub mod policy;
pub mod property_filter;
pub mod query;
pub mod revision_diff;
pub mod token_guard;
pub mod validation_rules;

pub use batch::{BatchExecutor, BatchTarget};
pub use binding::BindingPipeline;
pub use engine::{EngineSettings, EntityEngine, SharedServices};
pub use export::{ExportFile, GridExporter};
pub use identity::IdentityResolver;
pub use policy::{EntityPolicy, OpenPolicy};
pub use property_filter::PropertyFilterEvaluator;
pub use query::{QueryFacade, QueryOutcome, SelectOption};
pub use revision_diff::RevisionDiffEngine;
pub use token_guard::TokenGuard;
pub use validation_rules::{ConstraintSet, FullMatch, RuleCache, ValidationRuleCompiler, ValidationRuleSet};
