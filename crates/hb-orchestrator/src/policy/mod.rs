//! Connection Policy Matcher
//!
//! Collaborators ask [`PolicyMatcher::classify`] before opening an outbound
//! connection. The active [`RuleSet`] sits behind an atomic pointer: a reload
//! swaps the whole set at once, and a classification in progress keeps the
//! snapshot it started with.

mod destination;
mod ruleset;

pub use destination::Destination;
pub use ruleset::{Decision, RuleSet};

use std::sync::Arc;

use arc_swap::ArcSwap;
use hb_core::config::PolicyConfig;
use hb_core::error::PolicyMatchError;
use hb_core::time::current_time_millis;
use hb_core::types::Verdict;

pub struct PolicyMatcher {
    rules: ArcSwap<RuleSet>,
}

impl PolicyMatcher {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules: ArcSwap::from_pointee(rules),
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self, PolicyMatchError> {
        Ok(Self::new(RuleSet::compile(config)?))
    }

    /// Classify a destination against the current rule set.
    ///
    /// `Block` and `RedirectTo` outcomes are written to the audit log.
    pub fn classify(&self, destination: &str) -> Verdict {
        let rules = self.rules.load();
        let decision = rules.classify(destination);

        if let Some(rule) = decision.rule {
            tracing::warn!(
                target: "harbor::audit",
                timestamp = current_time_millis(),
                destination,
                rule = %rule.pattern,
                action = %rule.action,
                "Outbound connection {}",
                decision.verdict
            );
        }
        decision.verdict
    }

    /// Compile and swap in a new rule set. On error the current set stays.
    pub fn reload(&self, config: &PolicyConfig) -> Result<(), PolicyMatchError> {
        let rules = RuleSet::compile(config)?;
        tracing::info!(rules = rules.len(), "Policy rules reloaded");
        self.rules.store(Arc::new(rules));
        Ok(())
    }

    /// The rule set currently in effect
    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.load_full()
    }
}
