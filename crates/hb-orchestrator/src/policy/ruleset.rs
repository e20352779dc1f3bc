//! Immutable, tiered rule set

use hb_core::config::{Pattern, PolicyConfig, PolicyRule, RuleAction};
use hb_core::error::PolicyMatchError;
use hb_core::types::Verdict;

use super::destination::Destination;

/// Outcome of a classification together with the rule that decided it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision<'a> {
    pub verdict: Verdict,
    pub rule: Option<&'a PolicyRule>,
}

/// A compiled rule set, partitioned into match tiers.
///
/// Tiers are consulted in a fixed order: allowlist, IP prefix, domain
/// suffix, domain. Within a tier the first rule in configuration order wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    allowlist: Vec<String>,
    ip_prefix: Vec<PolicyRule>,
    domain_suffix: Vec<PolicyRule>,
    domain: Vec<PolicyRule>,
}

impl RuleSet {
    pub fn compile(config: &PolicyConfig) -> Result<Self, PolicyMatchError> {
        let mut set = RuleSet {
            allowlist: config
                .allowlist
                .iter()
                .map(|a| {
                    let a = a.trim().trim_end_matches('.').to_ascii_lowercase();
                    a.trim_start_matches('[').trim_end_matches(']').to_string()
                })
                .filter(|a| !a.is_empty())
                .collect(),
            ..Default::default()
        };

        for rule in config.compile()? {
            match rule.pattern {
                Pattern::IpPrefix(_) => set.ip_prefix.push(rule),
                Pattern::DomainSuffix(_) => set.domain_suffix.push(rule),
                Pattern::Domain(_) => set.domain.push(rule),
            }
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.ip_prefix.len() + self.domain_suffix.len() + self.domain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classify a destination. Pure: the same rule set and input always give
    /// the same decision.
    pub fn classify(&self, destination: &str) -> Decision<'_> {
        let dest = Destination::parse(destination);

        if self.allowlist.iter().any(|a| *a == dest.host) {
            return Decision {
                verdict: Verdict::Allow,
                rule: None,
            };
        }

        let matched = self
            .ip_prefix
            .iter()
            .find(|r| dest.is_ipv4() && matches_pattern(&r.pattern, &dest.host))
            .or_else(|| {
                self.domain_suffix
                    .iter()
                    .find(|r| matches_pattern(&r.pattern, &dest.host))
            })
            .or_else(|| {
                self.domain
                    .iter()
                    .find(|r| matches_pattern(&r.pattern, &dest.host))
            });

        match matched {
            Some(rule) => Decision {
                verdict: verdict_for(&rule.action),
                rule: Some(rule),
            },
            None => Decision {
                verdict: Verdict::Allow,
                rule: None,
            },
        }
    }
}

fn matches_pattern(pattern: &Pattern, host: &str) -> bool {
    match pattern {
        Pattern::IpPrefix(prefix) => host.starts_with(prefix.as_str()),
        // Stored with its leading dot, so the match is on a label boundary
        Pattern::DomainSuffix(suffix) => host.ends_with(suffix.as_str()),
        Pattern::Domain(domain) => {
            host == domain
                || (host.len() > domain.len()
                    && host.ends_with(domain.as_str())
                    && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
        }
    }
}

fn verdict_for(action: &RuleAction) -> Verdict {
    match action {
        RuleAction::Block => Verdict::Block,
        RuleAction::RedirectToLocal { host, port } => Verdict::RedirectTo {
            host: host.clone(),
            port: *port,
        },
    }
}
