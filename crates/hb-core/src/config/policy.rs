//! Connection policy rules
//!
//! Rules are written as `{pattern, action, redirectTarget}` and compiled
//! once per configuration load. Compilation is the only place a rule can be
//! rejected; a compiled [`PolicyRule`] always matches without error.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PolicyMatchError;

/// Destinations that are always allowed when no allowlist is configured
pub const DEFAULT_ALLOWLIST: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Policy section of the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyConfig {
    /// Exact hostnames / IP literals that are always allowed
    #[serde(default = "default_allowlist")]
    pub allowlist: Vec<String>,

    /// Block / redirect rules, in configuration order
    #[serde(default)]
    pub rules: Vec<PolicyRuleConfig>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowlist: default_allowlist(),
            rules: Vec::new(),
        }
    }
}

impl PolicyConfig {
    /// Compile every rule, failing on the first malformed one
    pub fn compile(&self) -> Result<Vec<PolicyRule>, PolicyMatchError> {
        self.rules.iter().map(PolicyRule::compile).collect()
    }
}

fn default_allowlist() -> Vec<String> {
    DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect()
}

/// A rule as written in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyRuleConfig {
    pub pattern: String,
    pub action: RuleActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
}

/// Action keyword in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleActionKind {
    #[serde(rename = "block")]
    Block,
    #[serde(rename = "redirect-to-local", alias = "redirect")]
    RedirectToLocal,
}

/// Compiled destination pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// `a.b.*` - stores `a.b.` so prefix tests stop on an octet boundary
    IpPrefix(String),
    /// `*.example.com` - stores `.example.com`
    DomainSuffix(String),
    /// `example.com` - the name itself or any subdomain of it
    Domain(String),
}

impl Pattern {
    /// Parse a configured pattern string
    pub fn parse(raw: &str) -> Result<Self, PolicyMatchError> {
        let pattern = raw.trim().trim_end_matches('.').to_ascii_lowercase();
        if pattern.is_empty() {
            return Err(PolicyMatchError::EmptyPattern);
        }

        if let Some(prefix) = pattern.strip_suffix(".*") {
            if prefix.contains('*') {
                return Err(PolicyMatchError::MisplacedWildcard(raw.to_string()));
            }
            let octets: Vec<&str> = prefix.split('.').collect();
            let valid = (1..=3).contains(&octets.len())
                && octets.iter().all(|o| !o.is_empty() && o.parse::<u8>().is_ok());
            if !valid {
                return Err(PolicyMatchError::InvalidIpPrefix(raw.to_string()));
            }
            return Ok(Pattern::IpPrefix(format!("{}.", prefix)));
        }

        if let Some(rest) = pattern.strip_prefix("*.") {
            if rest.is_empty() || rest.contains('*') {
                return Err(PolicyMatchError::MisplacedWildcard(raw.to_string()));
            }
            return Ok(Pattern::DomainSuffix(format!(".{}", rest)));
        }

        if pattern.contains('*') {
            return Err(PolicyMatchError::MisplacedWildcard(raw.to_string()));
        }

        Ok(Pattern::Domain(pattern))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::IpPrefix(prefix) => write!(f, "{}*", prefix),
            Pattern::DomainSuffix(suffix) => write!(f, "*{}", suffix),
            Pattern::Domain(domain) => write!(f, "{}", domain),
        }
    }
}

/// What a matching rule does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Block,
    RedirectToLocal { host: String, port: u16 },
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Block => write!(f, "block"),
            RuleAction::RedirectToLocal { host, port } => {
                write!(f, "redirect-to-local {}:{}", host, port)
            }
        }
    }
}

/// A compiled, immutable policy rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub pattern: Pattern,
    pub action: RuleAction,
}

impl PolicyRule {
    /// Compile a configured rule
    pub fn compile(config: &PolicyRuleConfig) -> Result<Self, PolicyMatchError> {
        let pattern = Pattern::parse(&config.pattern)?;
        let action = match (config.action, config.redirect_target.as_deref()) {
            (RuleActionKind::Block, None) => RuleAction::Block,
            (RuleActionKind::Block, Some(_)) => {
                return Err(PolicyMatchError::UnexpectedRedirectTarget(
                    config.pattern.clone(),
                ))
            }
            (RuleActionKind::RedirectToLocal, None) => {
                return Err(PolicyMatchError::MissingRedirectTarget(
                    config.pattern.clone(),
                ))
            }
            (RuleActionKind::RedirectToLocal, Some(target)) => {
                let (host, port) = parse_target(target)?;
                RuleAction::RedirectToLocal { host, port }
            }
        };
        Ok(Self { pattern, action })
    }
}

/// Parse `host:port`, accepting bracketed IPv6 hosts
fn parse_target(target: &str) -> Result<(String, u16), PolicyMatchError> {
    let invalid = || PolicyMatchError::InvalidTarget(target.to_string());
    let (host, port) = target.trim().rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(invalid());
    }
    let port: u16 = port.parse().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}
