//! Load-time validation
//!
//! Everything that can be wrong with a configuration is detected here,
//! before a single process is spawned.

use std::collections::{HashMap, HashSet};

use super::harbor::HarborConfig;
use crate::error::ConfigError;

impl HarborConfig {
    /// Validate the whole document and return the dependency-ordered
    /// start sequence (dependencies before dependents).
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        let mut names = HashSet::new();
        let mut ports: HashMap<u16, &str> = HashMap::new();

        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::Invalid("service with empty name".into()));
            }
            if !names.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }
            if service.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "service '{}' has an empty command",
                    service.name
                )));
            }
            if service.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "service '{}' must declare a non-zero port",
                    service.name
                )));
            }
            if let Some(first) = ports.insert(service.port, &service.name) {
                return Err(ConfigError::DuplicatePort {
                    port: service.port,
                    first: first.to_string(),
                    second: service.name.clone(),
                });
            }
            if service.startup_timeout.is_zero() || service.health_check.timeout.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "service '{}' has a zero timeout",
                    service.name
                )));
            }
            let url = service.health_url();
            match reqwest::Url::parse(&url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "service '{}' has an invalid health check URL '{}'",
                        service.name, url
                    )))
                }
            }
        }

        for service in &self.services {
            for dependency in &service.depends_on {
                if !names.contains(dependency.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        service: service.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        if self.target_ports.contains(&0) {
            return Err(ConfigError::Invalid("targetPorts contains port 0".into()));
        }
        if self.probe.interval.is_zero() || self.probe.startup_poll.is_zero() {
            return Err(ConfigError::Invalid("probe intervals must be non-zero".into()));
        }
        if self.probe.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "probe.failureThreshold must be at least 1".into(),
            ));
        }
        if self.backoff.multiplier < 1.0 || !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::Invalid(
                "backoff.multiplier must be >= 1 and backoff.jitter within 0..=1".into(),
            ));
        }
        if self.harness.scenario_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "harness.scenarioTimeoutMs must be non-zero".into(),
            ));
        }

        for watcher in &self.watchers {
            if watcher.path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("watcher with empty path".into()));
            }
            if watcher.poll_interval.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "watcher for {} has a zero poll interval",
                    watcher.path.display()
                )));
            }
            for name in &watcher.restart {
                if !names.contains(name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "watcher for {} restarts unknown service '{}'",
                        watcher.path.display(),
                        name
                    )));
                }
            }
        }

        self.policy.compile()?;

        self.start_order()
    }

    /// Topological order of services, ties broken by configuration order.
    ///
    /// Fails with the members of the first cycle found.
    pub fn start_order(&self) -> Result<Vec<String>, ConfigError> {
        let index: HashMap<&str, usize> = self
            .services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut marks = vec![Mark::Unvisited; self.services.len()];
        let mut order = Vec::with_capacity(self.services.len());
        let mut stack = Vec::new();

        for start in 0..self.services.len() {
            self.visit(start, &index, &mut marks, &mut stack, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        index: &HashMap<&str, usize>,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<String>,
    ) -> Result<(), ConfigError> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let from = stack.iter().position(|&n| n == node).unwrap_or(0);
                let mut cycle: Vec<String> = stack[from..]
                    .iter()
                    .map(|&n| self.services[n].name.clone())
                    .collect();
                cycle.push(self.services[node].name.clone());
                return Err(ConfigError::DependencyCycle(cycle));
            }
            Mark::Unvisited => {}
        }

        marks[node] = Mark::InProgress;
        stack.push(node);
        for dependency in &self.services[node].depends_on {
            let dep = *index.get(dependency.as_str()).ok_or_else(|| {
                ConfigError::UnknownDependency {
                    service: self.services[node].name.clone(),
                    dependency: dependency.clone(),
                }
            })?;
            self.visit(dep, index, marks, stack, order)?;
        }
        stack.pop();
        marks[node] = Mark::Done;
        order.push(self.services[node].name.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}
