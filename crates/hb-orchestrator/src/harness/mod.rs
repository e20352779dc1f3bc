//! Test Harness
//!
//! Runs a fixed list of named scenarios one after another against a live
//! [`HarborState`]. Every scenario runs under a timeout; a hang or a panic is
//! recorded as a failure and the run continues with the next scenario.

mod report;
mod scenarios;

pub use report::{OverallStatus, ResultStatus, TestReport, TestResult};
pub use scenarios::{builtin_scenarios, BUILTIN_SCENARIOS};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::state::HarborState;

/// Everything a scenario may touch
pub struct HarnessContext {
    pub state: Arc<HarborState>,
    /// Command that occupies a port, `{port}` is substituted.
    /// Without one, port-conflict checks have nothing to evict.
    pub occupant: Option<Vec<String>>,
}

/// A named scenario: setup, check, teardown.
///
/// `check` returns a human-readable detail on success and the failure
/// reason otherwise.
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    async fn setup(&self, _ctx: &HarnessContext) -> Result<(), String> {
        Ok(())
    }

    async fn check(&self, ctx: &HarnessContext) -> Result<String, String>;

    /// Always runs, whatever setup and check did
    async fn teardown(&self, _ctx: &HarnessContext) {}
}

pub struct Harness {
    ctx: Arc<HarnessContext>,
    scenarios: Vec<Arc<dyn Scenario>>,
    timeout: Duration,
}

impl Harness {
    pub fn new(ctx: HarnessContext, timeout: Duration) -> Self {
        Self {
            ctx: Arc::new(ctx),
            scenarios: Vec::new(),
            timeout,
        }
    }

    pub fn with_scenario(mut self, scenario: Arc<dyn Scenario>) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn with_scenarios(mut self, scenarios: Vec<Arc<dyn Scenario>>) -> Self {
        self.scenarios.extend(scenarios);
        self
    }

    /// Run every scenario sequentially and aggregate the results
    pub async fn run(&self, report_name: &str) -> TestReport {
        let mut results = Vec::with_capacity(self.scenarios.len());
        for scenario in &self.scenarios {
            let result = self.run_one(scenario.clone()).await;
            match result.status {
                ResultStatus::Pass => {
                    tracing::info!(scenario = %result.name, duration_ms = result.duration_ms, "PASS")
                }
                ResultStatus::Fail => tracing::warn!(
                    scenario = %result.name,
                    duration_ms = result.duration_ms,
                    "FAIL: {}",
                    result.detail
                ),
            }
            results.push(result);
        }
        let report = TestReport::new(report_name, results);
        tracing::info!(overall = %report.overall, passed = report.passed, failed = report.failed, "Test run finished");
        report
    }

    async fn run_one(&self, scenario: Arc<dyn Scenario>) -> TestResult {
        let name = scenario.name().to_string();
        let started = Instant::now();

        let task = tokio::spawn({
            let scenario = scenario.clone();
            let ctx = self.ctx.clone();
            async move {
                scenario.setup(&ctx).await.map_err(|e| format!("setup: {}", e))?;
                scenario.check(&ctx).await
            }
        });
        let abort = task.abort_handle();

        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) if e.is_panic() => Err("panicked".to_string()),
            Ok(Err(e)) => Err(format!("aborted: {}", e)),
            Err(_) => {
                abort.abort();
                Err("timeout".to_string())
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        if tokio::time::timeout(self.timeout, scenario.teardown(&self.ctx))
            .await
            .is_err()
        {
            tracing::warn!(scenario = %name, "Teardown timed out");
        }

        let (status, detail) = match outcome {
            Ok(detail) => (ResultStatus::Pass, detail),
            Err(reason) => (ResultStatus::Fail, reason),
        };
        TestResult {
            name,
            status,
            duration_ms,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hb_core::config::HarborConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        outcome: Result<&'static str, &'static str>,
        teardowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Scenario for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        async fn check(&self, _ctx: &HarnessContext) -> Result<String, String> {
            self.outcome.map(String::from).map_err(String::from)
        }
        async fn teardown(&self, _ctx: &HarnessContext) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Hangs;

    #[async_trait]
    impl Scenario for Hangs {
        fn name(&self) -> &str {
            "hangs"
        }
        async fn check(&self, _ctx: &HarnessContext) -> Result<String, String> {
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    struct Panics;

    #[async_trait]
    impl Scenario for Panics {
        fn name(&self) -> &str {
            "panics"
        }
        async fn check(&self, _ctx: &HarnessContext) -> Result<String, String> {
            panic!("boom");
        }
    }

    fn context() -> HarnessContext {
        HarnessContext {
            state: Arc::new(HarborState::new(HarborConfig::default()).unwrap()),
            occupant: None,
        }
    }

    fn fixed(
        name: &'static str,
        outcome: Result<&'static str, &'static str>,
        teardowns: &Arc<AtomicUsize>,
    ) -> Arc<dyn Scenario> {
        Arc::new(Fixed {
            name,
            outcome,
            teardowns: teardowns.clone(),
        })
    }

    #[tokio::test]
    async fn test_all_pass() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let harness = Harness::new(context(), Duration::from_secs(1))
            .with_scenario(fixed("one", Ok("fine"), &teardowns))
            .with_scenario(fixed("two", Ok("fine"), &teardowns));

        let report = harness.run("unit").await;
        assert_eq!(report.overall, OverallStatus::Pass);
        assert_eq!(teardowns.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure_and_run_continues() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let harness = Harness::new(context(), Duration::from_millis(100))
            .with_scenario(Arc::new(Hangs))
            .with_scenario(fixed("after", Ok("still ran"), &teardowns));

        let report = harness.run("unit").await;
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].status, ResultStatus::Fail);
        assert_eq!(report.results[0].detail, "timeout");
        assert!(report.results[1].passed());
        assert_eq!(report.overall, OverallStatus::Partial);
    }

    #[tokio::test]
    async fn test_panic_and_failure_are_recorded() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let harness = Harness::new(context(), Duration::from_secs(1))
            .with_scenario(Arc::new(Panics))
            .with_scenario(fixed("fails", Err("wrong answer"), &teardowns));

        let report = harness.run("unit").await;
        assert_eq!(report.overall, OverallStatus::Fail);
        assert_eq!(report.results[0].detail, "panicked");
        assert_eq!(report.results[1].detail, "wrong answer");
        // Teardown runs for failures too
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }
}
