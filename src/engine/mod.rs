//! Audit engine
//!
//! Drives a batch of targets through probing, evaluation, and recording.
//! Target concurrency is bounded by a semaphore; within one target the four
//! probes run as independent tasks with their own timeouts, and a hard
//! wall-clock budget caps the whole target. A target that exhausts its
//! budget is finalized from whatever probe results exist at that moment,
//! with the missing probes recorded as timeouts. One target's failure never
//! touches another: the engine always produces exactly one record per input
//! target, in input order.

pub mod evaluator;
pub mod model;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::app::config::Config;
use crate::engine::model::{
    summarize, BatchResult, ComplianceCode, ComplianceVerdict, Target, TargetAuditRecord,
};
use crate::error::ProbeError;
use crate::probe::{ProbeKind, ProbeResult, ProbeSet};

/// Lifecycle of one target within a batch. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPhase {
    Pending,
    Probing,
    Evaluating,
    Recorded,
}

/// Point-in-time view of batch progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub pending: usize,
    pub probing: usize,
    pub evaluating: usize,
    pub recorded: usize,
}

/// Shared phase tracker, readable while the batch runs
#[derive(Default)]
pub struct Progress {
    phases: Mutex<Vec<TargetPhase>>,
}

impl Progress {
    fn reset(&self, total: usize) {
        *self.phases.lock() = vec![TargetPhase::Pending; total];
    }

    fn set(&self, index: usize, phase: TargetPhase) {
        let mut phases = self.phases.lock();
        if let Some(slot) = phases.get_mut(index) {
            *slot = phase;
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let phases = self.phases.lock();
        let mut snapshot = ProgressSnapshot {
            total: phases.len(),
            ..Default::default()
        };
        for phase in phases.iter() {
            match phase {
                TargetPhase::Pending => snapshot.pending += 1,
                TargetPhase::Probing => snapshot.probing += 1,
                TargetPhase::Evaluating => snapshot.evaluating += 1,
                TargetPhase::Recorded => snapshot.recorded += 1,
            }
        }
        snapshot
    }
}

/// The batch scheduler
#[derive(Clone)]
pub struct AuditEngine {
    probes: Arc<ProbeSet>,
    config: Arc<Config>,
    progress: Arc<Progress>,
}

impl AuditEngine {
    pub fn new(probes: ProbeSet, config: Config) -> Self {
        Self {
            probes: Arc::new(probes),
            config: Arc::new(config),
            progress: Arc::new(Progress::default()),
        }
    }

    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    /// Audit every target and return the immutable batch result. Records
    /// come back in input order regardless of completion order.
    pub async fn run(&self, targets: Vec<Target>) -> BatchResult {
        let started_at = Utc::now();
        self.progress.reset(targets.len());

        tracing::info!(
            targets = targets.len(),
            concurrency = self.config.scanner.max_concurrent_targets,
            "starting audit batch"
        );

        let semaphore = Arc::new(Semaphore::new(
            self.config.scanner.max_concurrent_targets.max(1),
        ));

        let mut handles = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().cloned().enumerate() {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                engine.audit_target(index, target).await
            }));
        }

        let mut records = Vec::with_capacity(targets.len());
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(record) => records.push(record),
                // A panicked audit task costs that target its verdicts,
                // nothing more.
                Err(join_err) => {
                    tracing::error!(
                        url = %targets[index].url,
                        error = %join_err,
                        "audit task aborted"
                    );
                    self.progress.set(index, TargetPhase::Recorded);
                    records.push(Self::aborted_record(targets[index].clone()));
                }
            }
        }

        let summary = summarize(&records);
        let finished_at = Utc::now();

        tracing::info!(
            targets = records.len(),
            fully_compliant = summary.fully_compliant_targets,
            with_errors = summary.targets_with_probe_errors,
            "audit batch finished"
        );

        BatchResult {
            records,
            started_at,
            finished_at,
            policy_version: self.config.policy.version.clone(),
            summary,
        }
    }

    async fn audit_target(&self, index: usize, target: Target) -> TargetAuditRecord {
        let start = Instant::now();
        self.progress.set(index, TargetPhase::Probing);
        tracing::debug!(url = %target.url, "probing target");

        // Probe tasks push completed results here; on budget expiry the
        // record is built from whatever arrived in time.
        let completed: Arc<Mutex<Vec<ProbeResult>>> = Arc::new(Mutex::new(Vec::new()));

        let mut probe_handles = Vec::with_capacity(ProbeKind::ALL.len());
        for &kind in ProbeKind::ALL {
            let probes = Arc::clone(&self.probes);
            let sink = Arc::clone(&completed);
            let target = target.clone();
            let budget = self.config.scanner.probe_budget();

            probe_handles.push(tokio::spawn(async move {
                let result = match tokio::time::timeout(budget, probes.run(kind, &target)).await {
                    Ok(result) => result,
                    Err(_) => ProbeResult::failed(
                        kind,
                        ProbeError::timeout(format!(
                            "{} probe exceeded its {}s budget",
                            kind,
                            budget.as_secs()
                        )),
                        budget.as_millis() as u64,
                    ),
                };
                sink.lock().push(result);
            }));
        }

        let join_all = async {
            for handle in &mut probe_handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(self.config.scanner.target_budget(), join_all)
            .await
            .is_err()
        {
            tracing::warn!(
                url = %target.url,
                budget_secs = self.config.scanner.target_budget().as_secs(),
                "target budget exhausted, finalizing with partial results"
            );
            for handle in &probe_handles {
                handle.abort();
            }
        }

        self.progress.set(index, TargetPhase::Evaluating);

        let mut results = std::mem::take(&mut *completed.lock());

        // Probes cut off by the target budget still get an entry, so the
        // evaluator sees the timeout rather than an absent probe.
        for &kind in ProbeKind::ALL {
            if !results.iter().any(|r| r.kind == kind) {
                results.push(ProbeResult::failed(
                    kind,
                    ProbeError::timeout("probe did not complete within the target budget"),
                    self.config.scanner.target_budget().as_millis() as u64,
                ));
            }
        }

        let verdicts = evaluator::evaluate_target(&results, &self.config.policy);

        let probe_errors: Vec<ProbeError> = ProbeKind::ALL
            .iter()
            .filter_map(|&kind| {
                results
                    .iter()
                    .find(|r| r.kind == kind)
                    .and_then(|r| r.error.clone())
            })
            .collect();

        self.progress.set(index, TargetPhase::Recorded);
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(url = %target.url, duration_ms, "target recorded");

        TargetAuditRecord {
            target,
            verdicts,
            probe_errors,
            duration_ms,
        }
    }

    fn aborted_record(target: Target) -> TargetAuditRecord {
        let err = ProbeError::parse_failure("audit task aborted unexpectedly");
        TargetAuditRecord {
            target,
            verdicts: ComplianceCode::ALL
                .iter()
                .map(|&code| ComplianceVerdict::indeterminate(code, &err))
                .collect(),
            probe_errors: vec![err],
            duration_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::Config;
    use crate::engine::model::VerdictStatus;
    use crate::http::fake::FakeFetcher;
    use crate::http::{Fetcher, RedirectMode};
    use crate::probe::transport::fake::FakeTlsProber;
    use crate::probe::transport::TlsVersion;
    use crate::render::fake::FakeRenderer;
    use async_trait::async_trait;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.scanner.retry_count = 0;
        config.scanner.retry_backoff_ms = 1;
        config
    }

    fn engine_with(fetcher: FakeFetcher, renderer: FakeRenderer, config: Config) -> AuditEngine {
        let probes = ProbeSet::new(
            Arc::new(fetcher),
            Arc::new(renderer),
            Arc::new(FakeTlsProber::accepting(&[
                TlsVersion::Tls13,
                TlsVersion::Tls12,
            ])),
            &config.scanner,
            &config.policy,
        );
        AuditEngine::new(probes, config)
    }

    #[tokio::test]
    async fn one_record_per_target_in_input_order() {
        let engine = engine_with(
            FakeFetcher::new(),
            FakeRenderer::page("https://a.example/", "<html></html>", &[]),
            fast_config(),
        );

        let targets = vec![
            Target::new("https://a.example/"),
            Target::new("https://b.example/"),
            Target::new("https://c.example/"),
        ];
        let result = engine.run(targets).await;

        assert_eq!(result.records.len(), 3);
        assert_eq!(result.records[0].target.url, "https://a.example/");
        assert_eq!(result.records[1].target.url, "https://b.example/");
        assert_eq!(result.records[2].target.url, "https://c.example/");
        for record in &result.records {
            assert_eq!(record.verdicts.len(), ComplianceCode::ALL.len());
        }
    }

    #[tokio::test]
    async fn hardened_site_fails_only_on_missing_headers() {
        // example.com over TLS 1.3 only, plaintext unreachable, HSTS set,
        // version-less Server banner, clean DOM, sensitive paths blocked.
        // Everything passes except the two headers it never sends.
        let body = "<html><body>corporate site</body></html>";
        let fetcher = FakeFetcher::new()
            .with(
                "https://example.com/",
                FakeFetcher::respond(
                    200,
                    &[
                        ("server", "nginx"),
                        ("strict-transport-security", "max-age=31536000"),
                    ],
                    body,
                    "https://example.com/",
                ),
            )
            .with(
                "https://example.com/robots.txt",
                FakeFetcher::respond(
                    200,
                    &[],
                    "User-agent: *\nDisallow: /admin/\n",
                    "https://example.com/robots.txt",
                ),
            );
        let config = fast_config();
        let probes = ProbeSet::new(
            Arc::new(fetcher),
            Arc::new(FakeRenderer::page("https://example.com/", body, &[])),
            Arc::new(FakeTlsProber::accepting(&[TlsVersion::Tls13])),
            &config.scanner,
            &config.policy,
        );
        let engine = AuditEngine::new(probes, config);

        let result = engine.run(vec![Target::new("https://example.com/")]).await;
        let record = &result.records[0];

        assert!(record.probe_errors.is_empty());
        let failing = [ComplianceCode::S8_1, ComplianceCode::S8_3];
        for &code in ComplianceCode::ALL {
            let verdict = record.verdict(code).unwrap();
            let expected = if failing.contains(&code) {
                VerdictStatus::Failed
            } else {
                VerdictStatus::Passed
            };
            assert_eq!(verdict.status, expected, "unexpected verdict for {}", code.as_str());
        }
        assert_eq!(record.overall(), VerdictStatus::Failed);
    }

    #[tokio::test]
    async fn unreachable_target_is_isolated() {
        // FakeFetcher knows no URLs: header and exposure probes fail with
        // network errors while transport still gets TLS findings from the
        // fake prober. The batch completes regardless.
        let engine = engine_with(
            FakeFetcher::new(),
            FakeRenderer::failing(ProbeError::network("no route to host")),
            fast_config(),
        );

        let result = engine.run(vec![Target::new("https://down.example/")]).await;
        let record = &result.records[0];

        assert!(!record.probe_errors.is_empty());
        assert_eq!(
            record.verdict(ComplianceCode::S8_1).unwrap().status,
            VerdictStatus::Indeterminate
        );
        assert_eq!(result.summary.targets_with_probe_errors, 1);
    }

    struct StalledFetcher;

    #[async_trait]
    impl Fetcher for StalledFetcher {
        async fn fetch(
            &self,
            _url: &str,
            _redirects: RedirectMode,
        ) -> Result<crate::http::FetchResponse, ProbeError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProbeError::timeout("stalled"))
        }
    }

    #[tokio::test]
    async fn target_budget_finalizes_with_partial_results() {
        let mut config = fast_config();
        config.scanner.target_timeout = 1;
        config.scanner.probe_timeout = 30;

        let probes = ProbeSet::new(
            Arc::new(StalledFetcher),
            Arc::new(FakeRenderer::failing(ProbeError::network("refused"))),
            Arc::new(FakeTlsProber::accepting(&[TlsVersion::Tls13])),
            &config.scanner,
            &config.policy,
        );
        let engine = AuditEngine::new(probes, config);

        let result = engine.run(vec![Target::new("https://slow.example/")]).await;
        let record = &result.records[0];

        // Every code still has a verdict; the stalled header probe shows up
        // as a timeout.
        assert_eq!(record.verdicts.len(), ComplianceCode::ALL.len());
        let s8_1 = record.verdict(ComplianceCode::S8_1).unwrap();
        assert_eq!(s8_1.status, VerdictStatus::Indeterminate);
        assert!(record
            .probe_errors
            .iter()
            .any(|e| e.kind == crate::error::ProbeErrorKind::Timeout));
    }

    #[tokio::test]
    async fn progress_reaches_recorded() {
        let engine = engine_with(
            FakeFetcher::new(),
            FakeRenderer::page("https://a.example/", "<html></html>", &[]),
            fast_config(),
        );
        let progress = engine.progress();

        let result = engine
            .run(vec![Target::new("https://a.example/"), Target::new("https://b.example/")])
            .await;

        assert_eq!(result.records.len(), 2);
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.recorded, 2);
        assert_eq!(snapshot.pending, 0);
    }
}
