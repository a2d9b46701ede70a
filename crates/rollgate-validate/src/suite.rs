//! The validation suite runner.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use rollgate_core::config::{EndpointSettings, ValidationSettings};
use rollgate_core::{BoxFuture, FailureKind, RuntimeRef, epoch_millis};
use rollgate_protocol::{Endpoint, InvocationRequest, ProtocolClient, generate_session_id};

use crate::case::ValidationCase;
use crate::report::{CaseOutcome, LatencySummary, ValidationReport};

pub const LATENCY_CASE: &str = "latency_sample";

/// Certifies a runtime. The controller depends on this, not on the suite.
pub trait Validator: Send + Sync {
    fn validate<'a>(&'a self, runtime: &'a RuntimeRef) -> BoxFuture<'a, ValidationReport>;
}

/// Repeats one case concurrently to gather timings.
#[derive(Debug, Clone)]
pub struct LatencyProbe {
    pub case: ValidationCase,
    pub samples: u32,
    pub concurrency: u32,
}

pub struct ValidationSuite {
    client: ProtocolClient,
    url_template: String,
    timeout: Duration,
    cases: Vec<ValidationCase>,
    latency: Option<LatencyProbe>,
}

impl ValidationSuite {
    /// Empty suite; add cases with [`ValidationSuite::with_case`].
    pub fn new(client: ProtocolClient, url_template: &str, timeout: Duration) -> Self {
        Self {
            client,
            url_template: url_template.to_string(),
            timeout,
            cases: Vec::new(),
            latency: None,
        }
    }

    /// The fixed case list: connectivity, capability discovery, successful
    /// invocation, invalid params, unknown method, the auth gate when the
    /// endpoint requires credentials, then the latency sample.
    pub fn standard(
        client: ProtocolClient,
        endpoint: &EndpointSettings,
        validation: &ValidationSettings,
    ) -> Self {
        let probe = ValidationCase::successful_invocation(
            &validation.probe_tool,
            &validation.probe_arguments,
        );
        let mut suite = Self::new(client, &endpoint.url_template, endpoint.timeout)
            .with_case(ValidationCase::connectivity(&endpoint.protocol_version))
            .with_case(ValidationCase::capability_discovery())
            .with_case(probe.clone())
            .with_case(ValidationCase::invalid_params(
                &validation.probe_tool,
                &validation.invalid_arguments,
            ))
            .with_case(ValidationCase::unknown_method(&validation.unknown_method));
        if endpoint.require_auth {
            suite = suite.with_case(ValidationCase::auth_gate());
        }
        if validation.latency_samples > 0 {
            suite = suite.with_latency(LatencyProbe {
                case: probe,
                samples: validation.latency_samples,
                concurrency: validation.latency_concurrency,
            });
        }
        suite
    }

    pub fn with_case(mut self, case: ValidationCase) -> Self {
        self.cases.push(case);
        self
    }

    pub fn with_latency(mut self, probe: LatencyProbe) -> Self {
        self.latency = Some(probe);
        self
    }

    pub fn cases(&self) -> &[ValidationCase] {
        &self.cases
    }

    /// Resolve the runtime's endpoint and run every case against it.
    pub async fn run(&self, runtime: &RuntimeRef) -> ValidationReport {
        let endpoint = Endpoint::resolve(&self.url_template, runtime);
        self.run_against(&runtime.label(), &endpoint).await
    }

    /// Run against an already-resolved endpoint.
    pub async fn run_against(&self, label: &str, endpoint: &Endpoint) -> ValidationReport {
        let session_id = generate_session_id();
        let started_at_ms = epoch_millis();
        info!(runtime = %label, url = %endpoint, cases = self.cases.len(), "validation started");

        let mut outcomes = Vec::with_capacity(self.cases.len() + 1);
        for case in &self.cases {
            outcomes.push(self.run_case(endpoint, &session_id, case).await);
        }

        // An unreachable endpoint would only produce N more timeouts.
        let reachable = outcomes.first().is_none_or(|c| c.passed);
        let mut latency = None;
        if let Some(probe) = &self.latency {
            if reachable {
                let (outcome, summary) = self.sample_latency(endpoint, &session_id, probe).await;
                outcomes.push(outcome);
                latency = summary;
            } else {
                debug!(runtime = %label, "skipping latency sample; endpoint unreachable");
            }
        }

        let report = ValidationReport::new(
            label.to_string(),
            session_id,
            started_at_ms,
            epoch_millis(),
            outcomes,
            latency,
        );
        if report.passed {
            info!(runtime = %label, duration_ms = report.duration_ms(), "validation passed");
        } else {
            warn!(runtime = %label, failures = %report.failure_summary(), "validation failed");
        }
        report
    }

    fn request_for(&self, case: &ValidationCase, session_id: &str) -> InvocationRequest {
        let request = InvocationRequest::new(&case.method, session_id, self.timeout)
            .with_params(case.params.clone());
        if case.anonymous {
            request.anonymous()
        } else {
            request
        }
    }

    async fn run_case(&self, endpoint: &Endpoint, session_id: &str, case: &ValidationCase) -> CaseOutcome {
        let request = self.request_for(case, session_id);
        let start = Instant::now();
        let result = self.client.invoke(endpoint, &request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match case.check(&result) {
            Ok(()) => {
                debug!(case = %case.name, duration_ms, "case passed");
                CaseOutcome {
                    name: case.name.clone(),
                    passed: true,
                    gating: true,
                    duration_ms,
                    reason: None,
                    failure: None,
                }
            }
            Err(reason) => {
                // A reply that arrived but was wrong is non-compliance.
                let failure = result.failure_kind().unwrap_or(FailureKind::Protocol);
                warn!(case = %case.name, duration_ms, %reason, %failure, "case failed");
                CaseOutcome {
                    name: case.name.clone(),
                    passed: false,
                    gating: true,
                    duration_ms,
                    reason: Some(reason),
                    failure: Some(failure),
                }
            }
        }
    }

    async fn sample_latency(
        &self,
        endpoint: &Endpoint,
        session_id: &str,
        probe: &LatencyProbe,
    ) -> (CaseOutcome, Option<LatencySummary>) {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(probe.concurrency.max(1) as usize));
        let request = self.request_for(&probe.case, session_id);
        let mut tasks = JoinSet::new();

        for _ in 0..probe.samples {
            let semaphore = Arc::clone(&semaphore);
            let client = self.client.clone();
            let endpoint = endpoint.clone();
            let request = request.clone();
            let case = probe.case.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let begun = Instant::now();
                let result = client.invoke(&endpoint, &request).await;
                let checked = case.check(&result).map_err(|reason| {
                    (reason, result.failure_kind().unwrap_or(FailureKind::Protocol))
                });
                (checked, begun.elapsed())
            });
        }

        let mut latencies_us = Vec::with_capacity(probe.samples as usize);
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((Ok(()), elapsed)) => latencies_us.push(elapsed.as_micros() as u64),
                Ok((Err(failure), _)) => failures.push(failure),
                Err(e) => failures.push((format!("sample task failed: {e}"), FailureKind::Transport)),
            }
        }

        let summary = LatencySummary::from_samples(&latencies_us, probe.samples as usize);
        if let Some(s) = &summary {
            info!(
                samples = s.samples,
                successes = s.successes,
                min_ms = s.min_ms,
                median_ms = s.median_ms,
                p99_ms = s.p99_ms,
                "latency sampled"
            );
        }
        let reason = failures
            .first()
            .map(|(first, _)| format!("{}/{} samples failed: {first}", failures.len(), probe.samples));
        let outcome = CaseOutcome {
            name: LATENCY_CASE.to_string(),
            passed: failures.is_empty(),
            gating: false,
            duration_ms: start.elapsed().as_millis() as u64,
            failure: failures.first().map(|(_, kind)| *kind),
            reason,
        };
        (outcome, summary)
    }
}

impl Validator for ValidationSuite {
    fn validate<'a>(&'a self, runtime: &'a RuntimeRef) -> BoxFuture<'a, ValidationReport> {
        Box::pin(self.run(runtime))
    }
}
