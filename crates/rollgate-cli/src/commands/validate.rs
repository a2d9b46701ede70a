use std::process::ExitCode;

use tracing::{info, warn};

use rollgate_core::Settings;
use rollgate_validate::ValidationSuite;

use crate::ReportArgs;

pub async fn validate(
    settings: &Settings,
    runtime: &str,
    qualifier: Option<&str>,
    args: &ReportArgs,
) -> anyhow::Result<ExitCode> {
    let runtime = super::parse_runtime(runtime, qualifier)?;
    let transport = super::transport()?;
    let client = super::protocol_client(settings, transport.clone());
    let suite = ValidationSuite::standard(client, &settings.endpoint, &settings.validation);

    let report = suite.run(&runtime).await;
    if report.passed {
        info!(runtime = %runtime, duration_ms = report.duration_ms(), "validation passed");
    } else {
        warn!(runtime = %runtime, failures = %report.failure_summary(), "validation failed");
    }

    let doc = super::emitter(settings, transport)
        .emit_validation(&runtime, &report)
        .await?;
    super::output(&doc, args)?;

    Ok(if report.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
