pub mod reset;
pub mod rollout;
pub mod validate;

use std::sync::Arc;

use anyhow::{Context, bail};

use rollgate_core::{RuntimeRef, Settings};
use rollgate_protocol::{ClientOptions, HyperTransport, ProtocolClient, Transport};
use rollgate_report::{Emitter, LogSink, NotificationSink, ReportDocument, format_report};

use crate::adapters::HttpNotifySink;
use crate::{OutputFormat, ReportArgs};

const DEFAULT_QUALIFIER: &str = "DEFAULT";

/// `endpoint@qualifier`, splitting on the last `@`. A bare endpoint gets
/// the `DEFAULT` qualifier.
pub fn parse_runtime(id: &str, qualifier: Option<&str>) -> anyhow::Result<RuntimeRef> {
    let (endpoint, suffix) = match id.rsplit_once('@') {
        Some((endpoint, q)) if !q.is_empty() && !q.contains('/') => (endpoint, Some(q)),
        _ => (id, None),
    };
    if endpoint.trim().is_empty() {
        bail!("runtime identifier is empty");
    }
    let qualifier = qualifier.or(suffix).unwrap_or(DEFAULT_QUALIFIER);
    Ok(RuntimeRef::new(endpoint, qualifier))
}

pub fn transport() -> anyhow::Result<Arc<dyn Transport>> {
    let transport = HyperTransport::new()
        .map_err(anyhow::Error::msg)
        .context("initialising HTTP transport")?;
    Ok(Arc::new(transport))
}

pub fn protocol_client(settings: &Settings, transport: Arc<dyn Transport>) -> ProtocolClient {
    ProtocolClient::new(
        transport,
        ClientOptions::from(&settings.endpoint),
        settings.retry,
    )
}

/// Webhook sink when `[notify].url` is set, otherwise the log.
pub fn emitter(settings: &Settings, transport: Arc<dyn Transport>) -> Emitter {
    let sink: Arc<dyn NotificationSink> = match &settings.notify.url {
        Some(url) => Arc::new(HttpNotifySink::new(
            transport,
            url,
            settings.notify.bearer_token.clone(),
        )),
        None => Arc::new(LogSink),
    };
    Emitter::new(sink)
}

pub fn output(doc: &ReportDocument, args: &ReportArgs) -> anyhow::Result<()> {
    let json = doc.to_pretty_json()?;
    if let Some(path) = &args.report {
        std::fs::write(path, &json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        tracing::info!(path = %path.display(), digest = %doc.digest, "report written");
    }
    match args.format {
        OutputFormat::Json => println!("{json}"),
        OutputFormat::Text => println!("{}", format_report(doc)),
    }
    Ok(())
}
