//! Human-readable report formatting.

use rollgate_health::StageVerdict;

use crate::document::{ReportDocument, ReportKind};

pub fn format_report(doc: &ReportDocument) -> String {
    let mut out = String::new();
    let title = match doc.kind {
        ReportKind::Validation => "rollgate validation",
        ReportKind::Rollout => "rollgate rollout",
    };
    let verdict = if doc.passed { "PASS" } else { "FAIL" };

    out.push_str("\n╔══════════════════════════════════════════╗\n");
    out.push_str(&format!("║  {title:<40}║\n"));
    out.push_str("╠══════════════════════════════════════════╣\n");
    if let Some(old) = &doc.old {
        out.push_str(&format!("║  Old:      {:<30}║\n", old.to_string()));
    }
    out.push_str(&format!("║  New:      {:<30}║\n", doc.new.to_string()));
    if let Some(state) = &doc.final_state {
        out.push_str(&format!("║  State:    {:<30}║\n", state.name()));
    }
    out.push_str(&format!("║  Verdict:  {verdict:<30}║\n"));
    out.push_str(&format!(
        "║  Duration: {:<30}║\n",
        format!("{:.1}s", doc.duration_ms as f64 / 1000.0)
    ));
    out.push_str("╚══════════════════════════════════════════╝\n\n");

    if let Some(validation) = &doc.validation {
        out.push_str(&format!("Validation (session {}):\n", short(&validation.session_id)));
        for case in &validation.cases {
            let mark = match (case.passed, case.gating) {
                (true, _) => "✅",
                (false, true) => "❌",
                (false, false) => "⚠️ ",
            };
            out.push_str(&format!("  {mark} {:<24} {:>6}ms", case.name, case.duration_ms));
            if let Some(reason) = &case.reason {
                out.push_str(&format!("  {reason}"));
            }
            out.push('\n');
        }
        if let Some(latency) = &validation.latency {
            out.push_str(&format!(
                "  latency: {}/{} ok, min {:.1}ms, median {:.1}ms, p99 {:.1}ms\n",
                latency.successes, latency.samples, latency.min_ms, latency.median_ms, latency.p99_ms
            ));
        }
        out.push('\n');
    }

    if !doc.stages.is_empty() {
        out.push_str("Stages:\n");
        for stage in &doc.stages {
            let verdict = match &stage.verdict {
                StageVerdict::Violation { breach } => format!("violation: {breach}"),
                StageVerdict::Unverifiable { failed_polls } => {
                    format!("unverifiable ({failed_polls} failed polls)")
                }
                other => other.as_str().to_string(),
            };
            out.push_str(&format!(
                "  {}. {:>3}%  {} samples  {verdict}\n",
                stage.index + 1,
                stage.weight,
                stage.samples
            ));
        }
        out.push('\n');
    }

    if let Some(reason) = doc.final_state.as_ref().and_then(|s| s.reason()) {
        match doc.failure {
            Some(kind) => out.push_str(&format!("Reason ({kind}): {reason}\n")),
            None => out.push_str(&format!("Reason: {reason}\n")),
        }
    }

    out
}

fn short(session_id: &str) -> &str {
    session_id.get(..12).unwrap_or(session_id)
}
