//! Health check execution.
//!
//! A member's checks run in declared order and every check runs even after
//! one fails, so the combined error lists every problem.

use std::time::Duration;

use fleetgate_config::HealthCheckSpec;
use fleetgate_core::{FleetError, ServiceResolver};
use fleetgate_discovery::probe;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::error;

use crate::history::CheckResult;

pub const DEFAULT_EXPECT_STATUS: u16 = 200;

static RESOLVE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*resolve\s+([^\s}]+)\s+([^\s}]+)\s*\}\}").expect("valid resolve regex")
});

/// A check spec with its type decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheck {
    Tcp { port: u16 },
    Http { url: String, expect_status: u16 },
}

impl TryFrom<&HealthCheckSpec> for HealthCheck {
    type Error = FleetError;

    fn try_from(spec: &HealthCheckSpec) -> Result<Self, Self::Error> {
        match spec.check_type.as_str() {
            "tcp" => spec
                .port
                .map(|port| HealthCheck::Tcp { port })
                .ok_or_else(|| FleetError::Config("tcp check needs a port".into())),
            "http" => spec
                .url
                .clone()
                .map(|url| HealthCheck::Http {
                    url,
                    expect_status: spec.expect_status.unwrap_or(DEFAULT_EXPECT_STATUS),
                })
                .ok_or_else(|| FleetError::Config("http check needs a url".into())),
            other => Err(FleetError::UnknownCheckType(other.to_string())),
        }
    }
}

#[derive(Clone, Copy)]
pub struct CheckContext<'a> {
    pub resolver: &'a dyn ServiceResolver,
    pub client: &'a reqwest::Client,
    pub tcp_timeout: Duration,
    pub http_timeout: Duration,
}

/// Replace every `{{resolve agent service}}` with the service URL.
pub async fn expand_url(
    template: &str,
    resolver: &dyn ServiceResolver,
) -> fleetgate_core::Result<String> {
    let placeholders: Vec<_> = RESOLVE_PATTERN
        .captures_iter(template)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                whole.range(),
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str().to_string(),
            ))
        })
        .collect();

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for (range, agent, service) in placeholders {
        out.push_str(&template[last..range.start]);
        out.push_str(&resolver.service_url(&agent, &service).await?);
        last = range.end;
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Run one check against `member`. The error string names the check.
pub async fn run_check(
    member: &str,
    spec: &HealthCheckSpec,
    ctx: &CheckContext<'_>,
) -> Result<(), String> {
    let check = HealthCheck::try_from(spec).map_err(|e| {
        error!(member = %member, error = %e, "Invalid health check");
        e.to_string()
    })?;

    match check {
        HealthCheck::Tcp { port } => {
            let host = ctx
                .resolver
                .agent_host(member)
                .await
                .map_err(|e| format!("tcp:{port}: {e}"))?;
            probe::tcp_connect(&host, port, ctx.tcp_timeout)
                .await
                .map_err(|e| format!("{e:#}"))
        }
        HealthCheck::Http { url, expect_status } => {
            let url = expand_url(&url, ctx.resolver)
                .await
                .map_err(|e| format!("http {url}: {e}"))?;
            let status = probe::http_status(ctx.client, &url, ctx.http_timeout)
                .await
                .map_err(|e| format!("{e:#}"))?;
            if status == expect_status {
                Ok(())
            } else {
                Err(format!("GET {url}: status {status}, expected {expect_status}"))
            }
        }
    }
}

/// All checks in order; success only if every one passes.
pub async fn evaluate(
    member: &str,
    checks: &[HealthCheckSpec],
    ctx: &CheckContext<'_>,
) -> CheckResult {
    let mut errors = Vec::new();
    for spec in checks {
        if let Err(e) = run_check(member, spec, ctx).await {
            errors.push(e);
        }
    }
    if errors.is_empty() {
        CheckResult::ok()
    } else {
        CheckResult::failed(errors.join("; "))
    }
}
