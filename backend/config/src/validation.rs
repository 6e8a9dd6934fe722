//! Config validation: structural checks with field paths.

use std::collections::HashSet;

use crate::schema::FleetConfig;
use ipnet::Ipv4Net;
use thiserror::Error;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
///
/// Health check types are deliberately not inspected here.
pub fn validate(config: &FleetConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_server(config, &mut report);
    validate_agents(config, &mut report);
    validate_discovery(config, &mut report);
    validate_healthring(config, &mut report);
    validate_fallback(config, &mut report);
    report
}

fn validate_server(config: &FleetConfig, report: &mut ValidationReport) {
    let Some(server) = &config.server else { return };
    if server.port == Some(0) {
        report.error("server.port", "port must be > 0");
    }
}

fn validate_agents(config: &FleetConfig, report: &mut ValidationReport) {
    let Some(swarm) = &config.swarm else { return };
    let mut seen = HashSet::new();
    for (i, agent) in swarm.agents.iter().enumerate() {
        let path = format!("swarm.agents[{i}]");
        if agent.name.trim().is_empty() {
            report.error(format!("{path}.name"), "agent name cannot be empty");
        } else if !seen.insert(agent.name.as_str()) {
            report.error(
                format!("{path}.name"),
                format!("duplicate agent name '{}'", agent.name),
            );
        }
        if agent.host.trim().is_empty() {
            report.error(format!("{path}.host"), "agent host cannot be empty");
        }
        for (service, port) in &agent.services {
            if *port == 0 {
                report.error(
                    format!("{path}.services.{service}"),
                    "service port must be > 0",
                );
            }
        }
    }
}

fn validate_discovery(config: &FleetConfig, report: &mut ValidationReport) {
    let Some(discovery) = config.swarm.as_ref().and_then(|s| s.discovery.as_ref()) else {
        return;
    };
    if let Some(method) = &discovery.method {
        for part in method.split(['+', ',', ' ']).filter(|p| !p.is_empty()) {
            if !matches!(part, "arp" | "mdns") {
                report.warn(
                    "swarm.discovery.method",
                    format!("unknown discovery method '{part}'; use 'arp', 'mdns', or both"),
                );
            }
        }
    }
    if let Some(subnet) = &discovery.subnet {
        match subnet.trim().parse::<Ipv4Net>() {
            Ok(net) if net.prefix_len() != 24 => report.warn(
                "swarm.discovery.subnet",
                format!("only /24 subnets can be scanned, got /{}", net.prefix_len()),
            ),
            Ok(_) => {}
            Err(_) => report.error(
                "swarm.discovery.subnet",
                format!("'{subnet}' is not an IPv4 CIDR"),
            ),
        }
    }
}

fn validate_healthring(config: &FleetConfig, report: &mut ValidationReport) {
    let Some(ring) = &config.healthring else { return };
    if ring.history_size == Some(0) {
        report.error("healthring.history_size", "history_size must be >= 1");
    }
    let agents: HashSet<&str> = config
        .swarm
        .iter()
        .flat_map(|s| s.agents.iter().map(|a| a.name.as_str()))
        .collect();
    let mut seen = HashSet::new();
    for (i, member) in ring.members.iter().enumerate() {
        let path = format!("healthring.members[{i}]");
        if !seen.insert(member.name.as_str()) {
            report.error(
                format!("{path}.name"),
                format!("duplicate member '{}'", member.name),
            );
        }
        if !agents.contains(member.name.as_str()) {
            report.warn(
                format!("{path}.name"),
                format!("member '{}' is not a configured agent", member.name),
            );
        }
        if member.checks.is_empty() {
            report.warn(format!("{path}.checks"), "member has no checks");
        }
    }
}

fn validate_fallback(config: &FleetConfig, report: &mut ValidationReport) {
    let Some(fallback) = config.inference.as_ref().and_then(|i| i.fallback.as_ref()) else {
        return;
    };
    if fallback.primary.trim().is_empty() {
        report.error("inference.fallback.primary", "primary lane cannot be empty");
    }
    if fallback.fallbacks.contains(&fallback.primary) {
        report.warn(
            "inference.fallback.fallbacks",
            "primary lane also listed as a fallback",
        );
    }
}
