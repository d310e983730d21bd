//! Agent configuration: explicit struct passed into the scheduler at
//! startup. Loaded from `config/agent.toml` when present, then overridden
//! by environment variables (which `.env` can supply in local runs).

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/agent.toml";
pub const ENV_CONFIG_PATH: &str = "AGENT_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Master switch; a disabled agent still serves HTTP but runs no cycles.
    pub enabled: bool,
    /// Full pipeline, no outbound sends and no outbound persistence.
    pub dry_run: bool,
    /// 0–100. Leads outside the rollout are skipped before leasing.
    /// Selection is a deterministic hash of the lead id, reproducible
    /// across restarts.
    pub rollout_percent: u8,
    /// Max leads per batch cycle; the primary backpressure mechanism.
    pub batch_cap: usize,
    pub cycle_interval_secs: u64,
    pub outcome_sweep_interval_secs: u64,
    /// Exclusion window between the batch and reactive paths, minutes.
    pub exclusion_window_minutes: i64,
    pub lease_ttl_secs: i64,
    pub oracle_timeout_secs: u64,
    pub bind_addr: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dry_run: false,
            rollout_percent: 100,
            batch_cap: 50,
            cycle_interval_secs: 15 * 60,
            outcome_sweep_interval_secs: 5 * 60,
            exclusion_window_minutes: 10,
            lease_ttl_secs: 120,
            oracle_timeout_secs: 30,
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl AgentConfig {
    /// File (if any) + env overrides. Never fails; a broken file logs a
    /// warning and falls back to defaults so the service still boots.
    pub fn load() -> Self {
        let path = std::env::var(ENV_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str::<AgentConfig>(&raw) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!("config parse failed ({path}): {e}; using defaults");
                    AgentConfig::default()
                }
            },
            Err(_) => AgentConfig::default(),
        };
        cfg.apply_env();
        cfg.rollout_percent = cfg.rollout_percent.min(100);
        cfg
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_bool("AGENT_ENABLED") {
            self.enabled = v;
        }
        if let Some(v) = env_bool("AGENT_DRY_RUN") {
            self.dry_run = v;
        }
        if let Some(v) = env_parse::<u8>("AGENT_ROLLOUT_PERCENT") {
            self.rollout_percent = v;
        }
        if let Some(v) = env_parse::<usize>("AGENT_BATCH_CAP") {
            self.batch_cap = v;
        }
        if let Some(v) = env_parse::<u64>("AGENT_CYCLE_INTERVAL_SECS") {
            self.cycle_interval_secs = v;
        }
        if let Some(v) = env_parse::<u64>("AGENT_OUTCOME_SWEEP_INTERVAL_SECS") {
            self.outcome_sweep_interval_secs = v;
        }
        if let Some(v) = env_parse::<u64>("AGENT_ORACLE_TIMEOUT_SECS") {
            self.oracle_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("AGENT_BIND_ADDR") {
            self.bind_addr = v;
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AgentConfig::default();
        assert!(cfg.enabled);
        assert!(!cfg.dry_run);
        assert_eq!(cfg.rollout_percent, 100);
        assert_eq!(cfg.batch_cap, 50);
    }

    #[test]
    fn toml_round_trip() {
        let raw = r#"
            enabled = true
            dry_run = true
            rollout_percent = 25
            batch_cap = 10
        "#;
        let cfg: AgentConfig = toml::from_str(raw).unwrap();
        assert!(cfg.dry_run);
        assert_eq!(cfg.rollout_percent, 25);
        assert_eq!(cfg.batch_cap, 10);
        // Unspecified fields fall back to defaults.
        assert_eq!(cfg.lease_ttl_secs, AgentConfig::default().lease_ttl_secs);
    }
}
