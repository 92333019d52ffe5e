//! Run configuration.
//!
//! Parsed from the flat key/value map the server receives and validated
//! before any round runs.

use crate::core::{Error, Result};
use crate::federated::model::Penalty;
use crate::federated::orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Hyperparameter-selection strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentKind {
    /// Fixed hyperparameters
    Baseline,
    /// Predefined grid
    StaticHpo,
    /// Policy-driven search
    AgenticHpo,
}

impl Default for ExperimentKind {
    fn default() -> Self {
        Self::Baseline
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentKind::Baseline => write!(f, "baseline"),
            ExperimentKind::StaticHpo => write!(f, "static_hpo"),
            ExperimentKind::AgenticHpo => write!(f, "agentic_hpo"),
        }
    }
}

impl FromStr for ExperimentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "baseline" => Ok(ExperimentKind::Baseline),
            "static_hpo" => Ok(ExperimentKind::StaticHpo),
            "agentic_hpo" => Ok(ExperimentKind::AgenticHpo),
            other => Err(Error::Config(format!(
                "Unknown experiment {:?}. Valid: [\"agentic_hpo\", \"baseline\", \"static_hpo\"]",
                other
            ))),
        }
    }
}

/// Hyperparameters tuned per trial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HyperParams {
    pub local_epochs: u32,
    pub penalty: Penalty,
}

impl HyperParams {
    pub fn new(local_epochs: u32, penalty: Penalty) -> Self {
        Self {
            local_epochs,
            penalty,
        }
    }
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "penalty={} local-epochs={}", self.penalty, self.local_epochs)
    }
}

/// Filesystem locations for an experiment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentPaths {
    /// Project root
    pub project_root: PathBuf,
    /// Where artifacts are written
    pub config_dir: PathBuf,
}

impl ExperimentPaths {
    pub fn new(project_root: impl Into<PathBuf>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            config_dir: config_dir.into(),
        }
    }

    /// Paths with `configs/` under the project root.
    pub fn under(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref();
        Self::new(root, root.join("configs"))
    }
}

/// Validated run configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Rounds per trial
    pub num_rounds: u32,
    /// Base hyperparameters
    pub hyper: HyperParams,
    pub fraction_train: f64,
    pub fraction_evaluate: f64,
    pub experiment: ExperimentKind,
    /// Deadline for one round's replies
    pub round_timeout: Duration,
    /// Sampling seed
    pub seed: Option<u64>,
    /// Evaluation metric trials are ranked by
    pub objective_metric: String,
    /// Maximum trials for policy-driven search
    pub trial_budget: u32,
}

impl RunConfig {
    /// Config with defaults for every optional key.
    pub fn new(num_rounds: u32, hyper: HyperParams) -> Self {
        Self {
            num_rounds,
            hyper,
            fraction_train: 1.0,
            fraction_evaluate: 1.0,
            experiment: ExperimentKind::Baseline,
            round_timeout: Duration::from_secs(120),
            seed: None,
            objective_metric: "f1".to_string(),
            trial_budget: 4,
        }
    }

    /// Set experiment kind.
    pub fn with_experiment(mut self, experiment: ExperimentKind) -> Self {
        self.experiment = experiment;
        self
    }

    /// Set sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set round deadline.
    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    /// Parse and validate a flat key/value map.
    pub fn from_map(map: &HashMap<String, Value>) -> Result<Self> {
        let num_rounds = required_count(map, "num-server-rounds")?;
        let penalty = required_str(map, "penalty")?.parse::<Penalty>()?;
        let local_epochs = required_count(map, "local-epochs")?;

        let mut config = Self::new(num_rounds, HyperParams::new(local_epochs, penalty));
        if let Some(f) = optional_f64(map, "fraction-train")? {
            config.fraction_train = f;
        }
        if let Some(f) = optional_f64(map, "fraction-evaluate")? {
            config.fraction_evaluate = f;
        }
        if let Some(kind) = optional_str(map, "experiment")? {
            config.experiment = kind.parse()?;
        }
        if let Some(secs) = optional_f64(map, "round-timeout-secs")? {
            if !(secs > 0.0 && secs.is_finite()) {
                return Err(Error::Config(format!(
                    "round-timeout-secs must be positive, got {}",
                    secs
                )));
            }
            config.round_timeout = Duration::try_from_secs_f64(secs).map_err(|e| {
                Error::Config(format!("round-timeout-secs {} is out of range: {}", secs, e))
            })?;
        }
        if let Some(value) = map.get("seed") {
            config.seed = Some(value.as_u64().ok_or_else(|| {
                Error::Config(format!("seed must be a non-negative integer, got {}", value))
            })?);
        }
        if let Some(metric) = optional_str(map, "objective-metric")? {
            config.objective_metric = metric.to_string();
        }
        if map.contains_key("hpo-trial-budget") {
            config.trial_budget = required_count(map, "hpo-trial-budget")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON object of run config keys.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let map: HashMap<String, Value> = serde_json::from_str(s)
            .map_err(|e| Error::Config(format!("Run config is not a JSON object: {}", e)))?;
        Self::from_map(&map)
    }

    /// Range checks shared by parsed and hand-built configs.
    pub fn validate(&self) -> Result<()> {
        if self.num_rounds == 0 {
            return Err(Error::Config("num-server-rounds must be at least 1".to_string()));
        }
        if self.hyper.local_epochs == 0 {
            return Err(Error::Config("local-epochs must be at least 1".to_string()));
        }
        for (key, f) in [
            ("fraction-train", self.fraction_train),
            ("fraction-evaluate", self.fraction_evaluate),
        ] {
            if !(f > 0.0 && f <= 1.0) {
                return Err(Error::Config(format!("{} must be in (0, 1], got {}", key, f)));
            }
        }
        if self.round_timeout.is_zero() {
            return Err(Error::Config("round-timeout-secs must be positive".to_string()));
        }
        if self.objective_metric.trim().is_empty() {
            return Err(Error::Config("objective-metric must not be empty".to_string()));
        }
        if self.trial_budget == 0 {
            return Err(Error::Config("hpo-trial-budget must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Orchestrator settings for one trial.
    pub fn orchestrator_config(&self, hyper: &HyperParams) -> OrchestratorConfig {
        OrchestratorConfig {
            num_rounds: self.num_rounds,
            fraction_train: self.fraction_train,
            fraction_evaluate: self.fraction_evaluate,
            round_timeout: self.round_timeout,
            local_epochs: hyper.local_epochs,
            penalty: hyper.penalty,
            seed: self.seed,
        }
    }
}

fn required<'a>(map: &'a HashMap<String, Value>, key: &str) -> Result<&'a Value> {
    map.get(key)
        .ok_or_else(|| Error::Config(format!("Missing required key {}", key)))
}

fn required_count(map: &HashMap<String, Value>, key: &str) -> Result<u32> {
    let value = required(map, key)?;
    match value.as_u64() {
        Some(n) if n >= 1 && n <= u32::MAX as u64 => Ok(n as u32),
        _ => Err(Error::Config(format!(
            "{} must be an integer >= 1, got {}",
            key, value
        ))),
    }
}

fn required_str<'a>(map: &'a HashMap<String, Value>, key: &str) -> Result<&'a str> {
    let value = required(map, key)?;
    value
        .as_str()
        .ok_or_else(|| Error::Config(format!("{} must be a string, got {}", key, value)))
}

fn optional_str<'a>(map: &'a HashMap<String, Value>, key: &str) -> Result<Option<&'a str>> {
    match map.get(key) {
        None => Ok(None),
        Some(_) => required_str(map, key).map(Some),
    }
}

fn optional_f64(map: &HashMap<String, Value>, key: &str) -> Result<Option<f64>> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| Error::Config(format!("{} must be a number, got {}", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("num-server-rounds".to_string(), json!(3));
        map.insert("penalty".to_string(), json!("l2"));
        map.insert("local-epochs".to_string(), json!(1));
        map
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::from_map(&base()).unwrap();
        assert_eq!(config.num_rounds, 3);
        assert_eq!(config.hyper, HyperParams::new(1, Penalty::L2));
        assert_eq!(config.fraction_train, 1.0);
        assert_eq!(config.fraction_evaluate, 1.0);
        assert_eq!(config.experiment, ExperimentKind::Baseline);
        assert_eq!(config.round_timeout, Duration::from_secs(120));
        assert_eq!(config.objective_metric, "f1");
        assert_eq!(config.trial_budget, 4);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_all_keys() {
        let config = RunConfig::from_json_str(
            r#"{"num-server-rounds": 2, "penalty": "ElasticNet", "local-epochs": 3,
                "fraction-train": 0.5, "fraction-evaluate": 0.25,
                "experiment": "static_hpo", "round-timeout-secs": 1.5, "seed": 9,
                "objective-metric": "accuracy", "hpo-trial-budget": 6}"#,
        )
        .unwrap();
        assert_eq!(config.hyper.penalty, Penalty::ElasticNet);
        assert_eq!(config.experiment, ExperimentKind::StaticHpo);
        assert_eq!(config.round_timeout, Duration::from_millis(1500));
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.trial_budget, 6);
    }

    #[test]
    fn test_missing_required_key() {
        for key in ["num-server-rounds", "penalty", "local-epochs"] {
            let mut map = base();
            map.remove(key);
            assert!(matches!(RunConfig::from_map(&map), Err(Error::Config(_))), "{}", key);
        }
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            ("num-server-rounds", json!(0)),
            ("num-server-rounds", json!("3")),
            ("local-epochs", json!(1.5)),
            ("penalty", json!("l3")),
            ("fraction-train", json!(0.0)),
            ("fraction-evaluate", json!(1.5)),
            ("experiment", json!("bayesian")),
            ("round-timeout-secs", json!(-1.0)),
            ("seed", json!(-4)),
            ("hpo-trial-budget", json!(0)),
        ];
        for (key, value) in cases {
            let mut map = base();
            map.insert(key.to_string(), value);
            assert!(matches!(RunConfig::from_map(&map), Err(Error::Config(_))), "{}", key);
        }
    }

    #[test]
    fn test_timeout_too_large_for_duration() {
        let result = RunConfig::from_json_str(
            r#"{"num-server-rounds": 1, "penalty": "l2", "local-epochs": 1,
                "round-timeout-secs": 1e20}"#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(RunConfig::from_json_str("[1, 2]"), Err(Error::Config(_))));
    }

    #[test]
    fn test_experiment_kind_round_trip() {
        for kind in [
            ExperimentKind::Baseline,
            ExperimentKind::StaticHpo,
            ExperimentKind::AgenticHpo,
        ] {
            assert_eq!(kind.to_string().parse::<ExperimentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_paths_under_root() {
        let paths = ExperimentPaths::under("/tmp/proj");
        assert_eq!(paths.config_dir, PathBuf::from("/tmp/proj/configs"));
    }
}
