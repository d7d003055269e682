use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::{fs, io};

use serde::Deserialize;
use thiserror::Error;

use crate::production::{BonusRatio, IntervalBounds};
use crate::types::{Gold, StructureKind, Tick};

pub const DEFAULT_STATION_MAX_RANGE: u32 = 100;
pub const FARMLAND_INTERVAL_MIN: Tick = 160;
pub const FARMLAND_INTERVAL_MAX: Tick = 330;
pub const FARMLAND_GOLD_PER_LEVEL: u64 = 10;

/// Tunables the host game supplies to structure executions.
///
/// Read through a shared handle every time an interval is armed or production
/// fires, so implementations may change their answers between calls.
pub trait Config: Send + Sync {
    /// Production tunables for `kind`, `None` if the kind never produces.
    fn production(&self, kind: StructureKind) -> Option<ProductionTunables>;

    /// Radius used to look for structures a new station could connect to.
    fn station_max_range(&self) -> u32;

    /// Multiplier applied to production of rail-connected structures.
    fn connected_bonus(&self) -> BonusRatio;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductionTunables {
    pub interval_min: Tick,
    pub interval_max: Tick,
    /// Currency per structure level per production event.
    #[serde(deserialize_with = "deserialize_gold")]
    pub amount_per_level: Gold,
}

/// Accept currency as a JSON integer or, past `u64`, as a decimal string.
fn deserialize_gold<'de, D>(deserializer: D) -> Result<Gold, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(Gold::from(n)),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl ProductionTunables {
    pub fn interval(&self) -> IntervalBounds {
        IntervalBounds::new(self.interval_min, self.interval_max)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse game config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read game config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{kind} production interval is empty: min {min} > max {max}")]
    InvalidInterval {
        kind: StructureKind,
        min: Tick,
        max: Tick,
    },
    #[error("station max range must be positive")]
    InvalidStationRange,
    #[error("bonus ratio {numerator}/0 has a zero denominator")]
    InvalidBonus { numerator: u32 },
}

// ============================================================================
// GameConfig - serde-backed default implementation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    production: BTreeMap<StructureKind, ProductionTunables>,
    station_max_range: u32,
    connected_bonus: BonusRatio,
}

impl Default for GameConfig {
    fn default() -> Self {
        let mut production = BTreeMap::new();
        production.insert(
            StructureKind::Farmland,
            ProductionTunables {
                interval_min: FARMLAND_INTERVAL_MIN,
                interval_max: FARMLAND_INTERVAL_MAX,
                amount_per_level: Gold::from(FARMLAND_GOLD_PER_LEVEL),
            },
        );
        Self {
            production,
            station_max_range: DEFAULT_STATION_MAX_RANGE,
            connected_bonus: BonusRatio::CONNECTED,
        }
    }
}

impl GameConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (kind, tunables) in &self.production {
            if tunables.interval_min > tunables.interval_max {
                return Err(ConfigError::InvalidInterval {
                    kind: *kind,
                    min: tunables.interval_min,
                    max: tunables.interval_max,
                });
            }
        }
        if self.station_max_range == 0 {
            return Err(ConfigError::InvalidStationRange);
        }
        if self.connected_bonus.denominator == 0 {
            return Err(ConfigError::InvalidBonus {
                numerator: self.connected_bonus.numerator,
            });
        }
        Ok(())
    }

    pub fn with_production(mut self, kind: StructureKind, tunables: ProductionTunables) -> Self {
        self.production.insert(kind, tunables);
        self
    }

    pub fn with_station_max_range(mut self, range: u32) -> Self {
        self.station_max_range = range;
        self
    }

    pub fn with_connected_bonus(mut self, bonus: BonusRatio) -> Self {
        self.connected_bonus = bonus;
        self
    }
}

impl Config for GameConfig {
    fn production(&self, kind: StructureKind) -> Option<ProductionTunables> {
        self.production.get(&kind).cloned()
    }

    fn station_max_range(&self) -> u32 {
        self.station_max_range
    }

    fn connected_bonus(&self) -> BonusRatio {
        self.connected_bonus
    }
}

/// A `GameConfig` the host can replace while executions hold the handle.
#[derive(Debug, Default)]
pub struct ReloadableConfig {
    inner: RwLock<GameConfig>,
}

impl ReloadableConfig {
    pub fn new(config: GameConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    /// Validate and swap in `config`. The previous config stays on error.
    pub fn replace(&self, config: GameConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = config;
        Ok(())
    }

    pub fn snapshot(&self) -> GameConfig {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Config for ReloadableConfig {
    fn production(&self, kind: StructureKind) -> Option<ProductionTunables> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .production(kind)
    }

    fn station_max_range(&self) -> u32 {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .station_max_range()
    }

    fn connected_bonus(&self) -> BonusRatio {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .connected_bonus()
    }
}

// ============================================================================
// ServerConfig - deployment settings read from the environment
// ============================================================================

pub const MAX_WORKERS: usize = 20;
pub const HOSTED_DEFAULT_WORKERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEnv {
    Dev,
    Preprod,
    Prod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    num_workers: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `NUM_WORKERS` wins (clamped to `[1, MAX_WORKERS]`), then `RENDER`
    /// implies a small hosted box, otherwise the full pool.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let num_workers = match (lookup("NUM_WORKERS"), lookup("RENDER")) {
            (Some(raw), _) => raw
                .trim()
                .parse::<i64>()
                .map(|n| n.clamp(1, MAX_WORKERS as i64) as usize)
                .unwrap_or(HOSTED_DEFAULT_WORKERS),
            (None, Some(_)) => HOSTED_DEFAULT_WORKERS,
            (None, None) => MAX_WORKERS,
        };
        Self { num_workers }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn env(&self) -> GameEnv {
        GameEnv::Prod
    }

    pub fn jwt_audience(&self) -> &'static str {
        "openfront.io"
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            num_workers: MAX_WORKERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::production::Rounding;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| {
            owned
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn test_default_farmland_tunables() {
        let config = GameConfig::default();
        let farmland = config.production(StructureKind::Farmland).unwrap();
        assert_eq!(farmland.interval(), IntervalBounds::new(160, 330));
        assert_eq!(farmland.amount_per_level, Gold::from(10u32));
        assert!(config.production(StructureKind::Bunker).is_none());
        assert_eq!(config.station_max_range(), 100);
        assert_eq!(config.connected_bonus(), BonusRatio::CONNECTED);
    }

    #[test]
    fn test_json_overrides_and_keeps_defaults() {
        let json = r#"{
            "production": {
                "Farmland": { "interval_min": 5, "interval_max": 9, "amount_per_level": 25 }
            },
            "connected_bonus": { "numerator": 3, "denominator": 2, "rounding": "half_up" }
        }"#;
        let config = GameConfig::from_json_str(json).unwrap();
        let farmland = config.production(StructureKind::Farmland).unwrap();
        assert_eq!(farmland.interval(), IntervalBounds::new(5, 9));
        assert_eq!(farmland.amount_per_level, Gold::from(25u32));
        assert_eq!(config.station_max_range(), DEFAULT_STATION_MAX_RANGE);
        assert_eq!(config.connected_bonus().rounding, Rounding::HalfUp);
    }

    #[test]
    fn test_amount_accepts_decimal_strings() {
        let json = r#"{ "production": { "Farmland": {
            "interval_min": 1, "interval_max": 1,
            "amount_per_level": "100000000000000000000000"
        } } }"#;
        let config = GameConfig::from_json_str(json).unwrap();
        let expected: Gold = "100000000000000000000000".parse().unwrap();
        assert_eq!(
            config.production(StructureKind::Farmland).unwrap().amount_per_level,
            expected
        );
    }

    #[test]
    fn test_rejects_empty_interval() {
        let json = r#"{ "production": {
            "Farmland": { "interval_min": 50, "interval_max": 10, "amount_per_level": 1 }
        } }"#;
        let err = GameConfig::from_json_str(json).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidInterval {
                kind: StructureKind::Farmland,
                min: 50,
                max: 10
            }
        ));
    }

    #[test]
    fn test_rejects_zero_range_and_zero_denominator() {
        let err = GameConfig::from_json_str(r#"{ "station_max_range": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStationRange));

        let err = GameConfig::from_json_str(
            r#"{ "connected_bonus": { "numerator": 3, "denominator": 0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBonus { numerator: 3 }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = GameConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = GameConfig::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        match err {
            ConfigError::ReadFailed { path, .. } => {
                assert_eq!(path, PathBuf::from("/definitely/not/here.json"))
            }
            other => panic!("expected ReadFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_reloadable_swaps_and_rejects_invalid() {
        let reloadable = ReloadableConfig::new(GameConfig::default());
        let faster = GameConfig::default().with_production(
            StructureKind::Farmland,
            ProductionTunables {
                interval_min: 1,
                interval_max: 2,
                amount_per_level: Gold::from(3u32),
            },
        );
        reloadable.replace(faster.clone()).unwrap();
        assert_eq!(reloadable.snapshot(), faster);
        assert_eq!(
            reloadable
                .production(StructureKind::Farmland)
                .unwrap()
                .interval(),
            IntervalBounds::new(1, 2)
        );

        let broken = GameConfig::default().with_station_max_range(0);
        assert!(reloadable.replace(broken).is_err());
        assert_eq!(reloadable.station_max_range(), DEFAULT_STATION_MAX_RANGE);
        assert_eq!(reloadable.snapshot(), faster, "rejected config leaves the previous one");
    }

    #[test]
    fn test_server_workers_from_env() {
        assert_eq!(ServerConfig::from_lookup(env(&[])).num_workers(), 20);
        assert_eq!(ServerConfig::from_lookup(env(&[("RENDER", "true")])).num_workers(), 2);
        assert_eq!(ServerConfig::from_lookup(env(&[("NUM_WORKERS", "8")])).num_workers(), 8);
        assert_eq!(ServerConfig::from_lookup(env(&[("NUM_WORKERS", "64")])).num_workers(), 20);
        assert_eq!(ServerConfig::from_lookup(env(&[("NUM_WORKERS", "0")])).num_workers(), 1);
        assert_eq!(ServerConfig::from_lookup(env(&[("NUM_WORKERS", "-3")])).num_workers(), 1);
        assert_eq!(
            ServerConfig::from_lookup(env(&[("NUM_WORKERS", "lots"), ("RENDER", "1")]))
                .num_workers(),
            2
        );
        let server = ServerConfig::default();
        assert_eq!(server.env(), GameEnv::Prod);
        assert_eq!(server.jwt_audience(), "openfront.io");
    }
}
