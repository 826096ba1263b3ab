//! WhaleVault Configuration
//!
//! Shared configuration crate for the WhaleVault server and tools.
//!
//! Handles loading configuration from:
//! 1. WV_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.whalevault/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{env, fs};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<VaultConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".whalevault";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

const DEFAULT_KEYS_DIR: &str = "./keys";
const DEFAULT_MAX_CONCURRENT_PROOFS: usize = 2;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 60;
const DEFAULT_JOB_RETENTION_SECS: u64 = 600;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
const DEFAULT_MOCK_PROVE_MS: u64 = 100;

const DEFAULT_FEE_BPS: u16 = 30;

const DEFAULT_CHAIN_ID: &str = "solana:devnet";
const DEFAULT_DERIVATION_VERSION: u32 = 1;

const DEFAULT_POLL_INITIAL_MS: u64 = 1000;
const DEFAULT_POLL_MAX_MS: u64 = 5000;
const DEFAULT_POLL_MULTIPLIER: f64 = 1.5;
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 60;
const DEFAULT_CONFIRM_INTERVAL_MS: u64 = 2000;
const DEFAULT_CONFIRM_MAX_ATTEMPTS: u32 = 30;

/// 0.001 SOL, exclusive lower bound
const DEFAULT_MIN_AMOUNT: u64 = 1_000_000;
/// 1000 SOL, inclusive upper bound
const DEFAULT_MAX_AMOUNT: u64 = 1_000_000_000_000;
/// 0.1, 1 and 10 SOL
const DEFAULT_DENOMINATIONS: [u64; 3] = [100_000_000, 1_000_000_000, 10_000_000_000];

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VaultConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub prover: ProverConfig,
    #[serde(default)]
    pub relayer: RelayerConfig,
    #[serde(default)]
    pub derivation: DerivationConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub features: FeatureFlags,
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
        }
    }
}

impl ApiConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    DEFAULT_HOST.into()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Which proving backend the server runs
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProverMode {
    #[default]
    Mock,
    Groth16,
}

/// Proof job configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProverConfig {
    #[serde(default)]
    pub mode: ProverMode,
    /// Directory holding `withdraw.pk/vk` and `transfer.pk/vk`
    #[serde(default = "default_keys_dir")]
    pub keys_dir: String,
    #[serde(default = "default_max_concurrent_proofs")]
    pub max_concurrent_proofs: usize,
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    /// How long finished jobs stay queryable
    #[serde(default = "default_job_retention")]
    pub job_retention_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Simulated proving time of the mock backend
    #[serde(default = "default_mock_prove_ms")]
    pub mock_prove_time_ms: u64,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            mode: ProverMode::Mock,
            keys_dir: DEFAULT_KEYS_DIR.into(),
            max_concurrent_proofs: DEFAULT_MAX_CONCURRENT_PROOFS,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            job_retention_secs: DEFAULT_JOB_RETENTION_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            mock_prove_time_ms: DEFAULT_MOCK_PROVE_MS,
        }
    }
}

fn default_keys_dir() -> String {
    DEFAULT_KEYS_DIR.into()
}
fn default_max_concurrent_proofs() -> usize {
    DEFAULT_MAX_CONCURRENT_PROOFS
}
fn default_job_timeout() -> u64 {
    DEFAULT_JOB_TIMEOUT_SECS
}
fn default_job_retention() -> u64 {
    DEFAULT_JOB_RETENTION_SECS
}
fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_mock_prove_ms() -> u64 {
    DEFAULT_MOCK_PROVE_MS
}

/// Relayer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fee charged on unshield relays, in basis points
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u16,
    #[serde(default)]
    pub keypair_path: Option<String>,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fee_bps: DEFAULT_FEE_BPS,
            keypair_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_fee_bps() -> u16 {
    DEFAULT_FEE_BPS
}

/// Secret derivation message parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerivationConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    #[serde(default = "default_derivation_version")]
    pub version: u32,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID.into(),
            version: DEFAULT_DERIVATION_VERSION,
        }
    }
}

fn default_chain_id() -> String {
    DEFAULT_CHAIN_ID.into()
}
fn default_derivation_version() -> u32 {
    DEFAULT_DERIVATION_VERSION
}

/// Client-side polling of proof jobs and ledger confirmations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingConfig {
    #[serde(default = "default_poll_initial")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_poll_max")]
    pub max_delay_ms: u64,
    #[serde(default = "default_poll_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_confirm_interval")]
    pub confirmation_interval_ms: u64,
    #[serde(default = "default_confirm_attempts")]
    pub confirmation_max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_POLL_INITIAL_MS,
            max_delay_ms: DEFAULT_POLL_MAX_MS,
            multiplier: DEFAULT_POLL_MULTIPLIER,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            confirmation_interval_ms: DEFAULT_CONFIRM_INTERVAL_MS,
            confirmation_max_attempts: DEFAULT_CONFIRM_MAX_ATTEMPTS,
        }
    }
}

fn default_poll_initial() -> u64 {
    DEFAULT_POLL_INITIAL_MS
}
fn default_poll_max() -> u64 {
    DEFAULT_POLL_MAX_MS
}
fn default_poll_multiplier() -> f64 {
    DEFAULT_POLL_MULTIPLIER
}
fn default_poll_attempts() -> u32 {
    DEFAULT_POLL_MAX_ATTEMPTS
}
fn default_confirm_interval() -> u64 {
    DEFAULT_CONFIRM_INTERVAL_MS
}
fn default_confirm_attempts() -> u32 {
    DEFAULT_CONFIRM_MAX_ATTEMPTS
}

/// Amount rules of the pool, in lamports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// Exclusive lower bound
    #[serde(default = "default_min_amount")]
    pub min_amount: u64,
    /// Inclusive upper bound
    #[serde(default = "default_max_amount")]
    pub max_amount: u64,
    #[serde(default = "default_denominations")]
    pub denominations: Vec<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_amount: DEFAULT_MIN_AMOUNT,
            max_amount: DEFAULT_MAX_AMOUNT,
            denominations: DEFAULT_DENOMINATIONS.to_vec(),
        }
    }
}

fn default_min_amount() -> u64 {
    DEFAULT_MIN_AMOUNT
}
fn default_max_amount() -> u64 {
    DEFAULT_MAX_AMOUNT
}
fn default_denominations() -> Vec<u64> {
    DEFAULT_DENOMINATIONS.to_vec()
}

/// Feature flags
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureFlags {
    /// Enables `/api/dev/*` routes
    #[serde(default)]
    pub dev_mode: bool,
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(key: &str, field: &mut Option<String>) {
    if let Ok(v) = env::var(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

/// Check if env var is set to a truthy value ("1" or "true")
fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Implementation
// ============================================================================

impl VaultConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check WV_CONFIG env var
        if let Ok(path) = env::var("WV_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("WV_CONFIG points to missing file: {}", path.display());
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.whalevault/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // API
        env_string("WV_API_HOST", &mut self.api.host);
        env_parse("WV_API_PORT", &mut self.api.port);

        // Prover
        if let Ok(v) = env::var("WV_PROVER_MODE") {
            self.prover.mode = match v.to_ascii_lowercase().as_str() {
                "groth16" => ProverMode::Groth16,
                _ => ProverMode::Mock,
            };
        }
        env_string("WV_PROVER_KEYS_DIR", &mut self.prover.keys_dir);
        env_parse(
            "WV_PROVER_MAX_CONCURRENT",
            &mut self.prover.max_concurrent_proofs,
        );
        env_parse("WV_PROVER_JOB_TIMEOUT_SECS", &mut self.prover.job_timeout_secs);
        env_parse(
            "WV_PROVER_JOB_RETENTION_SECS",
            &mut self.prover.job_retention_secs,
        );

        // Relayer
        if let Some(v) = env_bool("WV_RELAYER_ENABLED") {
            self.relayer.enabled = v;
        }
        env_parse("WV_RELAYER_FEE_BPS", &mut self.relayer.fee_bps);
        env_option_string("WV_RELAYER_KEYPAIR", &mut self.relayer.keypair_path);

        // Derivation
        env_string("WV_CHAIN_ID", &mut self.derivation.chain_id);

        // Features
        if let Some(v) = env_bool("WV_DEV_MODE") {
            self.features.dev_mode = v;
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.prover.max_concurrent_proofs == 0 {
            bail!("prover.max_concurrent_proofs must be at least 1");
        }
        if self.prover.job_timeout_secs == 0 {
            bail!("prover.job_timeout_secs must be at least 1");
        }
        if self.relayer.fee_bps > 10_000 {
            bail!("relayer.fee_bps must not exceed 10000");
        }
        if self.pool.min_amount >= self.pool.max_amount {
            bail!(
                "pool.min_amount ({}) must be below pool.max_amount ({})",
                self.pool.min_amount,
                self.pool.max_amount
            );
        }
        if let Some(d) = self
            .pool
            .denominations
            .iter()
            .find(|d| **d <= self.pool.min_amount || **d > self.pool.max_amount)
        {
            bail!("denomination {} lies outside the pool amount bounds", d);
        }
        if !self.polling.multiplier.is_finite() || self.polling.multiplier < 1.0 {
            bail!("polling.multiplier must be a finite number >= 1.0");
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.features.dev_mode = true;
        sample.relayer.keypair_path = Some("~/.config/solana/relayer.json".into());
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static VaultConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            })
        })
    }

    /// Try to get the global config instance.
    ///
    /// Returns `None` if config hasn't been initialized yet.
    pub fn try_global() -> Option<&'static VaultConfig> {
        GLOBAL_CONFIG.get()
    }

    /// Initialize the global config with a specific instance.
    ///
    /// Returns `Err(config)` if already initialized.
    pub fn set_global(config: VaultConfig) -> Result<(), VaultConfig> {
        GLOBAL_CONFIG.set(config)
    }
}

/// Shorthand for `VaultConfig::global()`.
#[inline]
pub fn global_config() -> &'static VaultConfig {
    VaultConfig::global()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.api.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.prover.mode, ProverMode::Mock);
        assert_eq!(config.prover.max_concurrent_proofs, 2);
        assert!(config.relayer.enabled);
        assert_eq!(config.relayer.fee_bps, 30);
        assert_eq!(config.derivation.chain_id, "solana:devnet");
        assert!(!config.features.dev_mode);
        assert!(config.validate().is_ok(), "defaults must validate");
    }

    #[test]
    fn test_generate_sample() {
        let sample = VaultConfig::generate_sample();
        for section in ["[api]", "[prover]", "[relayer]", "[derivation]", "[polling]", "[pool]", "[features]"] {
            assert!(sample.contains(section), "sample is missing {section}");
        }
    }

    #[test]
    fn test_parse_sample() {
        let sample = VaultConfig::generate_sample();
        let parsed: VaultConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.api.port, DEFAULT_PORT);
        assert_eq!(parsed.pool.denominations, DEFAULT_DENOMINATIONS.to_vec());
        assert!(parsed.features.dev_mode);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: VaultConfig = toml::from_str(
            r#"
            [prover]
            mode = "groth16"
            max_concurrent_proofs = 4

            [relayer]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(parsed.prover.mode, ProverMode::Groth16);
        assert_eq!(parsed.prover.max_concurrent_proofs, 4);
        assert_eq!(parsed.prover.job_timeout_secs, DEFAULT_JOB_TIMEOUT_SECS);
        assert!(!parsed.relayer.enabled);
        assert_eq!(parsed.relayer.fee_bps, DEFAULT_FEE_BPS);
        assert_eq!(parsed.polling.max_attempts, DEFAULT_POLL_MAX_ATTEMPTS);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = VaultConfig::default();
        config.prover.max_concurrent_proofs = 0;
        assert!(config.validate().is_err(), "zero workers must be rejected");

        let mut config = VaultConfig::default();
        config.relayer.fee_bps = 10_001;
        assert!(config.validate().is_err(), "fee above 100% must be rejected");

        let mut config = VaultConfig::default();
        config.pool.denominations.push(DEFAULT_MIN_AMOUNT);
        assert!(
            config.validate().is_err(),
            "denomination at the exclusive minimum must be rejected"
        );

        for multiplier in [f64::INFINITY, f64::NAN, 0.5] {
            let mut config = VaultConfig::default();
            config.polling.multiplier = multiplier;
            assert!(config.validate().is_err(), "multiplier {multiplier} must be rejected");
        }
    }

    #[test]
    fn test_load_from_file() {
        let path = env::temp_dir().join(format!("wv-config-{}.toml", std::process::id()));
        fs::write(&path, "[api]\nport = 9100\n").unwrap();
        let config = VaultConfig::load_from(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(config.api.port, 9100);
        assert_eq!(config.api.host, DEFAULT_HOST);
    }
}
