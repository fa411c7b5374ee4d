//! 設定の読み込み
//!
//! 既定値 → `config/default`（任意）→ 環境変数（`LIBRARY__SECTION__KEY`）の順に重ねる。
//! `DATABASE_URL`と`PORT`は単独の環境変数でも上書きできる。

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

use crate::application::lending::LendingPolicy;
use crate::domain::{DEFAULT_LOAN_DAYS, FineRate, LoanPeriod};

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 永続化の方式
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LendingConfig {
    pub default_loan_days: i64,
    pub fine_per_day: Decimal,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SweepConfig {
    /// 未設定なら定期スイープを行わない
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` または `json`
    pub format: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub lending: LendingConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 設定ファイルと環境変数から読み込む
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("LIBRARY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("storage.database_url", env::var("DATABASE_URL").ok())?
            .set_override_option("server.port", env::var("PORT").ok())?
            .build()?
            .try_deserialize()
    }

    /// 既定値のみの設定
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("storage.backend", "memory")?
            .set_default("storage.database_url", "postgres://localhost/library")?
            .set_default("storage.max_connections", 5)?
            .set_default("lending.default_loan_days", i64::from(DEFAULT_LOAN_DAYS))?
            .set_default("lending.fine_per_day", "1.00")?
            .set_default("logging.level", "library_circulation=debug,tower_http=debug")?
            .set_default("logging.format", "pretty")
    }

    /// 貸出ポリシーを組み立てる
    ///
    /// # エラー
    /// 既定の貸出日数が1未満、または延滞料金の日額が負の場合
    pub fn lending_policy(&self) -> Result<LendingPolicy, ConfigError> {
        let default_loan_period =
            LoanPeriod::new(self.lending.default_loan_days).map_err(|_| {
                ConfigError::Message(format!(
                    "lending.default_loan_days must be positive (got {})",
                    self.lending.default_loan_days
                ))
            })?;
        let fine_rate = FineRate::new(self.lending.fine_per_day).ok_or_else(|| {
            ConfigError::Message(format!(
                "lending.fine_per_day must not be negative (got {})",
                self.lending.fine_per_day
            ))
        })?;

        Ok(LendingPolicy {
            default_loan_period,
            fine_rate,
        })
    }
}
