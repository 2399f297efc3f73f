//! Typed settings read from a [`ConfigPort`].
//!
//! Missing keys fall back to defaults; present but malformed values are
//! reported as `ConfigInvalid` rather than silently replaced.

use crate::domain::backtest::{
    BacktestConfig, DEFAULT_INITIAL_BUDGET, DEFAULT_MIN_ROWS, DEFAULT_SPLIT_RATIO,
};
use crate::domain::batch::{DEFAULT_MIN_TRADES_PER_WEEK, parse_codes};
use crate::domain::error::KabuError;
use crate::domain::indicator::IndicatorParams;
use crate::domain::label::{LabelClasses, LabelMode, LabelSpec};
use crate::domain::notification::NotificationSettings;
use crate::domain::rule::SignalRule;
use crate::domain::signal::Signal;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PRICES_DIR: &str = "data";
pub const DEFAULT_LEDGER_PATH: &str = "trade_log.csv";
const RULE_SECTION_PREFIX: &str = "rule:";
const STOCK_SECTION_PREFIX: &str = "stock:";

/// Trimmed value, `None` when absent or blank.
pub fn get_trimmed(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, KabuError>
where
    T::Err: std::fmt::Display,
{
    match get_trimmed(config, section, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| KabuError::invalid(section, key, format!("'{}': {}", raw, e))),
    }
}

fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, KabuError> {
    get_trimmed(config, section, key)
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                KabuError::invalid(
                    section,
                    key,
                    format!("invalid {} format, expected YYYY-MM-DD", key),
                )
            })
        })
        .transpose()
}

fn parse_list(config: &dyn ConfigPort, section: &str, key: &str, separator: char) -> Vec<String> {
    get_trimmed(config, section, key)
        .map(|raw| {
            raw.split(separator)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn positive(section: &str, key: &str, value: usize) -> Result<usize, KabuError> {
    if value == 0 {
        return Err(KabuError::invalid(section, key, format!("{} must be at least 1", key)));
    }
    Ok(value)
}

pub fn log_level(config: &dyn ConfigPort) -> Option<String> {
    get_trimmed(config, "logging", "level")
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub prices_dir: PathBuf,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

pub fn load_data_settings(config: &dyn ConfigPort) -> Result<DataSettings, KabuError> {
    let prices_dir = get_trimmed(config, "data", "prices_dir")
        .unwrap_or_else(|| DEFAULT_PRICES_DIR.to_string());
    let date_from = parse_date(config, "data", "date_from")?;
    let date_to = parse_date(config, "data", "date_to")?;
    if let (Some(from), Some(to)) = (date_from, date_to) {
        if from > to {
            return Err(KabuError::invalid(
                "data",
                "date_from",
                "date_from must not be after date_to",
            ));
        }
    }
    Ok(DataSettings {
        prices_dir: PathBuf::from(prices_dir),
        date_from,
        date_to,
    })
}

pub fn load_indicator_params(config: &dyn ConfigPort) -> Result<IndicatorParams, KabuError> {
    let d = IndicatorParams::default();
    let s = "indicators";
    let params = IndicatorParams {
        sma_short: positive(s, "sma_short", parse_or(config, s, "sma_short", d.sma_short)?)?,
        sma_long: positive(s, "sma_long", parse_or(config, s, "sma_long", d.sma_long)?)?,
        rsi_period: positive(s, "rsi_period", parse_or(config, s, "rsi_period", d.rsi_period)?)?,
        macd_fast: positive(s, "macd_fast", parse_or(config, s, "macd_fast", d.macd_fast)?)?,
        macd_slow: positive(s, "macd_slow", parse_or(config, s, "macd_slow", d.macd_slow)?)?,
        macd_signal: positive(
            s,
            "macd_signal",
            parse_or(config, s, "macd_signal", d.macd_signal)?,
        )?,
        bollinger_period: positive(
            s,
            "bollinger_period",
            parse_or(config, s, "bollinger_period", d.bollinger_period)?,
        )?,
        bollinger_stddev: parse_or(config, s, "bollinger_stddev", d.bollinger_stddev)?,
        atr_period: positive(s, "atr_period", parse_or(config, s, "atr_period", d.atr_period)?)?,
    };
    if params.sma_short >= params.sma_long {
        return Err(KabuError::invalid(s, "sma_short", "sma_short must be below sma_long"));
    }
    if params.macd_fast >= params.macd_slow {
        return Err(KabuError::invalid(s, "macd_fast", "macd_fast must be below macd_slow"));
    }
    if !(params.bollinger_stddev > 0.0) {
        return Err(KabuError::invalid(
            s,
            "bollinger_stddev",
            "bollinger_stddev must be positive",
        ));
    }
    Ok(params)
}

pub fn load_label_spec(config: &dyn ConfigPort) -> Result<LabelSpec, KabuError> {
    let spec = LabelSpec {
        horizon_days: parse_or(config, "labels", "horizon_days", 1usize)?,
        threshold_percent: parse_or(config, "labels", "threshold_percent", 2.0)?,
        mode: parse_or(config, "labels", "mode", LabelMode::SameDayClose)?,
        classes: parse_or(config, "labels", "classes", LabelClasses::Binary)?,
    };
    spec.validate()?;
    Ok(spec)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Model,
    Rules,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "model" => Ok(StrategyKind::Model),
            "rules" => Ok(StrategyKind::Rules),
            other => Err(format!("unknown strategy '{}', expected model or rules", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub candidates: Vec<String>,
    /// Empty means every column the indicator engine produces.
    pub feature_columns: Vec<String>,
    pub config: BacktestConfig,
    pub min_trades_per_week: f64,
    pub strategy: StrategyKind,
    pub rules: Vec<SignalRule>,
}

pub fn load_backtest_settings(
    config: &dyn ConfigPort,
    label_spec: &LabelSpec,
) -> Result<BacktestSettings, KabuError> {
    let s = "backtest";
    let candidates = match get_trimmed(config, s, "candidates") {
        Some(raw) => parse_codes(&raw)
            .map_err(|e| KabuError::invalid(s, "candidates", e.to_string()))?,
        None => Vec::new(),
    };

    let split_ratio = parse_or(config, s, "split_ratio", DEFAULT_SPLIT_RATIO)?;
    if !(split_ratio > 0.0 && split_ratio < 1.0) {
        return Err(KabuError::invalid(s, "split_ratio", "split_ratio must be between 0 and 1"));
    }
    let initial_budget = parse_or(config, s, "initial_budget", DEFAULT_INITIAL_BUDGET)?;
    if !(initial_budget > 0.0) {
        return Err(KabuError::invalid(s, "initial_budget", "initial_budget must be positive"));
    }
    let decision_threshold = parse_or(config, s, "decision_threshold", 0.5)?;
    if !(0.0..=1.0).contains(&decision_threshold) {
        return Err(KabuError::invalid(
            s,
            "decision_threshold",
            "decision_threshold must be between 0 and 1",
        ));
    }
    let min_trades_per_week =
        parse_or(config, s, "min_trades_per_week", DEFAULT_MIN_TRADES_PER_WEEK)?;
    if min_trades_per_week < 0.0 {
        return Err(KabuError::invalid(
            s,
            "min_trades_per_week",
            "min_trades_per_week must be non-negative",
        ));
    }

    let strategy = parse_or(config, s, "strategy", StrategyKind::Model)?;
    let rule_ids = parse_list(config, s, "rules", ',');
    let rules = if rule_ids.is_empty() {
        load_rules(config)?
    } else {
        load_rules_by_id(config, &rule_ids)?
    };
    if strategy == StrategyKind::Rules && rules.is_empty() {
        return Err(KabuError::missing(s, "rules"));
    }

    Ok(BacktestSettings {
        candidates,
        feature_columns: feature_columns(config),
        config: BacktestConfig {
            split_ratio,
            initial_budget,
            decision_threshold,
            horizon_days: label_spec.horizon_days,
            min_rows: parse_or(config, s, "min_rows", DEFAULT_MIN_ROWS)?,
        },
        min_trades_per_week,
        strategy,
        rules,
    })
}

/// `[backtest] feature_columns`. Empty means every engine column.
pub fn feature_columns(config: &dyn ConfigPort) -> Vec<String> {
    parse_list(config, "backtest", "feature_columns", ',')
}

/// Rule ids in evaluation order: `[rules] order` if set, else every
/// `[rule:<id>]` section sorted by id.
pub fn rule_ids(config: &dyn ConfigPort) -> Vec<String> {
    let order = parse_list(config, "rules", "order", ',');
    if !order.is_empty() {
        return order;
    }
    let mut ids: Vec<String> = config
        .sections()
        .iter()
        .filter_map(|s| s.strip_prefix(RULE_SECTION_PREFIX))
        .map(|id| id.trim().to_string())
        .collect();
    ids.sort();
    ids
}

pub fn load_rules(config: &dyn ConfigPort) -> Result<Vec<SignalRule>, KabuError> {
    load_rules_by_id(config, &rule_ids(config))
}

pub fn load_rules_by_id(
    config: &dyn ConfigPort,
    ids: &[String],
) -> Result<Vec<SignalRule>, KabuError> {
    ids.iter().map(|id| load_rule(config, id)).collect()
}

/// One `[rule:<id>]` section. Conditions are separated by `,`. A condition
/// that does not parse is kept on the rule and disables it at evaluation.
pub fn load_rule(config: &dyn ConfigPort, id: &str) -> Result<SignalRule, KabuError> {
    // Section names are case-insensitive in INI files.
    let section = format!("{}{}", RULE_SECTION_PREFIX, id.to_lowercase());
    if !config.sections().iter().any(|s| s.to_lowercase() == section) {
        return Err(KabuError::invalid("rules", "order", format!("no [{}] section", section)));
    }
    let name = get_trimmed(config, &section, "name").unwrap_or_else(|| id.to_string());
    let action: Signal = get_trimmed(config, &section, "action")
        .ok_or_else(|| KabuError::missing(&section, "action"))?
        .parse()
        .map_err(|e: String| KabuError::invalid(&section, "action", e))?;
    let conditions = parse_list(config, &section, "conditions", ',');
    Ok(SignalRule::new(&name, action, &conditions))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Csv,
    Sqlite,
}

impl FromStr for LedgerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(LedgerBackend::Csv),
            "sqlite" => Ok(LedgerBackend::Sqlite),
            other => Err(format!("unknown ledger backend '{}', expected csv or sqlite", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSettings {
    pub backend: LedgerBackend,
    /// CSV file for the `csv` backend.
    pub path: PathBuf,
    pub capital_basis: f64,
}

pub fn load_ledger_settings(config: &dyn ConfigPort) -> Result<LedgerSettings, KabuError> {
    let s = "ledger";
    let capital_basis = parse_or(config, s, "capital_basis", DEFAULT_INITIAL_BUDGET)?;
    if !(capital_basis > 0.0) {
        return Err(KabuError::invalid(
            s,
            "capital_basis",
            "capital_basis must be positive",
        ));
    }
    let backend = parse_or(config, s, "backend", LedgerBackend::Csv)?;
    if backend == LedgerBackend::Sqlite && !config.has_key(s, "sqlite_path") {
        return Err(KabuError::missing(s, "sqlite_path"));
    }
    let path = get_trimmed(config, s, "path").unwrap_or_else(|| DEFAULT_LEDGER_PATH.to_string());
    Ok(LedgerSettings {
        backend,
        path: PathBuf::from(path),
        capital_basis,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockSettings {
    pub code: String,
    pub name: String,
    pub enabled: bool,
    pub rules: Vec<SignalRule>,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub recipient: Option<String>,
    pub mode: StrategyKind,
    /// BUY probability needed in model mode.
    pub decision_threshold: f64,
    pub stocks: Vec<StockSettings>,
}

pub fn load_monitor_settings(config: &dyn ConfigPort) -> Result<MonitorSettings, KabuError> {
    let codes = match get_trimmed(config, "monitor", "codes") {
        Some(raw) => parse_codes(&raw)
            .map_err(|e| KabuError::invalid("monitor", "codes", e.to_string()))?,
        None => Vec::new(),
    };
    let stocks = codes
        .iter()
        .map(|code| load_stock_settings(config, code))
        .collect::<Result<Vec<_>, _>>()?;
    let decision_threshold = parse_or(config, "monitor", "decision_threshold", 0.75)?;
    if !(0.0..=1.0).contains(&decision_threshold) {
        return Err(KabuError::invalid(
            "monitor",
            "decision_threshold",
            "decision_threshold must be between 0 and 1",
        ));
    }
    Ok(MonitorSettings {
        recipient: get_trimmed(config, "monitor", "recipient"),
        mode: parse_or(config, "monitor", "mode", StrategyKind::Rules)?,
        decision_threshold,
        stocks,
    })
}

/// Rules listed in `[stock:<code>] rules`, else every configured rule.
pub fn stock_rules(config: &dyn ConfigPort, code: &str) -> Result<Vec<SignalRule>, KabuError> {
    let section = format!("{}{}", STOCK_SECTION_PREFIX, code);
    let rule_ids = parse_list(config, &section, "rules", ',');
    if rule_ids.is_empty() {
        load_rules(config)
    } else {
        load_rules_by_id(config, &rule_ids)
    }
}

/// Display name from `[stock:<code>] name`, defaulting to the code.
pub fn stock_name(config: &dyn ConfigPort, code: &str) -> String {
    let section = format!("{}{}", STOCK_SECTION_PREFIX, code);
    get_trimmed(config, &section, "name").unwrap_or_else(|| code.to_string())
}

fn load_stock_settings(config: &dyn ConfigPort, code: &str) -> Result<StockSettings, KabuError> {
    let section = format!("{}{}", STOCK_SECTION_PREFIX, code);
    let defaults = NotificationSettings::default();
    Ok(StockSettings {
        code: code.to_string(),
        name: stock_name(config, code),
        enabled: config.get_bool(&section, "enabled", true),
        rules: stock_rules(config, code)?,
        notifications: NotificationSettings {
            on_buy: config.get_bool(&section, "on_buy", defaults.on_buy),
            on_sell: config.get_bool(&section, "on_sell", defaults.on_sell),
            on_hold: config.get_bool(&section, "on_hold", defaults.on_hold),
        },
    })
}
