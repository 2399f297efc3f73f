//! INI file configuration adapter.
//!
//! Section and key names are case-insensitive (stored lowercased).

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn sections(&self) -> Vec<String> {
        self.config.sections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[data]
prices_dir = /var/lib/kabusignal/prices

[rule:golden_cross]
action = BUY
conditions = latest.SMA_5 > latest.SMA_25, previous.SMA_5 <= previous.SMA_25
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("data", "prices_dir"),
            Some("/var/lib/kabusignal/prices".to_string())
        );
        assert_eq!(
            adapter.get_string("rule:golden_cross", "conditions"),
            Some("latest.SMA_5 > latest.SMA_25, previous.SMA_5 <= previous.SMA_25".to_string())
        );
    }

    #[test]
    fn values_keep_their_case() {
        let adapter = FileConfigAdapter::from_string("[Rule:RSI]\nAction = BUY\n").unwrap();
        assert_eq!(
            adapter.get_string("rule:rsi", "action"),
            Some("BUY".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[labels]\nhorizon_days = 1\n").unwrap();
        assert_eq!(adapter.get_string("labels", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[labels]\nhorizon_days = 3\nbad = abc\n").unwrap();
        assert_eq!(adapter.get_int("labels", "horizon_days", 0), 3);
        assert_eq!(adapter.get_int("labels", "missing", 42), 42);
        assert_eq!(adapter.get_int("labels", "bad", 42), 42);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\ninitial_budget = 300000.5\nbad = not_a_number\n",
        )
        .unwrap();
        assert_eq!(
            adapter.get_double("backtest", "initial_budget", 0.0),
            300000.5
        );
        assert_eq!(adapter.get_double("backtest", "missing", 99.9), 99.9);
        assert_eq!(adapter.get_double("backtest", "bad", 99.9), 99.9);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[stock:7203]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        assert!(adapter.get_bool("stock:7203", "a", false));
        assert!(adapter.get_bool("stock:7203", "b", false));
        assert!(adapter.get_bool("stock:7203", "c", false));
        assert!(!adapter.get_bool("stock:7203", "d", true));
        assert!(!adapter.get_bool("stock:7203", "e", true));
        assert!(!adapter.get_bool("stock:7203", "f", true));
        assert!(adapter.get_bool("stock:7203", "missing", true));
    }

    #[test]
    fn sections_lists_every_section() {
        let adapter = FileConfigAdapter::from_string(
            "[rule:a]\naction = BUY\n[rule:b]\naction = SELL\n[ledger]\npath = x.csv\n",
        )
        .unwrap();
        let mut sections = adapter.sections();
        sections.sort();
        assert_eq!(sections, vec!["ledger", "rule:a", "rule:b"]);
    }

    #[test]
    fn has_key_ignores_blank_values() {
        let adapter =
            FileConfigAdapter::from_string("[monitor]\nrecipient =\ncodes = 7203\n").unwrap();
        assert!(!adapter.has_key("monitor", "recipient"));
        assert!(adapter.has_key("monitor", "codes"));
        assert!(!adapter.has_key("monitor", "missing"));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[ledger]\npath = /tmp/trade_log.csv\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("ledger", "path"),
            Some("/tmp/trade_log.csv".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/kabusignal.ini");
        assert!(result.is_err());
    }
}
