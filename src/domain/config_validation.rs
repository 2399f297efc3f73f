//! Configuration validation.
//!
//! Validates every config section before a command runs, collecting all
//! problems instead of stopping at the first one.

use crate::domain::error::KabuError;
use crate::domain::rule::SignalRule;
use crate::domain::settings;
use crate::ports::config_port::ConfigPort;

/// Sections a command may need. `Rules` also checks that every condition parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Data,
    Indicators,
    Labels,
    Backtest,
    Rules,
    Ledger,
    Monitor,
}

pub const ALL_SECTIONS: [Section; 7] = [
    Section::Data,
    Section::Indicators,
    Section::Labels,
    Section::Backtest,
    Section::Rules,
    Section::Ledger,
    Section::Monitor,
];

pub fn validate_sections(config: &dyn ConfigPort, sections: &[Section]) -> Vec<KabuError> {
    let mut errors = Vec::new();
    for section in sections {
        if let Err(e) = validate_section(config, *section) {
            errors.push(e);
        }
    }
    errors
}

pub fn validate_all(config: &dyn ConfigPort) -> Vec<KabuError> {
    validate_sections(config, &ALL_SECTIONS)
}

fn validate_section(config: &dyn ConfigPort, section: Section) -> Result<(), KabuError> {
    match section {
        Section::Data => settings::load_data_settings(config).map(|_| ()),
        Section::Indicators => settings::load_indicator_params(config).map(|_| ()),
        Section::Labels => settings::load_label_spec(config).map(|_| ()),
        Section::Backtest => {
            let labels = settings::load_label_spec(config)?;
            settings::load_backtest_settings(config, &labels).map(|_| ())
        }
        Section::Rules => validate_rule_conditions(&settings::load_rules(config)?),
        Section::Ledger => settings::load_ledger_settings(config).map(|_| ()),
        Section::Monitor => {
            let monitor = settings::load_monitor_settings(config)?;
            for stock in &monitor.stocks {
                validate_rule_conditions(&stock.rules)?;
            }
            Ok(())
        }
    }
}

/// First condition that fails to parse, as a `RuleParse` error.
pub fn validate_rule_conditions(rules: &[SignalRule]) -> Result<(), KabuError> {
    for rule in rules {
        if let Some((source, error)) = rule.parse_error() {
            log::error!(
                "rule '{}' has a malformed condition:\n{}",
                rule.name,
                error.display_with_context(source)
            );
            return Err(KabuError::RuleParse(error.clone()));
        }
    }
    Ok(())
}
