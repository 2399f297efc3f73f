//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvPriceSource;
use crate::adapters::csv_ledger_adapter::CsvLedgerStore;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::log_notifier::LogNotifier;
use crate::adapters::logistic_classifier::LogisticClassifierFactory;
use crate::adapters::technical_indicators::TechnicalIndicators;
use crate::domain::backtest::{DailyJournal, ModelStrategy, RuleStrategy, ScoringStrategy};
use crate::domain::batch::{BatchContext, BatchReport, Recommendation, parse_codes, run_batch};
use crate::domain::config_validation::{Section, validate_all, validate_sections};
use crate::domain::error::KabuError;
use crate::domain::label::{FrequencyAssessment, Label, LabelFrequency, build_labels};
use crate::domain::ledger::TradeLedger;
use crate::domain::monitor::{DecisionMode, MonitorContext, StockOutcome, run_monitor};
use crate::domain::notification::signal_message;
use crate::domain::rule_eval::evaluate_signals;
use crate::domain::settings::{self, LedgerBackend, LedgerSettings, StrategyKind};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceSource;
use crate::ports::indicator_port::IndicatorEngine;
use crate::ports::ledger_port::LedgerStore;
use crate::ports::report_port::ReportPort;

const DEFAULT_RECIPIENT: &str = "console";

#[derive(Parser, Debug)]
#[command(
    name = "kabusignal",
    about = "Daily equities signal labeling, rule evaluation, backtesting and trade ledger"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Label a stock's history and show how often each class occurs
    Labels {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
        /// Write date,close,label rows to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Evaluate the configured rules against a stock's latest data
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
    },
    /// Backtest candidates and rank them by profit
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated codes, overriding [backtest] candidates
        #[arg(long)]
        code: Option<String>,
        /// Write the ranking to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the daily journal of the best candidate to this CSV file
        #[arg(long)]
        journal: Option<PathBuf>,
    },
    /// Evaluate every monitored stock, notify and update the ledger
    Monitor {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Inspect or update the trade ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum LedgerAction {
    /// Show running totals over settled trades
    Summary {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Settle pending trades whose exit day has passed
    Reconcile {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Labels { config, .. }
            | Command::Evaluate { config, .. }
            | Command::Backtest { config, .. }
            | Command::Monitor { config }
            | Command::Validate { config }
            | Command::Ledger {
                action: LedgerAction::Summary { config } | LedgerAction::Reconcile { config },
            } => config,
        }
    }
}

/// `[logging] level` of the command's config file, if it loads.
pub fn configured_log_level(cli: &Cli) -> Option<String> {
    FileConfigAdapter::from_file(cli.command.config_path())
        .ok()
        .and_then(|config| settings::log_level(&config))
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Labels {
            config,
            code,
            output,
        } => run_labels(&config, &code, output.as_deref()),
        Command::Evaluate { config, code } => run_evaluate(&config, &code),
        Command::Backtest {
            config,
            code,
            output,
            journal,
        } => run_backtest(&config, code.as_deref(), output.as_deref(), journal.as_deref()),
        Command::Monitor { config } => run_monitor_command(&config),
        Command::Ledger { action } => match action {
            LedgerAction::Summary { config } => run_ledger_summary(&config),
            LedgerAction::Reconcile { config } => run_ledger_reconcile(&config),
        },
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = KabuError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Print every problem in `sections`; fail with the first one's exit code.
fn check_sections(config: &dyn ConfigPort, sections: &[Section]) -> Result<(), ExitCode> {
    let errors = validate_sections(config, sections);
    for e in &errors {
        eprintln!("error: {e}");
    }
    match errors.first() {
        Some(first) => Err(first.into()),
        None => Ok(()),
    }
}

fn finish(result: Result<(), KabuError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn fetch_nonempty(
    source: &dyn PriceSource,
    code: &str,
    data: &settings::DataSettings,
) -> Result<Vec<crate::domain::ohlcv::PriceBar>, KabuError> {
    let bars = source.get_daily_prices(code, data.date_from, data.date_to)?;
    if bars.is_empty() {
        return Err(KabuError::NoData {
            code: code.to_string(),
        });
    }
    Ok(bars)
}

fn run_labels(config_path: &Path, code: &str, output: Option<&Path>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(exit) => return exit,
    };
    if let Err(exit) = check_sections(&config, &[Section::Data, Section::Labels]) {
        return exit;
    }
    finish(labels(&config, code, output))
}

fn labels(config: &dyn ConfigPort, code: &str, output: Option<&Path>) -> Result<(), KabuError> {
    let data = settings::load_data_settings(config)?;
    let spec = settings::load_label_spec(config)?;
    let source = CsvPriceSource::new(data.prices_dir.clone());

    let bars = fetch_nonempty(&source, code, &data)?;
    let series = build_labels(&bars, &spec)?;
    let freq = LabelFrequency::from_series(&series);

    println!(
        "{}: {} labeled rows (horizon {} days, threshold {}%)",
        code, freq.total, spec.horizon_days, spec.threshold_percent
    );
    for label in [Label::Buy, Label::Sell, Label::Hold] {
        let count = match label {
            Label::Buy => freq.buy,
            Label::Sell => freq.sell,
            Label::Hold => freq.hold,
        };
        println!(
            "  {:>2}: {:>5} ({:.1}%)",
            label,
            count,
            freq.percent(label)
        );
    }
    match freq.assessment() {
        FrequencyAssessment::Rare => {
            println!("HOLD dominates: moves of this size are rare, consider a lower threshold")
        }
        FrequencyAssessment::Frequent => println!("signal classes are well represented"),
        FrequencyAssessment::Balanced => println!("class balance is moderate"),
    }

    if let Some(path) = output {
        let persistence = |e: csv::Error| KabuError::Persistence {
            reason: format!("{}: {}", path.display(), e),
        };
        let mut wtr = csv::Writer::from_path(path).map_err(persistence)?;
        wtr.write_record(["date", "close", "label"])
            .map_err(persistence)?;
        for row in &series.rows {
            wtr.write_record([
                row.date.format("%Y-%m-%d").to_string(),
                bars[row.index].close.to_string(),
                row.label.to_string(),
            ])
            .map_err(persistence)?;
        }
        wtr.flush()?;
        eprintln!("Labels written to: {}", path.display());
    }
    Ok(())
}

fn run_evaluate(config_path: &Path, code: &str) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(exit) => return exit,
    };
    if let Err(exit) = check_sections(&config, &[Section::Data, Section::Indicators]) {
        return exit;
    }
    finish(evaluate(&config, code))
}

fn evaluate(config: &dyn ConfigPort, code: &str) -> Result<(), KabuError> {
    let data = settings::load_data_settings(config)?;
    let params = settings::load_indicator_params(config)?;
    let rules = settings::stock_rules(config, code)?;
    let source = CsvPriceSource::new(data.prices_dir.clone());

    let bars = fetch_nonempty(&source, code, &data)?;
    let rows = TechnicalIndicators::new().compute_indicators(&bars, &params);
    let decision = evaluate_signals(&rows, &rules);

    println!(
        "{}",
        signal_message(
            &settings::stock_name(config, code),
            code,
            &decision,
            rows.last()
        )
    );
    Ok(())
}

fn run_backtest(
    config_path: &Path,
    code_override: Option<&str>,
    output: Option<&Path>,
    journal: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(exit) => return exit,
    };
    if let Err(exit) = check_sections(
        &config,
        &[
            Section::Data,
            Section::Indicators,
            Section::Labels,
            Section::Backtest,
        ],
    ) {
        return exit;
    }
    finish(backtest(&config, code_override, output, journal))
}

fn backtest(
    config: &dyn ConfigPort,
    code_override: Option<&str>,
    output: Option<&Path>,
    journal: Option<&Path>,
) -> Result<(), KabuError> {
    let data = settings::load_data_settings(config)?;
    let params = settings::load_indicator_params(config)?;
    let label_spec = settings::load_label_spec(config)?;
    let bt = settings::load_backtest_settings(config, &label_spec)?;

    let source = CsvPriceSource::new(data.prices_dir.clone());
    let engine = TechnicalIndicators::new();

    let codes = match code_override {
        Some(raw) => {
            parse_codes(raw).map_err(|e| KabuError::invalid("backtest", "code", e.to_string()))?
        }
        None if !bt.candidates.is_empty() => bt.candidates.clone(),
        None => source.list_codes()?,
    };
    if codes.is_empty() {
        return Err(KabuError::ConfigMissing {
            section: "backtest".into(),
            key: "candidates".into(),
        });
    }

    let feature_columns = if bt.feature_columns.is_empty() {
        engine.column_names(&params)
    } else {
        bt.feature_columns.clone()
    };

    let factory = LogisticClassifierFactory::default();
    let strategy: Box<dyn ScoringStrategy + '_> = match bt.strategy {
        StrategyKind::Model => Box::new(ModelStrategy::new(&factory)),
        StrategyKind::Rules => Box::new(RuleStrategy::new(bt.rules.clone())),
    };

    let ctx = BatchContext {
        prices: &source,
        indicators: &engine,
        strategy: strategy.as_ref(),
        params,
        label_spec,
        feature_columns,
        backtest: bt.config.clone(),
        date_from: data.date_from,
        date_to: data.date_to,
        parallel: config.get_bool("backtest", "parallel", true),
    };

    eprintln!(
        "Running backtest: {} candidates, strategy {}, horizon {} days",
        codes.len(),
        ctx.strategy.name(),
        ctx.label_spec.horizon_days
    );
    let report = run_batch(&ctx, &codes);
    print_batch(&report);

    let recommendation = report.recommend(bt.min_trades_per_week);
    println!("\n{}", recommendation);

    if let Some(path) = output {
        CsvReportAdapter::new().write_batch(&report, &recommendation, &path.to_string_lossy())?;
        eprintln!("Ranking written to: {}", path.display());
    }

    if let Some(path) = journal {
        let best = match recommendation {
            Recommendation::Recommended(r) => Some(r.code.as_str()),
            Recommendation::NoCandidateMetCriteria => {
                report.ranking.first().map(|r| r.code.as_str())
            }
        };
        match best.and_then(|code| report.journal(code).map(|j| (code, j))) {
            Some((code, journal)) => {
                write_journal(path, journal)?;
                eprintln!("Journal for {} written to: {}", code, path.display());
            }
            None => eprintln!("warning: no backtested candidate, journal not written"),
        }
    }
    Ok(())
}

fn print_batch(report: &BatchReport) {
    println!("\n=== Ranking ===");
    for (i, r) in report.ranking.iter().enumerate() {
        println!(
            "{:>3}. {:<8} profit {:>+10.0}  trades/week {:>5.2}  win rate {:>5.1}%  trades {}",
            i + 1,
            r.code,
            r.total_profit,
            r.trades_per_week,
            r.win_rate * 100.0,
            r.trade_count
        );
    }
    if !report.skipped.is_empty() {
        println!("\n=== Skipped ===");
        for s in &report.skipped {
            println!("  {}: {}", s.code, s.reason);
        }
    }
}

fn write_journal(path: &Path, journal: &DailyJournal) -> Result<(), KabuError> {
    let persistence = |e: csv::Error| KabuError::Persistence {
        reason: format!("{}: {}", path.display(), e),
    };
    let mut wtr = csv::Writer::from_path(path).map_err(persistence)?;
    for entry in &journal.entries {
        wtr.serialize(entry).map_err(persistence)?;
    }
    wtr.flush()?;
    Ok(())
}

fn open_ledger(
    config: &dyn ConfigPort,
    ledger: &LedgerSettings,
) -> Result<TradeLedger<Box<dyn LedgerStore>>, KabuError> {
    let store: Box<dyn LedgerStore> = match ledger.backend {
        LedgerBackend::Csv => Box::new(CsvLedgerStore::new(ledger.path.clone())),
        #[cfg(feature = "sqlite")]
        LedgerBackend::Sqlite => Box::new(
            crate::adapters::sqlite_ledger_adapter::SqliteLedgerStore::from_config(config)?,
        ),
        #[cfg(not(feature = "sqlite"))]
        LedgerBackend::Sqlite => {
            let _ = config;
            return Err(KabuError::invalid(
                "ledger",
                "backend",
                "built without the sqlite feature",
            ));
        }
    };
    Ok(TradeLedger::new(store, ledger.capital_basis))
}

fn run_monitor_command(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(exit) => return exit,
    };
    if let Err(exit) = check_sections(
        &config,
        &[
            Section::Data,
            Section::Indicators,
            Section::Labels,
            Section::Ledger,
            Section::Monitor,
        ],
    ) {
        return exit;
    }
    finish(monitor(&config))
}

fn monitor(config: &dyn ConfigPort) -> Result<(), KabuError> {
    let data = settings::load_data_settings(config)?;
    let params = settings::load_indicator_params(config)?;
    let label_spec = settings::load_label_spec(config)?;
    let monitor = settings::load_monitor_settings(config)?;
    let ledger_settings = settings::load_ledger_settings(config)?;
    if monitor.stocks.is_empty() {
        return Err(KabuError::ConfigMissing {
            section: "monitor".into(),
            key: "codes".into(),
        });
    }

    let source = CsvPriceSource::new(data.prices_dir.clone());
    let engine = TechnicalIndicators::new();
    let factory = LogisticClassifierFactory::default();
    let mode = match monitor.mode {
        StrategyKind::Rules => DecisionMode::Rules,
        StrategyKind::Model => {
            let columns = settings::feature_columns(config);
            DecisionMode::Model {
                factory: &factory,
                feature_columns: if columns.is_empty() {
                    engine.column_names(&params)
                } else {
                    columns
                },
                threshold: monitor.decision_threshold,
            }
        }
    };

    let ctx = MonitorContext {
        prices: &source,
        indicators: &engine,
        notifier: &LogNotifier,
        recipient: monitor
            .recipient
            .clone()
            .or_else(|| Some(DEFAULT_RECIPIENT.to_string())),
        params,
        label_spec,
        mode,
        date_from: data.date_from,
        date_to: data.date_to,
    };

    let mut ledger = open_ledger(config, &ledger_settings)?;
    let report = run_monitor(&ctx, &mut ledger, &monitor.stocks)?;

    println!("=== Monitor ===");
    for (code, outcome) in &report.outcomes {
        match outcome {
            StockOutcome::Disabled => println!("  {}: disabled", code),
            StockOutcome::Failed(reason) => println!("  {}: failed ({})", code, reason),
            StockOutcome::Decided {
                signal,
                notified,
                recorded,
                ..
            } => println!(
                "  {}: {}{}{}",
                code,
                signal,
                if *notified { ", notified" } else { "" },
                if *recorded { ", recorded" } else { "" }
            ),
        }
    }
    if report.failed() > 0 {
        eprintln!("warning: {} stocks failed", report.failed());
    }
    Ok(())
}

fn run_ledger_summary(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(exit) => return exit,
    };
    if let Err(exit) = check_sections(&config, &[Section::Ledger]) {
        return exit;
    }
    finish(ledger_summary(&config))
}

fn ledger_summary(config: &dyn ConfigPort) -> Result<(), KabuError> {
    let ledger_settings = settings::load_ledger_settings(config)?;
    let ledger = open_ledger(config, &ledger_settings)?;
    let records = ledger.records()?;
    let summary = ledger.summary()?;
    let pending = records.iter().filter(|r| !r.is_done()).count();

    println!("=== Trade Ledger ===");
    println!("Settled:          {}", summary.trade_count);
    println!("Pending:          {}", pending);
    println!(
        "Wins / Losses:    {} / {}",
        summary.win_count,
        summary.loss_count()
    );
    println!("Win Rate:         {:.1}%", summary.win_rate);
    println!("Cumulative P/L:   {:+.0} JPY", summary.cumulative_profit);
    if let Some(last) = ledger.latest_result()? {
        println!(
            "Latest:           {} {} {:+.0} JPY ({:+.1}%)",
            last.signal_date, last.stock_code, last.profit, last.profit_rate
        );
    }
    Ok(())
}

fn run_ledger_reconcile(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(exit) => return exit,
    };
    if let Err(exit) = check_sections(&config, &[Section::Data, Section::Ledger]) {
        return exit;
    }
    finish(ledger_reconcile(&config))
}

fn ledger_reconcile(config: &dyn ConfigPort) -> Result<(), KabuError> {
    let data = settings::load_data_settings(config)?;
    let ledger_settings = settings::load_ledger_settings(config)?;
    let source = CsvPriceSource::new(data.prices_dir.clone());
    let mut ledger = open_ledger(config, &ledger_settings)?;

    let codes: BTreeSet<String> = ledger
        .records()?
        .into_iter()
        .filter(|r| !r.is_done())
        .map(|r| r.stock_code)
        .collect();

    let mut settled = 0;
    for code in &codes {
        let bars = match source.get_daily_prices(code, None, None) {
            Ok(bars) => bars,
            Err(e) => {
                eprintln!("warning: skipping {} ({})", code, e);
                continue;
            }
        };
        settled += ledger.reconcile(code, &bars)?;
    }

    println!(
        "Settled {} trades across {} stocks with pending entries",
        settled,
        codes.len()
    );
    Ok(())
}

fn run_validate(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(exit) => return exit,
    };

    let errors = validate_all(&config);
    if errors.is_empty() {
        println!("Configuration is valid: {}", config_path.display());
        return ExitCode::SUCCESS;
    }
    for e in &errors {
        eprintln!("error: {e}");
    }
    (&errors[0]).into()
}
