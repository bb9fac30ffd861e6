//! risk-engine CLI
//!
//! Measure the risk of an oil book from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Generate a synthetic market and book
//! risk-engine generate --book book.json --prices prices.json
//!
//! # Portfolio VaR at 95% and 99%
//! risk-engine var --input book.json --prices prices.json --confidence 0.95,0.99
//!
//! # Gross vs net VaR per trade group
//! risk-engine groups --input book.json --prices prices.json --format json
//!
//! # Limit check and stress scenarios
//! risk-engine limits --input book.json
//! risk-engine stress --input book.json --prices prices.json --presets
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use risk_engine::core::config::RiskConfig;
use risk_engine::core::currency::FxRateTable;
use risk_engine::core::market_data::InMemoryPriceHistory;
use risk_engine::core::sources::{InMemoryBook, TradeGroupSource};
use risk_engine::engine::{RiskEngine, VarRequest};
use risk_engine::simulation::market_generator::{
    generate_market, generate_random_book, BookConfig, MarketConfig,
};
use risk_engine::simulation::stress_test::preset_scenarios;
use risk_engine::var::Methodology;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::fs;
use std::process;
use std::sync::Arc;
use std::time::Duration;

fn print_usage() {
    eprintln!(
        r#"risk-engine — portfolio Value-at-Risk for oil books

USAGE:
    risk-engine <COMMAND> [OPTIONS]

COMMANDS:
    var         Portfolio VaR and Expected Shortfall
    groups      Gross vs net VaR per trade group (hedge effectiveness)
    limits      Evaluate the book's concentration limits
    stress      Run the book's stress scenarios
    generate    Generate a synthetic price history and book
    help        Show this message

OPTIONS (var, groups, limits, stress):
    --input <FILE>        Book JSON: positions, limits, scenarios
    --prices <FILE>       Price history JSON (not needed for limits)
    --fx <FILE>           FX rate table JSON (default: reporting currency only)
    --config <FILE>       Risk configuration JSON (default: built-in)
    --as-of <DATE>        Valuation date YYYY-MM-DD (default: today)
    --format <FORMAT>     Output format: text (default) or json

OPTIONS (var, groups, stress):
    --confidence <LIST>   Comma-separated levels (default: 0.95)
    --methodology <NAME>  delta-normal (default), historical, monte-carlo
    --seed <N>            Monte Carlo seed (default: from config)
    --timeout-ms <N>      Fail with a timeout after N milliseconds
    --presets             (stress) Add the preset scenarios

OPTIONS (generate):
    --positions <N>       Number of positions (default: 20)
    --days <N>            Calendar days of history (default: 365)
    --end <DATE>          Last generated date (default: 2026-03-02)
    --seed <N>            Random seed (default: 42)
    --book <FILE>         Write the book here (default: stdout)
    --prices <FILE>       Write the price history here

EXAMPLES:
    risk-engine generate --positions 30 --book book.json --prices prices.json
    risk-engine var --input book.json --prices prices.json --methodology historical
    risk-engine var --input book.json --prices prices.json --methodology monte-carlo --seed 7
    risk-engine groups --input book.json --prices prices.json
    risk-engine stress --input book.json --prices prices.json --presets --format json"#
    );
}

fn fail(message: impl Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

#[derive(Default)]
struct Options {
    input: Option<String>,
    prices: Option<String>,
    fx: Option<String>,
    config: Option<String>,
    as_of: Option<NaiveDate>,
    json: bool,
    confidences: Vec<f64>,
    methodology: Option<Methodology>,
    seed: Option<u64>,
    timeout: Option<Duration>,
    presets: bool,
    positions: Option<usize>,
    days: Option<u32>,
    end: Option<NaiveDate>,
    book: Option<String>,
}

fn parse_options(args: &[String]) -> Options {
    let mut opts = Options::default();
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .cloned()
                .unwrap_or_else(|| fail(format!("{} requires a value", flag)))
        };
        match flag {
            "--input" => opts.input = Some(value()),
            "--prices" => opts.prices = Some(value()),
            "--fx" => opts.fx = Some(value()),
            "--config" => opts.config = Some(value()),
            "--book" => opts.book = Some(value()),
            "--as-of" => opts.as_of = Some(parse_date(&value())),
            "--end" => opts.end = Some(parse_date(&value())),
            "--format" => match value().as_str() {
                "json" => opts.json = true,
                "text" => opts.json = false,
                other => fail(format!("unknown format '{}'", other)),
            },
            "--confidence" => {
                opts.confidences = value()
                    .split(',')
                    .map(|s| {
                        s.trim()
                            .parse()
                            .unwrap_or_else(|_| fail(format!("invalid confidence '{}'", s)))
                    })
                    .collect();
            }
            "--methodology" => {
                opts.methodology = Some(value().parse().unwrap_or_else(|e| fail(e)));
            }
            "--seed" => opts.seed = Some(parse_number(flag, &value())),
            "--timeout-ms" => {
                opts.timeout = Some(Duration::from_millis(parse_number(flag, &value())))
            }
            "--positions" => opts.positions = Some(parse_number(flag, &value())),
            "--days" => opts.days = Some(parse_number(flag, &value())),
            "--presets" => opts.presets = true,
            _ => fail(format!("unknown option: {}", flag)),
        }
        i += 1;
    }
    opts
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .unwrap_or_else(|e| fail(format!("invalid date '{}': {}", s, e)))
}

fn parse_number<T: std::str::FromStr>(flag: &str, s: &str) -> T {
    s.parse()
        .unwrap_or_else(|_| fail(format!("{} requires a number, got '{}'", flag, s)))
}

fn read_json<T: DeserializeOwned>(path: &str) -> T {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("cannot read '{}': {}", path, e)));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| fail(format!("cannot parse '{}': {}", path, e)))
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| fail(e))
}

fn print_json<T: Serialize>(value: &T) {
    println!("{}", to_json(value));
}

impl Options {
    fn as_of(&self) -> DateTime<Utc> {
        self.as_of
            .and_then(|d| d.and_hms_opt(23, 59, 59))
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now)
    }

    fn confidences(&self) -> Vec<f64> {
        if self.confidences.is_empty() {
            vec![0.95]
        } else {
            self.confidences.clone()
        }
    }

    fn request(&self) -> VarRequest {
        let mut request = VarRequest::new(
            self.confidences()[0],
            self.methodology.unwrap_or(Methodology::DeltaNormal),
            self.as_of(),
        );
        request.seed = self.seed;
        request.time_budget = self.timeout;
        request
    }

    fn load(&self, needs_prices: bool) -> (RiskEngine, InMemoryBook) {
        let input = self
            .input
            .as_deref()
            .unwrap_or_else(|| fail("--input <FILE> is required"));
        let book: InMemoryBook = read_json(input);

        let config = match &self.config {
            Some(path) => RiskConfig::from_file(path).unwrap_or_else(|e| fail(e)),
            None => RiskConfig::default(),
        };
        let prices: InMemoryPriceHistory = match (&self.prices, needs_prices) {
            (Some(path), _) => read_json(path),
            (None, false) => InMemoryPriceHistory::new(),
            (None, true) => fail("--prices <FILE> is required"),
        };
        let fx: FxRateTable = match &self.fx {
            Some(path) => read_json(path),
            None => FxRateTable::new(config.reporting_currency.clone()),
        };

        let engine = RiskEngine::new(config, Arc::new(prices), Arc::new(fx))
            .and_then(|e| e.with_limits(book.limits.clone()))
            .unwrap_or_else(|e| fail(e));
        (engine, book)
    }
}

fn cmd_var(opts: &Options) {
    let (engine, book) = opts.load(true);
    let results = engine
        .calculate_var_levels(&book.positions, &opts.confidences(), &opts.request())
        .unwrap_or_else(|e| fail(e));

    if opts.json {
        print_json(&results);
    } else {
        for result in &results {
            println!("{}", result);
        }
    }
}

fn cmd_groups(opts: &Options) {
    let (engine, book) = opts.load(true);
    let memberships = book.trade_group_memberships().unwrap_or_else(|e| fail(e));
    let risk = engine
        .calculate_trade_group_risk(&book.positions, &memberships, &opts.request())
        .unwrap_or_else(|e| fail(e));

    if opts.json {
        print_json(&risk);
    } else {
        println!("{}", risk);
    }
}

fn cmd_limits(opts: &Options) {
    let (engine, book) = opts.load(false);
    let breaches = engine
        .evaluate_limits(&book.positions, opts.as_of())
        .unwrap_or_else(|e| fail(e));

    if opts.json {
        print_json(&breaches);
    } else if breaches.is_empty() {
        println!("All {} limit(s) within bounds.", engine.limits().len());
    } else {
        println!("=== Limit Report ===");
        for breach in &breaches {
            println!("  {}", breach);
        }
    }
}

fn cmd_stress(opts: &Options) {
    let (engine, book) = opts.load(true);
    let mut scenarios = book.scenarios.clone();
    if opts.presets || scenarios.is_empty() {
        scenarios.extend(preset_scenarios());
    }
    let results = engine
        .run_stress_scenarios(&book.positions, &scenarios, opts.as_of(), opts.confidences()[0])
        .unwrap_or_else(|e| fail(e));

    if opts.json {
        print_json(&results);
    } else {
        for result in &results {
            println!("{}", result);
        }
    }
}

fn cmd_generate(opts: &Options) {
    let defaults = MarketConfig::default();
    let seed = opts.seed.unwrap_or(defaults.seed);
    let market_config = MarketConfig {
        days: opts.days.unwrap_or(defaults.days),
        end_date: opts.end.unwrap_or(defaults.end_date),
        seed,
        ..defaults
    };
    let market = generate_market(&market_config).unwrap_or_else(|e| fail(e));
    let positions = generate_random_book(
        &market,
        &BookConfig {
            position_count: opts.positions.unwrap_or(20),
            seed: seed.wrapping_add(1),
            ..Default::default()
        },
    );
    let count = positions.len();
    let book = InMemoryBook::new(positions);

    let write = |path: &str, json: String| {
        fs::write(path, json).unwrap_or_else(|e| fail(format!("cannot write '{}': {}", path, e)));
    };

    if let Some(path) = &opts.prices {
        write(path, to_json(&market.history));
        eprintln!(
            "Generated {} days of prices for {} products → {}",
            market_config.days,
            market.products.len(),
            path
        );
    }
    match &opts.book {
        Some(path) => {
            write(path, to_json(&book));
            eprintln!("Generated {} positions → {}", count, path);
        }
        None => println!("{}", to_json(&book)),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return;
    }
    let opts = parse_options(&args[2..]);

    match command {
        "var" => cmd_var(&opts),
        "groups" => cmd_groups(&opts),
        "limits" => cmd_limits(&opts),
        "stress" => cmd_stress(&opts),
        "generate" => cmd_generate(&opts),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
