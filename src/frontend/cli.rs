use crate::errors;
use crate::frontend::harness::{self, Simulation, SimulationReport};
use crate::infrastructure::config::TieringConfig;
use crate::infrastructure::logging::init_logging;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub simulation: Simulation,
    pub workers: Option<usize>,
    pub json: bool,
    pub verbose: bool,
    pub help: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: None,
            simulation: Simulation::default(),
            workers: None,
            json: false,
            verbose: false,
            help: false,
        }
    }
}

impl CliArgs {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let prog = args.first().map(String::as_str).unwrap_or("tierup");
        let mut parsed = Self::default();
        let mut iter = args.iter().skip(1);

        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("Missing value for {}\n\n{}", name, Self::usage(prog)))
            };

            match arg.as_str() {
                "--help" | "-h" => {
                    parsed.help = true;
                    return Ok(parsed);
                }
                "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
                "--callers" => {
                    parsed.simulation.callers = parse_num("--callers", &value("--callers")?)?
                }
                "--calls" => {
                    parsed.simulation.calls_per_caller = parse_num("--calls", &value("--calls")?)?
                }
                "--units" => parsed.simulation.units = parse_num("--units", &value("--units")?)?,
                "--workers" => parsed.workers = Some(parse_num("--workers", &value("--workers")?)?),
                "--compile-us" => {
                    let micros: u64 = parse_num("--compile-us", &value("--compile-us")?)?;
                    parsed.simulation.compile_latency = Duration::from_micros(micros);
                }
                "--fail-rate" => {
                    let rate: f64 = parse_num("--fail-rate", &value("--fail-rate")?)?;
                    if !(0.0..=1.0).contains(&rate) {
                        return Err(format!("--fail-rate must be between 0 and 1, got {}", rate));
                    }
                    parsed.simulation.fail_rate = rate;
                }
                "--seed" => parsed.simulation.seed = parse_num("--seed", &value("--seed")?)?,
                "--json" => parsed.json = true,
                "--verbose" | "-v" => parsed.verbose = true,
                opt => return Err(format!("Unknown option: {}\n\n{}", opt, Self::usage(prog))),
            }
        }

        if parsed.simulation.callers == 0 {
            return Err("--callers must be at least 1".to_string());
        }
        if parsed.simulation.units == 0 {
            return Err("--units must be at least 1".to_string());
        }

        Ok(parsed)
    }

    fn usage(prog: &str) -> String {
        format!(
            "tierup - tiered compilation policy simulator\n\n\
            USAGE:\n    {} [OPTIONS]\n\n\
            OPTIONS:\n    \
            -h, --help          Print help information\n    \
            --config FILE       Load settings from FILE instead of discovering tierup.toml\n    \
            --callers N         Caller threads (default 4)\n    \
            --calls N           Calls per caller (default 50000)\n    \
            --units N           Distinct units in the workload (default 64)\n    \
            --workers N         Compile worker threads\n    \
            --compile-us N      Synthetic L1 compile latency in microseconds\n    \
            --fail-rate P       Fraction of units whose compiles always fail\n    \
            --seed N            Workload seed\n    \
            --json              Print the report as JSON\n    \
            -v, --verbose       Debug logging",
            prog
        )
    }

    fn load_config(&self) -> errors::Result<TieringConfig> {
        let config = match &self.config {
            Some(path) => TieringConfig::load(path)?,
            None => TieringConfig::discover()?,
        };
        let mut config = config.with_env_overrides()?;
        if let Some(workers) = self.workers {
            config.scheduler.workers = workers;
            config.validate()?;
        }
        Ok(config)
    }
}

fn parse_num<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, raw))
}

fn print_text(report: &SimulationReport) {
    println!("calls        {}", report.calls);
    println!("interpreted  {}", report.interpreted);
    println!("compiled     {}", report.compiled);
    println!("degraded     {}", report.degraded);
    println!("compiles     {}", report.compiles);
    println!("workers      {} (peak active {})", report.workers, report.peak_active);
    println!("elapsed      {:.2?}", report.elapsed);
    println!();
    println!("{}", report.metrics.report());
    println!();
    println!("=== Tiers ===");
    for (unit, level) in &report.levels {
        println!("{:<24} {}", unit.to_string(), level);
    }
}

fn print_json(report: &SimulationReport) -> Result<(), serde_json::Error> {
    let levels: serde_json::Map<String, serde_json::Value> = report
        .levels
        .iter()
        .map(|(unit, level)| (unit.to_string(), serde_json::Value::from(level.name())))
        .collect();

    let value = serde_json::json!({
        "calls": report.calls,
        "interpreted": report.interpreted,
        "compiled": report.compiled,
        "degraded": report.degraded,
        "compiles": report.compiles,
        "workers": report.workers,
        "peak_active": report.peak_active,
        "elapsed_ms": report.elapsed.as_millis() as u64,
        "levels": levels,
        "metrics": report.metrics.to_json(),
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub fn main() -> Result<i32, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let cli = match CliArgs::parse(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{}", message);
            return Ok(2);
        }
    };
    if cli.help {
        let prog = args.first().map(String::as_str).unwrap_or("tierup");
        println!("{}", CliArgs::usage(prog));
        return Ok(0);
    }

    let config = cli.load_config()?;
    let mut log_config = config.logging.to_log_config()?;
    if cli.verbose {
        log_config = log_config.with_level(tracing::Level::DEBUG);
    }
    let _guard = init_logging(log_config);
    debug!(?config, "configuration loaded");

    let report = match harness::run(config, &cli.simulation) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "simulation failed");
            return Err(e.into());
        }
    };

    if cli.json {
        print_json(&report)?;
    } else {
        print_text(&report);
    }

    Ok(if report.degraded > 0 { 1 } else { 0 })
}
