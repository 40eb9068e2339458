//! Battery simulator entry point: CLI wiring and config-driven engine construction.

use std::path::Path;
use std::process;

use tracing::info;

use batt_sim::config::ScenarioConfig;
use batt_sim::io::export::export_csv;
use batt_sim::sim::KpiReport;
use batt_sim::telemetry::init_tracing;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    years_override: Option<usize>,
    telemetry_out: Option<String>,
    print_steps: bool,
}

fn print_help() {
    eprintln!("batt-sim - Battery storage simulation and dispatch");
    eprintln!();
    eprintln!("Usage: batt-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --years <usize>          Override number of simulated years");
    eprintln!("  --telemetry-out <path>   Export step results to CSV");
    eprintln!("  --steps                  Print every step to stdout");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
    eprintln!("Log filter: BATT_SIM_LOG or RUST_LOG (default: info).");
}

fn value<'a>(args: &'a [String], i: usize, flag: &str, what: &str) -> &'a str {
    match args.get(i) {
        Some(v) => v.as_str(),
        None => {
            eprintln!("error: {flag} requires a {what} argument");
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        years_override: None,
        telemetry_out: None,
        print_steps: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                i += 1;
                cli.scenario_path = Some(value(&args, i, "--scenario", "path").to_string());
            }
            "--preset" => {
                i += 1;
                cli.preset = Some(value(&args, i, "--preset", "name").to_string());
            }
            "--seed" => {
                i += 1;
                let raw = value(&args, i, "--seed", "u64");
                if let Ok(s) = raw.parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{raw}\" is not a valid u64");
                    process::exit(1);
                }
            }
            "--years" => {
                i += 1;
                let raw = value(&args, i, "--years", "usize");
                if let Ok(y) = raw.parse::<usize>() {
                    cli.years_override = Some(y);
                } else {
                    eprintln!("error: --years value \"{raw}\" is not a valid usize");
                    process::exit(1);
                }
            }
            "--telemetry-out" => {
                i += 1;
                cli.telemetry_out = Some(value(&args, i, "--telemetry-out", "path").to_string());
            }
            "--steps" => cli.print_steps = true,
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    let cli = parse_args();
    init_tracing();

    // --scenario takes priority, then --preset, then baseline default
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        match ScenarioConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match ScenarioConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        ScenarioConfig::baseline()
    };

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }
    if let Some(years) = cli.years_override {
        scenario.simulation.years = years;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let mut engine = match scenario.build_engine() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };
    info!(
        steps = engine.config().total_steps(),
        mode = ?engine.setup().mode,
        "running simulation"
    );
    let results = match engine.run() {
        Ok(results) => results,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    if cli.print_steps {
        for r in &results {
            println!("{r}");
        }
    }

    let kpi = KpiReport::from_results(&results, engine.config().dt_hour);
    println!("{kpi}");

    if let Some(ref path) = cli.telemetry_out {
        if let Err(e) = export_csv(&results, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Telemetry written to {path}");
    }
}
