use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use log::{error, info, LevelFilter};
use std::path::Path;

use TwinSim::cli::CliArgs;
use TwinSim::fault::FaultDescriptor;
use TwinSim::simulator::{Simulator, SimulatorConfig};

fn main() {
    let matches = create_cli().get_matches();

    let level = match matches.get_count("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = run_application(&matches) {
        error!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

fn create_cli() -> Command {
    Command::new("TwinSim")
        .version(TwinSim::VERSION)
        .about(TwinSim::DESCRIPTION)
        .arg(
            Arg::new("input")
                .help("Circuit layout file (.json or text layout)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON simulator configuration"),
        )
        .arg(
            Arg::new("power")
                .long("power")
                .value_name("STATE")
                .value_parser(["on", "off"])
                .help("Switch the supply on or off"),
        )
        .arg(
            Arg::new("toggle")
                .short('t')
                .long("toggle")
                .value_name("SWITCH")
                .action(ArgAction::Append)
                .help("Toggle a switch (repeatable)"),
        )
        .arg(
            Arg::new("fault")
                .long("fault")
                .value_name("FILE")
                .help("JSON fault descriptor to inject"),
        )
        .arg(
            Arg::new("probe-l")
                .long("probe-l")
                .value_name("COMPONENT.POINT")
                .help("Terminal for the L probe"),
        )
        .arg(
            Arg::new("probe-n")
                .long("probe-n")
                .value_name("COMPONENT.POINT")
                .help("Terminal for the N probe"),
        )
        .arg(
            Arg::new("probe-pe")
                .long("probe-pe")
                .value_name("COMPONENT.POINT")
                .help("Terminal for the PE probe"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .value_parser(["V", "R_LO", "R_ISO", "Z_I", "RCD_T"])
                .help("Meter test mode"),
        )
        .arg(
            Arg::new("guess")
                .short('g')
                .long("guess")
                .value_name("TYPE:ID")
                .help("Diagnosis to grade, e.g. component:SW1 or wire:W3"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .help("Seed for reproducible meter readings"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for the session report"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("json")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
}

fn run_application(matches: &ArgMatches) -> anyhow::Result<()> {
    let args = CliArgs::from_matches(matches)?;

    info!("{}", "Starting TwinSim".green().bold());
    info!("Input file: {}", args.input_file.bright_blue());

    if !Path::new(&args.input_file).exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }

    let mut config = match &args.config_file {
        Some(file) => SimulatorConfig::from_file(file)?,
        None => SimulatorConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let mut simulator = Simulator::with_config(config);
    simulator.load_circuit(&args.input_file)?;

    if let Some(file) = &args.fault_file {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read fault '{}'", file))?;
        let fault: FaultDescriptor = serde_json::from_str(&content)
            .with_context(|| format!("Invalid fault descriptor '{}'", file))?;
        simulator.inject_fault(fault)?;
    }

    if let Some(on) = args.power {
        simulator.set_power(on)?;
    }

    for switch in &args.toggles {
        simulator.toggle_switch(switch)?;
    }

    for probe in &args.probes {
        simulator.place_probe(probe.probe, &probe.component_id, &probe.point_id);
    }
    simulator.set_test_mode(args.test_mode);

    if let Some(guess) = &args.guess {
        let verdict = if simulator.check_diagnosis(guess)? {
            "CORRECT".green().bold()
        } else {
            "INCORRECT".red().bold()
        };
        println!("Diagnosis {}:{} is {}", guess.fault_type, guess.id, verdict);
    }

    match args.output_file {
        Some(output_file) => {
            simulator.export_results(&output_file, args.output_format)?;
            info!("Results exported to: {}", output_file.bright_green());
        }
        None => simulator.print_summary(),
    }

    info!("{}", "Session completed".green().bold());
    Ok(())
}
