use clap::ArgMatches;
use anyhow::{anyhow, Result};

use crate::fault::DiagnosisGuess;
use crate::layout::parse_terminal_ref;
use crate::measurement::{Probe, TestMode};

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    pub config_file: Option<String>,
    pub verbose_level: u8,
    pub power: Option<bool>,
    pub toggles: Vec<String>,
    pub fault_file: Option<String>,
    pub probes: Vec<ProbeArg>,
    pub test_mode: TestMode,
    pub guess: Option<DiagnosisGuess>,
    pub seed: Option<u64>,
}

/// Probe placement requested on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeArg {
    pub probe: Probe,
    pub component_id: String,
    pub point_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();
        let config_file = matches.get_one::<String>("config").cloned();
        let fault_file = matches.get_one::<String>("fault").cloned();

        let verbose_level = matches.get_count("verbose");

        let output_format =
            parse_output_format(matches.get_one::<String>("format").map(String::as_str))?;

        let power = matches
            .get_one::<String>("power")
            .map(|value| parse_power(value))
            .transpose()?;

        let toggles = matches
            .get_many::<String>("toggle")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        let mut probes = Vec::new();
        for (arg, probe) in [("probe-l", Probe::L), ("probe-n", Probe::N), ("probe-pe", Probe::PE)] {
            if let Some(target) = matches.get_one::<String>(arg) {
                probes.push(parse_probe(probe, target)?);
            }
        }

        let test_mode = match matches.get_one::<String>("mode") {
            Some(mode) => mode.parse()?,
            None => TestMode::default(),
        };

        let guess = matches
            .get_one::<String>("guess")
            .map(|value| value.parse::<DiagnosisGuess>())
            .transpose()?;

        let seed = matches
            .get_one::<String>("seed")
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|e| anyhow!("Invalid seed '{}': {}", value, e))
            })
            .transpose()?;

        Ok(CliArgs {
            input_file,
            output_file,
            output_format,
            config_file,
            verbose_level,
            power,
            toggles,
            fault_file,
            probes,
            test_mode,
            guess,
            seed,
        })
    }
}

/// Report format; JSON unless asked otherwise
fn parse_output_format(value: Option<&str>) -> Result<OutputFormat> {
    match value {
        Some("json") | None => Ok(OutputFormat::Json),
        Some("csv") => Ok(OutputFormat::Csv),
        Some(other) => Err(anyhow!("Invalid output format: {}", other)),
    }
}

/// Parse supply state ("on"/"off")
fn parse_power(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        _ => Err(anyhow!("Power must be 'on' or 'off', got '{}'", value)),
    }
}

/// Parse a probe target written as COMPONENT.POINT
fn parse_probe(probe: Probe, target: &str) -> Result<ProbeArg> {
    let (component_id, point_id) = parse_terminal_ref(target)?;
    Ok(ProbeArg {
        probe,
        component_id,
        point_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_power() {
        assert!(parse_power("on").unwrap());
        assert!(!parse_power("OFF").unwrap());
        assert!(parse_power("maybe").is_err());
    }

    #[test]
    fn test_output_format_defaults_to_json() {
        assert_eq!(parse_output_format(None).unwrap(), OutputFormat::Json);
        assert_eq!(parse_output_format(Some("csv")).unwrap(), OutputFormat::Csv);
        assert!(parse_output_format(Some("xml")).is_err());
    }

    #[test]
    fn test_parse_probe() {
        let arg = parse_probe(Probe::PE, "LI.PE").unwrap();
        assert_eq!(arg.probe, Probe::PE);
        assert_eq!(arg.component_id, "LI");
        assert_eq!(arg.point_id, "PE");
        assert!(parse_probe(Probe::L, "LI").is_err());
    }
}
