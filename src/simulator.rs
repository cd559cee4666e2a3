use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::circuit::Circuit;
use crate::cli::OutputFormat;
use crate::fault::{apply_fault, check_diagnosis, DiagnosisGuess, FaultDescriptor, FaultTarget};
use crate::layout::LayoutParser;
use crate::loads::{evaluate_loads, wire_state, LoadStatus, WireState};
use crate::measurement::{Measurement, MeasurementContext, Meter, MeterConfig, MeterReading, Probe, ProbeSet, TestMode};
use crate::network::NetworkGraph;
use crate::solver::{CircuitState, Connectivity, ConnectivitySolver, SolverConfig, SolverStats};

/// Energization of one wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireReport {
    pub wire_id: String,
    pub state: WireState,
}

/// Snapshot of a session, as exported
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub title: String,
    pub power_on: bool,
    pub connectivity: Connectivity,
    pub lights: Vec<LoadStatus>,
    pub wires: Vec<WireReport>,
    pub test_mode: TestMode,
    pub probes: ProbeSet,
    pub reading: MeterReading,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub solver_config: SolverConfig,
    pub meter_config: MeterConfig,
    /// Fixed seed for reproducible meter noise
    pub seed: Option<u64>,
}

impl SimulatorConfig {
    /// Read a JSON config file; missing fields take their defaults
    pub fn from_file(filename: &str) -> Result<Self> {
        let content = std::fs::read_to_string(filename)
            .with_context(|| format!("Failed to read config '{}'", filename))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config '{}'", filename))
    }
}

/// One interactive session over a circuit.
///
/// Every change to the circuit, switches or supply re-derives the network
/// graph and the connectivity sets from scratch.
pub struct Simulator {
    circuit: Circuit,
    graph: NetworkGraph,
    state: CircuitState,
    connectivity: Connectivity,
    solver: ConnectivitySolver,
    meter: Meter,
    probes: ProbeSet,
    mode: TestMode,
    fault: Option<FaultDescriptor>,
    last_stats: Option<SolverStats>,
    rng: StdRng,
}

impl Simulator {
    /// Create a new simulator with default configuration
    pub fn new() -> Self {
        Self::with_config(SimulatorConfig::default())
    }

    /// Create a new simulator with custom configuration
    pub fn with_config(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Simulator {
            circuit: Circuit::default(),
            graph: NetworkGraph::default(),
            state: CircuitState::default(),
            connectivity: Connectivity::default(),
            solver: ConnectivitySolver::with_config(config.solver_config),
            meter: Meter::with_config(config.meter_config),
            probes: ProbeSet::default(),
            mode: TestMode::default(),
            fault: None,
            last_stats: None,
            rng,
        }
    }

    /// Load a circuit from a layout or JSON file
    pub fn load_circuit(&mut self, filename: &str) -> Result<()> {
        info!("Loading circuit from: {}", filename);
        let circuit = LayoutParser::new().parse_file(filename)?;
        self.load_circuit_from_parsed(circuit);
        Ok(())
    }

    /// Take ownership of a circuit snapshot and solve it
    pub fn load_circuit_from_parsed(&mut self, circuit: Circuit) {
        info!("Loaded circuit: {}", circuit.title);
        self.circuit = circuit;
        self.fault = None;
        self.probes = ProbeSet::default();
        self.refresh();
    }

    fn refresh(&mut self) {
        self.graph = NetworkGraph::new(&self.circuit);
        self.state = CircuitState::from_circuit(&self.circuit);
        let (connectivity, stats) = self.solver.solve(&self.graph, &self.state);
        debug!(
            "Solved in {:.3}ms: {} live, {} neutral, {} PE terminals",
            stats.solve_time * 1000.0,
            connectivity.live.len(),
            connectivity.neutral.len(),
            connectivity.protective_earth.len()
        );
        self.connectivity = connectivity;
        self.last_stats = Some(stats);
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn solver_stats(&self) -> Option<&SolverStats> {
        self.last_stats.as_ref()
    }

    pub fn power_on(&self) -> bool {
        self.state.power_on
    }

    /// Flip a switch and return its new state
    pub fn toggle_switch(&mut self, id: &str) -> Result<bool> {
        let toggled = self.circuit.toggle_switch(id)?;
        info!("Switch {} is now {}", id, if toggled { "on" } else { "off" });
        self.refresh();
        Ok(toggled)
    }

    pub fn set_power(&mut self, on: bool) -> Result<()> {
        self.circuit.set_power(on)?;
        info!("Supply switched {}", if on { "on" } else { "off" });
        self.refresh();
        Ok(())
    }

    /// Apply an externally generated fault. Only one fault per session.
    pub fn inject_fault(&mut self, fault: FaultDescriptor) -> Result<FaultTarget> {
        if self.fault.is_some() {
            return Err(anyhow!("A fault has already been injected into this session"));
        }
        let target = apply_fault(&mut self.circuit, &fault)?;
        if !fault.description.is_empty() {
            debug!("Fault scenario: {}", fault.description);
        }
        self.fault = Some(fault);
        self.refresh();
        Ok(target)
    }

    pub fn fault(&self) -> Option<&FaultDescriptor> {
        self.fault.as_ref()
    }

    /// Grade a diagnosis against the injected fault
    pub fn check_diagnosis(&self, guess: &DiagnosisGuess) -> Result<bool> {
        let fault = self
            .fault
            .as_ref()
            .ok_or_else(|| anyhow!("No fault has been injected"))?;
        let correct = check_diagnosis(guess, fault);
        info!("Diagnosis {}:{} is {}", guess.fault_type, guess.id, if correct { "correct" } else { "wrong" });
        Ok(correct)
    }

    pub fn place_probe(&mut self, probe: Probe, component_id: &str, point_id: &str) {
        if !self.circuit.has_terminal(component_id, point_id) {
            warn!("{:?} probe placed on unknown terminal {}-{}", probe, component_id, point_id);
        }
        self.probes.place(probe, component_id, point_id);
    }

    pub fn clear_probe(&mut self, probe: Probe) {
        self.probes.clear(probe);
    }

    pub fn probes(&self) -> &ProbeSet {
        &self.probes
    }

    pub fn set_test_mode(&mut self, mode: TestMode) {
        self.mode = mode;
    }

    pub fn test_mode(&self) -> TestMode {
        self.mode
    }

    /// Take a reading with the current probes and test mode
    pub fn measure(&mut self) -> Measurement {
        let context = MeasurementContext {
            graph: &self.graph,
            state: &self.state,
            connectivity: &self.connectivity,
            solver: &self.solver,
        };
        let measurement = self.meter.measure(self.mode, &self.probes, &context, &mut self.rng);
        debug!("{} reading: {}", self.mode, measurement.display());
        measurement
    }

    pub fn light_statuses(&self) -> Vec<LoadStatus> {
        evaluate_loads(&self.circuit, &self.connectivity)
    }

    pub fn wire_reports(&self) -> Vec<WireReport> {
        self.circuit
            .wires
            .iter()
            .map(|wire| WireReport {
                wire_id: wire.id.clone(),
                state: wire_state(wire, &self.connectivity),
            })
            .collect()
    }

    /// Current state, including a fresh reading
    pub fn report(&mut self) -> SessionReport {
        let reading = self.measure().display();
        SessionReport {
            title: self.circuit.title.clone(),
            power_on: self.state.power_on,
            connectivity: self.connectivity.clone(),
            lights: self.light_statuses(),
            wires: self.wire_reports(),
            test_mode: self.mode,
            probes: self.probes.clone(),
            reading,
            fault: self.fault.clone(),
        }
    }

    /// Export the session report to file
    pub fn export_results(&mut self, filename: &str, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Csv => self.export_csv(filename),
            OutputFormat::Json => {
                let report = self.report();
                self.export_json(&report, filename)
            }
        }
    }

    /// One row per terminal with its net memberships
    fn export_csv(&self, filename: &str) -> Result<()> {
        use std::fs::File;
        use csv::Writer;

        let file = File::create(filename)?;
        let mut writer = Writer::from_writer(file);

        writer.write_record(["terminal", "component", "point", "live", "neutral", "pe"])?;
        for terminal in self.graph.terminals() {
            let flag = |set: &std::collections::BTreeSet<String>| {
                if set.contains(&terminal.key) { "1" } else { "0" }
            };
            writer.write_record([
                terminal.key.as_str(),
                terminal.component_id.as_str(),
                terminal.point_id,
                flag(&self.connectivity.live),
                flag(&self.connectivity.neutral),
                flag(&self.connectivity.protective_earth),
            ])?;
        }

        writer.flush()?;
        info!("Results exported to CSV: {}", filename);
        Ok(())
    }

    fn export_json(&self, report: &SessionReport, filename: &str) -> Result<()> {
        use std::fs::File;

        let file = File::create(filename)?;
        serde_json::to_writer_pretty(file, report)?;

        info!("Results exported to JSON: {}", filename);
        Ok(())
    }

    /// Print session summary
    pub fn print_summary(&mut self) {
        let report = self.report();

        println!("\n=== Session Summary ===");
        self.circuit.print_summary();
        println!("Supply: {}", if report.power_on { "ON" } else { "OFF" });
        if let Some(stats) = &self.last_stats {
            println!("Solve time: {:.3}ms", stats.solve_time * 1000.0);
        }

        println!("\nEnergized terminals:");
        println!("  L:  {}", join(&report.connectivity.live));
        println!("  N:  {}", join(&report.connectivity.neutral));
        println!("  PE: {}", join(&report.connectivity.protective_earth));

        if !report.lights.is_empty() {
            println!("\nLights:");
            for light in &report.lights {
                println!("  {}: {}", light.component_id, if light.powered { "lit" } else { "off" });
            }
        }

        println!("\nMeter ({}): {}", report.test_mode, report.reading);
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

fn join(set: &std::collections::BTreeSet<String>) -> String {
    if set.is_empty() {
        "-".to_string()
    } else {
        set.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{ComponentType, PlacedComponent, Wire, WireColor};
    use crate::fault::FaultType;

    fn session(power_on: bool) -> Simulator {
        let mut circuit = Circuit::new("Session");
        circuit.add_component(PlacedComponent::new_power_source("PS", power_on)).unwrap();
        circuit.add_component(PlacedComponent::new_switch("SW", false)).unwrap();
        circuit.add_component(PlacedComponent::new("LI", ComponentType::Light)).unwrap();
        circuit.add_wire(Wire::new("W1", ("PS", "L"), ("SW", "L_in"), WireColor::L)).unwrap();
        circuit.add_wire(Wire::new("W2", ("SW", "L_out"), ("LI", "L"), WireColor::Switched)).unwrap();
        circuit.add_wire(Wire::new("W3", ("PS", "N"), ("LI", "N"), WireColor::N)).unwrap();
        circuit.add_wire(Wire::new("W4", ("PS", "PE"), ("LI", "PE"), WireColor::PE)).unwrap();

        let mut simulator = Simulator::with_config(SimulatorConfig {
            seed: Some(7),
            ..SimulatorConfig::default()
        });
        simulator.load_circuit_from_parsed(circuit);
        simulator
    }

    #[test]
    fn test_toggle_recomputes() {
        let mut simulator = session(true);
        assert!(!simulator.light_statuses()[0].powered);

        assert!(simulator.toggle_switch("SW").unwrap());
        assert!(simulator.light_statuses()[0].powered);
        assert!(simulator.connectivity().live.contains("LI-L"));

        simulator.set_power(false).unwrap();
        assert!(simulator.connectivity().is_dead());
        assert!(!simulator.light_statuses()[0].powered);
    }

    #[test]
    fn test_fault_then_diagnose() {
        let mut simulator = session(true);
        simulator.toggle_switch("SW").unwrap();
        assert!(simulator.check_diagnosis(&DiagnosisGuess::new(FaultType::Wire, "W2")).is_err());

        simulator.inject_fault(FaultDescriptor::wire("W2", "cut switched live")).unwrap();
        assert!(!simulator.light_statuses()[0].powered);
        assert!(simulator.inject_fault(FaultDescriptor::component("SW", "")).is_err());

        assert!(simulator.check_diagnosis(&DiagnosisGuess::new(FaultType::Wire, "W2")).unwrap());
        assert!(!simulator.check_diagnosis(&DiagnosisGuess::new(FaultType::Component, "SW")).unwrap());
    }

    #[test]
    fn test_measure_session() {
        let mut simulator = session(false);
        simulator.set_test_mode(TestMode::LowResistance);
        simulator.place_probe(Probe::L, "PS", "PE");
        simulator.place_probe(Probe::PE, "LI", "PE");
        assert!(matches!(simulator.measure(), Measurement::Resistance(_)));

        simulator.set_power(true).unwrap();
        assert_eq!(simulator.measure(), Measurement::LiveCircuit);

        simulator.clear_probe(Probe::PE);
        simulator.set_test_mode(TestMode::Voltage);
        assert_eq!(simulator.measure(), Measurement::ProbeError);
    }

    #[test]
    fn test_seeded_sessions_repeat() {
        let mut a = session(true);
        let mut b = session(true);
        for simulator in [&mut a, &mut b] {
            simulator.place_probe(Probe::L, "PS", "L");
            simulator.place_probe(Probe::PE, "PS", "N");
        }
        assert_eq!(a.measure(), b.measure());
    }

    #[test]
    fn test_wire_reports() {
        let simulator = session(true);
        let reports = simulator.wire_reports();
        let state = |id: &str| reports.iter().find(|r| r.wire_id == id).map(|r| r.state);
        assert_eq!(state("W1"), Some(WireState::Live));
        assert_eq!(state("W2"), Some(WireState::Dead));
        assert_eq!(state("W3"), Some(WireState::Neutral));
        assert_eq!(state("W4"), Some(WireState::ProtectiveEarth));
    }

    #[test]
    fn test_export_json_and_csv() {
        let mut simulator = session(true);
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("report.json");
        let json_path = json_path.to_str().unwrap();
        simulator.export_results(json_path, OutputFormat::Json).unwrap();
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(report["title"], "Session");
        assert_eq!(report["powerOn"], true);
        assert_eq!(report["reading"]["primary"], "Err");

        let csv_path = dir.path().join("terminals.csv");
        let csv_path = csv_path.to_str().unwrap();
        simulator.export_results(csv_path, OutputFormat::Csv).unwrap();
        let csv = std::fs::read_to_string(csv_path).unwrap();
        assert!(csv.starts_with("terminal,component,point,live,neutral,pe"));
        assert!(csv.contains("PS-L,PS,L,1,0,0"));
        assert!(csv.contains("LI-L,LI,L,0,0,0"));
    }

    #[test]
    fn test_config_file_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{"seed": 42, "meter_config": {"voltage_jitter": 0.0}}"#).unwrap();
        let config = SimulatorConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.meter_config.voltage_jitter, 0.0);
        assert_eq!(config.meter_config.nominal_voltage, 230.0);
    }

    #[test]
    fn test_config_errors_keep_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let err = SimulatorConfig::from_file(missing.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read config"));
        assert!(err.root_cause().downcast_ref::<std::io::Error>().is_some());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"{ not json").unwrap();
        let err = SimulatorConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid config"));
        assert!(err.root_cause().downcast_ref::<serde_json::Error>().is_some());
    }
}
