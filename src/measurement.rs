use std::fmt;
use std::str::FromStr;
use anyhow::anyhow;
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::circuit::terminal_key;
use crate::network::NetworkGraph;
use crate::resistance::ResistanceNetwork;
use crate::solver::{CircuitState, Connectivity, ConnectivitySolver, Net};

/// Test lead colours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Probe {
    L,
    N,
    PE,
}

/// Where a probe is clipped, if anywhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbePlacement {
    pub probe: Probe,
    pub target_component_id: Option<String>,
    pub target_point_id: Option<String>,
}

impl ProbePlacement {
    pub fn unplaced(probe: Probe) -> Self {
        ProbePlacement {
            probe,
            target_component_id: None,
            target_point_id: None,
        }
    }

    pub fn on(probe: Probe, component_id: &str, point_id: &str) -> Self {
        ProbePlacement {
            probe,
            target_component_id: Some(component_id.to_string()),
            target_point_id: Some(point_id.to_string()),
        }
    }

    /// Terminal key, when both target fields are set
    pub fn terminal_key(&self) -> Option<String> {
        match (&self.target_component_id, &self.target_point_id) {
            (Some(component_id), Some(point_id)) => Some(terminal_key(component_id, point_id)),
            _ => None,
        }
    }
}

/// The three independent probes of the instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSet {
    pub l: ProbePlacement,
    pub n: ProbePlacement,
    pub pe: ProbePlacement,
}

impl Default for ProbeSet {
    fn default() -> Self {
        ProbeSet {
            l: ProbePlacement::unplaced(Probe::L),
            n: ProbePlacement::unplaced(Probe::N),
            pe: ProbePlacement::unplaced(Probe::PE),
        }
    }
}

impl ProbeSet {
    pub fn get(&self, probe: Probe) -> &ProbePlacement {
        match probe {
            Probe::L => &self.l,
            Probe::N => &self.n,
            Probe::PE => &self.pe,
        }
    }

    pub fn place(&mut self, probe: Probe, component_id: &str, point_id: &str) {
        *self.slot(probe) = ProbePlacement::on(probe, component_id, point_id);
    }

    pub fn clear(&mut self, probe: Probe) {
        *self.slot(probe) = ProbePlacement::unplaced(probe);
    }

    fn slot(&mut self, probe: Probe) -> &mut ProbePlacement {
        match probe {
            Probe::L => &mut self.l,
            Probe::N => &mut self.n,
            Probe::PE => &mut self.pe,
        }
    }
}

/// Instrument function selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TestMode {
    #[default]
    #[serde(rename = "V")]
    Voltage,
    #[serde(rename = "R_LO")]
    LowResistance,
    #[serde(rename = "R_ISO")]
    Insulation,
    #[serde(rename = "Z_I")]
    LoopImpedance,
    #[serde(rename = "RCD_T")]
    RcdTrip,
}

impl TestMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TestMode::Voltage => "V",
            TestMode::LowResistance => "R_LO",
            TestMode::Insulation => "R_ISO",
            TestMode::LoopImpedance => "Z_I",
            TestMode::RcdTrip => "RCD_T",
        }
    }

    /// Unit shown on the secondary line of the display
    pub fn unit(self) -> &'static str {
        match self {
            TestMode::Voltage => "V AC",
            TestMode::LowResistance | TestMode::LoopImpedance => "Ω",
            TestMode::Insulation => "MΩ",
            TestMode::RcdTrip => "ms",
        }
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "V" => Ok(TestMode::Voltage),
            "R_LO" => Ok(TestMode::LowResistance),
            "R_ISO" => Ok(TestMode::Insulation),
            "Z_I" => Ok(TestMode::LoopImpedance),
            "RCD_T" => Ok(TestMode::RcdTrip),
            _ => Err(anyhow!("Unknown test mode: {}", s)),
        }
    }
}

/// Two-line instrument display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    pub primary: String,
    pub secondary: String,
}

impl MeterReading {
    fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        MeterReading {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }
}

impl fmt::Display for MeterReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.primary, self.secondary)
    }
}

/// Outcome of one measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    Voltage(f64),
    Resistance(f64),
    OpenCircuit,
    /// A lead is unplaced or sits on an unknown terminal
    ProbeError,
    /// Continuity attempted with the supply on
    LiveCircuit,
    NotSimulated(TestMode),
}

impl Measurement {
    pub fn display(&self) -> MeterReading {
        match *self {
            Measurement::Voltage(volts) => MeterReading::new(format!("{:.1}", volts), "V AC"),
            Measurement::Resistance(ohms) => MeterReading::new(format!("{:.2}", ohms), "Ω"),
            Measurement::OpenCircuit => MeterReading::new("OL", "Ω"),
            Measurement::ProbeError => MeterReading::new("Err", "Probes"),
            Measurement::LiveCircuit => MeterReading::new("Err", "LIVE"),
            Measurement::NotSimulated(mode) => MeterReading::new("---", mode.unit()),
        }
    }
}

/// What a voltage reading between two terminals should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageClass {
    /// One lead live, the other neutral
    Mains,
    /// Both leads on the same energized conductor
    SameNet,
    /// Nothing to measure; shows induced voltage
    Floating,
}

/// Classify a pair of terminals. Symmetric in its two leads.
pub fn classify_voltage(a: &str, b: &str, connectivity: &Connectivity) -> VoltageClass {
    let live = |key: &str| connectivity.live.contains(key);
    let neutral = |key: &str| connectivity.neutral.contains(key);

    if (live(a) && neutral(b)) || (neutral(a) && live(b)) {
        VoltageClass::Mains
    } else if (live(a) && live(b)) || (neutral(a) && neutral(b)) {
        VoltageClass::SameNet
    } else {
        VoltageClass::Floating
    }
}

/// Meter calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub nominal_voltage: f64,
    /// Half-width of the noise band around the nominal voltage
    pub voltage_jitter: f64,
    /// Upper bound of the induced voltage shown on dead conductors
    pub floating_max: f64,
    pub lead_resistance_min: f64,
    pub lead_resistance_max: f64,
    /// Per-wire resistance used by continuity readings
    pub wire_resistance: f64,
    pub contact_resistance: f64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        MeterConfig {
            nominal_voltage: 230.0,
            voltage_jitter: 2.5,
            floating_max: 2.0,
            lead_resistance_min: 0.2,
            lead_resistance_max: 0.4,
            wire_resistance: 0.02,
            contact_resistance: 0.01,
        }
    }
}

/// Everything a measurement reads, derived from one circuit snapshot
pub struct MeasurementContext<'a> {
    pub graph: &'a NetworkGraph,
    pub state: &'a CircuitState,
    pub connectivity: &'a Connectivity,
    pub solver: &'a ConnectivitySolver,
}

/// Simulated installation tester
#[derive(Debug, Clone, Default)]
pub struct Meter {
    config: MeterConfig,
}

impl Meter {
    pub fn new() -> Self {
        Meter {
            config: MeterConfig::default(),
        }
    }

    pub fn with_config(config: MeterConfig) -> Self {
        Meter { config }
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    /// Take a reading with the L and PE probes as the two leads
    pub fn measure<R: Rng>(
        &self,
        mode: TestMode,
        probes: &ProbeSet,
        context: &MeasurementContext<'_>,
        rng: &mut R,
    ) -> Measurement {
        let leads = self.leads(probes, context.graph);
        debug!("Measuring {} with leads {:?}", mode, leads);

        match mode {
            TestMode::Voltage => match leads {
                Some((a, b)) => self.measure_voltage(&a, &b, context.connectivity, rng),
                None => Measurement::ProbeError,
            },
            TestMode::LowResistance => {
                if context.state.power_on {
                    return Measurement::LiveCircuit;
                }
                match leads {
                    Some((a, b)) => self.measure_continuity(&a, &b, context, rng),
                    None => Measurement::ProbeError,
                }
            }
            other => Measurement::NotSimulated(other),
        }
    }

    fn leads(&self, probes: &ProbeSet, graph: &NetworkGraph) -> Option<(String, String)> {
        let a = probes.l.terminal_key().filter(|key| graph.contains(key))?;
        let b = probes.pe.terminal_key().filter(|key| graph.contains(key))?;
        Some((a, b))
    }

    /// AC voltage between two terminals
    pub fn measure_voltage<R: Rng>(
        &self,
        a: &str,
        b: &str,
        connectivity: &Connectivity,
        rng: &mut R,
    ) -> Measurement {
        let volts = match classify_voltage(a, b, connectivity) {
            VoltageClass::Mains => {
                let jitter = self.config.voltage_jitter.abs();
                self.config.nominal_voltage + rng.gen_range(-jitter..=jitter)
            }
            VoltageClass::SameNet => 0.0,
            VoltageClass::Floating => uniform(rng, 0.0, self.config.floating_max),
        };
        Measurement::Voltage(volts)
    }

    /// Low-resistance continuity between two terminals of the earth system.
    /// Assumes the supply is isolated.
    pub fn measure_continuity<R: Rng>(
        &self,
        a: &str,
        b: &str,
        context: &MeasurementContext<'_>,
        rng: &mut R,
    ) -> Measurement {
        let earth = context
            .solver
            .trace_net(context.graph, context.state, Net::ProtectiveEarth);
        if !(earth.contains(a) && earth.contains(b)) {
            return Measurement::OpenCircuit;
        }

        let lead = uniform(rng, self.config.lead_resistance_min, self.config.lead_resistance_max);
        let path = ResistanceNetwork::new(
            context.graph,
            context.state,
            self.config.wire_resistance,
            self.config.contact_resistance,
        )
        .and_then(|network| network.effective_resistance(a, b));

        let path = match path {
            Ok(Some(ohms)) => ohms,
            Ok(None) => 0.0,
            Err(e) => {
                warn!("Could not solve earth path {} -> {}: {}", a, b, e);
                0.0
            }
        };

        Measurement::Resistance(lead + path)
    }
}

fn uniform<R: Rng>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high > low {
        rng.gen_range(low..high)
    } else {
        low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use crate::circuit::{Circuit, ComponentType, PlacedComponent, Wire, WireColor};

    fn lighting_circuit(power_on: bool, toggled: bool) -> Circuit {
        let mut circuit = Circuit::new("Lighting");
        circuit.add_component(PlacedComponent::new_power_source("PS", power_on)).unwrap();
        circuit.add_component(PlacedComponent::new_switch("SW", toggled)).unwrap();
        circuit.add_component(PlacedComponent::new("LI", ComponentType::Light)).unwrap();
        circuit.add_wire(Wire::new("W1", ("PS", "L"), ("SW", "L_in"), WireColor::L)).unwrap();
        circuit.add_wire(Wire::new("W2", ("SW", "L_out"), ("LI", "L"), WireColor::Switched)).unwrap();
        circuit.add_wire(Wire::new("W3", ("PS", "N"), ("LI", "N"), WireColor::N)).unwrap();
        circuit.add_wire(Wire::new("W4", ("PS", "PE"), ("LI", "PE"), WireColor::PE)).unwrap();
        circuit
    }

    fn take(circuit: &Circuit, mode: TestMode, probes: &ProbeSet, seed: u64) -> Measurement {
        let graph = NetworkGraph::new(circuit);
        let state = CircuitState::from_circuit(circuit);
        let solver = ConnectivitySolver::new();
        let (connectivity, _) = solver.solve(&graph, &state);
        let context = MeasurementContext {
            graph: &graph,
            state: &state,
            connectivity: &connectivity,
            solver: &solver,
        };
        Meter::new().measure(mode, probes, &context, &mut StdRng::seed_from_u64(seed))
    }

    fn probes(l: (&str, &str), pe: (&str, &str)) -> ProbeSet {
        let mut probes = ProbeSet::default();
        probes.place(Probe::L, l.0, l.1);
        probes.place(Probe::PE, pe.0, pe.1);
        probes
    }

    #[test]
    fn test_mains_voltage_within_jitter() {
        let circuit = lighting_circuit(true, true);
        for seed in 0..20 {
            match take(&circuit, TestMode::Voltage, &probes(("PS", "L"), ("PS", "N")), seed) {
                Measurement::Voltage(v) => assert!((227.5..=232.5).contains(&v), "{}", v),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_voltage_is_symmetric() {
        let circuit = lighting_circuit(true, true);
        for seed in 0..10 {
            let forward = take(&circuit, TestMode::Voltage, &probes(("LI", "L"), ("LI", "N")), seed);
            let reverse = take(&circuit, TestMode::Voltage, &probes(("LI", "N"), ("LI", "L")), seed);
            assert_eq!(forward, reverse);
        }
    }

    #[test]
    fn test_same_net_reads_zero() {
        let circuit = lighting_circuit(true, true);
        let reading = take(&circuit, TestMode::Voltage, &probes(("SW", "L_in"), ("SW", "L_out")), 1);
        assert_eq!(reading, Measurement::Voltage(0.0));
        assert_eq!(reading.display(), MeterReading::new("0.0", "V AC"));
    }

    #[test]
    fn test_dead_circuit_floats() {
        let circuit = lighting_circuit(false, true);
        match take(&circuit, TestMode::Voltage, &probes(("PS", "L"), ("PS", "N")), 3) {
            Measurement::Voltage(v) => assert!((0.0..2.0).contains(&v)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_probe_is_error() {
        let circuit = lighting_circuit(true, true);
        let mut probes = probes(("PS", "L"), ("PS", "N"));
        probes.clear(Probe::PE);
        let reading = take(&circuit, TestMode::Voltage, &probes, 0);
        assert_eq!(reading.display(), MeterReading::new("Err", "Probes"));

        let bogus = self::probes(("PS", "L"), ("PS", "L_in"));
        assert_eq!(take(&circuit, TestMode::Voltage, &bogus, 0), Measurement::ProbeError);
    }

    #[test]
    fn test_continuity_refused_when_live() {
        let circuit = lighting_circuit(true, false);
        let reading = take(&circuit, TestMode::LowResistance, &probes(("PS", "PE"), ("LI", "PE")), 0);
        assert_eq!(reading.display(), MeterReading::new("Err", "LIVE"));

        // Even without leads
        let reading = take(&circuit, TestMode::LowResistance, &ProbeSet::default(), 0);
        assert_eq!(reading, Measurement::LiveCircuit);
    }

    #[test]
    fn test_earth_continuity() {
        let mut circuit = lighting_circuit(false, false);
        match take(&circuit, TestMode::LowResistance, &probes(("PS", "PE"), ("LI", "PE")), 5) {
            Measurement::Resistance(ohms) => assert!(ohms >= 0.2 && ohms < 0.5, "{}", ohms),
            other => panic!("unexpected {:?}", other),
        }

        circuit.remove_wire("W4");
        let reading = take(&circuit, TestMode::LowResistance, &probes(("PS", "PE"), ("LI", "PE")), 5);
        assert_eq!(reading.display(), MeterReading::new("OL", "Ω"));
    }

    #[test]
    fn test_continuity_is_earth_only() {
        let circuit = lighting_circuit(false, true);
        let reading = take(&circuit, TestMode::LowResistance, &probes(("PS", "L"), ("LI", "L")), 0);
        assert_eq!(reading, Measurement::OpenCircuit);
    }

    #[test]
    fn test_other_modes_not_simulated() {
        let circuit = lighting_circuit(false, false);
        let reading = take(&circuit, TestMode::Insulation, &probes(("PS", "L"), ("PS", "N")), 0);
        assert_eq!(reading.display(), MeterReading::new("---", "MΩ"));
    }

    #[test]
    fn test_classify_voltage() {
        let connectivity = Connectivity {
            live: ["A".to_string()].into_iter().collect(),
            neutral: ["B".to_string()].into_iter().collect(),
            protective_earth: Default::default(),
        };
        assert_eq!(classify_voltage("A", "B", &connectivity), VoltageClass::Mains);
        assert_eq!(classify_voltage("B", "A", &connectivity), VoltageClass::Mains);
        assert_eq!(classify_voltage("A", "A", &connectivity), VoltageClass::SameNet);
        assert_eq!(classify_voltage("A", "C", &connectivity), VoltageClass::Floating);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!("r_lo".parse::<TestMode>().unwrap(), TestMode::LowResistance);
        assert_eq!(serde_json::to_string(&TestMode::RcdTrip).unwrap(), "\"RCD_T\"");
        assert!("OHMS".parse::<TestMode>().is_err());
    }
}
