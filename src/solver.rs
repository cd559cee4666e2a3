use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::time::Instant;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::circuit::{terminal_key, Circuit};
use crate::network::NetworkGraph;

/// Traversal strategy. Both yield identical membership sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TraversalOrder {
    #[default]
    BreadthFirst,
    DepthFirst,
}

/// Solver configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub traversal: TraversalOrder,
}

/// The three conductors fed by the power source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Net {
    Live,
    Neutral,
    ProtectiveEarth,
}

impl Net {
    pub const ALL: [Net; 3] = [Net::Live, Net::Neutral, Net::ProtectiveEarth];

    /// Power source terminal the net starts from
    pub fn source_point(self) -> &'static str {
        match self {
            Net::Live => "L",
            Net::Neutral => "N",
            Net::ProtectiveEarth => "PE",
        }
    }
}

impl fmt::Display for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_point())
    }
}

/// Switching inputs to a solve: toggled switches, faulted components and
/// whether the source is energized
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CircuitState {
    pub toggled: HashSet<String>,
    pub faulted: HashSet<String>,
    pub power_on: bool,
}

impl CircuitState {
    /// Read the state carried by the components of a circuit
    pub fn from_circuit(circuit: &Circuit) -> Self {
        let toggled = circuit
            .components
            .iter()
            .filter(|c| c.toggled())
            .map(|c| c.id.clone())
            .collect();
        let faulted = circuit
            .components
            .iter()
            .filter(|c| c.is_faulted())
            .map(|c| c.id.clone())
            .collect();
        let power_on = circuit
            .power_source()
            .map(|c| c.is_powered_on())
            .unwrap_or(false);

        CircuitState {
            toggled,
            faulted,
            power_on,
        }
    }
}

/// Terminals energized on each net
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    pub live: BTreeSet<String>,
    pub neutral: BTreeSet<String>,
    pub protective_earth: BTreeSet<String>,
}

impl Connectivity {
    pub fn net(&self, net: Net) -> &BTreeSet<String> {
        match net {
            Net::Live => &self.live,
            Net::Neutral => &self.neutral,
            Net::ProtectiveEarth => &self.protective_earth,
        }
    }

    /// Nets a terminal belongs to, in L, N, PE order
    pub fn nets_of(&self, key: &str) -> Vec<Net> {
        Net::ALL
            .into_iter()
            .filter(|&net| self.net(net).contains(key))
            .collect()
    }

    pub fn is_dead(&self) -> bool {
        self.live.is_empty() && self.neutral.is_empty() && self.protective_earth.is_empty()
    }
}

/// Solver statistics
#[derive(Debug, Clone)]
pub struct SolverStats {
    pub traversal_used: TraversalOrder,
    pub terminals_visited: usize,
    pub solve_time: f64,
    pub energized: bool,
}

/// Reachability solver over a network graph
#[derive(Debug, Clone, Default)]
pub struct ConnectivitySolver {
    config: SolverConfig,
}

impl ConnectivitySolver {
    /// Create a new solver with default configuration
    pub fn new() -> Self {
        ConnectivitySolver {
            config: SolverConfig::default(),
        }
    }

    /// Create a new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        ConnectivitySolver { config }
    }

    /// Compute live, neutral and PE reachability.
    ///
    /// Without a power source, or with the source switched off, every set is
    /// empty.
    pub fn solve(&self, graph: &NetworkGraph, state: &CircuitState) -> (Connectivity, SolverStats) {
        let start_time = Instant::now();

        let connectivity = if state.power_on && graph.power_source().is_some() {
            Connectivity {
                live: self.trace_net(graph, state, Net::Live),
                neutral: self.trace_net(graph, state, Net::Neutral),
                protective_earth: self.trace_net(graph, state, Net::ProtectiveEarth),
            }
        } else {
            debug!("Source absent or off, network is dead");
            Connectivity::default()
        };

        let stats = SolverStats {
            traversal_used: self.config.traversal,
            terminals_visited: connectivity.live.len()
                + connectivity.neutral.len()
                + connectivity.protective_earth.len(),
            solve_time: start_time.elapsed().as_secs_f64(),
            energized: !connectivity.is_dead(),
        };

        (connectivity, stats)
    }

    /// Terminals reachable from one source terminal, regardless of whether
    /// the source is switched on
    pub fn trace_net(&self, graph: &NetworkGraph, state: &CircuitState, net: Net) -> BTreeSet<String> {
        match graph.power_source() {
            Some(source) => self.reachable(graph, state, &terminal_key(source, net.source_point())),
            None => BTreeSet::new(),
        }
    }

    /// Terminals reachable from `start` through wires and conducting
    /// component internals
    pub fn reachable(&self, graph: &NetworkGraph, state: &CircuitState, start: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let Some(start_index) = graph.index_of(start) else {
            return result;
        };

        let mut visited = vec![false; graph.terminal_count()];
        let mut frontier = VecDeque::new();
        visited[start_index] = true;
        frontier.push_back(start_index);

        while let Some(current) = self.next(&mut frontier) {
            let Some(terminal) = graph.terminal(current) else {
                continue;
            };
            result.insert(terminal.key.clone());

            for &neighbor in graph.neighbor_indices(current) {
                if neighbor < visited.len() && !visited[neighbor] {
                    visited[neighbor] = true;
                    frontier.push_back(neighbor);
                }
            }

            for target in internal_targets(graph, state, current) {
                if !visited[target] {
                    trace!("{} conducts internally to {}", terminal.key, graph.terminals()[target].key);
                    visited[target] = true;
                    frontier.push_back(target);
                }
            }
        }

        result
    }

    fn next(&self, frontier: &mut VecDeque<usize>) -> Option<usize> {
        match self.config.traversal {
            TraversalOrder::BreadthFirst => frontier.pop_front(),
            TraversalOrder::DepthFirst => frontier.pop_back(),
        }
    }
}

/// Terminals reached from `index` through the owning component's internal
/// pass-through, if that component is conducting
pub(crate) fn internal_targets(graph: &NetworkGraph, state: &CircuitState, index: usize) -> Vec<usize> {
    let Some(terminal) = graph.terminal(index) else {
        return Vec::new();
    };
    let component_id = terminal.component_id.as_str();
    if state.faulted.contains(component_id) {
        return Vec::new();
    }
    let Some(component_type) = graph.component_type(component_id) else {
        return Vec::new();
    };

    let toggled = state.toggled.contains(component_id);
    component_type
        .conducting_paths(toggled)
        .filter(|path| path.from == terminal.point_id)
        .filter_map(|path| graph.index_of(&terminal_key(component_id, path.to)))
        .collect()
}
