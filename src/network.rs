use std::collections::HashMap;
use log::{debug, warn};

use crate::circuit::{terminal_key, Circuit, ComponentType};

/// Graph node: one terminal of one placed component
#[derive(Debug, Clone, PartialEq)]
pub struct Terminal {
    pub key: String,
    pub component_id: String,
    pub point_id: &'static str,
}

/// Wiring graph over terminals.
///
/// Only wires become edges. Internal component behavior (a closed switch
/// bridging its terminals) depends on toggle and fault state and is applied
/// by the solver while traversing, never stored here.
#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    terminals: Vec<Terminal>,
    terminal_index: HashMap<String, usize>,
    adjacency: Vec<Vec<usize>>,
    component_types: HashMap<String, ComponentType>,
    wire_edges: Vec<(usize, usize)>,
    power_source: Option<String>,
}

impl NetworkGraph {
    /// Build the graph for a circuit snapshot
    pub fn new(circuit: &Circuit) -> Self {
        let mut graph = NetworkGraph::default();

        // Every terminal is a node, wired or not
        for component in &circuit.components {
            graph
                .component_types
                .insert(component.id.clone(), component.component_type);
            for point in component.connection_points() {
                graph.add_terminal(&component.id, point.id);
            }
        }

        for wire in &circuit.wires {
            let start = graph.index_of(&wire.start_key());
            let end = graph.index_of(&wire.end_key());
            match (start, end) {
                (Some(a), Some(b)) => graph.add_edge(a, b),
                _ => warn!(
                    "Skipping wire {}: {} -> {} references a missing terminal",
                    wire.id,
                    wire.start_key(),
                    wire.end_key()
                ),
            }
        }

        let sources = circuit.components_of_type(ComponentType::PowerSource);
        if sources.len() > 1 {
            warn!(
                "Circuit has {} power sources, only {} drives the network",
                sources.len(),
                sources[0].id
            );
        }
        graph.power_source = sources.first().map(|c| c.id.clone());

        debug!(
            "Built network graph: {} terminals, {} wire edges",
            graph.terminals.len(),
            graph.wire_edges.len()
        );

        graph
    }

    fn add_terminal(&mut self, component_id: &str, point_id: &'static str) {
        let key = terminal_key(component_id, point_id);
        if self.terminal_index.contains_key(&key) {
            warn!("Duplicate terminal {} ignored", key);
            return;
        }
        self.terminal_index.insert(key.clone(), self.terminals.len());
        self.terminals.push(Terminal {
            key,
            component_id: component_id.to_string(),
            point_id,
        });
        self.adjacency.push(Vec::new());
    }

    fn add_edge(&mut self, a: usize, b: usize) {
        self.adjacency[a].push(b);
        if a != b {
            self.adjacency[b].push(a);
        }
        self.wire_edges.push((a, b));
    }

    /// Dense index of a terminal key
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.terminal_index.get(key).copied()
    }

    pub fn terminal(&self, index: usize) -> Option<&Terminal> {
        self.terminals.get(index)
    }

    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    pub fn contains(&self, key: &str) -> bool {
        self.terminal_index.contains_key(key)
    }

    /// Wire-connected neighbors by index
    pub fn neighbor_indices(&self, index: usize) -> &[usize] {
        self.adjacency.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Wire-connected neighbors of a terminal key
    pub fn neighbors(&self, key: &str) -> Vec<&str> {
        self.index_of(key)
            .map(|i| {
                self.neighbor_indices(i)
                    .iter()
                    .filter_map(|&n| self.terminals.get(n))
                    .map(|t| t.key.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Component owning a terminal
    pub fn owner(&self, key: &str) -> Option<&str> {
        self.index_of(key)
            .and_then(|i| self.terminals.get(i))
            .map(|t| t.component_id.as_str())
    }

    pub fn component_type(&self, component_id: &str) -> Option<ComponentType> {
        self.component_types.get(component_id).copied()
    }

    pub fn wire_edges(&self) -> &[(usize, usize)] {
        &self.wire_edges
    }

    pub fn power_source(&self) -> Option<&str> {
        self.power_source.as_deref()
    }

    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }

    /// Print graph information
    pub fn print_graph_info(&self) {
        println!("Network Graph:");
        println!("  Terminals: {}", self.terminals.len());
        println!("  Wire edges: {}", self.wire_edges.len());
        println!(
            "  Power source: {}",
            self.power_source.as_deref().unwrap_or("none")
        );
    }
}
