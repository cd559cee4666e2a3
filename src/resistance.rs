use std::collections::{HashMap, VecDeque};
use nalgebra::{DMatrix, DVector};
use anyhow::{anyhow, Result};
use log::debug;

use crate::network::NetworkGraph;
use crate::solver::{internal_targets, CircuitState};

/// Conductor between two terminals of the resistance network
#[derive(Debug, Clone, Copy, PartialEq)]
struct Branch {
    a: usize,
    b: usize,
    resistance: f64,
}

/// Resistive model of the installation with the supply isolated: every wire
/// is a small series resistance and every conducting switch contact adds its
/// contact resistance.
pub struct ResistanceNetwork<'a> {
    graph: &'a NetworkGraph,
    branches: Vec<Branch>,
    adjacency: Vec<Vec<usize>>,
}

impl<'a> ResistanceNetwork<'a> {
    pub fn new(
        graph: &'a NetworkGraph,
        state: &CircuitState,
        wire_resistance: f64,
        contact_resistance: f64,
    ) -> Result<Self> {
        if wire_resistance <= 0.0 || contact_resistance <= 0.0 {
            return Err(anyhow!(
                "Conductor resistances must be positive (wire {}, contact {})",
                wire_resistance,
                contact_resistance
            ));
        }

        let mut branches: Vec<Branch> = graph
            .wire_edges()
            .iter()
            .filter(|(a, b)| a != b)
            .map(|&(a, b)| Branch {
                a,
                b,
                resistance: wire_resistance,
            })
            .collect();

        for index in 0..graph.terminal_count() {
            for target in internal_targets(graph, state, index) {
                branches.push(Branch {
                    a: index,
                    b: target,
                    resistance: contact_resistance,
                });
            }
        }

        let mut adjacency = vec![Vec::new(); graph.terminal_count()];
        for (i, branch) in branches.iter().enumerate() {
            adjacency[branch.a].push(i);
            adjacency[branch.b].push(i);
        }

        Ok(ResistanceNetwork {
            graph,
            branches,
            adjacency,
        })
    }

    /// Effective resistance between two terminals, `None` when they are not
    /// connected at all
    pub fn effective_resistance(&self, from: &str, to: &str) -> Result<Option<f64>> {
        let a = self
            .graph
            .index_of(from)
            .ok_or_else(|| anyhow!("Terminal {} not in network", from))?;
        let b = self
            .graph
            .index_of(to)
            .ok_or_else(|| anyhow!("Terminal {} not in network", to))?;

        if a == b {
            return Ok(Some(0.0));
        }

        let island = self.island(a);
        if !island.contains(&b) {
            return Ok(None);
        }

        // Terminal `b` is the reference node; the rest get matrix rows
        let mut rows: HashMap<usize, usize> = HashMap::new();
        for &node in island.iter().filter(|&&node| node != b) {
            let row = rows.len();
            rows.insert(node, row);
        }

        let size = rows.len();
        let mut matrix = DMatrix::<f64>::zeros(size, size);
        for branch in &self.branches {
            if !island.contains(&branch.a) {
                continue;
            }
            let g = 1.0 / branch.resistance;
            let ra = rows.get(&branch.a).copied();
            let rb = rows.get(&branch.b).copied();
            if let Some(i) = ra {
                matrix[(i, i)] += g;
            }
            if let Some(j) = rb {
                matrix[(j, j)] += g;
            }
            if let (Some(i), Some(j)) = (ra, rb) {
                matrix[(i, j)] -= g;
                matrix[(j, i)] -= g;
            }
        }

        // Inject one ampere at `a`; the resulting potential is the resistance
        let source_row = rows
            .get(&a)
            .copied()
            .ok_or_else(|| anyhow!("Terminal {} missing from its own island", from))?;
        let mut rhs = DVector::<f64>::zeros(size);
        rhs[source_row] = 1.0;

        let solution = matrix
            .lu()
            .solve(&rhs)
            .ok_or_else(|| anyhow!("Singular resistance network between {} and {}", from, to))?;

        let resistance = solution[source_row];
        debug!("Effective resistance {} -> {}: {:.4} ohm", from, to, resistance);
        Ok(Some(resistance))
    }

    /// Terminals connected to `start` through any branch
    fn island(&self, start: usize) -> Vec<usize> {
        let mut seen = vec![false; self.adjacency.len()];
        let mut queue = VecDeque::from([start]);
        let mut island = Vec::new();
        seen[start] = true;

        while let Some(node) = queue.pop_front() {
            island.push(node);
            for &branch_index in &self.adjacency[node] {
                let branch = self.branches[branch_index];
                let other = if branch.a == node { branch.b } else { branch.a };
                if !seen[other] {
                    seen[other] = true;
                    queue.push_back(other);
                }
            }
        }

        island
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Circuit, ComponentType, PlacedComponent, Wire, WireColor};

    fn earth_circuit() -> Circuit {
        let mut circuit = Circuit::new("Earth");
        circuit.add_component(PlacedComponent::new_power_source("PS", false)).unwrap();
        circuit.add_component(PlacedComponent::new("JB", ComponentType::JunctionBox)).unwrap();
        circuit.add_component(PlacedComponent::new("S1", ComponentType::Socket)).unwrap();
        circuit.add_component(PlacedComponent::new("S2", ComponentType::Socket)).unwrap();
        circuit.add_wire(Wire::new("E1", ("PS", "PE"), ("JB", "PE"), WireColor::PE)).unwrap();
        circuit.add_wire(Wire::new("E2", ("JB", "PE"), ("S1", "PE"), WireColor::PE)).unwrap();
        circuit.add_wire(Wire::new("E3", ("JB", "PE"), ("S2", "PE"), WireColor::PE)).unwrap();
        circuit
    }

    fn resistance(circuit: &Circuit, from: &str, to: &str) -> Option<f64> {
        let graph = NetworkGraph::new(circuit);
        let state = CircuitState::from_circuit(circuit);
        ResistanceNetwork::new(&graph, &state, 0.02, 0.01)
            .unwrap()
            .effective_resistance(from, to)
            .unwrap()
    }

    #[test]
    fn test_series_wires_add() {
        let r = resistance(&earth_circuit(), "PS-PE", "S1-PE").unwrap();
        assert!((r - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_ring_halves() {
        let mut circuit = earth_circuit();
        circuit.add_wire(Wire::new("E4", ("S1", "PE"), ("S2", "PE"), WireColor::PE)).unwrap();
        // JB->S1 direct (0.02) in parallel with JB->S2->S1 (0.04)
        let r = resistance(&circuit, "JB-PE", "S1-PE").unwrap();
        assert!((r - 0.02 * 0.04 / 0.06).abs() < 1e-9);
    }

    #[test]
    fn test_disconnected_is_none() {
        assert_eq!(resistance(&earth_circuit(), "PS-PE", "S1-L"), None);
        assert_eq!(resistance(&earth_circuit(), "S1-PE", "S1-PE"), Some(0.0));
    }

    #[test]
    fn test_closed_switch_contact_counts() {
        let mut circuit = Circuit::new("Switch");
        circuit.add_component(PlacedComponent::new_switch("SW", true)).unwrap();
        let r = resistance(&circuit, "SW-L_in", "SW-L_out").unwrap();
        assert!((r - 0.01).abs() < 1e-9);

        circuit.toggle_switch("SW").unwrap();
        assert_eq!(resistance(&circuit, "SW-L_in", "SW-L_out"), None);
    }

    #[test]
    fn test_rejects_non_positive_resistance() {
        let circuit = earth_circuit();
        let graph = NetworkGraph::new(&circuit);
        let state = CircuitState::from_circuit(&circuit);
        assert!(ResistanceNetwork::new(&graph, &state, 0.0, 0.01).is_err());
    }

    #[test]
    fn test_unknown_terminal_is_error() {
        let circuit = earth_circuit();
        let graph = NetworkGraph::new(&circuit);
        let state = CircuitState::from_circuit(&circuit);
        let network = ResistanceNetwork::new(&graph, &state, 0.02, 0.01).unwrap();
        assert!(network.effective_resistance("XX-PE", "S1-PE").is_err());
    }
}
