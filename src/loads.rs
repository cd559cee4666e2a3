use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, Wire};
use crate::solver::{Connectivity, Net};

/// Energization of one load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatus {
    pub component_id: String,
    pub powered: bool,
}

/// Net carried by a wire, for highlighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireState {
    Live,
    Neutral,
    ProtectiveEarth,
    Dead,
}

impl From<Net> for WireState {
    fn from(net: Net) -> Self {
        match net {
            Net::Live => WireState::Live,
            Net::Neutral => WireState::Neutral,
            Net::ProtectiveEarth => WireState::ProtectiveEarth,
        }
    }
}

/// A load is powered when its L terminal is live and its N terminal is
/// neutral
pub fn is_powered(component_id: &str, connectivity: &Connectivity) -> bool {
    connectivity.live.contains(&format!("{}-L", component_id))
        && connectivity.neutral.contains(&format!("{}-N", component_id))
}

/// Status of every load in the circuit, in component order
pub fn evaluate_loads(circuit: &Circuit, connectivity: &Connectivity) -> Vec<LoadStatus> {
    circuit
        .components
        .iter()
        .filter(|c| c.component_type.is_load())
        .map(|c| LoadStatus {
            component_id: c.id.clone(),
            powered: is_powered(&c.id, connectivity),
        })
        .collect()
}

/// Classify a wire by the first net (L, N, PE) either end belongs to
pub fn wire_state(wire: &Wire, connectivity: &Connectivity) -> WireState {
    let start = wire.start_key();
    let end = wire.end_key();
    Net::ALL
        .into_iter()
        .find(|&net| {
            let members = connectivity.net(net);
            members.contains(&start) || members.contains(&end)
        })
        .map(WireState::from)
        .unwrap_or(WireState::Dead)
}
