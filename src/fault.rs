use std::fmt;
use std::str::FromStr;
use anyhow::anyhow;
use log::info;
use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, ComponentFault};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultType {
    Component,
    Wire,
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultType::Component => f.write_str("component"),
            FaultType::Wire => f.write_str("wire"),
        }
    }
}

impl FromStr for FaultType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "component" => Ok(FaultType::Component),
            "wire" => Ok(FaultType::Wire),
            _ => Err(anyhow!("Unknown fault type: {}", s)),
        }
    }
}

/// Fault scenario handed to the engine by an external generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultDescriptor {
    pub fault_type: FaultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faulty_component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faulty_wire_id: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Resolved target of a validated fault descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultTarget {
    Component(String),
    Wire(String),
}

impl FaultDescriptor {
    pub fn component(id: impl Into<String>, description: impl Into<String>) -> Self {
        FaultDescriptor {
            fault_type: FaultType::Component,
            faulty_component_id: Some(id.into()),
            faulty_wire_id: None,
            description: description.into(),
        }
    }

    pub fn wire(id: impl Into<String>, description: impl Into<String>) -> Self {
        FaultDescriptor {
            fault_type: FaultType::Wire,
            faulty_component_id: None,
            faulty_wire_id: Some(id.into()),
            description: description.into(),
        }
    }

    /// Exactly one id must be populated and it must match `fault_type`
    pub fn target(&self) -> Result<FaultTarget, EngineError> {
        let present = |id: &Option<String>| id.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
        let component = present(&self.faulty_component_id);
        let wire = present(&self.faulty_wire_id);

        match (self.fault_type, component, wire) {
            (FaultType::Component, Some(id), None) => Ok(FaultTarget::Component(id)),
            (FaultType::Wire, None, Some(id)) => Ok(FaultTarget::Wire(id)),
            (fault_type, Some(_), Some(_)) => Err(EngineError::ambiguous_fault(
                fault_type,
                "both faultyComponentId and faultyWireId are set",
            )),
            (fault_type, None, None) => Err(EngineError::ambiguous_fault(
                fault_type,
                "no faulty id is set",
            )),
            (fault_type, _, _) => Err(EngineError::ambiguous_fault(
                fault_type,
                "populated id does not match the fault type",
            )),
        }
    }

    /// Id of the faulty item, when the descriptor is well formed
    pub fn faulty_id(&self) -> Option<String> {
        match self.target().ok()? {
            FaultTarget::Component(id) | FaultTarget::Wire(id) => Some(id),
        }
    }
}

/// Apply one fault to the circuit: remove the wire or open-circuit the
/// component. The circuit is left untouched on error.
pub fn apply_fault(circuit: &mut Circuit, fault: &FaultDescriptor) -> Result<FaultTarget, EngineError> {
    let target = fault.target()?;
    match &target {
        FaultTarget::Wire(id) => {
            circuit
                .remove_wire(id)
                .ok_or_else(|| EngineError::UnknownWire { id: id.clone() })?;
            info!("Injected fault: removed wire {}", id);
        }
        FaultTarget::Component(id) => {
            let component = circuit
                .component_mut(id)
                .ok_or_else(|| EngineError::UnknownComponent { id: id.clone() })?;
            component.fault = Some(ComponentFault::OpenCircuit);
            info!("Injected fault: {} is open circuit", id);
        }
    }
    Ok(target)
}

/// A trainee's answer to "what is faulty?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisGuess {
    #[serde(rename = "type")]
    pub fault_type: FaultType,
    pub id: String,
}

impl DiagnosisGuess {
    pub fn new(fault_type: FaultType, id: impl Into<String>) -> Self {
        DiagnosisGuess {
            fault_type,
            id: id.into(),
        }
    }
}

impl FromStr for DiagnosisGuess {
    type Err = anyhow::Error;

    /// Parse `component:ID` or `wire:ID`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("Diagnosis must look like 'component:ID' or 'wire:ID', got '{}'", s))?;
        if id.is_empty() {
            return Err(anyhow!("Diagnosis '{}' has an empty id", s));
        }
        Ok(DiagnosisGuess::new(kind.parse()?, id))
    }
}

/// Exact match on both fault type and id
pub fn check_diagnosis(guess: &DiagnosisGuess, actual: &FaultDescriptor) -> bool {
    if guess.fault_type != actual.fault_type {
        return false;
    }
    let expected = match guess.fault_type {
        FaultType::Component => actual.faulty_component_id.as_deref(),
        FaultType::Wire => actual.faulty_wire_id.as_deref(),
    };
    expected == Some(guess.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{ComponentType, PlacedComponent, Wire, WireColor};

    fn circuit() -> Circuit {
        let mut circuit = Circuit::new("Faults");
        circuit.add_component(PlacedComponent::new_power_source("PS", true)).unwrap();
        circuit.add_component(PlacedComponent::new_switch("SW", true)).unwrap();
        circuit.add_component(PlacedComponent::new("LI", ComponentType::Light)).unwrap();
        circuit.add_wire(Wire::new("W1", ("PS", "L"), ("SW", "L_in"), WireColor::L)).unwrap();
        circuit.add_wire(Wire::new("W2", ("SW", "L_out"), ("LI", "L"), WireColor::Switched)).unwrap();
        circuit
    }

    #[test]
    fn test_wire_fault_removes_wire() {
        let mut circuit = circuit();
        let target = apply_fault(&mut circuit, &FaultDescriptor::wire("W2", "broken switched live")).unwrap();
        assert_eq!(target, FaultTarget::Wire("W2".to_string()));
        assert!(circuit.wire("W2").is_none());
        assert_eq!(circuit.wires.len(), 1);
        assert!(circuit.components.iter().all(|c| c.fault.is_none()));
    }

    #[test]
    fn test_component_fault_marks_open_circuit() {
        let mut circuit = circuit();
        apply_fault(&mut circuit, &FaultDescriptor::component("SW", "burnt contacts")).unwrap();
        assert_eq!(circuit.component("SW").unwrap().fault, Some(ComponentFault::OpenCircuit));
        assert_eq!(circuit.wires.len(), 2);
    }

    #[test]
    fn test_rejects_ambiguous_descriptor() {
        let mut circuit = circuit();
        let mut both = FaultDescriptor::component("SW", "");
        both.faulty_wire_id = Some("W1".to_string());
        assert!(matches!(apply_fault(&mut circuit, &both), Err(EngineError::AmbiguousFault { .. })));

        let neither = FaultDescriptor {
            fault_type: FaultType::Wire,
            faulty_component_id: None,
            faulty_wire_id: Some(String::new()),
            description: String::new(),
        };
        assert!(matches!(neither.target(), Err(EngineError::AmbiguousFault { .. })));

        let mismatched = FaultDescriptor {
            fault_type: FaultType::Wire,
            faulty_component_id: Some("SW".to_string()),
            faulty_wire_id: None,
            description: String::new(),
        };
        assert!(mismatched.target().is_err());
        assert_eq!(circuit, self::circuit());
    }

    #[test]
    fn test_unknown_targets() {
        let mut circuit = circuit();
        assert_eq!(
            apply_fault(&mut circuit, &FaultDescriptor::wire("W9", "")),
            Err(EngineError::UnknownWire { id: "W9".to_string() })
        );
        assert_eq!(
            apply_fault(&mut circuit, &FaultDescriptor::component("XX", "")),
            Err(EngineError::UnknownComponent { id: "XX".to_string() })
        );
    }

    #[test]
    fn test_diagnosis_is_exact() {
        let fault = FaultDescriptor::component("SW", "");
        assert!(check_diagnosis(&DiagnosisGuess::new(FaultType::Component, "SW"), &fault));
        assert!(!check_diagnosis(&DiagnosisGuess::new(FaultType::Component, "LI"), &fault));
        assert!(!check_diagnosis(&DiagnosisGuess::new(FaultType::Wire, "SW"), &fault));
        assert!(!check_diagnosis(&DiagnosisGuess::new(FaultType::Component, "sw"), &fault));

        let fault = FaultDescriptor::wire("W2", "");
        assert!(check_diagnosis(&DiagnosisGuess::new(FaultType::Wire, "W2"), &fault));
        assert!(!check_diagnosis(&DiagnosisGuess::new(FaultType::Component, "W2"), &fault));
    }

    #[test]
    fn test_descriptor_json() {
        let json = r#"{"faultType": "wire", "faultyWireId": "W2", "description": "Loose terminal"}"#;
        let fault: FaultDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(fault.target().unwrap(), FaultTarget::Wire("W2".to_string()));
        assert_eq!(fault.faulty_id().as_deref(), Some("W2"));
    }

    #[test]
    fn test_parse_guess() {
        let guess: DiagnosisGuess = "wire:W2".parse().unwrap();
        assert_eq!(guess, DiagnosisGuess::new(FaultType::Wire, "W2"));
        assert!("W2".parse::<DiagnosisGuess>().is_err());
        assert!("socket:S1".parse::<DiagnosisGuess>().is_err());
        assert!("wire:".parse::<DiagnosisGuess>().is_err());
    }
}
