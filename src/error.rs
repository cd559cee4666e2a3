use thiserror::Error;

use crate::fault::FaultType;

/// Errors raised by the engine at its input boundaries.
///
/// Measurement problems never show up here: the meter reports them as
/// display sentinels instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Fault descriptor with both or neither id populated, or an id that does
    /// not match its fault type
    #[error("Ambiguous {fault_type} fault descriptor: {message}")]
    AmbiguousFault { fault_type: FaultType, message: String },

    #[error("Component '{id}' not found in circuit")]
    UnknownComponent { id: String },

    #[error("Wire '{id}' not found in circuit")]
    UnknownWire { id: String },

    #[error("Terminal '{component_id}-{point_id}' does not exist")]
    UnknownTerminal { component_id: String, point_id: String },

    #[error("Duplicate component id '{id}'")]
    DuplicateComponent { id: String },

    #[error("Duplicate wire id '{id}'")]
    DuplicateWire { id: String },

    /// Operation only valid for a specific component type
    #[error("Component '{id}' is a {actual}, expected a {expected}")]
    WrongComponentType {
        id: String,
        expected: String,
        actual: String,
    },
}

impl EngineError {
    pub fn ambiguous_fault(fault_type: FaultType, message: impl Into<String>) -> Self {
        Self::AmbiguousFault {
            fault_type,
            message: message.into(),
        }
    }

    pub fn unknown_terminal(component_id: impl Into<String>, point_id: impl Into<String>) -> Self {
        Self::UnknownTerminal {
            component_id: component_id.into(),
            point_id: point_id.into(),
        }
    }
}
