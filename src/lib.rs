pub mod catalog;
pub mod circuit;
pub mod cli;
pub mod error;
pub mod fault;
pub mod layout;
pub mod loads;
pub mod measurement;
pub mod network;
pub mod resistance;
pub mod simulator;
pub mod solver;

// Re-export commonly used types
pub use circuit::{Circuit, ComponentType, PlacedComponent, Wire, WireColor};
pub use error::EngineError;
pub use fault::{apply_fault, check_diagnosis, DiagnosisGuess, FaultDescriptor};
pub use layout::LayoutParser;
pub use measurement::{Measurement, MeterReading, Probe, TestMode};
pub use network::NetworkGraph;
pub use simulator::{SessionReport, Simulator};
pub use solver::{CircuitState, Connectivity, ConnectivitySolver};

// Error types
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
