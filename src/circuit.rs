use std::collections::{HashMap, HashSet};
use serde::{Deserialize, Serialize, Serializer};

pub use crate::catalog::{ComponentType, ConnectionPoint};
use crate::error::EngineError;

/// Build the graph key of a terminal
pub fn terminal_key(component_id: &str, point_id: &str) -> String {
    format!("{}-{}", component_id, point_id)
}

/// Position on the board, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Fault states a placed component can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentFault {
    OpenCircuit,
}

/// A component placed on the board. Connection points are not stored: they
/// are emitted from the catalog on serialization and ignored when read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedComponent {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    #[serde(default)]
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_toggled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<ComponentFault>,
}

impl Serialize for PlacedComponent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Snapshot<'a> {
            id: &'a str,
            #[serde(rename = "type")]
            component_type: ComponentType,
            position: Position,
            #[serde(skip_serializing_if = "Option::is_none")]
            is_toggled: Option<bool>,
            #[serde(skip_serializing_if = "Option::is_none")]
            is_on: Option<bool>,
            #[serde(skip_serializing_if = "Option::is_none")]
            fault: Option<ComponentFault>,
            connection_points: &'static [ConnectionPoint],
        }

        Snapshot {
            id: &self.id,
            component_type: self.component_type,
            position: self.position,
            is_toggled: self.is_toggled,
            is_on: self.is_on,
            fault: self.fault,
            connection_points: self.connection_points(),
        }
        .serialize(serializer)
    }
}

impl PlacedComponent {
    pub fn new(id: impl Into<String>, component_type: ComponentType) -> Self {
        let mut component = PlacedComponent {
            id: id.into(),
            component_type,
            position: Position::default(),
            is_toggled: None,
            is_on: None,
            fault: None,
        };
        match component_type {
            ComponentType::Switch => component.is_toggled = Some(false),
            ComponentType::PowerSource => component.is_on = Some(false),
            _ => {}
        }
        component
    }

    pub fn new_power_source(id: impl Into<String>, on: bool) -> Self {
        let mut component = Self::new(id, ComponentType::PowerSource);
        component.is_on = Some(on);
        component
    }

    pub fn new_switch(id: impl Into<String>, toggled: bool) -> Self {
        let mut component = Self::new(id, ComponentType::Switch);
        component.is_toggled = Some(toggled);
        component
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn with_fault(mut self, fault: ComponentFault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Terminals of this component, always the catalog entry for its type
    pub fn connection_points(&self) -> &'static [ConnectionPoint] {
        self.component_type.connection_points()
    }

    pub fn terminal_key(&self, point_id: &str) -> String {
        terminal_key(&self.id, point_id)
    }

    pub fn toggled(&self) -> bool {
        self.is_toggled.unwrap_or(false)
    }

    pub fn is_powered_on(&self) -> bool {
        self.is_on.unwrap_or(false)
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }
}

/// Insulation colour of a wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireColor {
    L,
    N,
    PE,
    #[serde(rename = "switched")]
    Switched,
}

impl std::str::FromStr for WireColor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "L" => Ok(WireColor::L),
            "N" => Ok(WireColor::N),
            "PE" => Ok(WireColor::PE),
            "switched" => Ok(WireColor::Switched),
            _ => Err(anyhow::anyhow!("Unknown wire colour: {}", s)),
        }
    }
}

/// Wire joining two terminals. Undirected for connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wire {
    pub id: String,
    pub start_component_id: String,
    pub start_point_id: String,
    pub end_component_id: String,
    pub end_point_id: String,
    pub color: WireColor,
}

impl Wire {
    pub fn new(
        id: impl Into<String>,
        (start_component_id, start_point_id): (&str, &str),
        (end_component_id, end_point_id): (&str, &str),
        color: WireColor,
    ) -> Self {
        Wire {
            id: id.into(),
            start_component_id: start_component_id.to_string(),
            start_point_id: start_point_id.to_string(),
            end_component_id: end_component_id.to_string(),
            end_point_id: end_point_id.to_string(),
            color,
        }
    }

    pub fn start_key(&self) -> String {
        terminal_key(&self.start_component_id, &self.start_point_id)
    }

    pub fn end_key(&self) -> String {
        terminal_key(&self.end_component_id, &self.end_point_id)
    }
}

/// Complete circuit snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub components: Vec<PlacedComponent>,
    #[serde(default)]
    pub wires: Vec<Wire>,
}

impl Circuit {
    pub fn new(title: impl Into<String>) -> Self {
        Circuit {
            title: title.into(),
            components: Vec::new(),
            wires: Vec::new(),
        }
    }

    /// Add a component, rejecting duplicate ids
    pub fn add_component(&mut self, component: PlacedComponent) -> Result<(), EngineError> {
        if self.component(&component.id).is_some() {
            return Err(EngineError::DuplicateComponent { id: component.id });
        }
        self.components.push(component);
        Ok(())
    }

    /// Add a wire after checking that both of its terminals exist
    pub fn add_wire(&mut self, wire: Wire) -> Result<(), EngineError> {
        if self.wire(&wire.id).is_some() {
            return Err(EngineError::DuplicateWire { id: wire.id });
        }
        self.check_terminal(&wire.start_component_id, &wire.start_point_id)?;
        self.check_terminal(&wire.end_component_id, &wire.end_point_id)?;
        self.wires.push(wire);
        Ok(())
    }

    /// Remove a wire by id and return it
    pub fn remove_wire(&mut self, wire_id: &str) -> Option<Wire> {
        let index = self.wires.iter().position(|w| w.id == wire_id)?;
        Some(self.wires.remove(index))
    }

    pub fn component(&self, id: &str) -> Option<&PlacedComponent> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn component_mut(&mut self, id: &str) -> Option<&mut PlacedComponent> {
        self.components.iter_mut().find(|c| c.id == id)
    }

    pub fn wire(&self, id: &str) -> Option<&Wire> {
        self.wires.iter().find(|w| w.id == id)
    }

    /// First power source in component order
    pub fn power_source(&self) -> Option<&PlacedComponent> {
        self.components
            .iter()
            .find(|c| c.component_type.is_power_source())
    }

    pub fn components_of_type(&self, component_type: ComponentType) -> Vec<&PlacedComponent> {
        self.components
            .iter()
            .filter(|c| c.component_type == component_type)
            .collect()
    }

    pub fn has_terminal(&self, component_id: &str, point_id: &str) -> bool {
        self.component(component_id)
            .map(|c| c.component_type.has_point(point_id))
            .unwrap_or(false)
    }

    fn check_terminal(&self, component_id: &str, point_id: &str) -> Result<(), EngineError> {
        if self.has_terminal(component_id, point_id) {
            Ok(())
        } else {
            Err(EngineError::unknown_terminal(component_id, point_id))
        }
    }

    /// Flip a switch and return its new state
    pub fn toggle_switch(&mut self, id: &str) -> Result<bool, EngineError> {
        let component = self
            .component_mut(id)
            .ok_or_else(|| EngineError::UnknownComponent { id: id.to_string() })?;
        if !component.component_type.is_switching() {
            return Err(EngineError::WrongComponentType {
                id: id.to_string(),
                expected: ComponentType::Switch.to_string(),
                actual: component.component_type.to_string(),
            });
        }
        let toggled = !component.toggled();
        component.is_toggled = Some(toggled);
        Ok(toggled)
    }

    /// Switch the first power source on or off
    pub fn set_power(&mut self, on: bool) -> Result<(), EngineError> {
        let source = self
            .components
            .iter_mut()
            .find(|c| c.component_type.is_power_source())
            .ok_or_else(|| EngineError::UnknownComponent {
                id: ComponentType::PowerSource.to_string(),
            })?;
        source.is_on = Some(on);
        Ok(())
    }

    /// Check id uniqueness and wire references
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        for component in &self.components {
            if !seen.insert(component.id.as_str()) {
                return Err(EngineError::DuplicateComponent {
                    id: component.id.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for wire in &self.wires {
            if !seen.insert(wire.id.as_str()) {
                return Err(EngineError::DuplicateWire { id: wire.id.clone() });
            }
            self.check_terminal(&wire.start_component_id, &wire.start_point_id)?;
            self.check_terminal(&wire.end_component_id, &wire.end_point_id)?;
        }

        Ok(())
    }

    /// Print circuit summary
    pub fn print_summary(&self) {
        println!("Circuit: {}", self.title);
        println!("Components: {}", self.components.len());
        println!("Wires: {}", self.wires.len());

        let mut type_counts: HashMap<ComponentType, usize> = HashMap::new();
        for component in &self.components {
            *type_counts.entry(component.component_type).or_insert(0) += 1;
        }

        for component_type in ComponentType::ALL {
            if let Some(count) = type_counts.get(&component_type) {
                println!("  {}: {}", component_type, count);
            }
        }
    }
}
