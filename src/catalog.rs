use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Named terminal on a component. `x`/`y` are percent offsets inside the
/// component footprint and only matter to renderers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConnectionPoint {
    pub id: &'static str,
    pub x: f64,
    pub y: f64,
}

const fn point(id: &'static str, x: f64, y: f64) -> ConnectionPoint {
    ConnectionPoint { id, x, y }
}

/// Internal conduction path between two terminals of the same component.
/// Conducts from `from` to `to` only when the component's toggle state equals
/// `when_toggled` and the component is not faulted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassThrough {
    pub from: &'static str,
    pub to: &'static str,
    pub when_toggled: bool,
}

/// Per-type behavior table consulted by the solver and evaluator.
#[derive(Debug)]
pub struct TypeBehavior {
    pub terminals: &'static [ConnectionPoint],
    pub pass_through: &'static [PassThrough],
    pub is_load: bool,
}

static POWER_SOURCE: TypeBehavior = TypeBehavior {
    terminals: &[point("L", 25.0, 80.0), point("N", 50.0, 80.0), point("PE", 75.0, 80.0)],
    pass_through: &[],
    is_load: false,
};

static SOCKET: TypeBehavior = TypeBehavior {
    terminals: &[point("L", 30.0, 60.0), point("N", 70.0, 60.0), point("PE", 50.0, 25.0)],
    pass_through: &[],
    is_load: false,
};

static SOCKET_DOUBLE: TypeBehavior = TypeBehavior {
    terminals: &[point("L", 20.0, 60.0), point("N", 80.0, 60.0), point("PE", 50.0, 25.0)],
    pass_through: &[],
    is_load: false,
};

static SWITCH: TypeBehavior = TypeBehavior {
    terminals: &[point("L_in", 30.0, 50.0), point("L_out", 70.0, 50.0)],
    pass_through: &[PassThrough {
        from: "L_in",
        to: "L_out",
        when_toggled: true,
    }],
    is_load: false,
};

static LIGHT: TypeBehavior = TypeBehavior {
    terminals: &[point("L", 30.0, 70.0), point("N", 70.0, 70.0), point("PE", 50.0, 90.0)],
    pass_through: &[],
    is_load: true,
};

static JUNCTION_BOX: TypeBehavior = TypeBehavior {
    terminals: &[
        point("L", 20.0, 50.0),
        point("N", 80.0, 50.0),
        point("PE", 50.0, 85.0),
        point("SW", 50.0, 15.0),
    ],
    pass_through: &[],
    is_load: false,
};

/// Kinds of component that can be placed on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentType {
    Socket,
    SocketDouble,
    Switch,
    Light,
    JunctionBox,
    PowerSource,
}

impl ComponentType {
    pub const ALL: [ComponentType; 6] = [
        ComponentType::Socket,
        ComponentType::SocketDouble,
        ComponentType::Switch,
        ComponentType::Light,
        ComponentType::JunctionBox,
        ComponentType::PowerSource,
    ];

    pub fn behavior(self) -> &'static TypeBehavior {
        match self {
            ComponentType::Socket => &SOCKET,
            ComponentType::SocketDouble => &SOCKET_DOUBLE,
            ComponentType::Switch => &SWITCH,
            ComponentType::Light => &LIGHT,
            ComponentType::JunctionBox => &JUNCTION_BOX,
            ComponentType::PowerSource => &POWER_SOURCE,
        }
    }

    /// Ordered terminals for this component type
    pub fn connection_points(self) -> &'static [ConnectionPoint] {
        self.behavior().terminals
    }

    pub fn has_point(self, point_id: &str) -> bool {
        self.connection_points().iter().any(|p| p.id == point_id)
    }

    /// Internal paths that conduct for the given toggle state
    pub fn conducting_paths(self, toggled: bool) -> impl Iterator<Item = &'static PassThrough> {
        self.behavior()
            .pass_through
            .iter()
            .filter(move |path| path.when_toggled == toggled)
    }

    /// Returns true if the type has any toggle-dependent pass-through
    pub fn is_switching(self) -> bool {
        !self.behavior().pass_through.is_empty()
    }

    pub fn is_load(self) -> bool {
        self.behavior().is_load
    }

    pub fn is_power_source(self) -> bool {
        matches!(self, ComponentType::PowerSource)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentType::Socket => "socket",
            ComponentType::SocketDouble => "socket-double",
            ComponentType::Switch => "switch",
            ComponentType::Light => "light",
            ComponentType::JunctionBox => "junction-box",
            ComponentType::PowerSource => "power-source",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentType::ALL
            .iter()
            .copied()
            .find(|ct| ct.as_str() == s)
            .ok_or_else(|| anyhow!("Unknown component type: {}", s))
    }
}

/// Catalog lookup by type
pub fn connection_points(component_type: ComponentType) -> &'static [ConnectionPoint] {
    component_type.connection_points()
}
