use crate::formula::{Formula, Predicate};
use crate::machine::MachineView;
use crate::resource::ResourceType;

// ---------------------------------------------------------------------------
// Flow descriptors
// ---------------------------------------------------------------------------

/// How fast an input drains, per second.
///
/// `maximum` throttles the drain to what the machine's outputs can actually
/// absorb this tick; `None` means the input drains at `amount` regardless
/// (catalysts, fuel that burns while idle).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consumption {
    pub amount: f64,
    pub maximum: Option<f64>,
}

impl Consumption {
    pub const NONE: Consumption = Consumption {
        amount: 0.0,
        maximum: None,
    };

    pub fn fixed(amount: f64) -> Self {
        Self {
            amount,
            maximum: None,
        }
    }

    pub fn throttled(amount: f64, maximum: f64) -> Self {
        Self {
            amount,
            maximum: Some(maximum),
        }
    }

    /// Effective rate: the lesser of `amount` and `maximum`, never negative.
    pub fn rate(&self) -> f64 {
        let rate = match self.maximum {
            Some(max) => self.amount.min(max),
            None => self.amount,
        };
        if rate.is_finite() { rate.max(0.0) } else { 0.0 }
    }
}

/// What an output yields per second at full throughput.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Production {
    pub resource: Option<ResourceType>,
    pub amount: f64,
}

impl Production {
    pub const NONE: Production = Production {
        resource: None,
        amount: 0.0,
    };
}

/// One input an output draws on: `amount` per second of `resource` from
/// input port `input_id`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Requirement {
    pub resource: Option<ResourceType>,
    pub amount: f64,
    pub input_id: usize,
}

// ---------------------------------------------------------------------------
// Port definitions
// ---------------------------------------------------------------------------

/// A buffered input slot on a machine type.
#[derive(Debug, Clone)]
pub struct InputPortDef {
    pub accepts: Formula<Vec<ResourceType>>,
    pub capacity: Formula<f64>,
    pub consumes: fn(&MachineView<'_>) -> Consumption,
    pub label: Option<&'static str>,
    pub is_unlocked: Option<Predicate>,
}

impl InputPortDef {
    pub fn new(
        accepts: Formula<Vec<ResourceType>>,
        capacity: Formula<f64>,
        consumes: fn(&MachineView<'_>) -> Consumption,
    ) -> Self {
        Self {
            accepts,
            capacity,
            consumes,
            label: None,
            is_unlocked: None,
        }
    }

    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn unlocked_when(mut self, predicate: Predicate) -> Self {
        self.is_unlocked = Some(predicate);
        self
    }

    pub fn is_unlocked(&self, view: &MachineView<'_>) -> bool {
        self.is_unlocked.is_none_or(|p| p(view))
    }

    /// Whether the port currently admits `resource`. Locked ports admit
    /// nothing.
    pub fn admits(&self, view: &MachineView<'_>, resource: ResourceType) -> bool {
        self.is_unlocked(view) && self.accepts.eval(view).contains(&resource)
    }

    /// Capacity, or zero while locked.
    pub fn capacity(&self, view: &MachineView<'_>) -> f64 {
        if self.is_unlocked(view) {
            sanitize(self.capacity.eval(view))
        } else {
            0.0
        }
    }

    /// Consumption, or nothing while locked.
    pub fn consumption(&self, view: &MachineView<'_>) -> Consumption {
        if self.is_unlocked(view) {
            (self.consumes)(view)
        } else {
            Consumption::NONE
        }
    }
}

/// A buffered output slot on a machine type.
#[derive(Debug, Clone)]
pub struct OutputPortDef {
    pub id: &'static str,
    pub capacity: Formula<f64>,
    pub produces: fn(&MachineView<'_>) -> Production,
    pub requires: fn(&MachineView<'_>) -> Vec<Requirement>,
    pub is_unlocked: Option<Predicate>,
}

impl OutputPortDef {
    pub fn new(
        id: &'static str,
        capacity: Formula<f64>,
        produces: fn(&MachineView<'_>) -> Production,
        requires: fn(&MachineView<'_>) -> Vec<Requirement>,
    ) -> Self {
        Self {
            id,
            capacity,
            produces,
            requires,
            is_unlocked: None,
        }
    }

    pub fn unlocked_when(mut self, predicate: Predicate) -> Self {
        self.is_unlocked = Some(predicate);
        self
    }

    pub fn is_unlocked(&self, view: &MachineView<'_>) -> bool {
        self.is_unlocked.is_none_or(|p| p(view))
    }

    pub fn capacity(&self, view: &MachineView<'_>) -> f64 {
        if self.is_unlocked(view) {
            sanitize(self.capacity.eval(view))
        } else {
            0.0
        }
    }

    pub fn production(&self, view: &MachineView<'_>) -> Production {
        if self.is_unlocked(view) {
            (self.produces)(view)
        } else {
            Production::NONE
        }
    }

    pub fn requirements(&self, view: &MachineView<'_>) -> Vec<Requirement> {
        if self.is_unlocked(view) {
            (self.requires)(view)
        } else {
            Vec::new()
        }
    }
}

/// Requirement list for outputs that need no input.
pub fn no_requirements(_view: &MachineView<'_>) -> Vec<Requirement> {
    Vec::new()
}

fn sanitize(capacity: f64) -> f64 {
    if capacity.is_finite() { capacity.max(0.0) } else { 0.0 }
}

// ---------------------------------------------------------------------------
// Admission / drain errors
// ---------------------------------------------------------------------------

/// Why resources could not be moved into or out of a port.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("unknown town {0}")]
    UnknownTown(String),
    #[error("no machine in slot {0}")]
    UnknownMachine(u32),
    #[error("machine type {0} is not registered")]
    UnknownType(String),
    #[error("machine has no input {0}")]
    NoSuchInput(usize),
    #[error("machine has no output {0}")]
    NoSuchOutput(usize),
    #[error("input {0} is locked")]
    Locked(usize),
    #[error("input does not accept {0}")]
    NotAccepted(ResourceType),
    #[error("port already holds {0}")]
    Occupied(ResourceType),
    #[error("port is full")]
    Full,
    #[error("nothing to move")]
    Empty,
}
