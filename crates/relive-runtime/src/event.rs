//! Swap events broadcast by the registry

use relive_kernel::ExportKind;

use crate::update::InvalidationReason;

/// Live-swap event
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SwapEvent {
    /// First load of an export created its binding
    Bound { name: String, kind: ExportKind },
    /// A reload reused an existing binding
    TakenOver { name: String, kind: ExportKind },
    /// A new implementation was installed
    Swapped {
        name: String,
        kind: ExportKind,
        /// Live instances migrated
        instances: usize,
        /// Whether instance fields were rebuilt
        reconstructed: bool,
    },
    /// The host was asked for a full reload
    Invalidated {
        name: String,
        reason: InvalidationReason,
    },
    /// The host delivered no module; waiting for the next update
    Unresolved { name: String },
}

impl SwapEvent {
    /// Export name the event is about
    pub fn name(&self) -> &str {
        match self {
            SwapEvent::Bound { name, .. }
            | SwapEvent::TakenOver { name, .. }
            | SwapEvent::Swapped { name, .. }
            | SwapEvent::Invalidated { name, .. }
            | SwapEvent::Unresolved { name } => name,
        }
    }
}
