//! Update protocol
//!
//! Runs when the host delivers a new module version for a file whose export
//! a binding tracks. Either every live instance migrates and the new target
//! is installed, or the host is asked to reload from scratch and nothing is
//! touched.

use relive_kernel::{
    CallError, CallResult, Class, Configuration, ExportKind, HotContext, Module, Object, Target,
};
use tracing::{debug, info, warn};

use crate::event::SwapEvent;
use crate::handle::{ClassHandle, SwapHandle};
use crate::registry::{ExportBinding, Registry};

/// Why a binding could not be migrated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum InvalidationReason {
    /// Function became class or the other way round, or the export is no
    /// longer a function or class at all.
    #[error("[relive] Incompatible swap kind change for {name} ({from} -> {to}), invalidating...")]
    KindChanged {
        name: String,
        from: ExportKind,
        to: &'static str,
    },

    /// Resolved configuration differs structurally.
    #[error("[relive] {name} options changed ({previous} -> {current}), invalidating...")]
    OptionsChanged {
        name: String,
        previous: Configuration,
        current: Configuration,
    },

    /// The export was renamed or removed.
    #[error("[relive] {name} not found in new module, invalidating...")]
    MissingExport { name: String },

    /// The new constructor failed while rebuilding an instance.
    #[error("[relive] Failed to reconstruct {name} instance: {error}, invalidating...")]
    ReconstructFailed { name: String, error: CallError },
}

impl InvalidationReason {
    pub fn name(&self) -> &str {
        match self {
            InvalidationReason::KindChanged { name, .. }
            | InvalidationReason::OptionsChanged { name, .. }
            | InvalidationReason::MissingExport { name }
            | InvalidationReason::ReconstructFailed { name, .. } => name,
        }
    }
}

/// Result of one update event for one binding.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// No module delivered; nothing changed.
    Unresolved,
    /// Host asked to reload; nothing changed.
    Invalidated(InvalidationReason),
    /// New target installed.
    Swapped { instances: usize, reconstructed: bool },
}

/// Check `target` and `configuration` from a module version against the
/// stored binding.
pub(crate) fn check_compatible(
    binding: &ExportBinding,
    target: &Target,
    configuration: &Configuration,
) -> Result<(), InvalidationReason> {
    if target.kind() != Some(binding.kind()) {
        return Err(InvalidationReason::KindChanged {
            name: binding.name().to_string(),
            from: binding.kind(),
            to: target.describe(),
        });
    }
    if !binding.configuration().is_compatible_with(configuration) {
        return Err(InvalidationReason::OptionsChanged {
            name: binding.name().to_string(),
            previous: binding.configuration().clone(),
            current: configuration.clone(),
        });
    }
    Ok(())
}

/// Report `reason` to the host and to event subscribers.
pub(crate) fn invalidate(
    hot: &dyn HotContext,
    registry: &Registry,
    reason: InvalidationReason,
) -> UpdateOutcome {
    warn!("{}", reason);
    hot.invalidate(&reason.to_string());
    registry.emit(SwapEvent::Invalidated {
        name: reason.name().to_string(),
        reason: reason.clone(),
    });
    UpdateOutcome::Invalidated(reason)
}

/// Apply a delivered module version to one binding.
pub fn apply(
    hot: &dyn HotContext,
    registry: &Registry,
    binding: &ExportBinding,
    module: Option<&Module>,
    prune_collected: bool,
) -> UpdateOutcome {
    let name = binding.name();

    let Some(module) = module else {
        debug!("No replacement module for {}, waiting for next update", name);
        registry.emit(SwapEvent::Unresolved {
            name: name.to_string(),
        });
        return UpdateOutcome::Unresolved;
    };

    let Some(declaration) = module.get(name) else {
        return invalidate(
            hot,
            registry,
            InvalidationReason::MissingExport {
                name: name.to_string(),
            },
        );
    };

    let configuration = Configuration::resolve(declaration.options.as_ref());
    if let Err(reason) = check_compatible(binding, &declaration.target, &configuration) {
        return invalidate(hot, registry, reason);
    }

    let (instances, reconstructed) = match (binding.handle(), &declaration.target) {
        (SwapHandle::Function(handle), Target::Function(new_target)) => {
            handle.install(new_target.clone());
            (0, false)
        }
        (SwapHandle::Class(handle), Target::Class(new_target)) => {
            let reconstruct = binding.configuration().reconstruct();
            match migrate(binding, handle, new_target, reconstruct, prune_collected) {
                Ok(count) => {
                    handle.install(new_target.clone());
                    (count, reconstruct)
                }
                Err(error) => {
                    return invalidate(
                        hot,
                        registry,
                        InvalidationReason::ReconstructFailed {
                            name: name.to_string(),
                            error,
                        },
                    );
                }
            }
        }
        // Kinds were checked above.
        (handle, target) => {
            return invalidate(
                hot,
                registry,
                InvalidationReason::KindChanged {
                    name: name.to_string(),
                    from: handle.kind(),
                    to: target.describe(),
                },
            );
        }
    };

    binding.record_swap();
    info!("Swapped {} {} ({} instances)", binding.kind(), name, instances);
    registry.emit(SwapEvent::Swapped {
        name: name.to_string(),
        kind: binding.kind(),
        instances,
        reconstructed,
    });
    UpdateOutcome::Swapped {
        instances,
        reconstructed,
    }
}

/// Move every live instance of `binding` onto `new_target`.
///
/// With `reconstruct`, every fresh object is built before any instance is
/// touched, so a failing constructor leaves all instances as they were.
fn migrate(
    binding: &ExportBinding,
    handle: &ClassHandle,
    new_target: &Class,
    reconstruct: bool,
    prune_collected: bool,
) -> CallResult<usize> {
    if prune_collected {
        let pruned = binding.instances().prune();
        if pruned > 0 {
            debug!("Pruned {} released {} instances", pruned, binding.name());
        }
    }

    let live = binding.instances().live();

    let fresh: Vec<Object> = if reconstruct {
        let skip = handle.skip_token();
        live.iter()
            .map(|(_, args)| handle.construct_with(new_target, &skip.prepend(args)))
            .collect::<CallResult<_>>()?
    } else {
        Vec::new()
    };

    for (index, (instance, _)) in live.iter().enumerate() {
        if let Some(fresh) = fresh.get(index) {
            debug!(
                "Reconstructing {} instance and replacing existing instance",
                binding.name()
            );
            instance.assign(fresh);
        }
        instance.rebind(new_target);
    }

    Ok(live.len())
}
