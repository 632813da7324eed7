//! Live-swap controller
//!
//! Entry point the rewritten module code calls once per export on every
//! evaluation. Hands out the binding's stable handle during development and
//! the raw target otherwise.

use std::sync::{Arc, Weak};

use futures::FutureExt;
use relive_kernel::config;
use relive_kernel::{
    Configuration, Declaration, Export, HotContext, Module, RuntimeConfig, SwapError, SwapOptions,
    SwapResult, Target,
};
use tracing::{debug, info};

use crate::event::SwapEvent;
use crate::registry::{ExportBinding, Registry};
use crate::update;

/// Live-swap runtime
#[derive(Debug, Clone, Default)]
pub struct Runtime {
    config: Arc<RuntimeConfig>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Runtime configured from a TOML, JSON or YAML file.
    pub fn from_config_file(path: &str) -> SwapResult<Self> {
        let config = config::load_config(path)?;
        debug!("Loaded runtime config from {}", path);
        Ok(Self::new(config))
    }

    /// Runtime configured from `RELIVE_*` environment variables.
    pub fn from_env() -> SwapResult<Self> {
        Ok(Self::new(config::from_env()?))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The registry kept in `hot`'s data bag
    pub fn registry(&self, hot: &dyn HotContext) -> Arc<Registry> {
        Registry::for_context(hot, &self.config)
    }

    /// Loader for export `name` of the module owning `hot`.
    ///
    /// `hot` is `None` outside development.
    pub fn loader(&self, hot: Option<Arc<dyn HotContext>>, name: &str) -> Loader {
        Loader {
            config: self.config.clone(),
            hot,
            name: name.to_string(),
        }
    }
}

/// Wraps one named export.
#[derive(Clone)]
pub struct Loader {
    config: Arc<RuntimeConfig>,
    hot: Option<Arc<dyn HotContext>>,
    name: String,
}

impl Loader {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bare form. Never reconstructs.
    pub fn load(&self, target: impl Into<Target>) -> SwapResult<Export> {
        self.hotswap(None, target.into())
    }

    /// Options form. `reconstruct` defaults to true here.
    pub fn load_with(&self, options: SwapOptions, target: impl Into<Target>) -> SwapResult<Export> {
        self.hotswap(Some(&options), target.into())
    }

    pub fn declare(&self, declaration: Declaration) -> SwapResult<Export> {
        self.hotswap(declaration.options.as_ref(), declaration.target)
    }

    /// Decorator form; `None` behaves like [`Loader::load`].
    pub fn decorator(&self, options: Option<SwapOptions>) -> Decorator {
        Decorator {
            loader: self.clone(),
            options,
        }
    }

    fn hotswap(&self, options: Option<&SwapOptions>, target: Target) -> SwapResult<Export> {
        let configuration = Configuration::resolve(options);

        let hot = match &self.hot {
            Some(hot) if self.config.enabled => hot,
            _ => return Ok(Export::from(target)),
        };

        let Some(kind) = target.kind() else {
            return Err(SwapError::UnsupportedKind {
                name: self.name.clone(),
                found: target.describe(),
            });
        };

        let registry = Registry::for_context(hot.as_ref(), &self.config);

        let binding = match registry.get(&self.name) {
            Some(existing) => {
                if let Err(reason) = update::check_compatible(&existing, &target, &configuration) {
                    update::invalidate(hot.as_ref(), &registry, reason);
                    return Ok(Export::from(target));
                }
                // Same handle, newest target. Existing instances move over
                // when the accept callback runs.
                existing.handle().install(&target);
                info!("Taking over {}", self.name);
                registry.emit(SwapEvent::TakenOver {
                    name: self.name.clone(),
                    kind,
                });
                existing
            }
            None => {
                let binding = ExportBinding::create(
                    &self.name,
                    &target,
                    configuration,
                    registry.skip_token(),
                )
                .ok_or_else(|| SwapError::UnsupportedKind {
                    name: self.name.clone(),
                    found: target.describe(),
                })?;
                let binding = registry.bind(binding);
                info!("Hot-swapping {}: {}", kind, self.name);
                registry.emit(SwapEvent::Bound {
                    name: self.name.clone(),
                    kind,
                });
                binding
            }
        };

        self.register_accept(hot, registry, binding.clone());
        Ok(binding.export())
    }

    fn register_accept(
        &self,
        hot: &Arc<dyn HotContext>,
        registry: Arc<Registry>,
        binding: Arc<ExportBinding>,
    ) {
        // Weak: the context owns its callbacks.
        let weak: Weak<dyn HotContext> = Arc::downgrade(hot);
        let prune = self.config.prune_collected;

        hot.accept(Box::new(move |module: Option<Arc<Module>>| {
            let weak = weak.clone();
            let registry = registry.clone();
            let binding = binding.clone();
            async move {
                let Some(hot) = weak.upgrade() else {
                    debug!("Module context for {} dropped, skipping update", binding.name());
                    return;
                };
                update::apply(
                    hot.as_ref(),
                    &registry,
                    &binding,
                    module.as_deref(),
                    prune,
                );
            }
            .boxed()
        }));
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("name", &self.name)
            .field("development", &self.hot.is_some())
            .finish()
    }
}

/// Decorator-application form of a [`Loader`].
#[derive(Debug, Clone)]
pub struct Decorator {
    loader: Loader,
    options: Option<SwapOptions>,
}

impl Decorator {
    pub fn apply(&self, target: impl Into<Target>) -> SwapResult<Export> {
        self.loader.hotswap(self.options.as_ref(), target.into())
    }
}
