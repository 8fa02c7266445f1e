//! Ordered hook registry.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::dialect::normalize_dialect;
use crate::error::{CopyError, Result};

use super::{builtin, DialectFilter, Event, Hook, HookContext, HookRole, Stage};

type HookFn = dyn Fn(&mut HookContext<'_>) -> Result<()> + Send + Sync;

/// Registry of correction hooks.
///
/// Built once before a run and shared read-only by every table worker.
/// Hooks are kept in registration order, which is also dispatch order.
///
/// ```rust,ignore
/// let mut hooks = HookRegistry::with_builtins();
/// hooks.before("trim-names", Event::CopyRow, HookRole::Source, DialectFilter::Any, |ctx| {
///     // ...
///     Ok(())
/// });
/// let pipeline = CopyPipeline::new(job, hooks);
/// ```
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in dialect corrections registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for hook in builtin::builtins() {
            registry.register_arc(hook);
        }
        registry
    }

    /// Append a hook.
    pub fn register(&mut self, hook: impl Hook + 'static) -> &mut Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Append a shared hook.
    pub fn register_arc(&mut self, hook: Arc<dyn Hook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    /// Register a closure to run before `event`.
    pub fn before<F>(
        &mut self,
        name: impl Into<String>,
        event: Event,
        role: HookRole,
        dialect: DialectFilter,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&mut HookContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register(FnHook::new(name, Stage::before(event), role, dialect, f))
    }

    /// Register a closure to run after `event`.
    pub fn after<F>(
        &mut self,
        name: impl Into<String>,
        event: Event,
        role: HookRole,
        dialect: DialectFilter,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&mut HookContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register(FnHook::new(name, Stage::after(event), role, dialect, f))
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Hook names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Whether any hook is registered on either side of `event`.
    pub fn handles(&self, event: Event) -> bool {
        self.hooks.iter().any(|h| h.stage().event == event)
    }

    /// Run every hook registered for `stage` whose dialect filter matches the
    /// stores in `ctx`, in registration order. Stops at the first failure.
    pub async fn dispatch(&self, stage: Stage, ctx: &mut HookContext<'_>) -> Result<()> {
        if self.hooks.is_empty() {
            return Ok(());
        }

        let source_dialect = normalize_dialect(ctx.source.dialect());
        let destination_dialect = normalize_dialect(ctx.destination.dialect());

        for hook in &self.hooks {
            if !hook.applies(stage, &source_dialect, &destination_dialect) {
                continue;
            }
            debug!(
                "Hook {} firing {} ({})",
                hook.name(),
                stage,
                ctx.args.table().unwrap_or("*")
            );
            hook.apply(ctx).await.map_err(|e| match e {
                CopyError::Hook { .. } => e,
                other => CopyError::hook(hook.name(), other),
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.names())
            .finish()
    }
}

/// A hook backed by a synchronous closure.
pub struct FnHook {
    name: String,
    stage: Stage,
    role: HookRole,
    dialect: DialectFilter,
    f: Box<HookFn>,
}

impl FnHook {
    pub fn new<F>(
        name: impl Into<String>,
        stage: Stage,
        role: HookRole,
        dialect: DialectFilter,
        f: F,
    ) -> Self
    where
        F: Fn(&mut HookContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            stage,
            role,
            dialect,
            f: Box::new(f),
        }
    }
}

#[async_trait]
impl Hook for FnHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn role(&self) -> HookRole {
        self.role
    }

    fn dialect(&self) -> &DialectFilter {
        &self.dialect
    }

    async fn apply(&self, ctx: &mut HookContext<'_>) -> Result<()> {
        (self.f)(ctx)
    }
}
