//! Lifecycle hooks around create, query, update and delete.
//!
//! Stages are named callbacks bound to an `(OperationKind, Phase)` pair. They run in
//! registration order against the operation's `Scope`; the first stage that returns an
//! error stops the pipeline and the error is reported as `Error::Hook`.
//!
//! The process-wide default registry is built once on first use. Every `Db` takes a
//! clone of it and mutates its own copy, so steady-state reads never take a lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use ormscope_core::{Result, Value};
use ormscope_query::Scope;
use ormscope_query::statement::DELETED_AT;

/// Category of operation a stage is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Query,
    Update,
    Delete,
}

impl OperationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Query => "query",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

/// When a stage runs relative to statement compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::After => "after",
        }
    }
}

/// Callback signature for a stage.
pub type StageFn = Arc<dyn Fn(&mut Scope) -> Result<()> + Send + Sync>;

#[derive(Clone)]
struct Stage {
    name: String,
    run: StageFn,
}

/// Ordered, named stages per `(OperationKind, Phase)`.
#[derive(Clone, Default)]
pub struct HookRegistry {
    stages: HashMap<(OperationKind, Phase), Vec<Stage>>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.stages.keys().collect();
        keys.sort_by_key(|(k, p)| (k.as_str(), p.as_str()));
        let mut map = f.debug_map();
        for key in keys {
            let names: Vec<&str> = self.stages[key].iter().map(|s| s.name.as_str()).collect();
            map.entry(&format!("{}/{}", key.0.as_str(), key.1.as_str()), &names);
        }
        map.finish()
    }
}

impl HookRegistry {
    /// A registry with no stages.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with the standard stages registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(OperationKind::Create, Phase::Before, "timestamps", |scope| {
            stamp_if_unset(scope, "created_at");
            stamp_if_unset(scope, "updated_at");
            Ok(())
        });
        registry.register(OperationKind::Update, Phase::Before, "timestamps", |scope| {
            if scope.has_column("updated_at") {
                scope.set_value("updated_at", Value::now());
            }
            Ok(())
        });
        registry.register(OperationKind::Delete, Phase::Before, "soft_delete", |scope| {
            if scope.has_column(DELETED_AT) && !scope.search().is_unscoped() {
                scope.set_soft_delete(true);
                scope.set_value(DELETED_AT, Value::now());
            }
            Ok(())
        });
        registry.register(
            OperationKind::Query,
            Phase::Before,
            "soft_delete_scope",
            |scope| {
                if scope.has_column(DELETED_AT) {
                    scope.search_mut().scope_soft_delete(DELETED_AT);
                }
                Ok(())
            },
        );
        registry
    }

    /// The process-wide default registry.
    pub fn global() -> &'static HookRegistry {
        static GLOBAL: OnceLock<HookRegistry> = OnceLock::new();
        GLOBAL.get_or_init(HookRegistry::with_defaults)
    }

    /// Register a stage. A stage with the same name is replaced in place.
    pub fn register<F>(&mut self, kind: OperationKind, phase: Phase, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut Scope) -> Result<()> + Send + Sync + 'static,
    {
        let stage = Stage {
            name: name.to_string(),
            run: Arc::new(f),
        };
        let stages = self.stages.entry((kind, phase)).or_default();
        match stages.iter_mut().find(|s| s.name == name) {
            Some(existing) => {
                tracing::debug!(
                    kind = kind.as_str(),
                    phase = phase.as_str(),
                    stage = name,
                    "Replacing hook stage"
                );
                *existing = stage;
            }
            None => stages.push(stage),
        }
        self
    }

    /// Remove a stage by name. Returns whether it existed.
    pub fn remove(&mut self, kind: OperationKind, phase: Phase, name: &str) -> bool {
        let Some(stages) = self.stages.get_mut(&(kind, phase)) else {
            return false;
        };
        let before = stages.len();
        stages.retain(|s| s.name != name);
        before != stages.len()
    }

    /// Stage names for a pair, in run order.
    pub fn stage_names(&self, kind: OperationKind, phase: Phase) -> Vec<&str> {
        self.stages
            .get(&(kind, phase))
            .map(|stages| stages.iter().map(|s| s.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Run the stages for a pair. Stops at the first error.
    pub fn run(&self, phase: Phase, kind: OperationKind, scope: &mut Scope) -> Result<()> {
        let Some(stages) = self.stages.get(&(kind, phase)) else {
            return Ok(());
        };
        for stage in stages {
            tracing::trace!(
                kind = kind.as_str(),
                phase = phase.as_str(),
                stage = %stage.name,
                "Running hook stage"
            );
            if let Err(err) = (stage.run)(scope) {
                tracing::debug!(stage = %stage.name, error = %err, "Hook stage failed");
                return Err(ormscope_core::Error::hook(&stage.name, err));
            }
        }
        Ok(())
    }
}

fn stamp_if_unset(scope: &mut Scope, column: &str) {
    if !scope.has_column(column) {
        return;
    }
    if scope.value(column).is_none_or(Value::is_null) {
        scope.set_value(column, Value::now());
    }
}
