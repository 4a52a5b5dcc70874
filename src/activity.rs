//! The activity contract (§3, §4.1, §9).
//!
//! The canonical design discovers dependency/service/config fields by
//! reflecting on an activity struct. Rust has no runtime reflection, so
//! each activity instead builds an [`ActivityDescriptor`] — the typed
//! analogue of the reflected struct tags — declaring its edges up front.
//! Dependency and service handles are [`Injected<T>`] slots: write-once
//! cells the orchestrator fills in during wiring, read afterwards from
//! `init`/`execute`.

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

pub use pbsflow_common::ActivityId;

/// A write-once slot for a dependency or service handed to an activity by
/// the orchestrator before `init()` runs. Cloning shares the same slot —
/// the orchestrator wiring phase clones the slot out of the descriptor,
/// fills it in, and the activity's own clone (kept as a struct field) then
/// observes the same value.
pub struct Injected<T: ?Sized> {
    slot: Arc<OnceLock<Arc<T>>>,
}

impl<T: ?Sized> Clone for Injected<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: ?Sized> Default for Injected<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(OnceLock::new()),
        }
    }
}

impl<T: ?Sized> Injected<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the wired value. Panics if called before wiring completed —
    /// the orchestrator's nil-check (§4.1 step 6) guarantees this never
    /// happens for a named dependency that survives wiring into `init()`.
    pub fn get(&self) -> &T {
        self.slot
            .get()
            .expect("Injected<T> read before the orchestrator wired it")
            .as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.slot.get().is_some()
    }

    pub(crate) fn set(&self, value: Arc<T>) {
        // A slot is filled exactly once, by the orchestrator's single
        // wiring pass; a second `set` silently no-ops rather than panics.
        let _ = self.slot.set(value);
    }
}

type AssignFn = Box<dyn Fn(Arc<dyn Any + Send + Sync>) -> Result<(), String> + Send + Sync>;
type ConfigAssignFn = Box<dyn Fn(&serde_yaml::Value) -> Result<(), String> + Send + Sync>;

/// A named, body-accessible dependency edge.
pub(crate) struct NamedDependency {
    pub target_type: TypeId,
    pub target_type_name: &'static str,
    pub assign: AssignFn,
}

/// An anonymous, ordering-only dependency edge.
pub(crate) struct OrderingDependency {
    pub target_type: TypeId,
    pub target_type_name: &'static str,
}

/// A service requested from the factory registry.
pub(crate) struct ServiceDependency {
    pub service_type: TypeId,
    pub service_type_name: &'static str,
    pub assign: AssignFn,
}

/// A config field bound to a dotted path in the configuration tree.
pub(crate) struct ConfigDependency {
    pub path: String,
    pub assign: ConfigAssignFn,
}

/// The set of edges one activity declares. Built once by the activity's
/// [`Activity::descriptor`] and consumed during the orchestrator's wiring
/// phase; never touched again afterwards.
#[derive(Default)]
pub struct ActivityDescriptor {
    pub(crate) id: Option<ActivityId>,
    pub(crate) named_deps: Vec<NamedDependency>,
    pub(crate) ordering_deps: Vec<OrderingDependency>,
    pub(crate) services: Vec<ServiceDependency>,
    pub(crate) configs: Vec<ConfigDependency>,
}

impl ActivityDescriptor {
    pub fn new(id: ActivityId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    /// Declare a named (body-accessible) dependency on another activity of
    /// type `T`, filling `slot` once `T`'s instance has finished wiring.
    pub fn depends_on<T: Send + Sync + 'static>(mut self, slot: &Injected<T>) -> Self {
        let slot = slot.clone();
        self.named_deps.push(NamedDependency {
            target_type: TypeId::of::<T>(),
            target_type_name: std::any::type_name::<T>(),
            assign: Box::new(move |any: Arc<dyn Any + Send + Sync>| {
                any.downcast::<T>()
                    .map(|typed| slot.set(typed))
                    .map_err(|_| "dependency type mismatch".to_string())
            }),
        });
        self
    }

    /// Declare an anonymous, ordering-only dependency on another activity of
    /// type `T`: an edge is recorded, but the body never sees `T`'s instance.
    pub fn after<T: 'static>(mut self) -> Self {
        self.ordering_deps.push(OrderingDependency {
            target_type: TypeId::of::<T>(),
            target_type_name: std::any::type_name::<T>(),
        });
        self
    }

    /// Declare a service requested from the factory registry.
    pub fn needs<S: Send + Sync + 'static>(mut self, slot: &Injected<S>) -> Self {
        let slot = slot.clone();
        self.services.push(ServiceDependency {
            service_type: TypeId::of::<S>(),
            service_type_name: std::any::type_name::<S>(),
            assign: Box::new(move |any: Arc<dyn Any + Send + Sync>| {
                any.downcast::<S>()
                    .map(|typed| slot.set(typed))
                    .map_err(|_| "service type mismatch".to_string())
            }),
        });
        self
    }

    /// Bind a config field to a dotted path in the configuration tree.
    pub fn config<T>(mut self, path: impl Into<String>, slot: &Injected<T>) -> Self
    where
        T: serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        let slot = slot.clone();
        self.configs.push(ConfigDependency {
            path: path.into(),
            assign: Box::new(move |value: &serde_yaml::Value| {
                serde_yaml::from_value::<T>(value.clone())
                    .map(|typed| slot.set(Arc::new(typed)))
                    .map_err(|e| e.to_string())
            }),
        });
        self
    }
}

/// One unit of work in an orchestrator (§3 "Activity").
pub trait Activity: Send + Sync + 'static {
    /// Declare this activity's dependencies, services, and config bindings.
    fn descriptor(&self) -> ActivityDescriptor;

    /// Structural validation after injection, before any activity executes.
    fn init(&self) -> Result<(), String> {
        Ok(())
    }

    /// The activity's body, called once all named/ordering dependencies
    /// have completed successfully.
    fn execute<'a>(
        &'a self,
        ctx: crate::orchestrator::RunContext<'a>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>>;
}
