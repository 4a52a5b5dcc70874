//! Factory registry for service injection (§4.1 "Service dependencies").
//!
//! A factory produces the value behind a `.needs::<S>()` declaration.
//! Two registration modes mirror the design's "shared singleton vs
//! fresh-per-activity" distinction: [`FactoryRegistry::shared`] hands every
//! activity the same `Arc<S>`, [`FactoryRegistry::per_activity`] calls a
//! closure once per wiring activity, which matters for config-derived
//! clients built from an `ArcSwap` snapshot taken at wiring time (see
//! SPEC_FULL.md's config reload discussion).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::activity::ActivityId;

enum Factory {
    Shared(Arc<dyn Any + Send + Sync>),
    PerActivity(Box<dyn Fn(&ActivityId) -> Arc<dyn Any + Send + Sync> + Send + Sync>),
}

/// Type-keyed registry of service factories, consulted during the
/// orchestrator's wiring phase whenever an activity declares `.needs::<S>()`.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<TypeId, Factory>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single shared instance of `S`, handed out by reference to
    /// every activity that needs it.
    pub fn shared<S: Send + Sync + 'static>(&mut self, value: S) -> &mut Self {
        let type_id = TypeId::of::<S>();
        self.factories
            .insert(type_id, Factory::Shared(Arc::new(value)));
        self
    }

    /// Register a factory closure invoked once per activity that needs `S`,
    /// with the consuming activity's id so the factory can specialize on it
    /// (e.g. picking a per-activity log scope or config sub-path).
    pub fn per_activity<S, F>(&mut self, build: F) -> &mut Self
    where
        S: Send + Sync + 'static,
        F: Fn(&ActivityId) -> S + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<S>();
        self.factories.insert(
            type_id,
            Factory::PerActivity(Box::new(move |activity_id| {
                Arc::new(build(activity_id)) as Arc<dyn Any + Send + Sync>
            })),
        );
        self
    }

    pub(crate) fn resolve(
        &self,
        type_id: TypeId,
        activity_id: &ActivityId,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        match self.factories.get(&type_id)? {
            Factory::Shared(value) => Some(value.clone()),
            Factory::PerActivity(build) => Some(build(activity_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Widget(u32);

    #[test]
    fn shared_factory_returns_same_value_each_time() {
        let mut registry = FactoryRegistry::new();
        registry.shared(Widget(7));
        let id = ActivityId::new("pbsflow.test", "Consumer");
        let a = registry.resolve(TypeId::of::<Widget>(), &id).unwrap();
        let b = registry.resolve(TypeId::of::<Widget>(), &id).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn per_activity_factory_builds_fresh_each_time() {
        let mut registry = FactoryRegistry::new();
        registry.per_activity(|_id| Widget(9));
        let id = ActivityId::new("pbsflow.test", "Consumer");
        let a = registry.resolve(TypeId::of::<Widget>(), &id).unwrap();
        let b = registry.resolve(TypeId::of::<Widget>(), &id).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(*a.downcast_ref::<Widget>().unwrap(), Widget(9));
    }

    #[test]
    fn per_activity_factory_receives_consuming_activity_id() {
        let mut registry = FactoryRegistry::new();
        registry.per_activity(|id: &ActivityId| id.to_string());
        let id = ActivityId::new("pbsflow.test", "Consumer");
        let resolved = registry.resolve(TypeId::of::<String>(), &id).unwrap();
        assert_eq!(*resolved.downcast_ref::<String>().unwrap(), id.to_string());
    }

    #[test]
    fn unregistered_type_resolves_to_none() {
        let registry = FactoryRegistry::new();
        let id = ActivityId::new("pbsflow.test", "Consumer");
        assert!(registry.resolve(TypeId::of::<Widget>(), &id).is_none());
    }
}
