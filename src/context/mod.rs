//! Per-invocation handler context — the owning server's identity and state.
//!
//! Every handler runs against the server node that owns it. Rather than
//! rebinding handlers to that node, the dispatcher passes a [`Context`] into
//! each invocation, exposing the node's identity, configuration, and a typed
//! state map that handlers may read and write.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::config::Config;
use crate::server::NodeId;

/// Type-erased map keyed by type — used to share state between the handlers
/// of one server node without requiring them to know about each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a value, returning the previous value of the same type
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    }

    /// Get a value from the extensions map
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Get a mutable reference to a value from the extensions map
    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove a value from the extensions map
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The owning server as seen from inside a handler.
pub struct Context<'a> {
    node: NodeId,
    parent: Option<NodeId>,
    config: &'a Config,
    state: &'a mut Extensions,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        node: NodeId,
        parent: Option<NodeId>,
        config: &'a Config,
        state: &'a mut Extensions,
    ) -> Self {
        Self {
            node,
            parent,
            config,
            state,
        }
    }

    /// Identity of the server node running the handler.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Identity of the node this one was cloned from, if any.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn state(&self) -> &Extensions {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut Extensions {
        &mut *self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Hits(u32);

    #[test]
    fn insert_get_remove() {
        let mut ext = Extensions::new();
        assert!(ext.insert(Hits(1)).is_none());
        assert_eq!(ext.insert(Hits(2)), Some(Hits(1)));
        assert_eq!(ext.get::<Hits>(), Some(&Hits(2)));
        assert_eq!(ext.remove::<Hits>(), Some(Hits(2)));
        assert!(ext.is_empty());
    }

    #[test]
    fn context_exposes_owner() {
        let config = Config::default();
        let mut state = Extensions::new();
        let node = NodeId::next();
        let mut ctx = Context::new(node, None, &config, &mut state);
        assert!(ctx.is_root());
        assert_eq!(ctx.node(), node);
        ctx.state_mut().insert(Hits(7));
        assert_eq!(ctx.state().get::<Hits>(), Some(&Hits(7)));
        assert_eq!(ctx.config().error_status, 500);
    }
}
