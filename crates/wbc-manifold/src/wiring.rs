//! Resolution of a manifold's bindings into external channels.
//!
//! Done once at setup.  Every consumer of a binding ends up connected to the
//! same resolved channel.

use tracing::info;
use wbc_types::{SignalRef, ValueType};

use crate::binding::SourceHandler;
use crate::manifold::Manifold;

/// Where a route's values come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteSource {
    /// The planner reference queue.
    Topic(String),
    /// The frame graph: pose of `frame1` in `frame0`.
    FramePair { frame0: String, frame1: String },
}

/// One binding resolved to its channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub binding: String,
    pub channel: String,
    pub value_type: ValueType,
    pub source: RouteSource,
    pub consumers: Vec<SignalRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn route(&self, binding: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.binding == binding)
    }

    /// Routes served by the reference queue.
    pub fn topic_routes(&self) -> impl Iterator<Item = &Route> {
        self.routes
            .iter()
            .filter(|r| matches!(r.source, RouteSource::Topic(_)))
    }

    /// Routes served by the frame graph.
    pub fn frame_routes(&self) -> impl Iterator<Item = &Route> {
        self.routes
            .iter()
            .filter(|r| matches!(r.source, RouteSource::FramePair { .. }))
    }
}

/// Resolve every binding of `manifold` against `base_path`.
pub fn resolve_routes(manifold: &Manifold, base_path: &str) -> RoutingTable {
    let routes = manifold
        .bindings()
        .iter()
        .map(|(name, binding)| {
            let channel = binding.channel(base_path);
            let source = match binding.handler() {
                SourceHandler::FramePair { frame0, frame1 } => RouteSource::FramePair {
                    frame0: frame0.clone(),
                    frame1: frame1.clone(),
                },
                _ => RouteSource::Topic(channel.clone()),
            };
            info!(
                channel = %channel,
                binding = %name,
                consumers = binding.consumers().len(),
                "channel plugged to binding"
            );
            Route {
                binding: name.clone(),
                channel,
                value_type: binding.value_type(),
                source,
                consumers: binding.consumers().to_vec(),
            }
        })
        .collect();
    RoutingTable { routes }
}
