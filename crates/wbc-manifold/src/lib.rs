//! `wbc-manifold` – composition of control objectives.
//!
//! A [`Manifold`][manifold::Manifold] bundles prioritized
//! [`Task`][task::Task]s with the named external
//! [`ReferenceBinding`][binding::ReferenceBinding]s that feed them.
//! Manifolds produced by the [`builders`] are merged in priority order and
//! pushed into solver stacks; their bindings are resolved once into a
//! [`RoutingTable`][wiring::RoutingTable] of external channels.

pub mod binding;
pub mod builders;
pub mod manifold;
pub mod task;
pub mod wiring;

pub use binding::{DEFAULT_BASE_PATH, ReferenceBinding, SourceHandler, velocity_name};
pub use builders::{Grasp, SEP};
pub use manifold::{Manifold, StackSink};
pub use task::{ControlLaw, Gain, Task};
pub use wiring::{Route, RouteSource, RoutingTable, resolve_routes};
