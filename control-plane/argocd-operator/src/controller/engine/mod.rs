//! Generic convergence engine: accessor, prober, diff, metadata filter,
//! lifecycle, rollout propagation and shard calculation. Nothing in here
//! knows about individual Argo CD components; providers in `templates`
//! hand it fully formed objects.

pub mod clock;
pub mod diff;
pub mod fields;
pub mod lifecycle;
pub mod memory;
pub mod metadata;
pub mod prober;
pub mod rollout;
pub mod sharding;
pub mod store;
pub mod workload;

pub use diff::{DiffOutcome, FieldGroup, diff};
pub use lifecycle::{ObjectStep, Outcome, Transition, decide, reconcile_object};
pub use store::{KubeStore, Managed, ObjectStore};

#[cfg(test)]
mod diff_tests;
