// Synchronization primitives shared by both session controllers.

pub mod guard;
pub mod scope;

pub use guard::{StalenessGuard, Verdict};
pub use scope::{CancellationScope, Generation, ScopeLineage};
