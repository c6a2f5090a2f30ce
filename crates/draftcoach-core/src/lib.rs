// Library root: the shared model both session controllers are built on
// (draft state, session identity, wire protocol, config) plus the two
// synchronization primitives, the staleness guard and cancellation scopes.

pub mod config;
pub mod draft;
pub mod error;
pub mod protocol;
pub mod session;
pub mod sync;
