pub mod action;
pub mod recommendation;
pub mod state;
