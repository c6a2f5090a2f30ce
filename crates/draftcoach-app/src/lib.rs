pub mod app;
pub mod console;
pub mod insight;
pub mod negotiation;
pub mod stream;
