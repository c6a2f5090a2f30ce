pub mod authority;
pub mod http;
pub mod stub;
pub mod ws;

pub use authority::{DraftAuthority, EventStream, StreamTransport};
pub use http::HttpAuthority;
pub use stub::{StubAuthority, StubTransport};
pub use ws::WsTransport;
