pub mod connection;
pub mod manager;
pub mod messages;
pub mod registry;
pub mod router;

pub use connection::{Transport, TransportConnection, WebSocketTransport};
pub use manager::SessionHandle;
pub use messages::{ConnectionState, SessionEvent, UserQuestion};
pub use registry::{Dialog, DialogRegistry, RecordOutcome};
pub use router::MessageKind;
