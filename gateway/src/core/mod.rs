pub mod extraction;
pub mod session;
pub mod translator;
pub mod upstream;

// Re-export commonly used types for convenience
pub use extraction::{ExtractedItem, ExtractedListState};
pub use session::{
    ClientCommand, NotFound, RelayOutgoingMessage, SendGate, Session, SessionRegistry,
    SessionRelay, SessionSnapshot,
};
pub use translator::{EventTranslator, TranslatedAction};
pub use upstream::{
    ConnectError, GeminiConfig, GeminiConnector, SendError, UpstreamConnector, UpstreamEvent,
    UpstreamLink,
};
