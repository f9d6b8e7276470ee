pub mod attachment;
pub mod config;
pub mod error;
pub mod flows;
pub mod lang;
pub mod reply;
pub mod session;
pub mod state;
pub mod transport;
pub mod turn;
pub mod voice;

// Re-export main types for convenience
pub use attachment::Attachment;
pub use config::Config;
pub use error::AssistantError;
pub use flows::{Flow, Priority};
pub use lang::Lang;
pub use reply::{classify_chips, extract_progress, ChipTag, ProgressUpdate};
pub use session::{FileStore, MemoryStore, SessionId, SessionIdentity, SessionStore};
pub use state::{DisplayMessage, Origin, ProgressState};
pub use transport::{ConversationTransport, OutboundTurn, ReplyEntry, TurnMetadata, WebhookClient};
pub use turn::{PendingTurn, TurnController, TurnState, TurnStatus};
pub use voice::{CommandRecognizer, SpeechEvent, SpeechRecognizer, VoiceCapture, VoiceUpdate};
