pub mod ai;
pub mod attachment;
pub mod config;
pub mod controller;
pub mod error;
pub mod presenter;
pub mod provider;
pub mod render;
pub mod state;
pub mod typeset;

// Re-export main types for convenience
pub use ai::{build_solver, GeminiClient, OllamaClient, SolveRequest, Solver};
pub use attachment::{EncodedAttachment, PendingAttachment};
pub use config::{Config, Credential, Settings};
pub use controller::{ConversationController, SubmitOutcome};
pub use error::{EncodingError, SolveError};
pub use presenter::{SolutionTab, TabStates};
pub use provider::Provider;
pub use render::{ResponseRenderer, Surface};
pub use state::{Conversation, MathResponse, Message, MessageId, Role};
pub use typeset::{TypesetEngine, Typesetter, UnicodeTypesetter};
