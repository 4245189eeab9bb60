pub mod config;
pub mod embeddings;
pub mod error;
pub mod mcp;
pub mod notes;
pub mod retrieval;
pub mod store;

// Re-export commonly used types
pub use config::Settings;
pub use error::{NotesError, Result};
pub use notes::{Note, NoteDraft, NoteService, NoteType};
pub use retrieval::{HybridQuery, HybridSearcher, NoteHit};
