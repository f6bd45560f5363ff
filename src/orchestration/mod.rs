pub mod analyzer;
pub mod input;
pub mod session;

pub use analyzer::Analyzer;
pub use input::{CollectedInput, InputCollector};
pub use session::{SessionHandle, SessionState, SessionStore};
