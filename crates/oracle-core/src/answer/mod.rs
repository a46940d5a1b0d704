pub mod state;

pub use state::{AnswerSnapshot, CanonicalAnswer};
