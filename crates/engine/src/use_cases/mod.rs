//! Use cases - conversation orchestration and auxiliary evaluators.
//!
//! Each module covers one user-facing operation. The chat orchestrator
//! owns the full turn lifecycle; the evaluators are single-call model
//! judgements with tolerant decoding of the reply.

pub mod chat;
pub mod examples;
pub mod feedback;
pub mod suggest;
pub mod task_check;
pub mod task_gen;
pub mod translate;
pub mod vocab;

pub use chat::{ChatTurn, ChatTurnError, ChatTurnInput, ChatTurnStream, TurnEvent, TurnOutcome};
pub use examples::GenerateExamples;
pub use feedback::EvaluateFeedback;
pub use suggest::GenerateSuggestion;
pub use task_check::{CheckTaskCompletion, CheckTaskInput};
pub use task_gen::GenerateTask;
pub use translate::{TranslateError, TranslateWord, Translation};
pub use vocab::GenerateVocabList;
