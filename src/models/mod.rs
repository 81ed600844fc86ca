pub mod answer;
pub mod answer_sheet;
pub mod attempt;
pub mod choices;
pub mod loaders;
pub mod result;

pub use answer::AnswerPayload;
pub use answer_sheet::{AnswerSheet, SheetAnswer, SubmitMode};
pub use attempt::{Attempt, AttemptId, ExamId, ExamSummary, Question, QuestionId, QuestionKind, UserId};
pub use choices::Choices;
pub use loaders::{load_all_answer_sheets, load_answer_sheet};
pub use result::{AttemptResult, ReviewItem, SubmitSummary};
