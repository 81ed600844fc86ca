pub mod attempt_ctx;
pub mod attempt_session;
pub mod session_state;

pub use attempt_ctx::AttemptCtx;
pub use attempt_session::{
    AttemptSession, SessionEvent, SessionSettings, SessionView, SubmitOutcome,
};
pub use session_state::{
    AnswerUpdate, AttemptStatus, PaletteEntry, SaveState, SessionState, SubmissionState,
    SubmitReason,
};
