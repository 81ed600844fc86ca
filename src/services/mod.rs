pub mod auth_session;
pub mod countdown;
pub mod save_queue;

pub use auth_session::{AuthSession, Credentials, SessionStore};
pub use countdown::{format_clock, Clock, Countdown, SystemClock};
pub use save_queue::{SaveDecision, SaveQueue};
