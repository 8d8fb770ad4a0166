//! Conversation live-update loop: polling reconciliation, optimistic operator
//! replies and hand-off between the assistant and a human operator.

pub mod mode;
pub mod notice;
pub mod reconciler;
pub mod send;
pub mod session;
pub mod timeline;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use mode::{LinkedReset, ModeSwitcher, TicketResolution, TicketResolver};
pub use send::SubmitOutcome;
pub use session::OperatorSession;
pub use view::{ConversationView, LiveServices, ViewEvent};
