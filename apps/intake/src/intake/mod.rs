// Intake workflow: file acquisition, upload with synthetic progress, review,
// correction and confirmation of a parsed resume.
// One controller task per session; the session itself is a plain value moved
// through pure transitions (see session.rs).

pub mod controller;
pub mod document;
pub mod error;
pub mod handlers;
pub mod persistence;
pub mod progress;
pub mod registry;
pub mod review;
pub mod session;
pub mod transport;

pub use controller::ControllerDeps;
pub use error::IntakeError;
pub use registry::SessionRegistry;
pub use session::SessionStatus;
