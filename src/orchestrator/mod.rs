//! Application-level orchestration.
//!
//! This module owns the session lifecycle (accepting commands, driving runs) and post-run
//! processing such as report building and JSON export. UI/CLI layers talk to it through
//! `UiCommand`s and receive `SessionEvent`s back.

mod controller;
mod post_process;
mod session;

pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use post_process::{default_export_path, export_json};
pub use session::SessionController;
