//! Analysis task lifecycle: submit → poll → resolve/fail

mod controller;

pub use controller::{TaskController, BOOTSTRAP_PROMPT};
