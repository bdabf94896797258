#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

pub mod arch;
pub mod code;
pub mod error;
pub mod hook;
pub mod memory;
pub mod trampoline;

pub use arch::Architecture;
pub use error::{HookError, Result};
pub use hook::{HookContext, HookOptions, HookState, JmpHook};
