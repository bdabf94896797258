//! # Hook
//!
//! This module covers hooks, which redirect execution from one location to another.
//!
//! A [`HookContext`] is created once, usually with [`HookContext::host`], and passed to every
//! [`JmpHook::install`]. It carries the [`Architecture`] used for all hooks and the options that
//! tune installation.
//!
//! ## Threading
//!
//! Nothing here takes a lock. Installing or closing a hook while another thread installs a hook on
//! the same function, or while another thread runs through the first bytes of that function, is
//! undefined behavior; the caller has to rule both out.

use std::fmt;

use crate::arch::{self, Architecture};
use crate::error::Result;

pub mod jmphook;

pub use jmphook::JmpHook;

/// Lifecycle of a hook. A hook that exists is installed until it is closed; closing is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    /// The target jumps to the replacement and the trampoline is alive
    Installed,
    /// The target has been given back its original bytes, or could not be
    Closed,
}

/// Options for installing hooks
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HookOptions {
    /// Number of bytes read from the target to find the patch boundary.
    ///
    /// `None` reads just enough for the jump being written, see [`Architecture::lookahead_for`].
    pub lookahead: Option<usize>,
}

impl HookOptions {
    /// Sets [`HookOptions::lookahead`]
    pub fn with_lookahead(mut self, lookahead: usize) -> Self {
        self.lookahead = Some(lookahead);
        self
    }
}

/// Everything an installation needs besides the addresses
#[derive(Clone, Copy)]
pub struct HookContext {
    /// Encoder for the instruction set of the target
    arch: &'static dyn Architecture,
    /// Installation options
    options: HookOptions,
}

impl HookContext {
    /// Creates a context for the given architecture with default options
    pub fn new(arch: &'static dyn Architecture) -> Self {
        Self {
            arch,
            options: HookOptions::default(),
        }
    }

    /// Creates a context for the architecture this crate was compiled for
    pub fn host() -> Result<Self> {
        arch::host().map(Self::new)
    }

    /// Replaces the options
    pub fn with_options(mut self, options: HookOptions) -> Self {
        self.options = options;
        self
    }

    /// Architecture hooks are written for
    pub fn arch(&self) -> &'static dyn Architecture {
        self.arch
    }

    /// Installation options
    pub fn options(&self) -> &HookOptions {
        &self.options
    }

    /// Number of bytes to read from a target that gets a `jump_size` byte jump
    pub fn lookahead(&self, jump_size: usize) -> usize {
        self.options
            .lookahead
            .unwrap_or_else(|| self.arch.lookahead_for(jump_size))
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("arch", &self.arch.name())
            .field("options", &self.options)
            .finish()
    }
}
