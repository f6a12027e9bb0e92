//! Execution engine for the Magpie binary translator.
//!
//! Glue between the frontend, the optimizer and the backends: a W+X code
//! [`arena`](crate::arena::CodeArena), the guest memory region, a
//! PC-keyed translation cache, and the [`Engine`] dispatch loop that
//! enters generated code through the `fn(*mut CpuState) -> i32`
//! trampoline contract.

#![deny(trivial_numeric_casts, unused_extern_crates)]
#![warn(missing_docs, unused_import_braces)]

pub mod arena;
pub mod engine;

pub use crate::arena::{CodeArena, GuestMemory};
pub use crate::engine::{Engine, INVOKE_UNTRANSLATABLE};
