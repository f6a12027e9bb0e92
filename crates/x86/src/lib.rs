//! x86-64 guest frontend for the Magpie binary translator.
//!
//! Three layers: the [`decode`] module turns bytes into one
//! [`decode::DecodedInst`] at a time; the [`translate`] module lifts
//! decoded instructions into IR packets through per-category translators;
//! and [`state`] defines the guest CPU-state layout shared with the
//! backends and the runtime.

#![deny(trivial_numeric_casts, unused_extern_crates)]
#![warn(missing_docs, unused_import_braces)]

pub mod decode;
pub mod regs;
pub mod state;
pub mod translate;

pub use crate::decode::{decode, DecodeError, DecodedInst, IClass};
pub use crate::state::{CpuState, GuestReg};
pub use crate::translate::{lift_chunk, translate_one, Outcome, TranslateError};
