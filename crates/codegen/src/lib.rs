//! Host code generation for the Magpie binary translator.
//!
//! The crate is split the way the pipeline flows: a host-agnostic
//! instruction layer ([`machinst`], [`reg`], [`regset`], [`value`]), the
//! shared reverse linear-scan [`regalloc`], and per-ISA backends under
//! [`isa`] exposing typed instruction builders, direct binary encoders,
//! and a chunk translation context each.

#![deny(trivial_numeric_casts, unused_extern_crates)]
#![warn(missing_docs, unused_import_braces)]

pub mod isa;
pub mod machinst;
pub mod reg;
pub mod regalloc;
pub mod regset;
pub mod value;

pub use crate::isa::{lookup, TargetIsa};
pub use crate::machinst::{CodeBuffer, EmitError, Label, MachInst, OperandKind, VInst};
pub use crate::reg::{Reg, RegClass, Writable};
pub use crate::regalloc::{allocate_registers, AllocError, AllocatorConfig};
pub use crate::regset::RegSet;
pub use crate::value::{VRegAllocator, ValueRegs};

use core::fmt;

/// A backend failure: invalid operands handed to an instruction builder,
/// an IR shape the backend cannot express, or a lower-level allocation or
/// emission error.
#[derive(Debug)]
pub enum BackendError {
    /// An instruction builder rejected an operand.
    InvalidOperand(String),
    /// The backend cannot express this IR shape.
    Unsupported(String),
    /// Register allocation failed.
    Alloc(AllocError),
    /// Encoding failed.
    Emit(EmitError),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackendError::InvalidOperand(msg) => write!(f, "invalid operand: {msg}"),
            BackendError::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            BackendError::Alloc(e) => write!(f, "register allocation: {e}"),
            BackendError::Emit(e) => write!(f, "emission: {e}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<AllocError> for BackendError {
    fn from(e: AllocError) -> Self {
        BackendError::Alloc(e)
    }
}

impl From<EmitError> for BackendError {
    fn from(e: EmitError) -> Self {
        BackendError::Emit(e)
    }
}
