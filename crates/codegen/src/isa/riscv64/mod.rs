//! RISC-V 64 backend.

pub mod emit;
pub mod inst;
mod lower;
pub mod regs;

use crate::isa::TargetIsa;
use crate::BackendError;
use magpie_ir::{Chunk, InternalFunctionResolver};

/// The RISC-V 64 code generator.
pub struct Riscv64Backend;

impl TargetIsa for Riscv64Backend {
    fn name(&self) -> &'static str {
        "riscv64"
    }

    fn translate_chunk(
        &self,
        chunk: &Chunk,
        ifr: &InternalFunctionResolver,
    ) -> Result<Vec<u8>, BackendError> {
        lower::TranslationContext::new(chunk, ifr).translate()
    }
}
