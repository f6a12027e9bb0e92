//! Host instruction set backends.

pub mod aarch64;
pub mod riscv64;

use crate::BackendError;
use magpie_ir::{Chunk, InternalFunctionResolver};
use target_lexicon::{Architecture, Triple};

/// A host backend: translates optimized chunks to machine code.
pub trait TargetIsa: Send + Sync {
    /// Short name, e.g. `"aarch64"`.
    fn name(&self) -> &'static str;

    /// Translate one chunk to host bytes. The walk of `chunk` is
    /// side-effect free; `ifr` supplies helper entry addresses.
    fn translate_chunk(
        &self,
        chunk: &Chunk,
        ifr: &InternalFunctionResolver,
    ) -> Result<Vec<u8>, BackendError>;
}

/// Look up the backend for a target triple.
pub fn lookup(triple: &Triple) -> Result<Box<dyn TargetIsa>, BackendError> {
    match triple.architecture {
        Architecture::Aarch64(_) => Ok(Box::new(aarch64::Aarch64Backend)),
        Architecture::Riscv64(_) => Ok(Box::new(riscv64::Riscv64Backend)),
        arch => Err(BackendError::Unsupported(format!(
            "no backend for target architecture {arch}"
        ))),
    }
}
