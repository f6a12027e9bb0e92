//! AArch64 register conventions.
//!
//! Generated code receives the CPU-state pointer in x0 and pins it in x29;
//! x28 holds the guest memory base. Both are callee-saved and spilled in
//! the prologue together with x30. The allocatable pool is the
//! caller-saved set, so generated code never has to preserve anything
//! else: x0-x15 for integers, v0-v7 and v16-v31 for floats and vectors.

use crate::reg::{Reg, RegClass, Writable};
use crate::regalloc::AllocatorConfig;
use crate::regset::RegSet;

/// Get a reference to an X-register.
pub fn xreg(num: u8) -> Reg {
    debug_assert!(num < 31);
    Reg::new_real(RegClass::Int, num)
}

/// Get a writable reference to an X-register.
pub fn writable_xreg(num: u8) -> Writable<Reg> {
    Writable::from_reg(xreg(num))
}

/// Get a reference to a V-register.
pub fn vreg(num: u8) -> Reg {
    debug_assert!(num < 32);
    Reg::new_real(RegClass::Float, num)
}

/// Get a writable reference to a V-register.
pub fn writable_vreg(num: u8) -> Writable<Reg> {
    Writable::from_reg(vreg(num))
}

/// The zero register. Encoding 31 names XZR in register-operand positions
/// and SP in address/immediate positions; which one applies is decided by
/// the instruction form, as in the architecture.
pub fn zero_reg() -> Reg {
    Reg::new_real(RegClass::Int, 31)
}

/// Get a writable reference to the zero register (discards the result).
pub fn writable_zero_reg() -> Writable<Reg> {
    Writable::from_reg(zero_reg())
}

/// The stack pointer (shares encoding 31 with XZR).
pub fn stack_reg() -> Reg {
    Reg::new_real(RegClass::Int, 31)
}

/// The CPU-state base register (x29).
pub fn state_reg() -> Reg {
    xreg(29)
}

/// The guest-memory base register (x28).
pub fn membase_reg() -> Reg {
    xreg(28)
}

/// The link register (x30).
pub fn link_reg() -> Reg {
    xreg(30)
}

/// Scratch register for emit-time address materialization (x16, IP0).
pub fn scratch_reg() -> Reg {
    xreg(16)
}

/// Second scratch register (x17, IP1).
pub fn scratch2_reg() -> Reg {
    xreg(17)
}

/// A marker for the NZCV flags, used only in implicit dependency sets.
pub fn nzcv() -> Reg {
    Reg::new_real(RegClass::Int, 33)
}

/// The initial free sets handed to the allocator.
pub fn allocator_config() -> AllocatorConfig {
    AllocatorConfig {
        // x0..x15.
        int_free: RegSet::from_bits(0x0000_ffff),
        // v0..v7 and v16..v31.
        float_free: RegSet::from_bits(0xffff_00ff),
    }
}

/// Name of an X-register at the given operand size.
pub fn show_xreg(num: u8, is64: bool) -> String {
    match (num, is64) {
        (31, true) => "xzr".to_string(),
        (31, false) => "wzr".to_string(),
        (n, true) => format!("x{n}"),
        (n, false) => format!("w{n}"),
    }
}

/// Name of a V-register viewed as a scalar of the given width.
pub fn show_freg(num: u8, bits: u8) -> String {
    match bits {
        32 => format!("s{num}"),
        64 => format!("d{num}"),
        _ => format!("q{num}"),
    }
}
