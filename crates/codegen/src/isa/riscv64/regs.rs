//! RISC-V 64 register conventions.
//!
//! Generated code receives the CPU-state pointer in a0 and pins it in s0;
//! s11 holds the guest memory base; t6 is reserved for call-target
//! materialization. The allocatable pool is the caller-saved set minus
//! t6: t0-t5, a0-a7 for integers, ft0-ft7, fa0-fa7, ft8-ft11 for floats.

use crate::reg::{Reg, RegClass, Writable};
use crate::regalloc::AllocatorConfig;
use crate::regset::RegSet;

/// Get a reference to an X-register.
pub fn xreg(num: u8) -> Reg {
    debug_assert!(num < 32);
    Reg::new_real(RegClass::Int, num)
}

/// Get a writable reference to an X-register.
pub fn writable_xreg(num: u8) -> Writable<Reg> {
    Writable::from_reg(xreg(num))
}

/// Get a reference to an F-register.
pub fn freg(num: u8) -> Reg {
    debug_assert!(num < 32);
    Reg::new_real(RegClass::Float, num)
}

/// Get a writable reference to an F-register.
pub fn writable_freg(num: u8) -> Writable<Reg> {
    Writable::from_reg(freg(num))
}

/// The hard-wired zero register (x0).
pub fn zero_reg() -> Reg {
    xreg(0)
}

/// The return-address register (x1).
pub fn link_reg() -> Reg {
    xreg(1)
}

/// The stack pointer (x2).
pub fn stack_reg() -> Reg {
    xreg(2)
}

/// The CPU-state base register (s0/x8).
pub fn state_reg() -> Reg {
    xreg(8)
}

/// The guest-memory base register (s11/x27).
pub fn membase_reg() -> Reg {
    xreg(27)
}

/// Scratch register for call-target and oversized-immediate
/// materialization (t6/x31).
pub fn scratch_reg() -> Reg {
    xreg(31)
}

/// The initial free sets handed to the allocator.
pub fn allocator_config() -> AllocatorConfig {
    AllocatorConfig {
        // t0-t2 (x5-x7), a0-a7 (x10-x17), t3-t5 (x28-x30).
        int_free: RegSet::from_bits(0x7003_fce0),
        // ft0-ft7 (f0-f7), fa0-fa7 (f10-f17), ft8-ft11 (f28-f31).
        float_free: RegSet::from_bits(0xf003_fcff),
    }
}

const XNAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

const FNAMES: [&str; 32] = [
    "ft0", "ft1", "ft2", "ft3", "ft4", "ft5", "ft6", "ft7", "fs0", "fs1", "fa0", "fa1", "fa2",
    "fa3", "fa4", "fa5", "fa6", "fa7", "fs2", "fs3", "fs4", "fs5", "fs6", "fs7", "fs8", "fs9",
    "fs10", "fs11", "ft8", "ft9", "ft10", "ft11",
];

/// ABI name of an X-register.
pub fn show_xreg(num: u8) -> &'static str {
    XNAMES[num as usize]
}

/// ABI name of an F-register.
pub fn show_freg(num: u8) -> &'static str {
    FNAMES[num as usize]
}
