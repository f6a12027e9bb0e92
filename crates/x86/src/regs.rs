//! Architectural register names as seen by the decoder.
//!
//! These are the registers an instruction encodes, at the width it encodes
//! them. The translator maps them onto CPU-state slots: every GPR aliases
//! its 64-bit slot, every XMM its 128-bit slot.

use core::fmt;

/// The bank and access width of a decoded register.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RegClass {
    /// 8-bit GPR, low byte (AL, CL, .., R15B).
    Gpr8,
    /// 8-bit GPR, bits [15:8] (AH, CH, DH, BH).
    Gpr8High,
    /// 16-bit GPR.
    Gpr16,
    /// 32-bit GPR.
    Gpr32,
    /// 64-bit GPR.
    Gpr64,
    /// 128-bit SSE register.
    Xmm,
    /// The instruction pointer, only as a memory base.
    Rip,
}

/// A decoded register: class plus encoding number.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Reg {
    pub class: RegClass,
    pub num: u8,
}

impl Reg {
    pub fn gpr(num: u8, width_bits: u16) -> Self {
        let class = match width_bits {
            8 => RegClass::Gpr8,
            16 => RegClass::Gpr16,
            32 => RegClass::Gpr32,
            64 => RegClass::Gpr64,
            _ => panic!("bad GPR width {width_bits}"),
        };
        Reg { class, num }
    }

    pub fn xmm(num: u8) -> Self {
        Reg {
            class: RegClass::Xmm,
            num,
        }
    }

    pub const RIP: Reg = Reg {
        class: RegClass::Rip,
        num: 0,
    };

    /// Access width in bits.
    pub fn width_bits(self) -> u16 {
        match self.class {
            RegClass::Gpr8 | RegClass::Gpr8High => 8,
            RegClass::Gpr16 => 16,
            RegClass::Gpr32 => 32,
            RegClass::Gpr64 | RegClass::Rip => 64,
            RegClass::Xmm => 128,
        }
    }

    /// Is this any width of general purpose register?
    pub fn is_gpr(self) -> bool {
        matches!(
            self.class,
            RegClass::Gpr8 | RegClass::Gpr8High | RegClass::Gpr16 | RegClass::Gpr32 | RegClass::Gpr64
        )
    }

    /// Does this register name bits [15:8] of its slot?
    pub fn is_high_byte(self) -> bool {
        self.class == RegClass::Gpr8High
    }
}

const GPR64_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];
const GPR32_NAMES: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d", "r12d",
    "r13d", "r14d", "r15d",
];
const GPR16_NAMES: [&str; 16] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w", "r13w",
    "r14w", "r15w",
];
const GPR8_NAMES: [&str; 16] = [
    "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b",
    "r13b", "r14b", "r15b",
];
const GPR8H_NAMES: [&str; 4] = ["ah", "ch", "dh", "bh"];
const XMM_NAMES: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Reg {
    /// The textual name, for disassembly output.
    pub fn name(self) -> &'static str {
        let n = self.num as usize;
        match self.class {
            RegClass::Gpr64 => GPR64_NAMES[n],
            RegClass::Gpr32 => GPR32_NAMES[n],
            RegClass::Gpr16 => GPR16_NAMES[n],
            RegClass::Gpr8 => GPR8_NAMES[n],
            RegClass::Gpr8High => GPR8H_NAMES[n],
            RegClass::Xmm => XMM_NAMES[n],
            RegClass::Rip => "rip",
        }
    }
}

/// Segment override prefixes the translator cares about.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Segment {
    Fs,
    Gs,
}
