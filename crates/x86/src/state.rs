//! Guest CPU state.
//!
//! The layout of [`CpuState`] is the contract between the translated code,
//! the backends (which address slots by byte offset off the state base
//! register) and the runtime trampoline. The offsets come from the table
//! generated out of `guest-regs.def`; a test below pins the struct layout
//! to that table.

/// One guest register slot: name, byte offset into [`CpuState`], dense
/// index, and width in bits.
#[derive(Copy, Clone, Debug)]
pub struct GuestReg {
    pub name: &'static str,
    pub offset: u32,
    pub index: u16,
    pub width: u16,
}

/// The generated register table. See `guest-regs.def`.
pub mod regs {
    use super::GuestReg;
    include!(concat!(env!("OUT_DIR"), "/guest_regs.rs"));

    /// The slot of the `n`-th general purpose register in encoding order
    /// (RAX, RCX, RDX, RBX, RSP, RBP, RSI, RDI, R8..R15).
    pub fn gpr(n: u8) -> GuestReg {
        debug_assert!(n < 16);
        ALL[1 + n as usize]
    }

    /// The slot of XMM register `n`.
    pub fn xmm(n: u8) -> GuestReg {
        debug_assert!(n < 16);
        ALL[XMM0.index as usize + n as usize]
    }
}

/// Architectural state of one guest thread.
///
/// `#[repr(C)]` with explicit padding; field offsets must equal the
/// generated table's. Flags hold 0 or 1 in their low bit.
#[repr(C)]
pub struct CpuState {
    pub rip: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rbx: u64,
    pub rsp: u64,
    pub rbp: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub zf: u8,
    pub cf: u8,
    pub of: u8,
    pub sf: u8,
    pub pf: u8,
    pub af: u8,
    pub df: u8,
    _pad0: u8,
    pub fs: u64,
    pub gs: u64,
    pub xmm: [[u8; 16]; 16],
    pub fpu_sts: u16,
    pub fpu_ctrl: u16,
    pub fpu_tag: u16,
    _pad1: u16,
    pub fpu_stack_base: u64,
    /// Base of the contiguous guest memory region; loaded by generated
    /// code prologues into the reserved memory-base register.
    pub mem_base: u64,
}

impl CpuState {
    /// A zeroed state.
    pub fn new() -> Self {
        // All-zero is a valid state.
        unsafe { core::mem::zeroed() }
    }

    /// General purpose register `n` in encoding order.
    pub fn gpr(&self, n: u8) -> u64 {
        match n {
            0 => self.rax,
            1 => self.rcx,
            2 => self.rdx,
            3 => self.rbx,
            4 => self.rsp,
            5 => self.rbp,
            6 => self.rsi,
            7 => self.rdi,
            8 => self.r8,
            9 => self.r9,
            10 => self.r10,
            11 => self.r11,
            12 => self.r12,
            13 => self.r13,
            14 => self.r14,
            15 => self.r15,
            _ => panic!("gpr index out of range: {n}"),
        }
    }

    /// Set general purpose register `n`.
    pub fn set_gpr(&mut self, n: u8, v: u64) {
        match n {
            0 => self.rax = v,
            1 => self.rcx = v,
            2 => self.rdx = v,
            3 => self.rbx = v,
            4 => self.rsp = v,
            5 => self.rbp = v,
            6 => self.rsi = v,
            7 => self.rdi = v,
            8 => self.r8 = v,
            9 => self.r9 = v,
            10 => self.r10 = v,
            11 => self.r11 = v,
            12 => self.r12 = v,
            13 => self.r13 = v,
            14 => self.r14 = v,
            15 => self.r15 = v,
            _ => panic!("gpr index out of range: {n}"),
        }
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CpuState {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        writeln!(f, "rip: {:#018x}", self.rip)?;
        for n in 0..16 {
            writeln!(f, "{:>4}: {:#018x}", regs::gpr(n).name, self.gpr(n))?;
        }
        writeln!(
            f,
            "  zf={} cf={} of={} sf={} pf={} af={} df={}",
            self.zf, self.cf, self.of, self.sf, self.pf, self.af, self.df
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn generated_offsets_match_struct_layout() {
        assert_eq!(regs::RIP.offset as usize, offset_of!(CpuState, rip));
        assert_eq!(regs::RAX.offset as usize, offset_of!(CpuState, rax));
        assert_eq!(regs::RSP.offset as usize, offset_of!(CpuState, rsp));
        assert_eq!(regs::R15.offset as usize, offset_of!(CpuState, r15));
        assert_eq!(regs::ZF.offset as usize, offset_of!(CpuState, zf));
        assert_eq!(regs::AF.offset as usize, offset_of!(CpuState, af));
        assert_eq!(regs::FS.offset as usize, offset_of!(CpuState, fs));
        assert_eq!(regs::GS.offset as usize, offset_of!(CpuState, gs));
        assert_eq!(regs::XMM0.offset as usize, offset_of!(CpuState, xmm));
        assert_eq!(regs::XMM15.offset as usize, offset_of!(CpuState, xmm) + 15 * 16);
        assert_eq!(regs::FPU_STS.offset as usize, offset_of!(CpuState, fpu_sts));
        assert_eq!(
            regs::FPU_STACK_BASE.offset as usize,
            offset_of!(CpuState, fpu_stack_base)
        );
        assert_eq!(regs::MEM_BASE.offset as usize, offset_of!(CpuState, mem_base));
    }

    #[test]
    fn indices_are_dense_and_ordered() {
        for (i, r) in regs::ALL.iter().enumerate() {
            assert_eq!(r.index as usize, i);
        }
        // The flag block sits right after the GPRs, as the flag helpers
        // assume.
        assert_eq!(regs::ZF.index, 17);
        assert_eq!(regs::CF.index, 18);
        assert_eq!(regs::OF.index, 19);
        assert_eq!(regs::SF.index, 20);
        assert_eq!(regs::PF.index, 21);
    }

    #[test]
    fn gpr_accessors_match_table() {
        let mut st = CpuState::new();
        st.set_gpr(4, 0x7ff0);
        assert_eq!(st.rsp, 0x7ff0);
        assert_eq!(regs::gpr(4).name, "rsp");
        assert_eq!(regs::gpr(0).offset, 8);
        assert_eq!(regs::xmm(1).offset, regs::XMM0.offset + 16);
    }
}
