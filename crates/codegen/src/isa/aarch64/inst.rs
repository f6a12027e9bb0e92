//! AArch64 instruction definitions and the typed builder surface.

use super::regs::{show_freg, show_xreg, nzcv, zero_reg};
use crate::machinst::{InstStream, Label, MachInst, OperandKind};
use crate::reg::{Reg, RegClass, Writable};
use crate::BackendError;
use core::fmt;
use smallvec::{smallvec, SmallVec};

/// An ALU operation selecting the instruction form in `AluRRR` /
/// `AluRRImm12`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ALUOp {
    Add,
    /// Add, setting NZCV.
    Adds,
    Sub,
    /// Subtract, setting NZCV.
    Subs,
    Adc,
    Sbc,
    And,
    /// And, setting NZCV.
    Ands,
    Orr,
    /// Or with inverted second operand (the MVN alias).
    OrrNot,
    Eor,
    Lsl,
    Lsr,
    Asr,
    SDiv,
    UDiv,
    SMulH,
    UMulH,
}

impl ALUOp {
    fn sets_flags(self) -> bool {
        matches!(self, ALUOp::Adds | ALUOp::Subs | ALUOp::Ands)
    }

    fn reads_flags(self) -> bool {
        matches!(self, ALUOp::Adc | ALUOp::Sbc)
    }

    fn mnemonic(self) -> &'static str {
        match self {
            ALUOp::Add => "add",
            ALUOp::Adds => "adds",
            ALUOp::Sub => "sub",
            ALUOp::Subs => "subs",
            ALUOp::Adc => "adc",
            ALUOp::Sbc => "sbc",
            ALUOp::And => "and",
            ALUOp::Ands => "ands",
            ALUOp::Orr => "orr",
            ALUOp::OrrNot => "orn",
            ALUOp::Eor => "eor",
            ALUOp::Lsl => "lsl",
            ALUOp::Lsr => "lsr",
            ALUOp::Asr => "asr",
            ALUOp::SDiv => "sdiv",
            ALUOp::UDiv => "udiv",
            ALUOp::SMulH => "smulh",
            ALUOp::UMulH => "umulh",
        }
    }
}

/// Operand size of an integer operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandSize {
    Size32,
    Size64,
}

impl OperandSize {
    pub fn sf_bit(self) -> u32 {
        match self {
            OperandSize::Size32 => 0,
            OperandSize::Size64 => 1,
        }
    }

    pub fn is64(self) -> bool {
        self == OperandSize::Size64
    }
}

/// Condition for conditional instructions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Hs,
    Lo,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
}

impl Cond {
    /// Encoding of this condition.
    pub fn bits(self) -> u32 {
        match self {
            Cond::Eq => 0b0000,
            Cond::Ne => 0b0001,
            Cond::Hs => 0b0010,
            Cond::Lo => 0b0011,
            Cond::Mi => 0b0100,
            Cond::Pl => 0b0101,
            Cond::Vs => 0b0110,
            Cond::Vc => 0b0111,
            Cond::Hi => 0b1000,
            Cond::Ls => 0b1001,
            Cond::Ge => 0b1010,
            Cond::Lt => 0b1011,
            Cond::Gt => 0b1100,
            Cond::Le => 0b1101,
        }
    }

    /// The inverted condition.
    pub fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Hs => Cond::Lo,
            Cond::Lo => Cond::Hs,
            Cond::Mi => Cond::Pl,
            Cond::Pl => Cond::Mi,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Hi => Cond::Ls,
            Cond::Ls => Cond::Hi,
            Cond::Ge => Cond::Lt,
            Cond::Lt => Cond::Ge,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Hs => "hs",
            Cond::Lo => "lo",
            Cond::Mi => "mi",
            Cond::Pl => "pl",
            Cond::Vs => "vs",
            Cond::Vc => "vc",
            Cond::Hi => "hi",
            Cond::Ls => "ls",
            Cond::Ge => "ge",
            Cond::Lt => "lt",
            Cond::Gt => "gt",
            Cond::Le => "le",
        }
    }
}

/// A memory operand.
// The indexed forms are not currently constructed, but we still want them
// as options in the future.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(dead_code)]
pub enum AMode {
    /// `[rn]`.
    Base { rn: Reg },
    /// `[rn, #off]`, scaled-unsigned or unscaled-signed at emission.
    Offset { rn: Reg, off: i32 },
    /// `[rn, rm]`.
    RegReg { rn: Reg, rm: Reg },
    /// `[rn, #off]!`: rn is adjusted before the access.
    PreIndexed { rn: Reg, off: i32 },
    /// `[rn], #off`: rn is adjusted after the access.
    PostIndexed { rn: Reg, off: i32 },
}

impl AMode {
    fn base(&self) -> Reg {
        match *self {
            AMode::Base { rn }
            | AMode::Offset { rn, .. }
            | AMode::RegReg { rn, .. }
            | AMode::PreIndexed { rn, .. }
            | AMode::PostIndexed { rn, .. } => rn,
        }
    }
}

/// A SIMD three-register operation over 128-bit vectors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VecOp {
    Add,
    Sub,
    And,
    Orr,
    Eor,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
}

/// A scalar FPU three-register operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FpuOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// An AArch64 machine instruction.
#[derive(Clone, Debug)]
pub enum Inst {
    Nop,
    AluRRR {
        op: ALUOp,
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
    },
    AluRRImm12 {
        op: ALUOp,
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        imm12: u16,
    },
    MovZ {
        size: OperandSize,
        rd: Writable<Reg>,
        imm16: u16,
        shift: u8,
    },
    MovK {
        size: OperandSize,
        rd: Writable<Reg>,
        imm16: u16,
        shift: u8,
    },
    MovRR {
        size: OperandSize,
        rd: Writable<Reg>,
        rm: Reg,
    },
    /// UXT*/SXT* between 8/16/32 and a wider size.
    Extend {
        rd: Writable<Reg>,
        rn: Reg,
        signed: bool,
        from_bits: u8,
        to_bits: u8,
    },
    UBfx {
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        lsb: u8,
        width: u8,
    },
    SBfx {
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        lsb: u8,
        width: u8,
    },
    /// Bitfield insert; rd is read and written.
    Bfi {
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        lsb: u8,
        width: u8,
    },
    MAdd {
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
        ra: Reg,
    },
    MSub {
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
        ra: Reg,
    },
    /// Zero-extending integer load.
    Load {
        bits: u8,
        rd: Writable<Reg>,
        mem: AMode,
    },
    Store {
        bits: u8,
        rs: Reg,
        mem: AMode,
    },
    CSel {
        size: OperandSize,
        cond: Cond,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
    },
    CSet {
        cond: Cond,
        rd: Writable<Reg>,
    },
    FpuCSel {
        bits: u8,
        cond: Cond,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
    },
    CondBr {
        cond: Cond,
        target: Label,
    },
    Cbz {
        size: OperandSize,
        rn: Reg,
        target: Label,
    },
    Cbnz {
        size: OperandSize,
        rn: Reg,
        target: Label,
    },
    Jump {
        target: Label,
    },
    LabelDef {
        label: Label,
    },
    Blr {
        rn: Reg,
    },
    Ret,
    LdAxr {
        bits: u8,
        rd: Writable<Reg>,
        rn: Reg,
    },
    StlXr {
        bits: u8,
        status: Writable<Reg>,
        rt: Reg,
        rn: Reg,
    },
    Dmb,
    FpuRRR {
        op: FpuOp,
        bits: u8,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
    },
    FpuMov {
        bits: u8,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// FMOV from an integer to a float register.
    MovToFpu {
        bits: u8,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// FMOV from a float to an integer register.
    MovFromFpu {
        bits: u8,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// SCVTF.
    IntToFpu {
        src_bits: u8,
        dst_bits: u8,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// FCVTZS (or FCVTNS when `nearest`).
    FpuToInt {
        src_bits: u8,
        dst_bits: u8,
        nearest: bool,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// FCVT between f32 and f64.
    FpuCvt {
        from_bits: u8,
        to_bits: u8,
        rd: Writable<Reg>,
        rn: Reg,
    },
    VecRRR {
        op: VecOp,
        lane_bits: u8,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
    },
    /// Whole-vector move.
    VecMov {
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// INS Vd.T[idx], Xn.
    InsLane {
        lane_bits: u8,
        idx: u8,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// INS Vd.T[idx], Vn.T[0].
    InsElem {
        lane_bits: u8,
        idx: u8,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// UMOV Xd, Vn.T[idx].
    ExtLane {
        lane_bits: u8,
        idx: u8,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// DUP (element) to a scalar FP register.
    DupElem {
        lane_bits: u8,
        idx: u8,
        rd: Writable<Reg>,
        rn: Reg,
    },
    Udf,
}

fn rname(r: Reg, is64: bool) -> String {
    if r.is_virtual() {
        format!("{r}")
    } else {
        show_xreg(r.hw_enc(), is64)
    }
}

fn fname(r: Reg, bits: u8) -> String {
    if r.is_virtual() {
        format!("{r}")
    } else {
        show_freg(r.hw_enc(), bits)
    }
}

fn vname(r: Reg, lane_bits: u8) -> String {
    let arr = match lane_bits {
        8 => "16b",
        16 => "8h",
        32 => "4s",
        _ => "2d",
    };
    if r.is_virtual() {
        format!("{r}.{arr}")
    } else {
        format!("v{}.{arr}", r.hw_enc())
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Inst::Nop => write!(f, "nop"),
            Inst::AluRRR { op, size, rd, rn, rm } => {
                let s = size.is64();
                write!(
                    f,
                    "{} {}, {}, {}",
                    op.mnemonic(),
                    rname(rd.to_reg(), s),
                    rname(*rn, s),
                    rname(*rm, s)
                )
            }
            Inst::AluRRImm12 { op, size, rd, rn, imm12 } => {
                let s = size.is64();
                write!(
                    f,
                    "{} {}, {}, #{}",
                    op.mnemonic(),
                    rname(rd.to_reg(), s),
                    rname(*rn, s),
                    imm12
                )
            }
            Inst::MovZ { size, rd, imm16, shift } => {
                write!(f, "movz {}, #{:#x}", rname(rd.to_reg(), size.is64()), imm16)?;
                if *shift != 0 {
                    write!(f, ", lsl #{shift}")?;
                }
                Ok(())
            }
            Inst::MovK { size, rd, imm16, shift } => {
                write!(f, "movk {}, #{:#x}", rname(rd.to_reg(), size.is64()), imm16)?;
                if *shift != 0 {
                    write!(f, ", lsl #{shift}")?;
                }
                Ok(())
            }
            Inst::MovRR { size, rd, rm } => {
                let s = size.is64();
                write!(f, "mov {}, {}", rname(rd.to_reg(), s), rname(*rm, s))
            }
            Inst::Extend { rd, rn, signed, from_bits, to_bits } => {
                let op = match (signed, from_bits) {
                    (false, 8) => "uxtb",
                    (false, 16) => "uxth",
                    (false, _) => "uxtw",
                    (true, 8) => "sxtb",
                    (true, 16) => "sxth",
                    (true, _) => "sxtw",
                };
                // Unsigned extends write the 32-bit view.
                let dst64 = *signed && *to_bits == 64;
                write!(f, "{op} {}, {}", rname(rd.to_reg(), dst64), rname(*rn, false))
            }
            Inst::UBfx { size, rd, rn, lsb, width } => {
                let s = size.is64();
                write!(
                    f,
                    "ubfx {}, {}, #{lsb}, #{width}",
                    rname(rd.to_reg(), s),
                    rname(*rn, s)
                )
            }
            Inst::SBfx { size, rd, rn, lsb, width } => {
                let s = size.is64();
                write!(
                    f,
                    "sbfx {}, {}, #{lsb}, #{width}",
                    rname(rd.to_reg(), s),
                    rname(*rn, s)
                )
            }
            Inst::Bfi { size, rd, rn, lsb, width } => {
                let s = size.is64();
                write!(
                    f,
                    "bfi {}, {}, #{lsb}, #{width}",
                    rname(rd.to_reg(), s),
                    rname(*rn, s)
                )
            }
            Inst::MAdd { size, rd, rn, rm, ra } => {
                let s = size.is64();
                write!(
                    f,
                    "madd {}, {}, {}, {}",
                    rname(rd.to_reg(), s),
                    rname(*rn, s),
                    rname(*rm, s),
                    rname(*ra, s)
                )
            }
            Inst::MSub { size, rd, rn, rm, ra } => {
                let s = size.is64();
                write!(
                    f,
                    "msub {}, {}, {}, {}",
                    rname(rd.to_reg(), s),
                    rname(*rn, s),
                    rname(*rm, s),
                    rname(*ra, s)
                )
            }
            Inst::Load { bits, rd, mem } => {
                let op = match bits {
                    8 => "ldrb",
                    16 => "ldrh",
                    _ => "ldr",
                };
                write!(f, "{op} {}, {}", rname(rd.to_reg(), *bits == 64), show_mem(mem))
            }
            Inst::Store { bits, rs, mem } => {
                let op = match bits {
                    8 => "strb",
                    16 => "strh",
                    _ => "str",
                };
                write!(f, "{op} {}, {}", rname(*rs, *bits == 64), show_mem(mem))
            }
            Inst::CSel { size, cond, rd, rn, rm } => {
                let s = size.is64();
                write!(
                    f,
                    "csel {}, {}, {}, {}",
                    rname(rd.to_reg(), s),
                    rname(*rn, s),
                    rname(*rm, s),
                    cond.name()
                )
            }
            Inst::CSet { cond, rd } => {
                write!(f, "cset {}, {}", rname(rd.to_reg(), true), cond.name())
            }
            Inst::FpuCSel { bits, cond, rd, rn, rm } => write!(
                f,
                "fcsel {}, {}, {}, {}",
                fname(rd.to_reg(), *bits),
                fname(*rn, *bits),
                fname(*rm, *bits),
                cond.name()
            ),
            Inst::CondBr { cond, target } => write!(f, "b.{} {target}", cond.name()),
            Inst::Cbz { size, rn, target } => {
                write!(f, "cbz {}, {target}", rname(*rn, size.is64()))
            }
            Inst::Cbnz { size, rn, target } => {
                write!(f, "cbnz {}, {target}", rname(*rn, size.is64()))
            }
            Inst::Jump { target } => write!(f, "b {target}"),
            Inst::LabelDef { label } => write!(f, "{label}:"),
            Inst::Blr { rn } => write!(f, "blr {}", rname(*rn, true)),
            Inst::Ret => write!(f, "ret"),
            Inst::LdAxr { bits, rd, rn } => {
                let op = match bits {
                    8 => "ldaxrb",
                    16 => "ldaxrh",
                    _ => "ldaxr",
                };
                write!(f, "{op} {}, [{}]", rname(rd.to_reg(), *bits == 64), rname(*rn, true))
            }
            Inst::StlXr { bits, status, rt, rn } => {
                let op = match bits {
                    8 => "stlxrb",
                    16 => "stlxrh",
                    _ => "stlxr",
                };
                write!(
                    f,
                    "{op} {}, {}, [{}]",
                    rname(status.to_reg(), false),
                    rname(*rt, *bits == 64),
                    rname(*rn, true)
                )
            }
            Inst::Dmb => write!(f, "dmb ish"),
            Inst::FpuRRR { op, bits, rd, rn, rm } => {
                let m = match op {
                    FpuOp::Add => "fadd",
                    FpuOp::Sub => "fsub",
                    FpuOp::Mul => "fmul",
                    FpuOp::Div => "fdiv",
                };
                write!(
                    f,
                    "{m} {}, {}, {}",
                    fname(rd.to_reg(), *bits),
                    fname(*rn, *bits),
                    fname(*rm, *bits)
                )
            }
            Inst::FpuMov { bits, rd, rn } => {
                write!(f, "fmov {}, {}", fname(rd.to_reg(), *bits), fname(*rn, *bits))
            }
            Inst::MovToFpu { bits, rd, rn } => write!(
                f,
                "fmov {}, {}",
                fname(rd.to_reg(), *bits),
                rname(*rn, *bits == 64)
            ),
            Inst::MovFromFpu { bits, rd, rn } => write!(
                f,
                "fmov {}, {}",
                rname(rd.to_reg(), *bits == 64),
                fname(*rn, *bits)
            ),
            Inst::IntToFpu { src_bits, dst_bits, rd, rn } => write!(
                f,
                "scvtf {}, {}",
                fname(rd.to_reg(), *dst_bits),
                rname(*rn, *src_bits == 64)
            ),
            Inst::FpuToInt { src_bits, dst_bits, nearest, rd, rn } => write!(
                f,
                "{} {}, {}",
                if *nearest { "fcvtns" } else { "fcvtzs" },
                rname(rd.to_reg(), *dst_bits == 64),
                fname(*rn, *src_bits)
            ),
            Inst::FpuCvt { from_bits, to_bits, rd, rn } => write!(
                f,
                "fcvt {}, {}",
                fname(rd.to_reg(), *to_bits),
                fname(*rn, *from_bits)
            ),
            Inst::VecRRR { op, lane_bits, rd, rn, rm } => {
                let m = match op {
                    VecOp::Add => "add",
                    VecOp::Sub => "sub",
                    VecOp::And => "and",
                    VecOp::Orr => "orr",
                    VecOp::Eor => "eor",
                    VecOp::Fadd => "fadd",
                    VecOp::Fsub => "fsub",
                    VecOp::Fmul => "fmul",
                    VecOp::Fdiv => "fdiv",
                };
                // Bitwise forms always use the byte arrangement.
                let lb = match op {
                    VecOp::And | VecOp::Orr | VecOp::Eor => 8,
                    _ => *lane_bits,
                };
                write!(
                    f,
                    "{m} {}, {}, {}",
                    vname(rd.to_reg(), lb),
                    vname(*rn, lb),
                    vname(*rm, lb)
                )
            }
            Inst::VecMov { rd, rn } => {
                write!(f, "mov {}, {}", vname(rd.to_reg(), 8), vname(*rn, 8))
            }
            Inst::InsLane { lane_bits, idx, rd, rn } => write!(
                f,
                "ins {}[{idx}], {}",
                lane_name(rd.to_reg(), *lane_bits),
                rname(*rn, *lane_bits == 64)
            ),
            Inst::InsElem { lane_bits, idx, rd, rn } => write!(
                f,
                "ins {}[{idx}], {}[0]",
                lane_name(rd.to_reg(), *lane_bits),
                lane_name(*rn, *lane_bits)
            ),
            Inst::ExtLane { lane_bits, idx, rd, rn } => write!(
                f,
                "umov {}, {}[{idx}]",
                rname(rd.to_reg(), *lane_bits == 64),
                lane_name(*rn, *lane_bits)
            ),
            Inst::DupElem { lane_bits, idx, rd, rn } => write!(
                f,
                "mov {}, {}[{idx}]",
                fname(rd.to_reg(), *lane_bits),
                lane_name(*rn, *lane_bits)
            ),
            Inst::Udf => write!(f, "udf #0"),
        }
    }
}

fn lane_name(r: Reg, lane_bits: u8) -> String {
    let t = match lane_bits {
        8 => "b",
        16 => "h",
        32 => "s",
        _ => "d",
    };
    if r.is_virtual() {
        format!("{r}.{t}")
    } else {
        format!("v{}.{t}", r.hw_enc())
    }
}

fn show_mem(mem: &AMode) -> String {
    match mem {
        AMode::Base { rn } => format!("[{}]", rname(*rn, true)),
        AMode::Offset { rn, off } => format!("[{}, #{off}]", rname(*rn, true)),
        AMode::RegReg { rn, rm } => format!("[{}, {}]", rname(*rn, true), rname(*rm, true)),
        AMode::PreIndexed { rn, off } => format!("[{}, #{off}]!", rname(*rn, true)),
        AMode::PostIndexed { rn, off } => format!("[{}], #{off}", rname(*rn, true)),
    }
}

fn map_mem(mem: &mut AMode, f: &mut dyn FnMut(&mut Reg, OperandKind)) {
    match mem {
        AMode::Base { rn } | AMode::Offset { rn, .. } => f(rn, OperandKind::Use),
        AMode::RegReg { rn, rm } => {
            f(rn, OperandKind::Use);
            f(rm, OperandKind::Use);
        }
        // The base is also written back.
        AMode::PreIndexed { rn, .. } | AMode::PostIndexed { rn, .. } => {
            f(rn, OperandKind::UseDef)
        }
    }
}

impl MachInst for Inst {
    fn map_regs(&mut self, f: &mut dyn FnMut(&mut Reg, OperandKind)) {
        use OperandKind::*;
        match self {
            Inst::Nop | Inst::Dmb | Inst::Ret | Inst::Udf | Inst::Jump { .. }
            | Inst::CondBr { .. } | Inst::LabelDef { .. } => {}
            Inst::AluRRR { rd, rn, rm, .. } => {
                map_wr(rd, f, Def);
                f(rn, Use);
                f(rm, Use);
            }
            Inst::AluRRImm12 { rd, rn, .. } => {
                map_wr(rd, f, Def);
                f(rn, Use);
            }
            Inst::MovZ { rd, .. } => map_wr(rd, f, Def),
            Inst::MovK { rd, .. } => map_wr(rd, f, UseDef),
            Inst::MovRR { rd, rm, .. } => {
                map_wr(rd, f, Def);
                f(rm, Use);
            }
            Inst::Extend { rd, rn, .. }
            | Inst::UBfx { rd, rn, .. }
            | Inst::SBfx { rd, rn, .. } => {
                map_wr(rd, f, Def);
                f(rn, Use);
            }
            Inst::Bfi { rd, rn, .. } => {
                map_wr(rd, f, UseDef);
                f(rn, Use);
            }
            Inst::MAdd { rd, rn, rm, ra, .. } | Inst::MSub { rd, rn, rm, ra, .. } => {
                map_wr(rd, f, Def);
                f(rn, Use);
                f(rm, Use);
                f(ra, Use);
            }
            Inst::Load { rd, mem, .. } => {
                map_wr(rd, f, Def);
                map_mem(mem, f);
            }
            Inst::Store { rs, mem, .. } => {
                f(rs, Use);
                map_mem(mem, f);
            }
            Inst::CSel { rd, rn, rm, .. } => {
                map_wr(rd, f, Def);
                f(rn, Use);
                f(rm, Use);
            }
            Inst::CSet { rd, .. } => map_wr(rd, f, Def),
            Inst::FpuCSel { rd, rn, rm, .. } => {
                map_wr(rd, f, Def);
                f(rn, Use);
                f(rm, Use);
            }
            Inst::Cbz { rn, .. } | Inst::Cbnz { rn, .. } => f(rn, Use),
            Inst::Blr { rn } => f(rn, Use),
            Inst::LdAxr { rd, rn, .. } => {
                map_wr(rd, f, Def);
                f(rn, Use);
            }
            Inst::StlXr { status, rt, rn, .. } => {
                map_wr(status, f, Def);
                f(rt, Use);
                f(rn, Use);
            }
            Inst::FpuRRR { rd, rn, rm, .. } | Inst::VecRRR { rd, rn, rm, .. } => {
                map_wr(rd, f, Def);
                f(rn, Use);
                f(rm, Use);
            }
            Inst::FpuMov { rd, rn, .. }
            | Inst::MovToFpu { rd, rn, .. }
            | Inst::MovFromFpu { rd, rn, .. }
            | Inst::IntToFpu { rd, rn, .. }
            | Inst::FpuToInt { rd, rn, .. }
            | Inst::FpuCvt { rd, rn, .. }
            | Inst::VecMov { rd, rn }
            | Inst::ExtLane { rd, rn, .. }
            | Inst::DupElem { rd, rn, .. } => {
                map_wr(rd, f, Def);
                f(rn, Use);
            }
            Inst::InsLane { rd, rn, .. } | Inst::InsElem { rd, rn, .. } => {
                map_wr(rd, f, UseDef);
                f(rn, Use);
            }
        }
    }

    fn is_move(&self) -> Option<(Reg, Reg)> {
        match self {
            Inst::MovRR { rd, rm, size: OperandSize::Size64 } => Some((rd.to_reg(), *rm)),
            Inst::FpuMov { rd, rn, .. } | Inst::VecMov { rd, rn } => Some((rd.to_reg(), *rn)),
            _ => None,
        }
    }

    fn is_branch(&self) -> bool {
        matches!(
            self,
            Inst::CondBr { .. } | Inst::Cbz { .. } | Inst::Cbnz { .. } | Inst::Jump { .. }
        )
    }

    fn branch_target(&self) -> Option<Label> {
        match self {
            Inst::CondBr { target, .. }
            | Inst::Cbz { target, .. }
            | Inst::Cbnz { target, .. }
            | Inst::Jump { target } => Some(*target),
            _ => None,
        }
    }

    fn defines_label(&self) -> Option<Label> {
        match self {
            Inst::LabelDef { label } => Some(*label),
            _ => None,
        }
    }

    fn implicit_uses(&self) -> SmallVec<[Reg; 2]> {
        match self {
            Inst::CSel { .. } | Inst::CSet { .. } | Inst::FpuCSel { .. } | Inst::CondBr { .. } => {
                smallvec![nzcv()]
            }
            Inst::AluRRR { op, .. } | Inst::AluRRImm12 { op, .. } if op.reads_flags() => {
                smallvec![nzcv()]
            }
            _ => smallvec![],
        }
    }

    fn implicit_defs(&self) -> SmallVec<[Reg; 2]> {
        match self {
            Inst::AluRRR { op, .. } | Inst::AluRRImm12 { op, .. } if op.sets_flags() => {
                smallvec![nzcv()]
            }
            Inst::Blr { .. } => smallvec![super::regs::link_reg()],
            _ => smallvec![],
        }
    }
}

fn map_wr(wr: &mut Writable<Reg>, f: &mut dyn FnMut(&mut Reg, OperandKind), kind: OperandKind) {
    let mut r = wr.to_reg();
    f(&mut r, kind);
    *wr = Writable::from_reg(r);
}

/// The typed builder surface: one method per instruction form, validating
/// operands and appending to the stream.
pub struct Asm {
    pub stream: InstStream<Inst>,
}

fn check_int(r: Reg) -> Result<(), BackendError> {
    if r.class() != RegClass::Int {
        return Err(BackendError::InvalidOperand(format!(
            "{r} is not an integer register"
        )));
    }
    Ok(())
}

fn check_float(r: Reg) -> Result<(), BackendError> {
    if r.class() != RegClass::Float {
        return Err(BackendError::InvalidOperand(format!(
            "{r} is not a float register"
        )));
    }
    Ok(())
}

impl Asm {
    pub fn new() -> Self {
        Self {
            stream: InstStream::new(),
        }
    }

    pub fn new_label(&mut self) -> Label {
        self.stream.new_label()
    }

    pub fn bind(&mut self, label: Label) {
        self.stream.push_keep(Inst::LabelDef { label });
    }

    fn alu_rrr(
        &mut self,
        op: ALUOp,
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
    ) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rn)?;
        check_int(rm)?;
        self.stream.push(Inst::AluRRR { op, size, rd, rn, rm });
        Ok(())
    }

    pub fn add(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Add, size, rd, rn, rm)
    }
    pub fn adds(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Adds, size, rd, rn, rm)
    }
    pub fn sub(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Sub, size, rd, rn, rm)
    }
    pub fn subs(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Subs, size, rd, rn, rm)
    }
    pub fn adc(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Adc, size, rd, rn, rm)
    }
    pub fn sbc(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Sbc, size, rd, rn, rm)
    }
    pub fn and_(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::And, size, rd, rn, rm)
    }
    pub fn orr(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Orr, size, rd, rn, rm)
    }
    /// Bitwise complement: `orn rd, xzr, rm`.
    pub fn mvn(&mut self, size: OperandSize, rd: Writable<Reg>, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::OrrNot, size, rd, zero_reg(), rm)
    }
    pub fn eor(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Eor, size, rd, rn, rm)
    }
    pub fn lsl(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Lsl, size, rd, rn, rm)
    }
    pub fn lsr(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Lsr, size, rd, rn, rm)
    }
    pub fn asr(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::Asr, size, rd, rn, rm)
    }
    pub fn sdiv(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::SDiv, size, rd, rn, rm)
    }
    pub fn udiv(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::UDiv, size, rd, rn, rm)
    }
    pub fn smulh(&mut self, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::SMulH, OperandSize::Size64, rd, rn, rm)
    }
    pub fn umulh(&mut self, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.alu_rrr(ALUOp::UMulH, OperandSize::Size64, rd, rn, rm)
    }

    fn alu_imm12(
        &mut self,
        op: ALUOp,
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        imm: u64,
    ) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rn)?;
        if imm > 0xfff {
            return Err(BackendError::InvalidOperand(format!(
                "immediate {imm:#x} does not fit in 12 bits"
            )));
        }
        self.stream.push(Inst::AluRRImm12 {
            op,
            size,
            rd,
            rn,
            imm12: imm as u16,
        });
        Ok(())
    }

    pub fn add_imm(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, imm: u64) -> Result<(), BackendError> {
        self.alu_imm12(ALUOp::Add, size, rd, rn, imm)
    }
    pub fn sub_imm(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, imm: u64) -> Result<(), BackendError> {
        self.alu_imm12(ALUOp::Sub, size, rd, rn, imm)
    }
    pub fn subs_imm(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, imm: u64) -> Result<(), BackendError> {
        self.alu_imm12(ALUOp::Subs, size, rd, rn, imm)
    }

    /// `cmp rn, rm`.
    pub fn cmp(&mut self, size: OperandSize, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.subs(size, Writable::from_reg(zero_reg()), rn, rm)
    }

    /// `cmp rn, #imm`.
    pub fn cmp_imm(&mut self, size: OperandSize, rn: Reg, imm: u64) -> Result<(), BackendError> {
        self.subs_imm(size, Writable::from_reg(zero_reg()), rn, imm)
    }

    pub fn mov(&mut self, size: OperandSize, rd: Writable<Reg>, rm: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rm)?;
        self.stream.push(Inst::MovRR { size, rd, rm });
        Ok(())
    }

    fn movz(&mut self, size: OperandSize, rd: Writable<Reg>, imm16: u16, shift: u8) {
        self.stream.push(Inst::MovZ { size, rd, imm16, shift });
    }

    fn movk(&mut self, size: OperandSize, rd: Writable<Reg>, imm16: u16, shift: u8) {
        self.stream.push(Inst::MovK { size, rd, imm16, shift });
    }

    /// Materialize a 64-bit immediate: one `movz` for the first non-zero
    /// 16-bit lane and one `movk` per further non-zero lane.
    pub fn move_immediate(&mut self, rd: Writable<Reg>, value: u64) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        if value == 0 {
            self.movz(OperandSize::Size64, rd, 0, 0);
            return Ok(());
        }
        let mut first = true;
        for lane in 0..4 {
            let chunk = ((value >> (lane * 16)) & 0xffff) as u16;
            if chunk == 0 {
                continue;
            }
            if first {
                self.movz(OperandSize::Size64, rd, chunk, lane * 16);
                first = false;
            } else {
                self.movk(OperandSize::Size64, rd, chunk, lane * 16);
            }
        }
        Ok(())
    }

    pub fn extend(
        &mut self,
        rd: Writable<Reg>,
        rn: Reg,
        signed: bool,
        from_bits: u8,
        to_bits: u8,
    ) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rn)?;
        if !matches!(from_bits, 8 | 16 | 32) || to_bits <= from_bits {
            return Err(BackendError::InvalidOperand(format!(
                "cannot extend from {from_bits} to {to_bits} bits"
            )));
        }
        self.stream.push(Inst::Extend {
            rd,
            rn,
            signed,
            from_bits,
            to_bits,
        });
        Ok(())
    }

    fn bitfield(
        &mut self,
        size: OperandSize,
        lsb: u8,
        width: u8,
    ) -> Result<(), BackendError> {
        let limit = if size.is64() { 64 } else { 32 };
        if width == 0 || lsb as u32 + width as u32 > limit {
            return Err(BackendError::InvalidOperand(format!(
                "bitfield [{lsb}, {lsb}+{width}) exceeds {limit} bits"
            )));
        }
        Ok(())
    }

    pub fn ubfx(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, lsb: u8, width: u8) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rn)?;
        self.bitfield(size, lsb, width)?;
        self.stream.push(Inst::UBfx { size, rd, rn, lsb, width });
        Ok(())
    }

    pub fn sbfx(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, lsb: u8, width: u8) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rn)?;
        self.bitfield(size, lsb, width)?;
        self.stream.push(Inst::SBfx { size, rd, rn, lsb, width });
        Ok(())
    }

    pub fn bfi(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, lsb: u8, width: u8) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rn)?;
        self.bitfield(size, lsb, width)?;
        self.stream.push(Inst::Bfi { size, rd, rn, lsb, width });
        Ok(())
    }

    pub fn madd(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg, ra: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        self.stream.push(Inst::MAdd { size, rd, rn, rm, ra });
        Ok(())
    }

    pub fn msub(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg, ra: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        self.stream.push(Inst::MSub { size, rd, rn, rm, ra });
        Ok(())
    }

    /// `mul` is `madd` with a zero addend.
    pub fn mul(&mut self, size: OperandSize, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.madd(size, rd, rn, rm, zero_reg())
    }

    fn check_amode(&self, bits: u8, mem: &AMode) -> Result<(), BackendError> {
        check_int(mem.base())?;
        match mem {
            AMode::Offset { off, .. } => {
                let scale = (bits / 8) as i32;
                let scaled_ok = *off >= 0 && *off % scale == 0 && *off / scale < 4096;
                let unscaled_ok = (-256..256).contains(off);
                if !scaled_ok && !unscaled_ok {
                    return Err(BackendError::InvalidOperand(format!(
                        "load/store offset {off} out of range"
                    )));
                }
            }
            AMode::PreIndexed { off, .. } | AMode::PostIndexed { off, .. } => {
                if !(-256..256).contains(off) {
                    return Err(BackendError::InvalidOperand(format!(
                        "indexed offset {off} out of range"
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn ldr(&mut self, bits: u8, rd: Writable<Reg>, mem: AMode) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        self.check_amode(bits, &mem)?;
        self.stream.push(Inst::Load { bits, rd, mem });
        Ok(())
    }

    pub fn str(&mut self, bits: u8, rs: Reg, mem: AMode) -> Result<(), BackendError> {
        check_int(rs)?;
        self.check_amode(bits, &mem)?;
        self.stream.push(Inst::Store { bits, rs, mem });
        Ok(())
    }

    pub fn csel(&mut self, size: OperandSize, cond: Cond, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        self.stream.push(Inst::CSel { size, cond, rd, rn, rm });
        Ok(())
    }

    pub fn cset(&mut self, rd: Writable<Reg>, cond: Cond) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        self.stream.push(Inst::CSet { cond, rd });
        Ok(())
    }

    pub fn fcsel(&mut self, bits: u8, cond: Cond, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rn)?;
        check_float(rm)?;
        self.stream.push(Inst::FpuCSel { bits, cond, rd, rn, rm });
        Ok(())
    }

    pub fn b(&mut self, target: Label) {
        self.stream.push_keep(Inst::Jump { target });
    }

    pub fn b_cond(&mut self, cond: Cond, target: Label) {
        self.stream.push_keep(Inst::CondBr { cond, target });
    }

    pub fn cbz(&mut self, size: OperandSize, rn: Reg, target: Label) {
        self.stream.push_keep(Inst::Cbz { size, rn, target });
    }

    pub fn cbnz(&mut self, size: OperandSize, rn: Reg, target: Label) {
        self.stream.push_keep(Inst::Cbnz { size, rn, target });
    }

    pub fn blr(&mut self, rn: Reg) -> Result<(), BackendError> {
        check_int(rn)?;
        self.stream.push_keep(Inst::Blr { rn });
        Ok(())
    }

    pub fn ret(&mut self) {
        self.stream.push_keep(Inst::Ret);
    }

    pub fn nop(&mut self) {
        self.stream.push_keep(Inst::Nop);
    }

    pub fn udf(&mut self) {
        self.stream.push_keep(Inst::Udf);
    }

    pub fn ldaxr(&mut self, bits: u8, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rn)?;
        self.stream.push_keep(Inst::LdAxr { bits, rd, rn });
        Ok(())
    }

    pub fn stlxr(&mut self, bits: u8, status: Writable<Reg>, rt: Reg, rn: Reg) -> Result<(), BackendError> {
        check_int(status.to_reg())?;
        check_int(rt)?;
        check_int(rn)?;
        self.stream.push_keep(Inst::StlXr { bits, status, rt, rn });
        Ok(())
    }

    pub fn dmb(&mut self) {
        self.stream.push_keep(Inst::Dmb);
    }

    /// Scalar FPU arithmetic with the operation as a parameter.
    pub fn fpu_op(&mut self, op: FpuOp, bits: u8, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.fpu_rrr(op, bits, rd, rn, rm)
    }

    fn fpu_rrr(&mut self, op: FpuOp, bits: u8, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rn)?;
        check_float(rm)?;
        self.stream.push(Inst::FpuRRR { op, bits, rd, rn, rm });
        Ok(())
    }

    pub fn fadd(&mut self, bits: u8, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.fpu_rrr(FpuOp::Add, bits, rd, rn, rm)
    }
    pub fn fsub(&mut self, bits: u8, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.fpu_rrr(FpuOp::Sub, bits, rd, rn, rm)
    }
    pub fn fmul(&mut self, bits: u8, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.fpu_rrr(FpuOp::Mul, bits, rd, rn, rm)
    }
    pub fn fdiv(&mut self, bits: u8, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        self.fpu_rrr(FpuOp::Div, bits, rd, rn, rm)
    }

    pub fn fmov(&mut self, bits: u8, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rn)?;
        self.stream.push(Inst::FpuMov { bits, rd, rn });
        Ok(())
    }

    /// `fmov` requires one side to be a floating-point register; these two
    /// forms move into and out of the FP bank.
    pub fn fmov_to_fpu(&mut self, bits: u8, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_int(rn)?;
        self.stream.push(Inst::MovToFpu { bits, rd, rn });
        Ok(())
    }

    pub fn fmov_from_fpu(&mut self, bits: u8, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_float(rn)?;
        self.stream.push(Inst::MovFromFpu { bits, rd, rn });
        Ok(())
    }

    pub fn scvtf(&mut self, src_bits: u8, dst_bits: u8, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_int(rn)?;
        self.stream.push(Inst::IntToFpu { src_bits, dst_bits, rd, rn });
        Ok(())
    }

    pub fn fcvt_to_int(
        &mut self,
        src_bits: u8,
        dst_bits: u8,
        nearest: bool,
        rd: Writable<Reg>,
        rn: Reg,
    ) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_float(rn)?;
        self.stream.push(Inst::FpuToInt {
            src_bits,
            dst_bits,
            nearest,
            rd,
            rn,
        });
        Ok(())
    }

    pub fn fcvt(&mut self, from_bits: u8, to_bits: u8, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rn)?;
        self.stream.push(Inst::FpuCvt { from_bits, to_bits, rd, rn });
        Ok(())
    }

    pub fn vec_rrr(&mut self, op: VecOp, lane_bits: u8, rd: Writable<Reg>, rn: Reg, rm: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rn)?;
        check_float(rm)?;
        self.stream.push(Inst::VecRRR { op, lane_bits, rd, rn, rm });
        Ok(())
    }

    pub fn vec_mov(&mut self, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rn)?;
        self.stream.push(Inst::VecMov { rd, rn });
        Ok(())
    }

    pub fn ins_lane(&mut self, lane_bits: u8, idx: u8, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_int(rn)?;
        self.check_lane(lane_bits, idx)?;
        self.stream.push(Inst::InsLane { lane_bits, idx, rd, rn });
        Ok(())
    }

    pub fn ins_elem(&mut self, lane_bits: u8, idx: u8, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rn)?;
        self.check_lane(lane_bits, idx)?;
        self.stream.push(Inst::InsElem { lane_bits, idx, rd, rn });
        Ok(())
    }

    pub fn ext_lane(&mut self, lane_bits: u8, idx: u8, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_float(rn)?;
        self.check_lane(lane_bits, idx)?;
        self.stream.push(Inst::ExtLane { lane_bits, idx, rd, rn });
        Ok(())
    }

    pub fn dup_elem(&mut self, lane_bits: u8, idx: u8, rd: Writable<Reg>, rn: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rn)?;
        self.check_lane(lane_bits, idx)?;
        self.stream.push(Inst::DupElem { lane_bits, idx, rd, rn });
        Ok(())
    }

    fn check_lane(&self, lane_bits: u8, idx: u8) -> Result<(), BackendError> {
        let lanes = 128 / lane_bits as u32;
        if idx as u32 >= lanes {
            return Err(BackendError::InvalidOperand(format!(
                "lane {idx} out of range for {lane_bits}-bit lanes"
            )));
        }
        Ok(())
    }
}

impl Default for Asm {
    fn default() -> Self {
        Self::new()
    }
}
