//! RISC-V 64 instruction definitions and the typed builder surface.

use super::regs::{show_freg, show_xreg};
use crate::machinst::{InstStream, Label, MachInst, OperandKind};
use crate::reg::{Reg, RegClass, Writable};
use crate::BackendError;
use core::fmt;
use smallvec::{smallvec, SmallVec};

/// R-type ALU operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Sll,
    Srl,
    Sra,
    Slt,
    Sltu,
    And,
    Or,
    Xor,
    Mul,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
}

impl AluOp {
    fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::Sll => "sll",
            AluOp::Srl => "srl",
            AluOp::Sra => "sra",
            AluOp::Slt => "slt",
            AluOp::Sltu => "sltu",
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Xor => "xor",
            AluOp::Mul => "mul",
            AluOp::Mulhu => "mulhu",
            AluOp::Div => "div",
            AluOp::Divu => "divu",
            AluOp::Rem => "rem",
            AluOp::Remu => "remu",
        }
    }
}

/// I-type ALU operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluImmOp {
    Addi,
    Addiw,
    Sltiu,
    Andi,
    Ori,
    Xori,
    Slli,
    Srli,
    Srai,
}

impl AluImmOp {
    fn mnemonic(self) -> &'static str {
        match self {
            AluImmOp::Addi => "addi",
            AluImmOp::Addiw => "addiw",
            AluImmOp::Sltiu => "sltiu",
            AluImmOp::Andi => "andi",
            AluImmOp::Ori => "ori",
            AluImmOp::Xori => "xori",
            AluImmOp::Slli => "slli",
            AluImmOp::Srli => "srli",
            AluImmOp::Srai => "srai",
        }
    }
}

/// Load operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadOp {
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lw,
    Lwu,
    Ld,
}

impl LoadOp {
    fn mnemonic(self) -> &'static str {
        match self {
            LoadOp::Lb => "lb",
            LoadOp::Lbu => "lbu",
            LoadOp::Lh => "lh",
            LoadOp::Lhu => "lhu",
            LoadOp::Lw => "lw",
            LoadOp::Lwu => "lwu",
            LoadOp::Ld => "ld",
        }
    }
}

/// Store operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Sb,
    Sh,
    Sw,
    Sd,
}

impl StoreOp {
    fn mnemonic(self) -> &'static str {
        match self {
            StoreOp::Sb => "sb",
            StoreOp::Sh => "sh",
            StoreOp::Sw => "sw",
            StoreOp::Sd => "sd",
        }
    }
}

/// Conditional branch comparisons.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BrOp {
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
}

impl BrOp {
    fn mnemonic(self) -> &'static str {
        match self {
            BrOp::Beq => "beq",
            BrOp::Bne => "bne",
            BrOp::Blt => "blt",
            BrOp::Bge => "bge",
            BrOp::Bltu => "bltu",
            BrOp::Bgeu => "bgeu",
        }
    }
}

/// Atomic memory operations (A extension).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AmoOp {
    Swap,
    Add,
    Xor,
    And,
    Or,
}

impl AmoOp {
    fn mnemonic(self) -> &'static str {
        match self {
            AmoOp::Swap => "amoswap",
            AmoOp::Add => "amoadd",
            AmoOp::Xor => "amoxor",
            AmoOp::And => "amoand",
            AmoOp::Or => "amoor",
        }
    }
}

/// Scalar float arithmetic.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FpuOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A RISC-V 64 machine instruction.
#[derive(Clone, Debug)]
pub enum Inst {
    AluRRR {
        op: AluOp,
        rd: Writable<Reg>,
        rs1: Reg,
        rs2: Reg,
    },
    AluRRImm {
        op: AluImmOp,
        rd: Writable<Reg>,
        rs1: Reg,
        imm12: i16,
    },
    Lui {
        rd: Writable<Reg>,
        /// The 20-bit immediate, pre-shifted out of the low 12 bits.
        imm20: i32,
    },
    Mv {
        rd: Writable<Reg>,
        rs: Reg,
    },
    Load {
        op: LoadOp,
        rd: Writable<Reg>,
        base: Reg,
        offset: i16,
    },
    Store {
        op: StoreOp,
        src: Reg,
        base: Reg,
        offset: i16,
    },
    Branch {
        op: BrOp,
        rs1: Reg,
        rs2: Reg,
        target: Label,
    },
    Jal {
        rd: Writable<Reg>,
        target: Label,
    },
    Jalr {
        rd: Writable<Reg>,
        base: Reg,
        offset: i16,
    },
    LabelDef {
        label: Label,
    },
    LoadReserved {
        is64: bool,
        rd: Writable<Reg>,
        addr: Reg,
    },
    StoreConditional {
        is64: bool,
        rd: Writable<Reg>,
        src: Reg,
        addr: Reg,
    },
    Amo {
        op: AmoOp,
        is64: bool,
        rd: Writable<Reg>,
        src: Reg,
        addr: Reg,
    },
    FpuRRR {
        op: FpuOp,
        bits: u8,
        rd: Writable<Reg>,
        rs1: Reg,
        rs2: Reg,
    },
    /// FSGNJ rd, rs, rs: a float register move.
    FpuMv {
        bits: u8,
        rd: Writable<Reg>,
        rs: Reg,
    },
    /// FMV.X.W / FMV.X.D.
    FpuMvToX {
        bits: u8,
        rd: Writable<Reg>,
        rs: Reg,
    },
    /// FMV.W.X / FMV.D.X.
    FpuMvFromX {
        bits: u8,
        rd: Writable<Reg>,
        rs: Reg,
    },
    /// FCVT.{S,D}.{W,L}.
    IntToFpu {
        int_bits: u8,
        f_bits: u8,
        rd: Writable<Reg>,
        rs: Reg,
    },
    /// FCVT.{W,L}.{S,D}, truncating or round-to-nearest.
    FpuToInt {
        f_bits: u8,
        int_bits: u8,
        rtz: bool,
        rd: Writable<Reg>,
        rs: Reg,
    },
    /// FCVT.D.S / FCVT.S.D.
    FpuCvt {
        from_bits: u8,
        to_bits: u8,
        rd: Writable<Reg>,
        rs: Reg,
    },
    Ebreak,
}

fn xname(r: Reg) -> String {
    if r.is_virtual() {
        format!("{r}")
    } else {
        show_xreg(r.hw_enc()).to_string()
    }
}

fn fnname(r: Reg) -> String {
    if r.is_virtual() {
        format!("{r}")
    } else {
        show_freg(r.hw_enc()).to_string()
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Inst::AluRRR { op, rd, rs1, rs2 } => write!(
                f,
                "{} {}, {}, {}",
                op.mnemonic(),
                xname(rd.to_reg()),
                xname(*rs1),
                xname(*rs2)
            ),
            Inst::AluRRImm { op, rd, rs1, imm12 } => write!(
                f,
                "{} {}, {}, {}",
                op.mnemonic(),
                xname(rd.to_reg()),
                xname(*rs1),
                imm12
            ),
            Inst::Lui { rd, imm20 } => write!(f, "lui {}, {:#x}", xname(rd.to_reg()), imm20),
            Inst::Mv { rd, rs } => write!(f, "mv {}, {}", xname(rd.to_reg()), xname(*rs)),
            Inst::Load { op, rd, base, offset } => write!(
                f,
                "{} {}, {}({})",
                op.mnemonic(),
                xname(rd.to_reg()),
                offset,
                xname(*base)
            ),
            Inst::Store { op, src, base, offset } => write!(
                f,
                "{} {}, {}({})",
                op.mnemonic(),
                xname(*src),
                offset,
                xname(*base)
            ),
            Inst::Branch { op, rs1, rs2, target } => write!(
                f,
                "{} {}, {}, {target}",
                op.mnemonic(),
                xname(*rs1),
                xname(*rs2)
            ),
            Inst::Jal { rd, target } => write!(f, "jal {}, {target}", xname(rd.to_reg())),
            Inst::Jalr { rd, base, offset } => write!(
                f,
                "jalr {}, {}({})",
                xname(rd.to_reg()),
                offset,
                xname(*base)
            ),
            Inst::LabelDef { label } => write!(f, "{label}:"),
            Inst::LoadReserved { is64, rd, addr } => write!(
                f,
                "lr.{} {}, ({})",
                if *is64 { "d" } else { "w" },
                xname(rd.to_reg()),
                xname(*addr)
            ),
            Inst::StoreConditional { is64, rd, src, addr } => write!(
                f,
                "sc.{} {}, {}, ({})",
                if *is64 { "d" } else { "w" },
                xname(rd.to_reg()),
                xname(*src),
                xname(*addr)
            ),
            Inst::Amo { op, is64, rd, src, addr } => write!(
                f,
                "{}.{}.aqrl {}, {}, ({})",
                op.mnemonic(),
                if *is64 { "d" } else { "w" },
                xname(rd.to_reg()),
                xname(*src),
                xname(*addr)
            ),
            Inst::FpuRRR { op, bits, rd, rs1, rs2 } => {
                let m = match op {
                    FpuOp::Add => "fadd",
                    FpuOp::Sub => "fsub",
                    FpuOp::Mul => "fmul",
                    FpuOp::Div => "fdiv",
                };
                write!(
                    f,
                    "{m}.{} {}, {}, {}",
                    if *bits == 64 { "d" } else { "s" },
                    fnname(rd.to_reg()),
                    fnname(*rs1),
                    fnname(*rs2)
                )
            }
            Inst::FpuMv { bits, rd, rs } => write!(
                f,
                "fmv.{} {}, {}",
                if *bits == 64 { "d" } else { "s" },
                fnname(rd.to_reg()),
                fnname(*rs)
            ),
            Inst::FpuMvToX { bits, rd, rs } => write!(
                f,
                "fmv.x.{} {}, {}",
                if *bits == 64 { "d" } else { "w" },
                xname(rd.to_reg()),
                fnname(*rs)
            ),
            Inst::FpuMvFromX { bits, rd, rs } => write!(
                f,
                "fmv.{}.x {}, {}",
                if *bits == 64 { "d" } else { "w" },
                fnname(rd.to_reg()),
                xname(*rs)
            ),
            Inst::IntToFpu { int_bits, f_bits, rd, rs } => write!(
                f,
                "fcvt.{}.{} {}, {}",
                if *f_bits == 64 { "d" } else { "s" },
                if *int_bits == 64 { "l" } else { "w" },
                fnname(rd.to_reg()),
                xname(*rs)
            ),
            Inst::FpuToInt { f_bits, int_bits, rtz, rd, rs } => write!(
                f,
                "fcvt.{}.{} {}, {}{}",
                if *int_bits == 64 { "l" } else { "w" },
                if *f_bits == 64 { "d" } else { "s" },
                xname(rd.to_reg()),
                fnname(*rs),
                if *rtz { ", rtz" } else { "" }
            ),
            Inst::FpuCvt { from_bits, to_bits, rd, rs } => write!(
                f,
                "fcvt.{}.{} {}, {}",
                if *to_bits == 64 { "d" } else { "s" },
                if *from_bits == 64 { "d" } else { "s" },
                fnname(rd.to_reg()),
                fnname(*rs)
            ),
            Inst::Ebreak => write!(f, "ebreak"),
        }
    }
}

impl MachInst for Inst {
    fn map_regs(&mut self, f: &mut dyn FnMut(&mut Reg, OperandKind)) {
        use OperandKind::*;
        match self {
            Inst::LabelDef { .. } | Inst::Ebreak => {}
            Inst::AluRRR { rd, rs1, rs2, .. } => {
                map_wr(rd, f, Def);
                f(rs1, Use);
                f(rs2, Use);
            }
            Inst::AluRRImm { rd, rs1, .. } => {
                map_wr(rd, f, Def);
                f(rs1, Use);
            }
            Inst::Lui { rd, .. } => map_wr(rd, f, Def),
            Inst::Mv { rd, rs } => {
                map_wr(rd, f, Def);
                f(rs, Use);
            }
            Inst::Load { rd, base, .. } => {
                map_wr(rd, f, Def);
                f(base, Use);
            }
            Inst::Store { src, base, .. } => {
                f(src, Use);
                f(base, Use);
            }
            Inst::Branch { rs1, rs2, .. } => {
                f(rs1, Use);
                f(rs2, Use);
            }
            Inst::Jal { rd, .. } => map_wr(rd, f, Def),
            Inst::Jalr { rd, base, .. } => {
                map_wr(rd, f, Def);
                f(base, Use);
            }
            Inst::LoadReserved { rd, addr, .. } => {
                map_wr(rd, f, Def);
                f(addr, Use);
            }
            Inst::StoreConditional { rd, src, addr, .. } => {
                map_wr(rd, f, Def);
                f(src, Use);
                f(addr, Use);
            }
            Inst::Amo { rd, src, addr, .. } => {
                map_wr(rd, f, Def);
                f(src, Use);
                f(addr, Use);
            }
            Inst::FpuRRR { rd, rs1, rs2, .. } => {
                map_wr(rd, f, Def);
                f(rs1, Use);
                f(rs2, Use);
            }
            Inst::FpuMv { rd, rs, .. }
            | Inst::FpuMvToX { rd, rs, .. }
            | Inst::FpuMvFromX { rd, rs, .. }
            | Inst::IntToFpu { rd, rs, .. }
            | Inst::FpuToInt { rd, rs, .. }
            | Inst::FpuCvt { rd, rs, .. } => {
                map_wr(rd, f, Def);
                f(rs, Use);
            }
        }
    }

    fn is_move(&self) -> Option<(Reg, Reg)> {
        match self {
            Inst::Mv { rd, rs } => Some((rd.to_reg(), *rs)),
            Inst::FpuMv { rd, rs, .. } => Some((rd.to_reg(), *rs)),
            _ => None,
        }
    }

    fn is_branch(&self) -> bool {
        matches!(self, Inst::Branch { .. } | Inst::Jal { .. })
    }

    fn branch_target(&self) -> Option<Label> {
        match self {
            Inst::Branch { target, .. } | Inst::Jal { target, .. } => Some(*target),
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
        smallvec![]
    }

    fn implicit_defs(&self) -> SmallVec<[Reg; 2]> {
        match self {
            Inst::Jalr { .. } => smallvec![super::regs::link_reg()],
            _ => smallvec![],
        }
    }
}

fn map_wr(wr: &mut Writable<Reg>, f: &mut dyn FnMut(&mut Reg, OperandKind), kind: OperandKind) {
    let mut r = wr.to_reg();
    f(&mut r, kind);
    *wr = Writable::from_reg(r);
}

/// The typed builder surface for RISC-V 64.
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

fn check_imm12(imm: i64) -> Result<i16, BackendError> {
    if !(-2048..2048).contains(&imm) {
        return Err(BackendError::InvalidOperand(format!(
            "immediate {imm} does not fit in 12 bits"
        )));
    }
    Ok(imm as i16)
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

    pub fn alu(&mut self, op: AluOp, rd: Writable<Reg>, rs1: Reg, rs2: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rs1)?;
        check_int(rs2)?;
        self.stream.push(Inst::AluRRR { op, rd, rs1, rs2 });
        Ok(())
    }

    pub fn alu_imm(&mut self, op: AluImmOp, rd: Writable<Reg>, rs1: Reg, imm: i64) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rs1)?;
        let imm12 = match op {
            AluImmOp::Slli | AluImmOp::Srli | AluImmOp::Srai => {
                if !(0..64).contains(&imm) {
                    return Err(BackendError::InvalidOperand(format!(
                        "shift amount {imm} out of range"
                    )));
                }
                imm as i16
            }
            _ => check_imm12(imm)?,
        };
        self.stream.push(Inst::AluRRImm { op, rd, rs1, imm12 });
        Ok(())
    }

    pub fn mv(&mut self, rd: Writable<Reg>, rs: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(rs)?;
        self.stream.push(Inst::Mv { rd, rs });
        Ok(())
    }

    fn lui(&mut self, rd: Writable<Reg>, imm20: i32) {
        self.stream.push(Inst::Lui { rd, imm20 });
    }

    /// Materialize a 64-bit immediate: `addi` when it fits 12 bits,
    /// `lui`+`addiw` for 32-bit values, and a shift/or chain otherwise.
    pub fn move_immediate(&mut self, rd: Writable<Reg>, value: u64) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        let sv = value as i64;
        if (-2048..2048).contains(&sv) {
            return self.alu_imm(AluImmOp::Addi, rd, super::regs::zero_reg(), sv);
        }
        if sv == sv as i32 as i64 {
            let v = sv as i32;
            let lo = ((v << 20) >> 20) as i64; // sign-extended low 12
            let hi = (v.wrapping_sub(lo as i32)) >> 12;
            self.lui(rd, hi);
            if lo != 0 {
                self.alu_imm(AluImmOp::Addiw, rd, rd.to_reg(), lo)?;
            }
            return Ok(());
        }
        // 64-bit: build the upper 31 bits, then shift in 11-bit chunks.
        self.move_immediate(rd, value >> 33)?;
        for chunk_idx in 0..3 {
            let shift = 22 - chunk_idx * 11;
            let chunk = (value >> shift) & 0x7ff;
            self.alu_imm(AluImmOp::Slli, rd, rd.to_reg(), 11)?;
            if chunk != 0 {
                self.alu_imm(AluImmOp::Ori, rd, rd.to_reg(), chunk as i64)?;
            }
        }
        Ok(())
    }

    pub fn load(&mut self, op: LoadOp, rd: Writable<Reg>, base: Reg, offset: i64) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(base)?;
        let offset = check_imm12(offset)?;
        self.stream.push(Inst::Load { op, rd, base, offset });
        Ok(())
    }

    pub fn store(&mut self, op: StoreOp, src: Reg, base: Reg, offset: i64) -> Result<(), BackendError> {
        check_int(src)?;
        check_int(base)?;
        let offset = check_imm12(offset)?;
        self.stream.push(Inst::Store { op, src, base, offset });
        Ok(())
    }

    pub fn branch(&mut self, op: BrOp, rs1: Reg, rs2: Reg, target: Label) {
        self.stream.push_keep(Inst::Branch { op, rs1, rs2, target });
    }

    pub fn j(&mut self, target: Label) {
        self.stream.push_keep(Inst::Jal {
            rd: Writable::from_reg(super::regs::zero_reg()),
            target,
        });
    }

    pub fn jalr(&mut self, rd: Writable<Reg>, base: Reg, offset: i64) -> Result<(), BackendError> {
        check_int(base)?;
        let offset = check_imm12(offset)?;
        self.stream.push_keep(Inst::Jalr { rd, base, offset });
        Ok(())
    }

    pub fn ret(&mut self) {
        self.stream.push_keep(Inst::Jalr {
            rd: Writable::from_reg(super::regs::zero_reg()),
            base: super::regs::link_reg(),
            offset: 0,
        });
    }

    pub fn lr(&mut self, is64: bool, rd: Writable<Reg>, addr: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(addr)?;
        self.stream.push_keep(Inst::LoadReserved { is64, rd, addr });
        Ok(())
    }

    pub fn sc(&mut self, is64: bool, rd: Writable<Reg>, src: Reg, addr: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(src)?;
        check_int(addr)?;
        self.stream.push_keep(Inst::StoreConditional { is64, rd, src, addr });
        Ok(())
    }

    pub fn amo(&mut self, op: AmoOp, is64: bool, rd: Writable<Reg>, src: Reg, addr: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_int(src)?;
        check_int(addr)?;
        self.stream.push_keep(Inst::Amo { op, is64, rd, src, addr });
        Ok(())
    }

    pub fn fpu_op(&mut self, op: FpuOp, bits: u8, rd: Writable<Reg>, rs1: Reg, rs2: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rs1)?;
        check_float(rs2)?;
        self.stream.push(Inst::FpuRRR { op, bits, rd, rs1, rs2 });
        Ok(())
    }

    pub fn fmv(&mut self, bits: u8, rd: Writable<Reg>, rs: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rs)?;
        self.stream.push(Inst::FpuMv { bits, rd, rs });
        Ok(())
    }

    /// `fmv` between banks requires exactly one float register.
    pub fn fmv_to_x(&mut self, bits: u8, rd: Writable<Reg>, rs: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_float(rs)?;
        self.stream.push(Inst::FpuMvToX { bits, rd, rs });
        Ok(())
    }

    pub fn fmv_from_x(&mut self, bits: u8, rd: Writable<Reg>, rs: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_int(rs)?;
        self.stream.push(Inst::FpuMvFromX { bits, rd, rs });
        Ok(())
    }

    pub fn fcvt_from_int(&mut self, int_bits: u8, f_bits: u8, rd: Writable<Reg>, rs: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_int(rs)?;
        self.stream.push(Inst::IntToFpu { int_bits, f_bits, rd, rs });
        Ok(())
    }

    pub fn fcvt_to_int(&mut self, f_bits: u8, int_bits: u8, rtz: bool, rd: Writable<Reg>, rs: Reg) -> Result<(), BackendError> {
        check_int(rd.to_reg())?;
        check_float(rs)?;
        self.stream.push(Inst::FpuToInt { f_bits, int_bits, rtz, rd, rs });
        Ok(())
    }

    pub fn fcvt(&mut self, from_bits: u8, to_bits: u8, rd: Writable<Reg>, rs: Reg) -> Result<(), BackendError> {
        check_float(rd.to_reg())?;
        check_float(rs)?;
        self.stream.push(Inst::FpuCvt { from_bits, to_bits, rd, rs });
        Ok(())
    }

    pub fn ebreak(&mut self) {
        self.stream.push_keep(Inst::Ebreak);
    }
}

impl Default for Asm {
    fn default() -> Self {
        Self::new()
    }
}
