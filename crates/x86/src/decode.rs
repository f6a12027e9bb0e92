//! x86-64 instruction decoding.
//!
//! Identifies one instruction at a time: legacy and REX prefixes, one- and
//! two-byte opcode maps, ModRM/SIB/displacement and immediates. The result
//! carries an instruction class, the effective operand width, and an
//! ordered operand list with the destination first, which is the numbering
//! the translators use.
//!
//! Coverage is the integer, control-flow and SSE subset the translators
//! understand. Recognized-but-untranslated classes (e.g. rotates) decode
//! fine and are lifted as poison calls; bytes outside the recognized maps
//! are a [`DecodeError`], which truncates the chunk.

use crate::regs::{Reg, RegClass, Segment};
use core::fmt;
use smallvec::{smallvec, SmallVec};

/// Instruction decode failure.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte stream ended inside an instruction.
    Truncated,
    /// A byte sequence outside the recognized opcode maps.
    UnknownOpcode(u8),
    /// Recognized but deliberately not decoded (EVEX, VEX).
    Unsupported(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "byte stream ends inside an instruction"),
            DecodeError::UnknownOpcode(b) => write!(f, "unknown opcode byte {b:#04x}"),
            DecodeError::Unsupported(what) => write!(f, "unsupported encoding: {what}"),
        }
    }
}

impl std::error::Error for DecodeError {}

macro_rules! iclasses {
    ($($variant:ident = $name:expr,)*) => {
        /// The semantic class of a decoded instruction.
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        pub enum IClass {
            $($variant,)*
        }

        impl IClass {
            /// Lower-case mnemonic, also used to label poison calls.
            pub fn name(self) -> &'static str {
                match self {
                    $(IClass::$variant => $name,)*
                }
            }
        }
    };
}

iclasses! {
    Add = "add", Adc = "adc", And = "and", Or = "or", Sbb = "sbb", Sub = "sub",
    Xor = "xor", Cmp = "cmp", Test = "test", Not = "not", Neg = "neg",
    Inc = "inc", Dec = "dec",
    Mul = "mul", Imul = "imul", Div = "div", Idiv = "idiv",
    Shl = "shl", Shr = "shr", Sar = "sar", Rol = "rol", Ror = "ror",
    Rcl = "rcl", Rcr = "rcr",
    Mov = "mov", Movzx = "movzx", Movsx = "movsx", Movsxd = "movsxd",
    Lea = "lea", Cdqe = "cdqe", Cwde = "cwde", Cdq = "cdq", Cqo = "cqo",
    Xchg = "xchg", Push = "push", Pop = "pop",
    Call = "call", Ret = "ret", Jmp = "jmp",
    Jcc = "j", Setcc = "set", Cmovcc = "cmov",
    Nop = "nop", Pause = "pause", Hlt = "hlt", Cpuid = "cpuid",
    Prefetch = "prefetchnta", Endbr64 = "endbr64", Syscall = "syscall",
    Ud2 = "ud2",
    RepeCmpsb = "repe cmpsb",
    Cmpxchg = "cmpxchg", Xadd = "xadd",
    Movd = "movd", Movq = "movq",
    Movups = "movups", Movupd = "movupd", Movaps = "movaps", Movapd = "movapd",
    Movss = "movss", Movsd = "movsd", Movhps = "movhps",
    Pand = "pand", Por = "por", Pxor = "pxor",
    Paddb = "paddb", Paddw = "paddw", Paddd = "paddd", Paddq = "paddq",
    Psubb = "psubb", Psubw = "psubw", Psubd = "psubd", Psubq = "psubq",
    Andps = "andps", Andpd = "andpd", Orps = "orps", Orpd = "orpd",
    Xorps = "xorps", Xorpd = "xorpd",
    Addps = "addps", Addpd = "addpd", Addss = "addss", Addsd = "addsd",
    Subps = "subps", Subpd = "subpd", Subss = "subss", Subsd = "subsd",
    Mulps = "mulps", Mulpd = "mulpd", Mulss = "mulss", Mulsd = "mulsd",
    Divps = "divps", Divpd = "divpd", Divss = "divss", Divsd = "divsd",
    Cvtsi2ss = "cvtsi2ss", Cvtsi2sd = "cvtsi2sd",
    Cvtss2si = "cvtss2si", Cvtsd2si = "cvtsd2si",
    Cvttss2si = "cvttss2si", Cvttsd2si = "cvttsd2si",
    Cvtss2sd = "cvtss2sd", Cvtsd2ss = "cvtsd2ss",
    Pshufd = "pshufd", Shufps = "shufps", Shufpd = "shufpd",
    Punpckldq = "punpckldq", Punpcklqdq = "punpcklqdq",
}

/// Condition code of Jcc/SETcc/CMOVcc, from the opcode's low nibble.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CondCode {
    O,
    No,
    B,
    Nb,
    Z,
    Nz,
    Be,
    Nbe,
    S,
    Ns,
    P,
    Np,
    L,
    Nl,
    Le,
    Nle,
}

impl CondCode {
    fn from_nibble(n: u8) -> CondCode {
        match n & 0xf {
            0x0 => CondCode::O,
            0x1 => CondCode::No,
            0x2 => CondCode::B,
            0x3 => CondCode::Nb,
            0x4 => CondCode::Z,
            0x5 => CondCode::Nz,
            0x6 => CondCode::Be,
            0x7 => CondCode::Nbe,
            0x8 => CondCode::S,
            0x9 => CondCode::Ns,
            0xa => CondCode::P,
            0xb => CondCode::Np,
            0xc => CondCode::L,
            0xd => CondCode::Nl,
            0xe => CondCode::Le,
            _ => CondCode::Nle,
        }
    }

    /// The mnemonic suffix ("z", "nbe", ...).
    pub fn suffix(self) -> &'static str {
        match self {
            CondCode::O => "o",
            CondCode::No => "no",
            CondCode::B => "b",
            CondCode::Nb => "nb",
            CondCode::Z => "z",
            CondCode::Nz => "nz",
            CondCode::Be => "be",
            CondCode::Nbe => "nbe",
            CondCode::S => "s",
            CondCode::Ns => "ns",
            CondCode::P => "p",
            CondCode::Np => "np",
            CondCode::L => "l",
            CondCode::Nl => "nl",
            CondCode::Le => "le",
            CondCode::Nle => "nle",
        }
    }
}

/// A decoded memory reference: `base + index*scale + disp (+ segment)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemRef {
    pub base: Option<Reg>,
    pub index: Option<Reg>,
    pub scale: u8,
    pub disp: i64,
    pub seg: Option<Segment>,
    /// Access width in bits.
    pub bits: u16,
}

/// One decoded operand, destination first in the operand list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    /// The instruction's memory reference (see [`DecodedInst::mem`]).
    Mem,
    Imm {
        value: i64,
        bits: u16,
        signed: bool,
    },
    /// A PC-relative branch displacement.
    Rel(i32),
}

/// One decoded instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedInst {
    pub iclass: IClass,
    pub cond: Option<CondCode>,
    /// Instruction length in bytes.
    pub len: u8,
    pub lock: bool,
    pub operands: SmallVec<[Operand; 4]>,
    pub mem: Option<MemRef>,
    /// Effective operand width of the main operation, in bits.
    pub op_bits: u16,
}

impl DecodedInst {
    /// The declared width of operand `i` in bits.
    pub fn operand_bits(&self, i: usize) -> u16 {
        match self.operands[i] {
            Operand::Reg(r) => r.width_bits(),
            Operand::Mem => self.mem.expect("mem operand without memref").bits,
            Operand::Imm { bits, .. } => bits,
            Operand::Rel(_) => 64,
        }
    }

    pub fn is_memory_operand(&self, i: usize) -> bool {
        matches!(self.operands.get(i), Some(Operand::Mem))
    }

    pub fn is_immediate_operand(&self, i: usize) -> bool {
        matches!(self.operands.get(i), Some(Operand::Imm { .. }))
    }
}

impl fmt::Display for DecodedInst {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.lock {
            write!(f, "lock ")?;
        }
        write!(f, "{}", self.iclass.name())?;
        if let Some(cond) = self.cond {
            write!(f, "{}", cond.suffix())?;
        }
        for (i, op) in self.operands.iter().enumerate() {
            write!(f, "{}", if i == 0 { " " } else { ", " })?;
            match op {
                Operand::Reg(r) => write!(f, "{r}")?,
                Operand::Imm { value, .. } => write!(f, "{value:#x}")?,
                Operand::Rel(rel) => write!(f, "{rel:+#x}")?,
                Operand::Mem => {
                    let m = self.mem.expect("mem operand without memref");
                    write!(f, "[")?;
                    let mut first = true;
                    if let Some(b) = m.base {
                        write!(f, "{b}")?;
                        first = false;
                    }
                    if let Some(i) = m.index {
                        if !first {
                            write!(f, "+")?;
                        }
                        write!(f, "{i}*{}", m.scale)?;
                        first = false;
                    }
                    if m.disp != 0 || first {
                        if !first && m.disp >= 0 {
                            write!(f, "+")?;
                        }
                        write!(f, "{:#x}", m.disp)?;
                    }
                    write!(f, "]")?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Default)]
struct Rex {
    present: bool,
    w: bool,
    r: bool,
    x: bool,
    b: bool,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u8(&mut self) -> Result<u8, DecodeError> {
        let b = *self.bytes.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.u8()? as i8)
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes([self.u8()?, self.u8()?]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes([
            self.u8()?,
            self.u8()?,
            self.u8()?,
            self.u8()?,
        ]))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.u32()? as i32)
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes([
            self.u8()?,
            self.u8()?,
            self.u8()?,
            self.u8()?,
            self.u8()?,
            self.u8()?,
            self.u8()?,
            self.u8()?,
        ]))
    }
}

struct Decoder<'a> {
    cur: Cursor<'a>,
    rex: Rex,
    opsize66: bool,
    rep_f2: bool,
    rep_f3: bool,
    lock: bool,
    seg: Option<Segment>,
    mem: Option<MemRef>,
}

/// Either the register or memory form of a ModRM `rm` field.
enum Rm {
    Reg(u8),
    Mem,
}

struct ModRm {
    mode: u8,
    reg: u8,
    rm: u8,
}

impl<'a> Decoder<'a> {
    /// Effective width of a non-byte operation.
    fn wbits(&self) -> u16 {
        if self.rex.w {
            64
        } else if self.opsize66 {
            16
        } else {
            32
        }
    }

    fn gpr(&self, num: u8, bits: u16) -> Reg {
        if bits == 8 && !self.rex.present && (4..8).contains(&num) {
            // Without REX, encodings 4-7 name AH/CH/DH/BH.
            Reg {
                class: RegClass::Gpr8High,
                num: num - 4,
            }
        } else {
            Reg::gpr(num, bits)
        }
    }

    fn modrm(&mut self) -> Result<ModRm, DecodeError> {
        let b = self.cur.u8()?;
        Ok(ModRm {
            mode: b >> 6,
            reg: ((b >> 3) & 7) | ((self.rex.r as u8) << 3),
            rm: b & 7,
        })
    }

    /// Decode the rm side of a ModRM byte, filling `self.mem` for the
    /// memory forms. `bits` is the access width recorded on the memref.
    fn rm(&mut self, m: &ModRm, bits: u16) -> Result<Rm, DecodeError> {
        if m.mode == 3 {
            return Ok(Rm::Reg(m.rm | ((self.rex.b as u8) << 3)));
        }

        let mut base = None;
        let mut index = None;
        let mut scale = 1u8;
        let disp: i64;

        if m.rm == 4 {
            // SIB byte.
            let sib = self.cur.u8()?;
            let sib_scale = sib >> 6;
            let sib_index = ((sib >> 3) & 7) | ((self.rex.x as u8) << 3);
            let sib_base = (sib & 7) | ((self.rex.b as u8) << 3);

            scale = 1 << sib_scale;
            if sib_index != 4 {
                index = Some(Reg::gpr(sib_index, 64));
            }
            if (sib & 7) == 5 && m.mode == 0 {
                disp = self.cur.i32()? as i64;
            } else {
                base = Some(Reg::gpr(sib_base, 64));
                disp = match m.mode {
                    1 => self.cur.i8()? as i64,
                    2 => self.cur.i32()? as i64,
                    _ => 0,
                };
            }
        } else if m.rm == 5 && m.mode == 0 {
            // RIP-relative.
            base = Some(Reg::RIP);
            disp = self.cur.i32()? as i64;
        } else {
            base = Some(Reg::gpr(m.rm | ((self.rex.b as u8) << 3), 64));
            disp = match m.mode {
                1 => self.cur.i8()? as i64,
                2 => self.cur.i32()? as i64,
                _ => 0,
            };
        }

        self.mem = Some(MemRef {
            base,
            index,
            scale,
            disp,
            seg: self.seg,
            bits,
        });
        Ok(Rm::Mem)
    }

    fn rm_operand(&mut self, m: &ModRm, bits: u16) -> Result<Operand, DecodeError> {
        Ok(match self.rm(m, bits)? {
            Rm::Reg(num) => Operand::Reg(self.gpr(num, bits)),
            Rm::Mem => Operand::Mem,
        })
    }

    fn xmm_rm_operand(&mut self, m: &ModRm, bits: u16) -> Result<Operand, DecodeError> {
        Ok(match self.rm(m, bits)? {
            Rm::Reg(num) => Operand::Reg(Reg::xmm(num)),
            Rm::Mem => Operand::Mem,
        })
    }

    fn imm(&mut self, bits: u16, signed: bool) -> Result<Operand, DecodeError> {
        let value = match bits {
            8 => self.cur.i8()? as i64,
            16 => self.cur.u16()? as i16 as i64,
            32 => self.cur.i32()? as i64,
            64 => self.cur.u64()? as i64,
            _ => unreachable!("imm width"),
        };
        Ok(Operand::Imm { value, bits, signed })
    }

    /// `op rm, reg` at the given width.
    fn mr(&mut self, iclass: IClass, bits: u16) -> Result<(IClass, SmallVec<[Operand; 4]>), DecodeError> {
        let m = self.modrm()?;
        let rm = self.rm_operand(&m, bits)?;
        Ok((iclass, smallvec![rm, Operand::Reg(self.gpr(m.reg, bits))]))
    }

    /// `op reg, rm` at the given width.
    fn rm_form(
        &mut self,
        iclass: IClass,
        bits: u16,
    ) -> Result<(IClass, SmallVec<[Operand; 4]>), DecodeError> {
        let m = self.modrm()?;
        let rm = self.rm_operand(&m, bits)?;
        Ok((iclass, smallvec![Operand::Reg(self.gpr(m.reg, bits)), rm]))
    }

    /// `op rm, imm`.
    fn mi(
        &mut self,
        iclass: IClass,
        bits: u16,
        imm_bits: u16,
    ) -> Result<(IClass, SmallVec<[Operand; 4]>), DecodeError> {
        let m = self.modrm()?;
        let rm = self.rm_operand(&m, bits)?;
        let imm = self.imm(imm_bits, true)?;
        Ok((iclass, smallvec![rm, imm]))
    }

    /// `xmm, xmm/m` (load direction) at the given memory width.
    fn xmm_rm(
        &mut self,
        iclass: IClass,
        mem_bits: u16,
    ) -> Result<(IClass, SmallVec<[Operand; 4]>), DecodeError> {
        let m = self.modrm()?;
        let rm = self.xmm_rm_operand(&m, mem_bits)?;
        Ok((iclass, smallvec![Operand::Reg(Reg::xmm(m.reg)), rm]))
    }

    /// `xmm/m, xmm` (store direction).
    fn rm_xmm(
        &mut self,
        iclass: IClass,
        mem_bits: u16,
    ) -> Result<(IClass, SmallVec<[Operand; 4]>), DecodeError> {
        let m = self.modrm()?;
        let rm = self.xmm_rm_operand(&m, mem_bits)?;
        Ok((iclass, smallvec![rm, Operand::Reg(Reg::xmm(m.reg))]))
    }
}

const GROUP1: [IClass; 8] = [
    IClass::Add,
    IClass::Or,
    IClass::Adc,
    IClass::Sbb,
    IClass::And,
    IClass::Sub,
    IClass::Xor,
    IClass::Cmp,
];

const GROUP2: [IClass; 8] = [
    IClass::Rol,
    IClass::Ror,
    IClass::Rcl,
    IClass::Rcr,
    IClass::Shl,
    IClass::Shr,
    IClass::Shl,
    IClass::Sar,
];

/// Decode one instruction from `bytes`.
pub fn decode(bytes: &[u8]) -> Result<DecodedInst, DecodeError> {
    let mut d = Decoder {
        cur: Cursor { bytes, pos: 0 },
        rex: Rex::default(),
        opsize66: false,
        rep_f2: false,
        rep_f3: false,
        lock: false,
        seg: None,
        mem: None,
    };

    // Legacy prefixes, then at most one REX immediately before the opcode.
    loop {
        match d.cur.peek() {
            Some(0x66) => d.opsize66 = true,
            Some(0x67) => return Err(DecodeError::Unsupported("32-bit address size")),
            Some(0xf0) => d.lock = true,
            Some(0xf2) => {
                d.rep_f2 = true;
                d.rep_f3 = false;
            }
            Some(0xf3) => {
                d.rep_f3 = true;
                d.rep_f2 = false;
            }
            Some(0x64) => d.seg = Some(Segment::Fs),
            Some(0x65) => d.seg = Some(Segment::Gs),
            Some(0x2e) | Some(0x3e) | Some(0x26) | Some(0x36) => {}
            _ => break,
        }
        d.cur.pos += 1;
    }
    if let Some(b) = d.cur.peek() {
        if (0x40..=0x4f).contains(&b) {
            d.rex = Rex {
                present: true,
                w: b & 8 != 0,
                r: b & 4 != 0,
                x: b & 2 != 0,
                b: b & 1 != 0,
            };
            d.cur.pos += 1;
        }
        if b == 0x62 || b == 0xc4 || b == 0xc5 {
            // EVEX/VEX-coded instructions are out of scope.
            return Err(DecodeError::Unsupported("VEX/EVEX encoding"));
        }
    }

    let opcode = d.cur.u8()?;
    let mut cond = None;
    let mut op_bits = d.wbits();

    let (iclass, operands): (IClass, SmallVec<[Operand; 4]>) = match opcode {
        // Arithmetic and logic, register forms.
        0x00 | 0x08 | 0x10 | 0x18 | 0x20 | 0x28 | 0x30 | 0x38 => {
            op_bits = 8;
            d.mr(GROUP1[(opcode >> 3) as usize], 8)?
        }
        0x01 | 0x09 | 0x11 | 0x19 | 0x21 | 0x29 | 0x31 | 0x39 => {
            d.mr(GROUP1[(opcode >> 3) as usize], op_bits)?
        }
        0x02 | 0x0a | 0x12 | 0x1a | 0x22 | 0x2a | 0x32 | 0x3a => {
            op_bits = 8;
            d.rm_form(GROUP1[(opcode >> 3) as usize], 8)?
        }
        0x03 | 0x0b | 0x13 | 0x1b | 0x23 | 0x2b | 0x33 | 0x3b => {
            d.rm_form(GROUP1[(opcode >> 3) as usize], op_bits)?
        }
        // AL/eAX, imm forms.
        0x04 | 0x0c | 0x14 | 0x1c | 0x24 | 0x2c | 0x34 | 0x3c => {
            op_bits = 8;
            let imm = d.imm(8, true)?;
            (
                GROUP1[(opcode >> 3) as usize],
                smallvec![Operand::Reg(Reg::gpr(0, 8)), imm],
            )
        }
        0x05 | 0x0d | 0x15 | 0x1d | 0x25 | 0x2d | 0x35 | 0x3d => {
            let imm = d.imm(op_bits.min(32), true)?;
            (
                GROUP1[(opcode >> 3) as usize],
                smallvec![Operand::Reg(Reg::gpr(0, op_bits)), imm],
            )
        }

        // PUSH/POP r64.
        0x50..=0x57 => {
            op_bits = 64;
            let num = (opcode & 7) | ((d.rex.b as u8) << 3);
            (IClass::Push, smallvec![Operand::Reg(Reg::gpr(num, 64))])
        }
        0x58..=0x5f => {
            op_bits = 64;
            let num = (opcode & 7) | ((d.rex.b as u8) << 3);
            (IClass::Pop, smallvec![Operand::Reg(Reg::gpr(num, 64))])
        }

        0x63 => {
            // MOVSXD r64, r/m32.
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, 32)?;
            (
                IClass::Movsxd,
                smallvec![Operand::Reg(d.gpr(m.reg, 64)), rm],
            )
        }

        0x68 => {
            op_bits = 64;
            let imm = d.imm(32, true)?;
            (IClass::Push, smallvec![imm])
        }
        0x6a => {
            op_bits = 64;
            let imm = d.imm(8, true)?;
            (IClass::Push, smallvec![imm])
        }
        0x69 => {
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, op_bits)?;
            let imm = d.imm(op_bits.min(32), true)?;
            (
                IClass::Imul,
                smallvec![Operand::Reg(d.gpr(m.reg, op_bits)), rm, imm],
            )
        }
        0x6b => {
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, op_bits)?;
            let imm = d.imm(8, true)?;
            (
                IClass::Imul,
                smallvec![Operand::Reg(d.gpr(m.reg, op_bits)), rm, imm],
            )
        }

        // Jcc rel8.
        0x70..=0x7f => {
            cond = Some(CondCode::from_nibble(opcode));
            let rel = d.cur.i8()? as i32;
            (IClass::Jcc, smallvec![Operand::Rel(rel)])
        }

        // Group 1 immediate forms.
        0x80 => {
            op_bits = 8;
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, 8)?;
            let imm = d.imm(8, true)?;
            (GROUP1[m.reg as usize & 7], smallvec![rm, imm])
        }
        0x81 => {
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, op_bits)?;
            let imm = d.imm(op_bits.min(32), true)?;
            (GROUP1[m.reg as usize & 7], smallvec![rm, imm])
        }
        0x83 => {
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, op_bits)?;
            let imm = d.imm(8, true)?;
            (GROUP1[m.reg as usize & 7], smallvec![rm, imm])
        }

        0x84 => {
            op_bits = 8;
            d.mr(IClass::Test, 8)?
        }
        0x85 => d.mr(IClass::Test, op_bits)?,
        0x86 => {
            op_bits = 8;
            d.mr(IClass::Xchg, 8)?
        }
        0x87 => d.mr(IClass::Xchg, op_bits)?,

        // MOV.
        0x88 => {
            op_bits = 8;
            d.mr(IClass::Mov, 8)?
        }
        0x89 => d.mr(IClass::Mov, op_bits)?,
        0x8a => {
            op_bits = 8;
            d.rm_form(IClass::Mov, 8)?
        }
        0x8b => d.rm_form(IClass::Mov, op_bits)?,
        0x8d => {
            let m = d.modrm()?;
            match d.rm(&m, op_bits)? {
                Rm::Mem => {}
                Rm::Reg(_) => return Err(DecodeError::UnknownOpcode(opcode)),
            }
            (
                IClass::Lea,
                smallvec![Operand::Reg(d.gpr(m.reg, op_bits)), Operand::Mem],
            )
        }
        0x8f => {
            op_bits = 64;
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, 64)?;
            (IClass::Pop, smallvec![rm])
        }

        0x90 => {
            if d.rep_f3 {
                (IClass::Pause, smallvec![])
            } else {
                (IClass::Nop, smallvec![])
            }
        }
        // XCHG rAX, r.
        0x91..=0x97 => {
            let num = (opcode & 7) | ((d.rex.b as u8) << 3);
            (
                IClass::Xchg,
                smallvec![
                    Operand::Reg(Reg::gpr(0, op_bits)),
                    Operand::Reg(Reg::gpr(num, op_bits))
                ],
            )
        }

        0x98 => {
            if d.rex.w {
                (IClass::Cdqe, smallvec![])
            } else {
                (IClass::Cwde, smallvec![])
            }
        }
        0x99 => {
            if d.rex.w {
                (IClass::Cqo, smallvec![])
            } else {
                (IClass::Cdq, smallvec![])
            }
        }

        0xa6 => {
            if d.rep_f3 {
                (IClass::RepeCmpsb, smallvec![])
            } else {
                return Err(DecodeError::UnknownOpcode(opcode));
            }
        }

        0xa8 => {
            op_bits = 8;
            let imm = d.imm(8, false)?;
            (IClass::Test, smallvec![Operand::Reg(Reg::gpr(0, 8)), imm])
        }
        0xa9 => {
            let imm = d.imm(op_bits.min(32), true)?;
            (
                IClass::Test,
                smallvec![Operand::Reg(Reg::gpr(0, op_bits)), imm],
            )
        }

        // MOV r, imm.
        0xb0..=0xb7 => {
            op_bits = 8;
            let num = (opcode & 7) | ((d.rex.b as u8) << 3);
            let reg = d.gpr(num, 8);
            let imm = d.imm(8, false)?;
            (IClass::Mov, smallvec![Operand::Reg(reg), imm])
        }
        0xb8..=0xbf => {
            let num = (opcode & 7) | ((d.rex.b as u8) << 3);
            let imm = d.imm(op_bits, false)?;
            (
                IClass::Mov,
                smallvec![Operand::Reg(Reg::gpr(num, op_bits)), imm],
            )
        }

        // Shift groups.
        0xc0 => {
            op_bits = 8;
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, 8)?;
            let imm = d.imm(8, false)?;
            (GROUP2[m.reg as usize & 7], smallvec![rm, imm])
        }
        0xc1 => {
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, op_bits)?;
            let imm = d.imm(8, false)?;
            (GROUP2[m.reg as usize & 7], smallvec![rm, imm])
        }
        0xd0 | 0xd1 => {
            if opcode == 0xd0 {
                op_bits = 8;
            }
            let bits = if opcode == 0xd0 { 8 } else { op_bits };
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, bits)?;
            (
                GROUP2[m.reg as usize & 7],
                smallvec![
                    rm,
                    Operand::Imm {
                        value: 1,
                        bits: 8,
                        signed: false
                    }
                ],
            )
        }
        0xd2 | 0xd3 => {
            if opcode == 0xd2 {
                op_bits = 8;
            }
            let bits = if opcode == 0xd2 { 8 } else { op_bits };
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, bits)?;
            (
                GROUP2[m.reg as usize & 7],
                smallvec![rm, Operand::Reg(Reg::gpr(1, 8))],
            )
        }

        0xc2 => {
            let imm = d.imm(16, false)?;
            (IClass::Ret, smallvec![imm])
        }
        0xc3 => (IClass::Ret, smallvec![]),

        0xc6 => {
            op_bits = 8;
            d.mi(IClass::Mov, 8, 8)?
        }
        0xc7 => d.mi(IClass::Mov, op_bits, op_bits.min(32))?,

        0xe8 => {
            let rel = d.cur.i32()?;
            (IClass::Call, smallvec![Operand::Rel(rel)])
        }
        0xe9 => {
            let rel = d.cur.i32()?;
            (IClass::Jmp, smallvec![Operand::Rel(rel)])
        }
        0xeb => {
            let rel = d.cur.i8()? as i32;
            (IClass::Jmp, smallvec![Operand::Rel(rel)])
        }

        0xf4 => (IClass::Hlt, smallvec![]),

        // Group 3.
        0xf6 | 0xf7 => {
            let bits = if opcode == 0xf6 { 8 } else { op_bits };
            if opcode == 0xf6 {
                op_bits = 8;
            }
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, bits)?;
            match m.reg & 7 {
                0 | 1 => {
                    let imm = d.imm(bits.min(32), true)?;
                    (IClass::Test, smallvec![rm, imm])
                }
                2 => (IClass::Not, smallvec![rm]),
                3 => (IClass::Neg, smallvec![rm]),
                4 => (IClass::Mul, smallvec![rm]),
                5 => (IClass::Imul, smallvec![rm]),
                6 => (IClass::Div, smallvec![rm]),
                _ => (IClass::Idiv, smallvec![rm]),
            }
        }

        0xfe => {
            op_bits = 8;
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, 8)?;
            match m.reg & 7 {
                0 => (IClass::Inc, smallvec![rm]),
                1 => (IClass::Dec, smallvec![rm]),
                _ => return Err(DecodeError::UnknownOpcode(opcode)),
            }
        }
        0xff => {
            let m = d.modrm()?;
            match m.reg & 7 {
                0 => {
                    let rm = d.rm_operand(&m, op_bits)?;
                    (IClass::Inc, smallvec![rm])
                }
                1 => {
                    let rm = d.rm_operand(&m, op_bits)?;
                    (IClass::Dec, smallvec![rm])
                }
                2 => {
                    let rm = d.rm_operand(&m, 64)?;
                    (IClass::Call, smallvec![rm])
                }
                4 => {
                    let rm = d.rm_operand(&m, 64)?;
                    (IClass::Jmp, smallvec![rm])
                }
                6 => {
                    op_bits = 64;
                    let rm = d.rm_operand(&m, 64)?;
                    (IClass::Push, smallvec![rm])
                }
                _ => return Err(DecodeError::UnknownOpcode(opcode)),
            }
        }

        0x0f => decode_0f(&mut d, &mut cond, &mut op_bits)?,

        _ => return Err(DecodeError::UnknownOpcode(opcode)),
    };

    Ok(DecodedInst {
        iclass,
        cond,
        len: d.cur.pos as u8,
        lock: d.lock,
        operands,
        mem: d.mem,
        op_bits,
    })
}

fn decode_0f(
    d: &mut Decoder,
    cond: &mut Option<CondCode>,
    op_bits: &mut u16,
) -> Result<(IClass, SmallVec<[Operand; 4]>), DecodeError> {
    let opcode = d.cur.u8()?;
    Ok(match opcode {
        0x05 => (IClass::Syscall, smallvec![]),
        0x0b => (IClass::Ud2, smallvec![]),

        0x10 | 0x11 => {
            // MOVUPS/MOVUPD/MOVSS/MOVSD, load or store direction.
            let (iclass, bits) = if d.rep_f3 {
                (IClass::Movss, 32)
            } else if d.rep_f2 {
                (IClass::Movsd, 64)
            } else if d.opsize66 {
                (IClass::Movupd, 128)
            } else {
                (IClass::Movups, 128)
            };
            *op_bits = bits;
            if opcode == 0x10 {
                d.xmm_rm(iclass, bits)?
            } else {
                d.rm_xmm(iclass, bits)?
            }
        }
        0x16 => {
            *op_bits = 64;
            d.xmm_rm(IClass::Movhps, 64)?
        }
        0x18 => {
            // Group 16 prefetches; all hints lift as a no-op.
            let m = d.modrm()?;
            let _ = d.rm(&m, 8)?;
            (IClass::Prefetch, smallvec![])
        }
        0x1e => {
            let m = d.modrm()?;
            if d.rep_f3 && m.mode == 3 && m.rm == 2 && (m.reg & 7) == 7 {
                (IClass::Endbr64, smallvec![])
            } else {
                return Err(DecodeError::UnknownOpcode(opcode));
            }
        }
        0x1f => {
            // Multi-byte NOP.
            let m = d.modrm()?;
            let _ = d.rm(&m, d.wbits())?;
            (IClass::Nop, smallvec![])
        }

        0x28 => {
            let iclass = if d.opsize66 {
                IClass::Movapd
            } else {
                IClass::Movaps
            };
            *op_bits = 128;
            d.xmm_rm(iclass, 128)?
        }
        0x29 => {
            let iclass = if d.opsize66 {
                IClass::Movapd
            } else {
                IClass::Movaps
            };
            *op_bits = 128;
            d.rm_xmm(iclass, 128)?
        }

        0x2a => {
            // CVTSI2SS/SD xmm, r/m.
            let iclass = if d.rep_f3 {
                IClass::Cvtsi2ss
            } else if d.rep_f2 {
                IClass::Cvtsi2sd
            } else {
                return Err(DecodeError::UnknownOpcode(opcode));
            };
            let src_bits = if d.rex.w { 64 } else { 32 };
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, src_bits)?;
            (iclass, smallvec![Operand::Reg(Reg::xmm(m.reg)), rm])
        }
        0x2c | 0x2d => {
            // CVT(T)SS2SI / CVT(T)SD2SI r, xmm/m.
            let iclass = match (opcode, d.rep_f3, d.rep_f2) {
                (0x2c, true, _) => IClass::Cvttss2si,
                (0x2c, _, true) => IClass::Cvttsd2si,
                (0x2d, true, _) => IClass::Cvtss2si,
                (0x2d, _, true) => IClass::Cvtsd2si,
                _ => return Err(DecodeError::UnknownOpcode(opcode)),
            };
            let dst_bits = if d.rex.w { 64 } else { 32 };
            let mem_bits = if d.rep_f3 { 32 } else { 64 };
            let m = d.modrm()?;
            let rm = d.xmm_rm_operand(&m, mem_bits)?;
            *op_bits = dst_bits;
            (iclass, smallvec![Operand::Reg(d.gpr(m.reg, dst_bits)), rm])
        }

        // CMOVcc.
        0x40..=0x4f => {
            *cond = Some(CondCode::from_nibble(opcode));
            d.rm_form(IClass::Cmovcc, d.wbits())?
        }

        0x54 => {
            *op_bits = 128;
            d.xmm_rm(if d.opsize66 { IClass::Andpd } else { IClass::Andps }, 128)?
        }
        0x56 => {
            *op_bits = 128;
            d.xmm_rm(if d.opsize66 { IClass::Orpd } else { IClass::Orps }, 128)?
        }
        0x57 => {
            *op_bits = 128;
            d.xmm_rm(if d.opsize66 { IClass::Xorpd } else { IClass::Xorps }, 128)?
        }

        0x58 | 0x59 | 0x5c | 0x5e => {
            let table: [[IClass; 4]; 4] = [
                // none, 66, F3, F2
                [IClass::Addps, IClass::Addpd, IClass::Addss, IClass::Addsd],
                [IClass::Mulps, IClass::Mulpd, IClass::Mulss, IClass::Mulsd],
                [IClass::Subps, IClass::Subpd, IClass::Subss, IClass::Subsd],
                [IClass::Divps, IClass::Divpd, IClass::Divss, IClass::Divsd],
            ];
            let row = match opcode {
                0x58 => 0,
                0x59 => 1,
                0x5c => 2,
                _ => 3,
            };
            let col = if d.rep_f3 {
                2
            } else if d.rep_f2 {
                3
            } else if d.opsize66 {
                1
            } else {
                0
            };
            let bits = match col {
                2 => 32,
                3 => 64,
                _ => 128,
            };
            *op_bits = bits;
            d.xmm_rm(table[row][col], bits)?
        }

        0x5a => {
            let iclass = if d.rep_f3 {
                IClass::Cvtss2sd
            } else if d.rep_f2 {
                IClass::Cvtsd2ss
            } else {
                return Err(DecodeError::UnknownOpcode(opcode));
            };
            let bits = if d.rep_f3 { 32 } else { 64 };
            *op_bits = bits;
            d.xmm_rm(iclass, bits)?
        }

        0x62 if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Punpckldq, 128)?
        }
        0x6c if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Punpcklqdq, 128)?
        }

        0x6e if d.opsize66 => {
            // MOVD/MOVQ xmm, r/m.
            let bits = if d.rex.w { 64 } else { 32 };
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, bits)?;
            *op_bits = bits;
            (
                if d.rex.w { IClass::Movq } else { IClass::Movd },
                smallvec![Operand::Reg(Reg::xmm(m.reg)), rm],
            )
        }
        0x70 if d.opsize66 => {
            let m = d.modrm()?;
            let rm = d.xmm_rm_operand(&m, 128)?;
            let imm = d.imm(8, false)?;
            *op_bits = 128;
            (
                IClass::Pshufd,
                smallvec![Operand::Reg(Reg::xmm(m.reg)), rm, imm],
            )
        }
        0x7e => {
            if d.rep_f3 {
                // MOVQ xmm, xmm/m64.
                *op_bits = 64;
                d.xmm_rm(IClass::Movq, 64)?
            } else if d.opsize66 {
                // MOVD/MOVQ r/m, xmm.
                let bits = if d.rex.w { 64 } else { 32 };
                let m = d.modrm()?;
                let rm = d.rm_operand(&m, bits)?;
                *op_bits = bits;
                (
                    if d.rex.w { IClass::Movq } else { IClass::Movd },
                    smallvec![rm, Operand::Reg(Reg::xmm(m.reg))],
                )
            } else {
                return Err(DecodeError::UnknownOpcode(opcode));
            }
        }

        // Jcc rel32.
        0x80..=0x8f => {
            *cond = Some(CondCode::from_nibble(opcode));
            let rel = d.cur.i32()?;
            (IClass::Jcc, smallvec![Operand::Rel(rel)])
        }

        // SETcc r/m8.
        0x90..=0x9f => {
            *cond = Some(CondCode::from_nibble(opcode));
            *op_bits = 8;
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, 8)?;
            (IClass::Setcc, smallvec![rm])
        }

        0xa2 => (IClass::Cpuid, smallvec![]),

        0xaf => d.rm_form(IClass::Imul, d.wbits())?,

        0xb0 => {
            *op_bits = 8;
            d.mr(IClass::Cmpxchg, 8)?
        }
        0xb1 => d.mr(IClass::Cmpxchg, d.wbits())?,

        0xb6 | 0xb7 => {
            let src_bits = if opcode == 0xb6 { 8 } else { 16 };
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, src_bits)?;
            (
                IClass::Movzx,
                smallvec![Operand::Reg(d.gpr(m.reg, d.wbits())), rm],
            )
        }
        0xbe | 0xbf => {
            let src_bits = if opcode == 0xbe { 8 } else { 16 };
            let m = d.modrm()?;
            let rm = d.rm_operand(&m, src_bits)?;
            (
                IClass::Movsx,
                smallvec![Operand::Reg(d.gpr(m.reg, d.wbits())), rm],
            )
        }

        0xc0 => {
            *op_bits = 8;
            d.mr(IClass::Xadd, 8)?
        }
        0xc1 => d.mr(IClass::Xadd, d.wbits())?,

        0xc6 => {
            let iclass = if d.opsize66 {
                IClass::Shufpd
            } else {
                IClass::Shufps
            };
            let m = d.modrm()?;
            let rm = d.xmm_rm_operand(&m, 128)?;
            let imm = d.imm(8, false)?;
            *op_bits = 128;
            (iclass, smallvec![Operand::Reg(Reg::xmm(m.reg)), rm, imm])
        }

        0xd4 if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Paddq, 128)?
        }
        0xd6 if d.opsize66 => {
            *op_bits = 64;
            d.rm_xmm(IClass::Movq, 64)?
        }
        0xdb if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Pand, 128)?
        }
        0xeb if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Por, 128)?
        }
        0xef if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Pxor, 128)?
        }
        0xf8 if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Psubb, 128)?
        }
        0xf9 if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Psubw, 128)?
        }
        0xfa if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Psubd, 128)?
        }
        0xfb if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Psubq, 128)?
        }
        0xfc if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Paddb, 128)?
        }
        0xfd if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Paddw, 128)?
        }
        0xfe if d.opsize66 => {
            *op_bits = 128;
            d.xmm_rm(IClass::Paddd, 128)?
        }

        _ => return Err(DecodeError::UnknownOpcode(opcode)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(bytes: &[u8]) -> DecodedInst {
        decode(bytes).unwrap()
    }

    #[test]
    fn xor_rax_rax() {
        let i = dec(&[0x48, 0x31, 0xc0]);
        assert_eq!(i.iclass, IClass::Xor);
        assert_eq!(i.len, 3);
        assert_eq!(i.op_bits, 64);
        assert_eq!(i.operands[0], Operand::Reg(Reg::gpr(0, 64)));
        assert_eq!(i.operands[1], Operand::Reg(Reg::gpr(0, 64)));
        assert_eq!(i.to_string(), "xor rax, rax");
    }

    #[test]
    fn add_eax_imm() {
        // add eax, 1
        let i = dec(&[0x83, 0xc0, 0x01]);
        assert_eq!(i.iclass, IClass::Add);
        assert_eq!(i.op_bits, 32);
        assert_eq!(i.operands[0], Operand::Reg(Reg::gpr(0, 32)));
        assert!(matches!(i.operands[1], Operand::Imm { value: 1, .. }));
    }

    #[test]
    fn cmp_al_imm_and_jb() {
        let i = dec(&[0x3c, 0x10]);
        assert_eq!(i.iclass, IClass::Cmp);
        assert_eq!(i.operands[0], Operand::Reg(Reg::gpr(0, 8)));
        assert_eq!(i.len, 2);

        let j = dec(&[0x72, 0x08]);
        assert_eq!(j.iclass, IClass::Jcc);
        assert_eq!(j.cond, Some(CondCode::B));
        assert_eq!(j.operands[0], Operand::Rel(8));
        assert_eq!(j.to_string(), "jb +0x8");
    }

    #[test]
    fn mov_rax_from_rsp_memory() {
        // mov rax, [rsp]
        let i = dec(&[0x48, 0x8b, 0x04, 0x24]);
        assert_eq!(i.iclass, IClass::Mov);
        assert_eq!(i.operands[0], Operand::Reg(Reg::gpr(0, 64)));
        assert_eq!(i.operands[1], Operand::Mem);
        let m = i.mem.unwrap();
        assert_eq!(m.base, Some(Reg::gpr(4, 64)));
        assert_eq!(m.index, None);
        assert_eq!(m.disp, 0);
        assert_eq!(m.bits, 64);
    }

    #[test]
    fn sib_with_scale_and_disp() {
        // mov rax, [rbx+rcx*4+0x10]
        let i = dec(&[0x48, 0x8b, 0x44, 0x8b, 0x10]);
        let m = i.mem.unwrap();
        assert_eq!(m.base, Some(Reg::gpr(3, 64)));
        assert_eq!(m.index, Some(Reg::gpr(1, 64)));
        assert_eq!(m.scale, 4);
        assert_eq!(m.disp, 0x10);
    }

    #[test]
    fn rip_relative() {
        // lea rax, [rip+0x1234]
        let i = dec(&[0x48, 0x8d, 0x05, 0x34, 0x12, 0x00, 0x00]);
        assert_eq!(i.iclass, IClass::Lea);
        let m = i.mem.unwrap();
        assert_eq!(m.base, Some(Reg::RIP));
        assert_eq!(m.disp, 0x1234);
        assert_eq!(i.len, 7);
    }

    #[test]
    fn imul_and_div_group() {
        // imul rax, rbx (0F AF /r)
        let i = dec(&[0x48, 0x0f, 0xaf, 0xc3]);
        assert_eq!(i.iclass, IClass::Imul);
        assert_eq!(i.operands[0], Operand::Reg(Reg::gpr(0, 64)));
        assert_eq!(i.operands[1], Operand::Reg(Reg::gpr(3, 64)));

        // div rcx
        let i = dec(&[0x48, 0xf7, 0xf1]);
        assert_eq!(i.iclass, IClass::Div);
        assert_eq!(i.operands.len(), 1);
    }

    #[test]
    fn push_pop_call_ret() {
        assert_eq!(dec(&[0x55]).iclass, IClass::Push);
        assert_eq!(dec(&[0x55]).operands[0], Operand::Reg(Reg::gpr(5, 64)));
        assert_eq!(dec(&[0x41, 0x54]).operands[0], Operand::Reg(Reg::gpr(12, 64)));
        assert_eq!(dec(&[0x5d]).iclass, IClass::Pop);
        let c = dec(&[0xe8, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(c.iclass, IClass::Call);
        assert_eq!(c.operands[0], Operand::Rel(0x100));
        assert_eq!(dec(&[0xc3]).iclass, IClass::Ret);
        // jmp rax
        let j = dec(&[0xff, 0xe0]);
        assert_eq!(j.iclass, IClass::Jmp);
        assert_eq!(j.operands[0], Operand::Reg(Reg::gpr(0, 64)));
    }

    #[test]
    fn high_byte_registers() {
        // mov ah, 1 (B4 ib)
        let i = dec(&[0xb4, 0x01]);
        let Operand::Reg(r) = i.operands[0] else {
            panic!()
        };
        assert!(r.is_high_byte());
        assert_eq!(r.name(), "ah");
        // With REX, encoding 4 is SPL.
        let i = dec(&[0x40, 0xb4, 0x01]);
        let Operand::Reg(r) = i.operands[0] else {
            panic!()
        };
        assert!(!r.is_high_byte());
    }

    #[test]
    fn lock_cmpxchg() {
        // lock cmpxchg [rdi], rsi
        let i = dec(&[0xf0, 0x48, 0x0f, 0xb1, 0x37]);
        assert_eq!(i.iclass, IClass::Cmpxchg);
        assert!(i.lock);
        assert_eq!(i.operands[0], Operand::Mem);
        assert_eq!(i.operands[1], Operand::Reg(Reg::gpr(6, 64)));
        assert_eq!(i.mem.unwrap().base, Some(Reg::gpr(7, 64)));
    }

    #[test]
    fn sse_forms() {
        // pxor xmm0, xmm1
        let i = dec(&[0x66, 0x0f, 0xef, 0xc1]);
        assert_eq!(i.iclass, IClass::Pxor);
        assert_eq!(i.operands[0], Operand::Reg(Reg::xmm(0)));
        assert_eq!(i.operands[1], Operand::Reg(Reg::xmm(1)));

        // addsd xmm0, xmm1
        let i = dec(&[0xf2, 0x0f, 0x58, 0xc1]);
        assert_eq!(i.iclass, IClass::Addsd);
        assert_eq!(i.op_bits, 64);

        // cvtsi2sd xmm0, rax
        let i = dec(&[0xf2, 0x48, 0x0f, 0x2a, 0xc0]);
        assert_eq!(i.iclass, IClass::Cvtsi2sd);
        assert_eq!(i.operands[1], Operand::Reg(Reg::gpr(0, 64)));

        // pshufd xmm0, xmm1, 0x1b
        let i = dec(&[0x66, 0x0f, 0x70, 0xc1, 0x1b]);
        assert_eq!(i.iclass, IClass::Pshufd);
        assert!(matches!(i.operands[2], Operand::Imm { value: 0x1b, .. }));
    }

    #[test]
    fn fs_segment_override() {
        // mov rax, fs:[0x28]
        let i = dec(&[0x64, 0x48, 0x8b, 0x04, 0x25, 0x28, 0x00, 0x00, 0x00]);
        let m = i.mem.unwrap();
        assert_eq!(m.seg, Some(Segment::Fs));
        assert_eq!(m.base, None);
        assert_eq!(m.disp, 0x28);
    }

    #[test]
    fn noop_classes() {
        assert_eq!(dec(&[0x90]).iclass, IClass::Nop);
        assert_eq!(dec(&[0xf3, 0x90]).iclass, IClass::Pause);
        assert_eq!(dec(&[0x0f, 0x1f, 0x40, 0x00]).iclass, IClass::Nop);
        assert_eq!(dec(&[0xf4]).iclass, IClass::Hlt);
        assert_eq!(dec(&[0x0f, 0xa2]).iclass, IClass::Cpuid);
        assert_eq!(dec(&[0xf3, 0x0f, 0x1e, 0xfa]).iclass, IClass::Endbr64);
    }

    #[test]
    fn errors() {
        assert_eq!(decode(&[]), Err(DecodeError::Truncated));
        assert_eq!(decode(&[0x48]), Err(DecodeError::Truncated));
        assert!(matches!(
            decode(&[0x62, 0x00, 0x00]),
            Err(DecodeError::Unsupported(_))
        ));
        assert!(matches!(
            decode(&[0x0f, 0xff]),
            Err(DecodeError::UnknownOpcode(_))
        ));
    }

    #[test]
    fn movzx_source_width() {
        // movzx eax, byte [rdi]
        let i = dec(&[0x0f, 0xb6, 0x07]);
        assert_eq!(i.iclass, IClass::Movzx);
        assert_eq!(i.operands[0], Operand::Reg(Reg::gpr(0, 32)));
        assert_eq!(i.mem.unwrap().bits, 8);
    }
}
