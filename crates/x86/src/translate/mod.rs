//! Instruction translation: decoded x86-64 instructions into IR packets.
//!
//! [`lift_chunk`] drives the per-instruction translators. Each translator
//! works through a [`Translator`] context that provides the operand
//! protocol (`read_operand`/`write_operand`/`compute_address`), the
//! abstract flag writer, condition materialization, and the x87 stack
//! helpers.

mod atomic;
mod binop;
mod branch;
mod cmov;
mod fpvec;
mod jcc;
mod mov;
mod muldiv;
mod punpck;
mod rep;
mod setcc;
mod shifts;
mod shuffle;
mod stack;
mod unimplemented;
mod unop;

use crate::decode::{decode, CondCode, DecodeError, DecodedInst, IClass, MemRef, Operand};
use crate::regs::{Reg, Segment};
use crate::state::{regs, GuestReg};
use log::{debug, trace};
use magpie_ir::{
    BuilderError, ChunkBuilder, Node, NodeData, PacketKind, PortRef, TypeClass, ValueType,
    HANDLE_POISON,
};
use std::fmt;

/// Result of translating one instruction.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Outcome {
    Normal,
    EndOfBlock,
    /// The instruction lifts to an empty packet.
    Noop,
}

/// Failure to lift a chunk.
#[derive(Debug)]
pub enum TranslateError {
    /// The first instruction of a chunk did not decode.
    Decode(DecodeError),
    /// An IR construction contract was violated.
    Builder(BuilderError),
    /// A required helper routine is not registered with the resolver.
    MissingHelper(&'static str),
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TranslateError::Decode(e) => write!(f, "decode failure: {e}"),
            TranslateError::Builder(e) => write!(f, "IR builder failure: {e}"),
            TranslateError::MissingHelper(name) => {
                write!(f, "helper routine not registered: {name}")
            }
        }
    }
}

impl std::error::Error for TranslateError {}

impl From<BuilderError> for TranslateError {
    fn from(e: BuilderError) -> Self {
        TranslateError::Builder(e)
    }
}

impl From<DecodeError> for TranslateError {
    fn from(e: DecodeError) -> Self {
        TranslateError::Decode(e)
    }
}

pub(crate) type TResult<T> = Result<T, TranslateError>;

/// Abstract per-flag update request, applied by
/// [`Translator::write_flags`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FlagOp {
    Ignore,
    Set0,
    Set1,
    /// Tie the flag to the corresponding port of the producing node.
    Update,
}

/// Per-instruction translation context.
pub struct Translator<'a, 'b> {
    b: &'a mut ChunkBuilder<'b>,
    inst: &'a DecodedInst,
    pc: u64,
}

impl<'a, 'b> Translator<'a, 'b> {
    fn new(b: &'a mut ChunkBuilder<'b>, inst: &'a DecodedInst, pc: u64) -> Self {
        Self { b, inst, pc }
    }

    pub(crate) fn builder(&mut self) -> &mut ChunkBuilder<'b> {
        self.b
    }

    pub(crate) fn inst(&self) -> &DecodedInst {
        self.inst
    }

    /// Length of the current instruction in bytes.
    pub(crate) fn inst_len(&self) -> u64 {
        self.inst.len as u64
    }

    /* Guest register access */

    pub(crate) fn read_guest(&mut self, ty: ValueType, slot: GuestReg) -> TResult<Node> {
        Ok(self.b.read_reg(ty, slot.offset, slot.index, slot.name)?)
    }

    pub(crate) fn write_guest(&mut self, slot: GuestReg, value: PortRef) -> TResult<Node> {
        Ok(self.b.write_reg(slot.offset, slot.index, slot.name, value)?)
    }

    fn uint(bits: u16) -> ValueType {
        ValueType::scalar(TypeClass::UnsignedInteger, bits).expect("integer width")
    }

    /// Read an architectural register at its encoded width.
    pub(crate) fn read_reg(&mut self, r: Reg) -> TResult<Node> {
        if r.is_high_byte() {
            let slot = regs::gpr(r.num);
            let full = self.read_guest(ValueType::u64(), slot)?;
            return Ok(self.b.bit_extract(full.val(), 8, 8)?);
        }
        match r.class {
            crate::regs::RegClass::Xmm => self.read_guest(ValueType::u128(), regs::xmm(r.num)),
            _ => self.read_guest(Self::uint(r.width_bits()), regs::gpr(r.num)),
        }
    }

    /// Write an architectural register with the x86-64 aliasing rules:
    /// 64-bit writes store everything, 32-bit writes zero bits [63:32],
    /// 16- and 8-bit writes leave the rest of the slot intact.
    pub(crate) fn write_reg_arch(&mut self, r: Reg, value: PortRef) -> TResult<Node> {
        if r.class == crate::regs::RegClass::Xmm {
            return self.write_xmm_merge(r.num, value);
        }
        let slot = regs::gpr(r.num);
        let vty = self.b.chunk().port_ty(value);
        match r.width_bits() {
            64 => {
                let v = self.b.bitcast(ValueType::u64(), value)?;
                self.write_guest(slot, v.val())
            }
            32 => {
                let v = self.b.bitcast(ValueType::u32(), value)?;
                let wide = self.b.zx(ValueType::u64(), v.val())?;
                self.write_guest(slot, wide.val())
            }
            16 => {
                let v = self.b.bitcast(ValueType::u16(), value)?;
                let orig = self.read_guest(ValueType::u64(), slot)?;
                let merged = self.b.bit_insert(orig.val(), v.val(), 0, 16)?;
                self.write_guest(slot, merged.val())
            }
            8 => {
                let v = self.b.bitcast(ValueType::u8(), value)?;
                let orig = self.read_guest(ValueType::u64(), slot)?;
                let to = if r.is_high_byte() { 8 } else { 0 };
                let merged = self.b.bit_insert(orig.val(), v.val(), to, 8)?;
                self.write_guest(slot, merged.val())
            }
            bits => {
                debug_assert!(false, "GPR write of {bits} bits to {vty}");
                Err(BuilderError::UnsupportedWidth(bits as u32).into())
            }
        }
    }

    /// Write an XMM register, merging a narrow value into lane 0 and
    /// keeping the upper lanes (the SSE scalar-op convention).
    pub(crate) fn write_xmm_merge(&mut self, num: u8, value: PortRef) -> TResult<Node> {
        let slot = regs::xmm(num);
        let bits = self.b.chunk().port_ty(value).width();
        if bits == 128 {
            let v = self.b.bitcast(ValueType::u128(), value)?;
            return self.write_guest(slot, v.val());
        }
        let v = self.b.bitcast(Self::uint(bits as u16), value)?;
        let orig = self.read_guest(ValueType::u128(), slot)?;
        let merged = self.b.bit_insert(orig.val(), v.val(), 0, bits)?;
        self.write_guest(slot, merged.val())
    }

    /// Write an XMM register whole, zero-extending a narrow value (the
    /// MOVD/MOVQ convention).
    pub(crate) fn write_xmm_zero(&mut self, num: u8, value: PortRef) -> TResult<Node> {
        let bits = self.b.chunk().port_ty(value).width();
        let v = self.b.bitcast(Self::uint(bits as u16), value)?;
        let wide = self.b.zx(ValueType::u128(), v.val())?;
        self.write_guest(regs::xmm(num), wide.val())
    }

    /* Operand protocol */

    /// The declared type of operand `i`.
    pub(crate) fn operand_ty(&self, i: usize) -> ValueType {
        match self.inst.operands[i] {
            Operand::Reg(r) if r.class == crate::regs::RegClass::Xmm => ValueType::u128(),
            Operand::Reg(r) => Self::uint(r.width_bits()),
            Operand::Mem => Self::uint(self.inst.mem.expect("memref").bits),
            Operand::Imm { bits, signed, .. } => {
                let class = if signed {
                    TypeClass::SignedInteger
                } else {
                    TypeClass::UnsignedInteger
                };
                ValueType::scalar(class, bits).expect("imm width")
            }
            Operand::Rel(_) => ValueType::u64(),
        }
    }

    /// Read operand `i` at its declared width.
    pub(crate) fn read_operand(&mut self, i: usize) -> TResult<Node> {
        match self.inst.operands[i] {
            Operand::Reg(r) => self.read_reg(r),
            Operand::Mem => {
                let mem = self.inst.mem.expect("memref");
                let addr = self.compute_address(&mem)?;
                Ok(self.b.read_mem(Self::uint(mem.bits), addr.val())?)
            }
            Operand::Imm {
                value,
                bits,
                signed,
            } => {
                let class = if signed {
                    TypeClass::SignedInteger
                } else {
                    TypeClass::UnsignedInteger
                };
                let ty = ValueType::scalar(class, bits).expect("imm width");
                Ok(self.b.constant_i(ty, value as u64)?)
            }
            Operand::Rel(rel) => Ok(self.b.constant_u64(rel as i64 as u64)?),
        }
    }

    /// Write `value` to operand `i`.
    pub(crate) fn write_operand(&mut self, i: usize, value: PortRef) -> TResult<Node> {
        match self.inst.operands[i] {
            Operand::Reg(r) => self.write_reg_arch(r, value),
            Operand::Mem => {
                let mem = self.inst.mem.expect("memref");
                let addr = self.compute_address(&mem)?;
                Ok(self.b.write_mem(addr.val(), value)?)
            }
            _ => panic!("write to immediate operand"),
        }
    }

    /// Effective address: `base + (index << log2 scale) + disp + segment`.
    /// RIP-relative bases resolve to the next instruction's address.
    pub(crate) fn compute_address(&mut self, mem: &MemRef) -> TResult<Node> {
        let mut addr: Option<Node> = None;

        if let Some(base) = mem.base {
            let n = if base == Reg::RIP {
                let pc = self.b.read_pc()?;
                let len = self.b.constant_u64(self.inst_len())?;
                self.b.add(pc.val(), len.val())?
            } else {
                self.read_guest(ValueType::u64(), regs::gpr(base.num))?
            };
            addr = Some(n);
        }

        if let Some(index) = mem.index {
            let idx = self.read_guest(ValueType::u64(), regs::gpr(index.num))?;
            let scaled = if mem.scale > 1 {
                let shift = self.b.constant_u64(mem.scale.trailing_zeros() as u64)?;
                self.b.lsl(idx.val(), shift.val())?
            } else {
                idx
            };
            addr = Some(match addr {
                Some(a) => self.b.add(a.val(), scaled.val())?,
                None => scaled,
            });
        }

        if mem.disp != 0 || addr.is_none() {
            let disp = self.b.constant_u64(mem.disp as u64)?;
            addr = Some(match addr {
                Some(a) => self.b.add(a.val(), disp.val())?,
                None => disp,
            });
        }

        let mut addr = addr.expect("empty effective address");

        if let Some(seg) = mem.seg {
            let slot = match seg {
                Segment::Fs => regs::FS,
                Segment::Gs => regs::GS,
            };
            let base = self.read_guest(ValueType::u64(), slot)?;
            addr = self.b.add(addr.val(), base.val())?;
        }

        Ok(addr)
    }

    /* Flags */

    fn flag_slot(tag: char) -> GuestReg {
        match tag {
            'z' => regs::ZF,
            'c' => regs::CF,
            'o' => regs::OF,
            's' => regs::SF,
            'p' => regs::PF,
            'a' => regs::AF,
            _ => unreachable!(),
        }
    }

    fn write_flag_const(&mut self, tag: char, v: bool) -> TResult<()> {
        let c = self.b.constant_u1(v)?;
        self.write_guest(Self::flag_slot(tag), c.val())?;
        Ok(())
    }

    fn flag_port(&mut self, op: Node, tag: char) -> TResult<Option<PortRef>> {
        // Constants compute ZF/SF directly from the value.
        let constant = match self.b.chunk().node(op) {
            NodeData::Constant { ty, bits } => Some((*ty, *bits)),
            _ => None,
        };
        if let Some((ty, bits)) = constant {
            return Ok(match tag {
                'z' => Some(self.b.constant_u1(bits == 0)?.val()),
                's' => {
                    let sign = (bits >> (ty.width() - 1)) & 1;
                    Some(self.b.constant_u1(sign != 0)?.val())
                }
                _ => None,
            });
        }
        let data = self.b.chunk().node(op);
        Ok(match tag {
            'z' if data.has_port(magpie_ir::PortTag::Zero) => Some(op.zero()),
            's' if data.has_port(magpie_ir::PortTag::Negative) => Some(op.negative()),
            'c' if data.has_port(magpie_ir::PortTag::Carry) => Some(op.carry()),
            'o' if data.has_port(magpie_ir::PortTag::Overflow) => Some(op.overflow()),
            _ => None,
        })
    }

    /// Apply one [`FlagOp`] per flag, tying `Update`s to the ports of the
    /// producing node `op`. PF and AF are accepted for interface parity but
    /// are not modeled; their slots are only ever written by `Set0`/`Set1`.
    pub(crate) fn write_flags(
        &mut self,
        op: Node,
        zf: FlagOp,
        cf: FlagOp,
        of: FlagOp,
        sf: FlagOp,
        pf: FlagOp,
        af: FlagOp,
    ) -> TResult<()> {
        for (tag, fop) in [('z', zf), ('c', cf), ('o', of), ('s', sf), ('p', pf), ('a', af)] {
            match fop {
                FlagOp::Ignore => {}
                FlagOp::Set0 => self.write_flag_const(tag, false)?,
                FlagOp::Set1 => self.write_flag_const(tag, true)?,
                FlagOp::Update => {
                    if let Some(port) = self.flag_port(op, tag)? {
                        self.write_guest(Self::flag_slot(tag), port)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Write a flag slot from an explicitly computed `u1`.
    pub(crate) fn write_flag_value(&mut self, tag: char, value: PortRef) -> TResult<()> {
        self.write_guest(Self::flag_slot(tag), value)?;
        Ok(())
    }

    fn read_flag(&mut self, slot: GuestReg) -> TResult<Node> {
        self.read_guest(ValueType::u1(), slot)
    }

    /// Materialize a condition code as a `u1` from the flag registers.
    pub(crate) fn compute_cond(&mut self, cond: CondCode) -> TResult<Node> {
        Ok(match cond {
            CondCode::Nbe => {
                let cf = self.read_flag(regs::CF)?;
                let zf = self.read_flag(regs::ZF)?;
                let ncf = self.b.bnot(cf.val())?;
                let nzf = self.b.bnot(zf.val())?;
                self.b.band(ncf.val(), nzf.val())?
            }
            CondCode::Nb => {
                let cf = self.read_flag(regs::CF)?;
                self.b.bnot(cf.val())?
            }
            CondCode::B => self.read_flag(regs::CF)?,
            CondCode::Be => {
                let cf = self.read_flag(regs::CF)?;
                let zf = self.read_flag(regs::ZF)?;
                self.b.bor(cf.val(), zf.val())?
            }
            CondCode::Z => self.read_flag(regs::ZF)?,
            CondCode::Nle => {
                let zf = self.read_flag(regs::ZF)?;
                let sf = self.read_flag(regs::SF)?;
                let of = self.read_flag(regs::OF)?;
                let nzf = self.b.bnot(zf.val())?;
                let eq = self.b.cmpeq(sf.val(), of.val())?;
                self.b.band(nzf.val(), eq.val())?
            }
            CondCode::Nl => {
                let sf = self.read_flag(regs::SF)?;
                let of = self.read_flag(regs::OF)?;
                self.b.cmpeq(sf.val(), of.val())?
            }
            CondCode::L => {
                let sf = self.read_flag(regs::SF)?;
                let of = self.read_flag(regs::OF)?;
                self.b.cmpne(sf.val(), of.val())?
            }
            CondCode::Le => {
                let zf = self.read_flag(regs::ZF)?;
                let sf = self.read_flag(regs::SF)?;
                let of = self.read_flag(regs::OF)?;
                let ne = self.b.cmpne(sf.val(), of.val())?;
                self.b.bor(zf.val(), ne.val())?
            }
            CondCode::Nz => {
                let zf = self.read_flag(regs::ZF)?;
                self.b.bnot(zf.val())?
            }
            CondCode::No => {
                let of = self.read_flag(regs::OF)?;
                self.b.bnot(of.val())?
            }
            CondCode::Np => {
                let pf = self.read_flag(regs::PF)?;
                self.b.bnot(pf.val())?
            }
            CondCode::Ns => {
                let sf = self.read_flag(regs::SF)?;
                self.b.bnot(sf.val())?
            }
            CondCode::O => self.read_flag(regs::OF)?,
            CondCode::P => self.read_flag(regs::PF)?,
            CondCode::S => self.read_flag(regs::SF)?,
        })
    }

    /// Cast `v` to `target`, inserting the truncation/extension and
    /// bitcast the width and class difference calls for.
    pub(crate) fn auto_cast(&mut self, target: ValueType, v: Node) -> TResult<Node> {
        let vty = self.b.chunk().port_ty(v.val());

        if target.width() == vty.width() {
            if target != vty {
                return Ok(self.b.bitcast(target, v.val())?);
            }
            return Ok(v);
        }

        let r = if target.width() < vty.width() {
            let narrow = vty.with_width(target.width() as u16).ok_or(
                BuilderError::UnsupportedWidth(target.width()),
            )?;
            self.b.trunc(narrow, v.val())?
        } else if vty.class() == TypeClass::SignedInteger {
            let wide = vty.with_width(target.width() as u16).ok_or(
                BuilderError::UnsupportedWidth(target.width()),
            )?;
            self.b.sx(wide, v.val())?
        } else if vty.class() == TypeClass::UnsignedInteger {
            let wide = vty.with_width(target.width() as u16).ok_or(
                BuilderError::UnsupportedWidth(target.width()),
            )?;
            self.b.zx(wide, v.val())?
        } else {
            return Err(BuilderError::TypeMismatch {
                expected: target,
                found: vty,
            }
            .into());
        };

        let rty = self.b.chunk().port_ty(r.val());
        if rty != target {
            return Ok(self.b.bitcast(target, r.val())?);
        }
        Ok(r)
    }

    /* x87 stack helpers */

    /// Address of ST(i): the stack base plus 10 bytes per slot, indexed by
    /// the TOP field (status word bits [13:11]).
    pub fn fpu_stack_addr(&mut self, stack_idx: u32) -> TResult<Node> {
        let base = self.read_guest(ValueType::u64(), regs::FPU_STACK_BASE)?;
        let sts = self.read_guest(ValueType::u16(), regs::FPU_STS)?;
        let top = self.b.bit_extract(sts.val(), 11, 3)?;
        let top = self.b.zx(ValueType::u64(), top.val())?;
        let ten = self.b.constant_u64(10)?;
        let off = self.b.mul(top.val(), ten.val())?;
        let mut addr = self.b.add(base.val(), off.val())?;
        if stack_idx != 0 {
            let c = self.b.constant_u64(stack_idx as u64 * 10)?;
            addr = self.b.add(addr.val(), c.val())?;
        }
        Ok(addr)
    }

    /// Read ST(i) as an 80-bit value.
    pub fn fpu_stack_get(&mut self, stack_idx: u32) -> TResult<Node> {
        let addr = self.fpu_stack_addr(stack_idx)?;
        Ok(self.b.read_mem(ValueType::f80(), addr.val())?)
    }

    /// Write ST(i) and mark its tag valid.
    pub fn fpu_stack_set(&mut self, stack_idx: u32, value: PortRef) -> TResult<Node> {
        let sts = self.read_guest(ValueType::u16(), regs::FPU_STS)?;
        let top = self.b.bit_extract(sts.val(), 11, 3)?;
        let tag = self.read_guest(ValueType::u16(), regs::FPU_TAG)?;

        // Clear the two tag bits of the TOP slot (00 = valid).
        let mask = self.b.constant_u16(0x3)?;
        let top16 = self.b.zx(ValueType::u16(), top.val())?;
        let one = self.b.constant_u8(1)?;
        let shift = self.b.lsl(top16.val(), one.val())?;
        let mask = self.b.lsl(mask.val(), shift.val())?;
        let mask = self.b.bnot(mask.val())?;
        let tag = self.b.band(tag.val(), mask.val())?;
        self.write_guest(regs::FPU_TAG, tag.val())?;

        let addr = self.fpu_stack_addr(stack_idx)?;
        Ok(self.b.write_mem(addr.val(), value)?)
    }

    /// Move the x87 TOP field: +1 pops (marking the old slot empty), -1
    /// pushes.
    pub fn fpu_stack_top_move(&mut self, delta: i32) -> TResult<Node> {
        debug_assert!(delta == 1 || delta == -1);
        let sts = self.read_guest(ValueType::u16(), regs::FPU_STS)?;
        let top = self.b.bit_extract(sts.val(), 11, 3)?;

        let new_top = if delta == 1 {
            // Mark the popped slot empty (tag 11).
            let tag = self.read_guest(ValueType::u16(), regs::FPU_TAG)?;
            let empty = self.b.constant_u16(0x3)?;
            let top16 = self.b.zx(ValueType::u16(), top.val())?;
            let one = self.b.constant_u8(1)?;
            let shift = self.b.lsl(top16.val(), one.val())?;
            let empty = self.b.lsl(empty.val(), shift.val())?;
            let tag = self.b.bor(tag.val(), empty.val())?;
            self.write_guest(regs::FPU_TAG, tag.val())?;

            let one3 = self.b.constant_u8(1)?;
            let top8 = self.b.zx(ValueType::u8(), top.val())?;
            self.b.add(top8.val(), one3.val())?
        } else {
            let one3 = self.b.constant_u8(1)?;
            let top8 = self.b.zx(ValueType::u8(), top.val())?;
            self.b.sub(top8.val(), one3.val())?
        };

        let sts = self.b.bit_insert(sts.val(), new_top.val(), 11, 3)?;
        self.write_guest(regs::FPU_STS, sts.val())
    }
}

fn is_noop_class(iclass: IClass) -> bool {
    matches!(
        iclass,
        IClass::Nop
            | IClass::Pause
            | IClass::Hlt
            | IClass::Cpuid
            | IClass::Prefetch
            | IClass::Endbr64
    )
}

fn translate_inst(ctx: &mut Translator) -> TResult<()> {
    use IClass::*;
    let inst = ctx.inst();
    match inst.iclass {
        Mov | Lea | Movzx | Movsx | Movsxd | Cdqe | Cwde | Cdq | Cqo | Movd | Movq | Movss
        | Movsd | Movups | Movupd | Movaps | Movapd | Movhps => mov::translate(ctx),

        Add | Or | Adc | Sbb | And | Sub | Xor | Cmp | Test | Pand | Por | Pxor | Paddb
        | Paddw | Paddd | Paddq | Psubb | Psubw | Psubd | Psubq => {
            if inst.lock {
                atomic::translate(ctx)
            } else {
                binop::translate(ctx)
            }
        }

        Not | Neg | Inc | Dec => {
            if inst.lock {
                atomic::translate(ctx)
            } else {
                unop::translate(ctx)
            }
        }

        Shl | Shr | Sar => shifts::translate(ctx),
        Mul | Imul | Div | Idiv => muldiv::translate(ctx),

        Jcc => jcc::translate(ctx),
        Setcc => setcc::translate(ctx),
        Cmovcc => cmov::translate(ctx),

        Push | Pop => stack::translate(ctx),
        Call | Ret | Jmp => branch::translate(ctx),
        RepeCmpsb => rep::translate(ctx),

        Xchg | Cmpxchg | Xadd => atomic::translate(ctx),

        Andps | Andpd | Orps | Orpd | Xorps | Xorpd | Addps | Addpd | Addss | Addsd | Subps
        | Subpd | Subss | Subsd | Mulps | Mulpd | Mulss | Mulsd | Divps | Divpd | Divss
        | Divsd | Cvtsi2ss | Cvtsi2sd | Cvtss2si | Cvtsd2si | Cvttss2si | Cvttsd2si
        | Cvtss2sd | Cvtsd2ss => fpvec::translate(ctx),

        Punpckldq | Punpcklqdq => punpck::translate(ctx),
        Pshufd | Shufps | Shufpd => shuffle::translate(ctx),

        _ => unimplemented::translate(ctx),
    }
}

/// Translate one decoded instruction into a packet.
pub fn translate_one(
    b: &mut ChunkBuilder,
    inst: &DecodedInst,
    pc: u64,
) -> TResult<Outcome> {
    if is_noop_class(inst.iclass) {
        b.begin_packet(pc, &inst.to_string());
        return Ok(match b.end_packet() {
            PacketKind::EndOfBlock => Outcome::EndOfBlock,
            PacketKind::Normal => Outcome::Noop,
        });
    }

    b.begin_packet(pc, &inst.to_string());
    let mut ctx = Translator::new(b, inst, pc);
    translate_inst(&mut ctx)?;
    Ok(match b.end_packet() {
        PacketKind::EndOfBlock => Outcome::EndOfBlock,
        PacketKind::Normal => Outcome::Normal,
    })
}

/// Lift a chunk starting at `base` from `code` until an end-of-block
/// instruction, the instruction budget, or the end of the byte stream.
///
/// A decode failure after the first instruction truncates the chunk at the
/// last successful instruction; on the first it fails the lift.
pub fn lift_chunk(
    b: &mut ChunkBuilder,
    code: &[u8],
    base: u64,
    max_insts: usize,
) -> TResult<()> {
    let mut offset = 0usize;
    let mut count = 0usize;
    let mut ended = false;

    while offset < code.len() && count < max_insts {
        let pc = base + offset as u64;
        let inst = match decode(&code[offset..]) {
            Ok(inst) => inst,
            Err(e) if count == 0 => return Err(e.into()),
            Err(e) => {
                debug!("truncating chunk at {pc:#x}: {e}");
                break;
            }
        };
        trace!("{pc:#x}: {inst}");

        let outcome = translate_one(b, &inst, pc)?;
        offset += inst.len as usize;
        count += 1;
        if outcome == Outcome::EndOfBlock {
            ended = true;
            break;
        }
    }

    // A chunk cut short by the byte stream or the budget resumes at the
    // next instruction; synchronize the PC so the dispatcher can continue.
    if !ended {
        let resume = base + offset as u64;
        b.begin_packet(resume, "(fallthrough)");
        let pc = b.constant_u64(resume)?;
        b.write_pc(pc.val(), magpie_ir::BranchHint::Fallthrough)?;
        b.end_packet();
    }
    Ok(())
}

/// Resolve the poison helper, required by the unimplemented-instruction
/// translator.
pub(crate) fn resolve_poison(
    b: &ChunkBuilder,
) -> Result<magpie_ir::InternalFunction, TranslateError> {
    b.ifr()
        .resolve(HANDLE_POISON)
        .ok_or(TranslateError::MissingHelper(HANDLE_POISON))
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_ir::InternalFunctionResolver;

    fn with_translator(f: impl FnOnce(&mut Translator)) -> magpie_ir::Chunk {
        let ifr = InternalFunctionResolver::new();
        let mut b = ChunkBuilder::new(0, &ifr);
        let inst = decode(&[0x90]).unwrap();
        b.begin_packet(0, "test");
        {
            let mut ctx = Translator::new(&mut b, &inst, 0);
            f(&mut ctx);
        }
        b.end_packet();
        b.finish()
    }

    #[test]
    fn fpu_stack_addressing_uses_top_field() {
        let chunk = with_translator(|ctx| {
            let addr = ctx.fpu_stack_addr(2).unwrap();
            ctx.builder()
                .write_reg(regs::RAX.offset, regs::RAX.index, "rax", addr.val())
                .unwrap();
        });
        // TOP comes out of status-word bits [13:11], slots are 10 bytes.
        let has_top_extract = chunk.nodes().any(|(_, d)| {
            matches!(d, NodeData::BitExtract { from: 11, length: 3, .. })
        });
        assert!(has_top_extract);
        let reads_stack_base = chunk.nodes().any(|(_, d)| {
            matches!(d, NodeData::ReadReg { name: "fpu_stack_base", .. })
        });
        assert!(reads_stack_base);
    }

    #[test]
    fn fpu_stack_set_marks_tag_valid() {
        let chunk = with_translator(|ctx| {
            // Copy ST(1) into ST(0): read and write through the stack.
            let raw = ctx.fpu_stack_get(1).unwrap();
            ctx.fpu_stack_set(0, raw.val()).unwrap();
        });
        let writes_tag = chunk
            .nodes()
            .any(|(_, d)| matches!(d, NodeData::WriteReg { name: "fpu_tag", .. }));
        assert!(writes_tag);
        let writes_mem = chunk
            .nodes()
            .any(|(_, d)| matches!(d, NodeData::WriteMem { .. }));
        assert!(writes_mem);
    }

    #[test]
    fn fpu_stack_pop_marks_slot_empty() {
        let chunk = with_translator(|ctx| {
            ctx.fpu_stack_top_move(1).unwrap();
        });
        let writes_sts = chunk
            .nodes()
            .any(|(_, d)| matches!(d, NodeData::WriteReg { name: "fpu_sts", .. }));
        assert!(writes_sts);
        let writes_tag = chunk
            .nodes()
            .any(|(_, d)| matches!(d, NodeData::WriteReg { name: "fpu_tag", .. }));
        assert!(writes_tag);
    }

    #[test]
    fn compute_cond_combines_flags() {
        // "le" is ZF | (SF != OF): one or, one compare, three flag reads.
        let chunk = with_translator(|ctx| {
            let c = ctx.compute_cond(CondCode::Le).unwrap();
            ctx.builder()
                .write_reg(regs::RAX.offset, regs::RAX.index, "rax", c.val())
                .unwrap();
        });
        let flag_reads = chunk
            .nodes()
            .filter(|(_, d)| {
                matches!(d, NodeData::ReadReg { name, .. } if ["zf", "sf", "of"].contains(name))
            })
            .count();
        assert_eq!(flag_reads, 3);
    }

    #[test]
    fn auto_cast_widens_by_class() {
        let chunk = with_translator(|ctx| {
            let signed = ctx.builder().constant_s8(-1).unwrap();
            let wide = ctx.auto_cast(ValueType::u64(), signed).unwrap();
            ctx.builder()
                .write_reg(regs::RAX.offset, regs::RAX.index, "rax", wide.val())
                .unwrap();
        });
        // Sign extension then a bitcast to the unsigned class.
        assert!(chunk
            .nodes()
            .any(|(_, d)| matches!(d, NodeData::Cast { op: magpie_ir::CastOp::Sx, .. })));
        assert!(chunk
            .nodes()
            .any(|(_, d)| matches!(d, NodeData::Cast { op: magpie_ir::CastOp::Bitcast, .. })));
    }
}
