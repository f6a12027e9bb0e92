//! RISC-V 64 translation context.
//!
//! Value representation: integers up to 64 bits and `f80` halves live in
//! X registers, zero-extended; every 128-bit type (scalar or vector) is an
//! X-register pair; `f32`/`f64` live in F registers. With no vector unit
//! assumed, lane operations are decomposed onto the pair with shifts and
//! masks. Conditional selects lower to short branch diamonds, which the
//! allocator's branch-liveness tracking was built for.

use super::inst::{AluImmOp, AluOp, AmoOp, Asm, BrOp, FpuOp, LoadOp, StoreOp};
use super::regs::{
    allocator_config, link_reg, membase_reg, scratch_reg, stack_reg, state_reg, writable_xreg,
    xreg, zero_reg,
};
use crate::machinst::{CodeBuffer, Label};
use crate::reg::{Reg, RegClass, Writable};
use crate::regalloc::allocate_registers;
use crate::value::{VRegAllocator, ValueRegs};
use crate::BackendError;
use log::trace;
use magpie_ir::{
    AtomicOp, BinaryOp, BranchHint, CastOp, Chunk, EntityRef, InternalFunctionResolver, Local,
    Node, NodeData, PortRef, PortTag, Rounding, ShiftOp, TernaryOp, TypeClass, UnaryOp, ValueType,
};
use magpie_x86::state::regs as guest;
use rustc_hash::FxHashMap;

const SAVE_AREA: i32 = 32;

fn wr(r: Reg) -> Writable<Reg> {
    Writable::from_reg(r)
}

#[derive(Copy, Clone)]
enum FlagKind {
    Add,
    Sub,
    Logic,
}

#[derive(Copy, Clone)]
struct FlagInfo {
    kind: FlagKind,
    bits: u32,
    lhs: Reg,
    rhs: Reg,
    full: Reg,
    zero_src: Reg,
    carry_in: Option<Reg>,
}

type LowerResult<T> = Result<T, BackendError>;

pub(super) struct TranslationContext<'a> {
    chunk: &'a Chunk,
    ifr: &'a InternalFunctionResolver,
    asm: Asm,
    vregs: VRegAllocator,
    ports: FxHashMap<(Node, PortTag), ValueRegs>,
    flags: FxHashMap<Node, FlagInfo>,
    ir_labels: FxHashMap<Node, Label>,
    local_offsets: FxHashMap<Local, i32>,
    frame: i32,
    epilogue: Label,
    this_pc: u64,
}

impl<'a> TranslationContext<'a> {
    pub(super) fn new(chunk: &'a Chunk, ifr: &'a InternalFunctionResolver) -> Self {
        let mut asm = Asm::new();
        let epilogue = asm.new_label();

        let mut local_offsets = FxHashMap::default();
        let mut frame = SAVE_AREA;
        for (local, ty) in chunk.locals() {
            local_offsets.insert(local, frame);
            frame += if ty.width() > 64 { 16 } else { 8 };
        }
        frame = (frame + 15) & !15;

        Self {
            chunk,
            ifr,
            asm,
            vregs: VRegAllocator::new(),
            ports: FxHashMap::default(),
            flags: FxHashMap::default(),
            ir_labels: FxHashMap::default(),
            local_offsets,
            frame,
            epilogue,
            this_pc: chunk.address(),
        }
    }

    pub(super) fn translate(mut self) -> LowerResult<Vec<u8>> {
        self.prologue()?;

        for packet in self.chunk.packets() {
            self.this_pc = packet.address();
            trace!("{:#x}: {}", packet.address(), packet.disasm());
            for &action in packet.actions() {
                self.lower_action(action)?;
            }
        }

        self.epilogue()?;

        allocate_registers(&mut self.asm.stream, &allocator_config())
            .map_err(BackendError::Alloc)?;
        trace!("allocated stream:\n{}", self.asm.stream.display());

        let mut buf = CodeBuffer::new(self.asm.stream.num_labels());
        for vi in self.asm.stream.insts() {
            if vi.dead {
                continue;
            }
            super::emit::emit(&vi.inst, &mut buf);
        }
        buf.finish().map_err(BackendError::Emit)
    }

    fn prologue(&mut self) -> LowerResult<()> {
        let sp = stack_reg();
        self.asm
            .alu_imm(AluImmOp::Addi, wr(sp), sp, -(self.frame as i64))?;
        self.asm.store(StoreOp::Sd, link_reg(), sp, 0)?;
        self.asm.store(StoreOp::Sd, state_reg(), sp, 8)?;
        self.asm.store(StoreOp::Sd, membase_reg(), sp, 16)?;
        self.asm.mv(wr(state_reg()), xreg(10))?;
        self.asm.load(
            LoadOp::Ld,
            wr(membase_reg()),
            state_reg(),
            guest::MEM_BASE.offset as i64,
        )?;
        Ok(())
    }

    fn epilogue(&mut self) -> LowerResult<()> {
        let sp = stack_reg();
        let epilogue = self.epilogue;
        self.asm.bind(epilogue);
        self.asm.load(LoadOp::Ld, wr(link_reg()), sp, 0)?;
        self.asm.load(LoadOp::Ld, wr(membase_reg()), sp, 16)?;
        self.asm.load(LoadOp::Ld, wr(state_reg()), sp, 8)?;
        self.asm
            .alu_imm(AluImmOp::Addi, wr(sp), sp, self.frame as i64)?;
        self.asm
            .alu_imm(AluImmOp::Addi, writable_xreg(10), zero_reg(), 0)?;
        self.asm.ret();
        Ok(())
    }

    /* Value representation */

    fn shape(ty: ValueType) -> LowerResult<(RegClass, usize)> {
        if ty.is_vector() || (ty.is_int() && ty.width() == 128) {
            if ty.width() != 128 {
                return Err(BackendError::Unsupported(format!(
                    "type {ty} wider than 128 bits"
                )));
            }
            return Ok((RegClass::Int, 2));
        }
        if ty.is_float() {
            return match ty.width() {
                32 | 64 => Ok((RegClass::Float, 1)),
                80 => Ok((RegClass::Int, 2)),
                w => Err(BackendError::Unsupported(format!("float width {w}"))),
            };
        }
        match ty.width() {
            0..=64 => Ok((RegClass::Int, 1)),
            w => Err(BackendError::Unsupported(format!("integer width {w}"))),
        }
    }

    fn int_vreg(&mut self) -> Reg {
        self.vregs.alloc(RegClass::Int)
    }

    fn float_vreg(&mut self) -> Reg {
        self.vregs.alloc(RegClass::Float)
    }

    fn cache(&mut self, node: Node, tag: PortTag, regs: ValueRegs) {
        self.ports.insert((node, tag), regs);
    }

    fn port_regs(&mut self, p: PortRef) -> LowerResult<ValueRegs> {
        if let Some(v) = self.ports.get(&(p.node, p.tag)) {
            return Ok(v.clone());
        }
        match p.tag {
            PortTag::Value => self.materialize(p.node)?,
            _ => self.materialize_flag(p.node, p.tag)?,
        }
        self.ports
            .get(&(p.node, p.tag))
            .cloned()
            .ok_or_else(|| BackendError::Unsupported(format!("port {p} not materialized")))
    }

    fn port_reg(&mut self, p: PortRef) -> LowerResult<Reg> {
        let v = self.port_regs(p)?;
        if v.len() != 1 {
            return Err(BackendError::Unsupported(format!(
                "port {p} spans {} registers",
                v.len()
            )));
        }
        Ok(v.only())
    }

    fn port_ty(&self, p: PortRef) -> ValueType {
        self.chunk.port_ty(p)
    }

    fn li(&mut self, value: u64) -> LowerResult<Reg> {
        let rd = self.int_vreg();
        self.asm.move_immediate(wr(rd), value)?;
        Ok(rd)
    }

    fn ir_label(&mut self, node: Node) -> Label {
        if let Some(&l) = self.ir_labels.get(&node) {
            return l;
        }
        let l = self.asm.new_label();
        self.ir_labels.insert(node, l);
        l
    }

    fn mask_to(&mut self, bits: u32, src: Reg) -> LowerResult<Reg> {
        if bits >= 64 {
            return Ok(src);
        }
        let t = self.int_vreg();
        self.asm
            .alu_imm(AluImmOp::Slli, wr(t), src, (64 - bits) as i64)?;
        let rd = self.int_vreg();
        self.asm
            .alu_imm(AluImmOp::Srli, wr(rd), t, (64 - bits) as i64)?;
        Ok(rd)
    }

    fn sext_to_64(&mut self, bits: u32, src: Reg) -> LowerResult<Reg> {
        if bits >= 64 {
            return Ok(src);
        }
        let t = self.int_vreg();
        self.asm
            .alu_imm(AluImmOp::Slli, wr(t), src, (64 - bits) as i64)?;
        let rd = self.int_vreg();
        self.asm
            .alu_imm(AluImmOp::Srai, wr(rd), t, (64 - bits) as i64)?;
        Ok(rd)
    }

    /// Extract `length` bits at `from` out of a (possibly paired) value.
    fn extract_bits(&mut self, v: &ValueRegs, from: u32, length: u32) -> LowerResult<Reg> {
        let (src, from) = if v.len() == 2 && from >= 64 {
            (v.hi(), from - 64)
        } else {
            (v.lo(), from)
        };
        if from + length > 64 {
            return Err(BackendError::Unsupported(format!(
                "bit extract [{from}, {from}+{length}) spans register halves"
            )));
        }
        let shifted = if from > 0 {
            let t = self.int_vreg();
            self.asm.alu_imm(AluImmOp::Srli, wr(t), src, from as i64)?;
            t
        } else {
            src
        };
        self.mask_to(length, shifted)
    }

    /// Insert the low `length` bits of `bits` into `target` at `to`
    /// (within one 64-bit register).
    fn insert_bits(&mut self, target: Reg, bits: Reg, to: u32, length: u32) -> LowerResult<Reg> {
        if to == 0 && length == 64 {
            return Ok(bits);
        }
        let mask: u64 = if length >= 64 {
            u64::MAX
        } else {
            ((1u64 << length) - 1) << to
        };
        let keep = self.li(!mask)?;
        let base = self.int_vreg();
        self.asm.alu(AluOp::And, wr(base), target, keep)?;
        let bm = self.mask_to(length, bits)?;
        let shifted = if to > 0 {
            let t = self.int_vreg();
            self.asm.alu_imm(AluImmOp::Slli, wr(t), bm, to as i64)?;
            t
        } else {
            bm
        };
        let rd = self.int_vreg();
        self.asm.alu(AluOp::Or, wr(rd), base, shifted)?;
        Ok(rd)
    }

    /* Actions */

    fn lower_action(&mut self, node: Node) -> LowerResult<()> {
        match self.chunk.node(node).clone() {
            NodeData::WriteReg { offset, value, .. } => {
                let ty = self.port_ty(value);
                let v = self.port_regs(value)?;
                self.store_at(state_reg(), offset as i32, ty, &v)
            }
            NodeData::WriteMem { addr, value } => {
                let ty = self.port_ty(value);
                let a = self.guest_addr(addr)?;
                let v = self.port_regs(value)?;
                self.store_at(a, 0, ty, &v)
            }
            NodeData::WritePc { value, hint } => self.lower_write_pc(value, hint),
            NodeData::Label { .. } => {
                let l = self.ir_label(node);
                self.asm.bind(l);
                Ok(())
            }
            NodeData::Br { target } => {
                let l = self.ir_label(target);
                self.asm.j(l);
                Ok(())
            }
            NodeData::CondBr { cond, target } => {
                let c = self.port_reg(cond)?;
                let l = self.ir_label(target);
                self.asm.branch(BrOp::Bne, c, zero_reg(), l);
                Ok(())
            }
            NodeData::InternalCall { func, args } => {
                self.asm.mv(writable_xreg(10), state_reg())?;
                for (i, arg) in args.iter().enumerate() {
                    let rd = writable_xreg(11 + i as u8);
                    if let NodeData::Label { .. } = self.chunk.node(arg.node) {
                        self.asm.move_immediate(rd, arg.node.index() as u64)?;
                    } else {
                        let v = self.port_reg(*arg)?;
                        self.asm.mv(rd, v)?;
                    }
                }
                let addr = self.ifr.address(func);
                self.asm.move_immediate(wr(scratch_reg()), addr)?;
                self.asm.jalr(wr(link_reg()), scratch_reg(), 0)?;
                Ok(())
            }
            NodeData::WriteLocal { local, value } => {
                let off = self.local_offsets[&local];
                let ty = self.port_ty(value);
                let v = self.port_regs(value)?;
                self.store_at(stack_reg(), off, ty, &v)
            }
            NodeData::BinaryAtomic { op, ty, addr, src } => {
                self.lower_binary_atomic(node, op, ty, addr, src)
            }
            NodeData::TernaryAtomic {
                ty,
                addr,
                expected,
                desired,
            } => self.lower_cmpxchg(node, ty, addr, expected, desired),
            data => Err(BackendError::Unsupported(format!(
                "action node {data:?} in action position"
            ))),
        }
    }

    fn lower_write_pc(&mut self, value: PortRef, hint: BranchHint) -> LowerResult<()> {
        let rip = guest::RIP.offset as i32;
        if hint == BranchHint::Csel {
            if let NodeData::Csel {
                cond, tval, fval, ..
            } = self.chunk.node(value.node).clone()
            {
                let c = self.port_reg(cond)?;
                let taken = self.asm.new_label();
                self.asm.branch(BrOp::Bne, c, zero_reg(), taken);
                let f = self.port_reg(fval)?;
                self.asm.store(StoreOp::Sd, f, state_reg(), rip as i64)?;
                let epilogue = self.epilogue;
                self.asm.j(epilogue);
                self.asm.bind(taken);
                let t = self.port_reg(tval)?;
                self.asm.store(StoreOp::Sd, t, state_reg(), rip as i64)?;
                return Ok(());
            }
        }
        let v = self.port_reg(value)?;
        self.asm.store(StoreOp::Sd, v, state_reg(), rip as i64)?;
        Ok(())
    }

    /* Memory */

    fn guest_addr(&mut self, addr: PortRef) -> LowerResult<Reg> {
        let a = self.port_reg(addr)?;
        let rd = self.int_vreg();
        self.asm.alu(AluOp::Add, wr(rd), membase_reg(), a)?;
        Ok(rd)
    }

    fn store_at(&mut self, base: Reg, offset: i32, ty: ValueType, v: &ValueRegs) -> LowerResult<()> {
        match (v.len(), ty.width()) {
            (1, w) if w <= 64 => {
                let r = self.to_int(v.lo(), ty)?;
                self.asm.store(store_op(w), r, base, offset as i64)
            }
            (2, 80) => {
                self.asm.store(StoreOp::Sd, v.lo(), base, offset as i64)?;
                self.asm.store(StoreOp::Sh, v.hi(), base, offset as i64 + 8)
            }
            (2, _) => {
                self.asm.store(StoreOp::Sd, v.lo(), base, offset as i64)?;
                self.asm.store(StoreOp::Sd, v.hi(), base, offset as i64 + 8)
            }
            (n, w) => Err(BackendError::Unsupported(format!(
                "store of {w}-bit value in {n} registers"
            ))),
        }
    }

    fn load_at(&mut self, base: Reg, offset: i32, ty: ValueType) -> LowerResult<ValueRegs> {
        let (class, n) = Self::shape(ty)?;
        match (class, n) {
            (RegClass::Int, 1) => {
                let rd = self.int_vreg();
                self.asm.load(load_op(ty.width()), wr(rd), base, offset as i64)?;
                Ok(ValueRegs::one(rd))
            }
            (RegClass::Int, 2) => {
                let lo = self.int_vreg();
                let hi = self.int_vreg();
                self.asm.load(LoadOp::Ld, wr(lo), base, offset as i64)?;
                let hi_op = if ty.width() == 80 { LoadOp::Lhu } else { LoadOp::Ld };
                self.asm.load(hi_op, wr(hi), base, offset as i64 + 8)?;
                Ok(ValueRegs::two(lo, hi))
            }
            (RegClass::Float, _) => {
                let tmp = self.int_vreg();
                self.asm.load(load_op(ty.width()), wr(tmp), base, offset as i64)?;
                let rd = self.float_vreg();
                self.asm.fmv_from_x(ty.width() as u8, wr(rd), tmp)?;
                Ok(ValueRegs::one(rd))
            }
            (class, n) => Err(BackendError::Unsupported(format!(
                "load of {n}-register {class:?} value"
            ))),
        }
    }

    fn to_int(&mut self, r: Reg, ty: ValueType) -> LowerResult<Reg> {
        if r.class() == RegClass::Int {
            return Ok(r);
        }
        let bits = if ty.width() <= 32 { 32 } else { 64 };
        let rd = self.int_vreg();
        self.asm.fmv_to_x(bits, wr(rd), r)?;
        if bits == 32 {
            // fmv.x.w sign-extends; keep values canonical.
            return self.mask_to(32, rd);
        }
        Ok(rd)
    }

    /* Value nodes */

    fn materialize(&mut self, node: Node) -> LowerResult<()> {
        if self.ports.contains_key(&(node, PortTag::Value)) {
            return Ok(());
        }
        let data = self.chunk.node(node).clone();
        match data {
            NodeData::Constant { ty, bits } => {
                let (class, n) = Self::shape(ty)?;
                if class == RegClass::Float {
                    let tmp = self.li(bits)?;
                    let rd = self.float_vreg();
                    self.asm.fmv_from_x(ty.width() as u8, wr(rd), tmp)?;
                    self.cache(node, PortTag::Value, ValueRegs::one(rd));
                } else if n == 2 {
                    let lo = self.li(bits)?;
                    let hi = self.li(0)?;
                    self.cache(node, PortTag::Value, ValueRegs::two(lo, hi));
                } else {
                    let rd = self.li(bits)?;
                    self.cache(node, PortTag::Value, ValueRegs::one(rd));
                }
            }

            NodeData::ReadPc => {
                let pc = self.this_pc;
                let rd = self.li(pc)?;
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }

            NodeData::ReadReg { ty, offset, .. } => {
                let v = self.load_at(state_reg(), offset as i32, ty)?;
                self.cache(node, PortTag::Value, v);
            }

            NodeData::ReadMem { ty, addr } => {
                let a = self.guest_addr(addr)?;
                let v = self.load_at(a, 0, ty)?;
                self.cache(node, PortTag::Value, v);
            }

            NodeData::ReadLocal { ty, local } => {
                let off = self.local_offsets[&local];
                let v = self.load_at(stack_reg(), off, ty)?;
                self.cache(node, PortTag::Value, v);
            }

            NodeData::UnaryArith { op, ty, value } => self.lower_unary(node, op, ty, value)?,
            NodeData::BinaryArith { op, ty, lhs, rhs } => {
                self.lower_binary(node, op, ty, lhs, rhs)?
            }
            NodeData::TernaryArith {
                op,
                ty,
                lhs,
                rhs,
                carry,
            } => self.lower_ternary(node, op, ty, lhs, rhs, carry)?,
            NodeData::Cast { op, ty, value } => self.lower_cast(node, op, ty, value)?,
            NodeData::Csel {
                ty,
                cond,
                tval,
                fval,
            } => self.lower_csel(node, ty, cond, tval, fval)?,
            NodeData::BitShift {
                op,
                ty,
                value,
                amount,
            } => self.lower_shift(node, op, ty, value, amount)?,
            NodeData::BitExtract {
                value,
                from,
                length,
                ..
            } => {
                let v = self.port_regs(value)?;
                let rd = self.extract_bits(&v, from, length)?;
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            NodeData::BitInsert {
                ty,
                value,
                bits,
                to,
                length,
            } => self.lower_bit_insert(node, ty, value, bits, to, length)?,
            NodeData::VectorExtract { ty, value, index } => {
                let lane = self.port_ty(value).element_width() as u32;
                let v = self.port_regs(value)?;
                let raw = self.extract_bits(&v, index * lane, lane)?;
                if ty.is_float() {
                    let rd = self.float_vreg();
                    self.asm.fmv_from_x(lane as u8, wr(rd), raw)?;
                    self.cache(node, PortTag::Value, ValueRegs::one(rd));
                } else {
                    self.cache(node, PortTag::Value, ValueRegs::one(raw));
                }
            }
            NodeData::VectorInsert {
                ty,
                value,
                elem,
                index,
            } => {
                let lane = ty.element_width() as u32;
                let v = self.port_regs(value)?;
                let e = self.port_regs(elem)?;
                let ebits = if ty.element_type().is_float() {
                    let t = self.int_vreg();
                    self.asm.fmv_to_x(lane as u8, wr(t), e.only())?;
                    t
                } else {
                    e.only()
                };
                let offset = index * lane;
                let (lo, hi) = (v.lo(), v.hi());
                let (new_lo, new_hi) = if offset >= 64 {
                    (lo, self.insert_bits(hi, ebits, offset - 64, lane)?)
                } else {
                    (self.insert_bits(lo, ebits, offset, lane)?, hi)
                };
                self.cache(node, PortTag::Value, ValueRegs::two(new_lo, new_hi));
            }
            NodeData::Label { .. } => {
                let rd = self.li(node.index() as u64)?;
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            data => {
                return Err(BackendError::Unsupported(format!(
                    "cannot materialize {data:?} as a value"
                )))
            }
        }
        Ok(())
    }

    /* Arithmetic */

    fn lower_unary(&mut self, node: Node, op: UnaryOp, ty: ValueType, value: PortRef) -> LowerResult<()> {
        let bits = ty.width();
        if bits > 64 {
            let v = self.port_regs(value)?;
            if op != UnaryOp::Not || v.len() != 2 {
                return Err(BackendError::Unsupported(format!("{op:?} on {ty}")));
            }
            let lo = self.int_vreg();
            let hi = self.int_vreg();
            self.asm.alu_imm(AluImmOp::Xori, wr(lo), v.lo(), -1)?;
            self.asm.alu_imm(AluImmOp::Xori, wr(hi), v.hi(), -1)?;
            self.cache(node, PortTag::Value, ValueRegs::two(lo, hi));
            return Ok(());
        }

        let v = self.port_reg(value)?;
        let full = self.int_vreg();
        match op {
            UnaryOp::Not => self.asm.alu_imm(AluImmOp::Xori, wr(full), v, -1)?,
            UnaryOp::Neg => self.asm.alu(AluOp::Sub, wr(full), zero_reg(), v)?,
        }
        let masked = self.mask_to(bits, full)?;
        self.cache(node, PortTag::Value, ValueRegs::one(masked));
        self.flags.insert(
            node,
            FlagInfo {
                kind: FlagKind::Sub,
                bits,
                lhs: zero_reg(),
                rhs: v,
                full,
                zero_src: masked,
                carry_in: None,
            },
        );
        Ok(())
    }

    fn lower_binary(
        &mut self,
        node: Node,
        op: BinaryOp,
        ty: ValueType,
        lhs: PortRef,
        rhs: PortRef,
    ) -> LowerResult<()> {
        if ty.is_vector() {
            return self.lower_vector_binary(node, op, ty, lhs, rhs);
        }
        if ty.is_float() {
            let a = self.port_regs(lhs)?.only();
            let b = self.port_regs(rhs)?.only();
            let fop = match op {
                BinaryOp::Add => FpuOp::Add,
                BinaryOp::Sub => FpuOp::Sub,
                BinaryOp::Mul => FpuOp::Mul,
                BinaryOp::Div => FpuOp::Div,
                _ => return Err(BackendError::Unsupported(format!("float {op:?}"))),
            };
            let rd = self.float_vreg();
            self.asm.fpu_op(fop, ty.width() as u8, wr(rd), a, b)?;
            self.cache(node, PortTag::Value, ValueRegs::one(rd));
            return Ok(());
        }
        if op.is_comparison() {
            return self.lower_compare(node, op, lhs, rhs);
        }

        let bits = ty.width();
        if bits == 128 {
            return self.lower_binary_128(node, op, lhs, rhs);
        }

        let a = self.port_reg(lhs)?;
        let b = self.port_reg(rhs)?;
        let full = self.int_vreg();
        let kind = match op {
            BinaryOp::Add => {
                self.asm.alu(AluOp::Add, wr(full), a, b)?;
                FlagKind::Add
            }
            BinaryOp::Sub => {
                self.asm.alu(AluOp::Sub, wr(full), a, b)?;
                FlagKind::Sub
            }
            BinaryOp::Mul => {
                self.asm.alu(AluOp::Mul, wr(full), a, b)?;
                FlagKind::Logic
            }
            BinaryOp::Div | BinaryOp::Rem => {
                let signed = ty.class() == TypeClass::SignedInteger;
                let (a, b) = if signed {
                    (self.sext_to_64(bits, a)?, self.sext_to_64(bits, b)?)
                } else {
                    (a, b)
                };
                let alu = match (op, signed) {
                    (BinaryOp::Div, true) => AluOp::Div,
                    (BinaryOp::Div, false) => AluOp::Divu,
                    (BinaryOp::Rem, true) => AluOp::Rem,
                    _ => AluOp::Remu,
                };
                self.asm.alu(alu, wr(full), a, b)?;
                FlagKind::Logic
            }
            BinaryOp::And => {
                self.asm.alu(AluOp::And, wr(full), a, b)?;
                FlagKind::Logic
            }
            BinaryOp::Or => {
                self.asm.alu(AluOp::Or, wr(full), a, b)?;
                FlagKind::Logic
            }
            BinaryOp::Xor => {
                self.asm.alu(AluOp::Xor, wr(full), a, b)?;
                FlagKind::Logic
            }
            _ => unreachable!(),
        };

        let masked = self.mask_to(bits, full)?;
        self.cache(node, PortTag::Value, ValueRegs::one(masked));
        self.flags.insert(
            node,
            FlagInfo {
                kind,
                bits,
                lhs: a,
                rhs: b,
                full,
                zero_src: masked,
                carry_in: None,
            },
        );
        Ok(())
    }

    fn lower_binary_128(
        &mut self,
        node: Node,
        op: BinaryOp,
        lhs: PortRef,
        rhs: PortRef,
    ) -> LowerResult<()> {
        let a = self.port_regs(lhs)?;
        let b = self.port_regs(rhs)?;
        let lo = self.int_vreg();
        let hi = self.int_vreg();
        match op {
            BinaryOp::And => {
                self.asm.alu(AluOp::And, wr(lo), a.lo(), b.lo())?;
                self.asm.alu(AluOp::And, wr(hi), a.hi(), b.hi())?;
            }
            BinaryOp::Or => {
                self.asm.alu(AluOp::Or, wr(lo), a.lo(), b.lo())?;
                self.asm.alu(AluOp::Or, wr(hi), a.hi(), b.hi())?;
            }
            BinaryOp::Xor => {
                self.asm.alu(AluOp::Xor, wr(lo), a.lo(), b.lo())?;
                self.asm.alu(AluOp::Xor, wr(hi), a.hi(), b.hi())?;
            }
            BinaryOp::Add => {
                self.asm.alu(AluOp::Add, wr(lo), a.lo(), b.lo())?;
                let carry = self.int_vreg();
                self.asm.alu(AluOp::Sltu, wr(carry), lo, a.lo())?;
                let t = self.int_vreg();
                self.asm.alu(AluOp::Add, wr(t), a.hi(), b.hi())?;
                self.asm.alu(AluOp::Add, wr(hi), t, carry)?;
            }
            BinaryOp::Mul => {
                self.asm.alu(AluOp::Mul, wr(lo), a.lo(), b.lo())?;
                let t = self.int_vreg();
                self.asm.alu(AluOp::Mulhu, wr(t), a.lo(), b.lo())?;
                let t2 = self.int_vreg();
                self.asm.alu(AluOp::Mul, wr(t2), a.lo(), b.hi())?;
                let t3 = self.int_vreg();
                self.asm.alu(AluOp::Add, wr(t3), t, t2)?;
                let t4 = self.int_vreg();
                self.asm.alu(AluOp::Mul, wr(t4), a.hi(), b.lo())?;
                self.asm.alu(AluOp::Add, wr(hi), t3, t4)?;
            }
            _ => {
                return Err(BackendError::Unsupported(format!(
                    "{op:?} on 128-bit values"
                )))
            }
        }
        self.cache(node, PortTag::Value, ValueRegs::two(lo, hi));
        Ok(())
    }

    /// Lane-parallel vector operations, decomposed onto the register pair.
    fn lower_vector_binary(
        &mut self,
        node: Node,
        op: BinaryOp,
        ty: ValueType,
        lhs: PortRef,
        rhs: PortRef,
    ) -> LowerResult<()> {
        // Bitwise forms need no lane structure.
        if matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor) {
            return self.lower_binary_128(node, op, lhs, rhs);
        }

        let lane = ty.element_width() as u32;
        let lanes = ty.lanes() as u32;
        let a = self.port_regs(lhs)?;
        let b = self.port_regs(rhs)?;

        let mut lo = a.lo();
        let mut hi = a.hi();
        for i in 0..lanes {
            let offset = i * lane;
            let av = self.extract_bits(&a, offset, lane)?;
            let bv = self.extract_bits(&b, offset, lane)?;
            let r = if ty.is_float() {
                let fa = self.float_vreg();
                self.asm.fmv_from_x(lane as u8, wr(fa), av)?;
                let fb = self.float_vreg();
                self.asm.fmv_from_x(lane as u8, wr(fb), bv)?;
                let fop = match op {
                    BinaryOp::Add => FpuOp::Add,
                    BinaryOp::Sub => FpuOp::Sub,
                    BinaryOp::Mul => FpuOp::Mul,
                    BinaryOp::Div => FpuOp::Div,
                    _ => {
                        return Err(BackendError::Unsupported(format!("vector {op:?} on {ty}")))
                    }
                };
                let fr = self.float_vreg();
                self.asm.fpu_op(fop, lane as u8, wr(fr), fa, fb)?;
                let ri = self.int_vreg();
                self.asm.fmv_to_x(lane as u8, wr(ri), fr)?;
                self.mask_to(lane, ri)?
            } else {
                let full = self.int_vreg();
                match op {
                    BinaryOp::Add => self.asm.alu(AluOp::Add, wr(full), av, bv)?,
                    BinaryOp::Sub => self.asm.alu(AluOp::Sub, wr(full), av, bv)?,
                    _ => {
                        return Err(BackendError::Unsupported(format!("vector {op:?} on {ty}")))
                    }
                }
                self.mask_to(lane, full)?
            };
            if offset >= 64 {
                hi = self.insert_bits(hi, r, offset - 64, lane)?;
            } else {
                lo = self.insert_bits(lo, r, offset, lane)?;
            }
        }
        self.cache(node, PortTag::Value, ValueRegs::two(lo, hi));
        Ok(())
    }

    fn lower_compare(&mut self, node: Node, op: BinaryOp, lhs: PortRef, rhs: PortRef) -> LowerResult<()> {
        let ty = self.port_ty(lhs);
        let mut a = self.port_reg(lhs)?;
        let mut b = self.port_reg(rhs)?;
        let rd = self.int_vreg();
        match op {
            BinaryOp::CmpEq => {
                let t = self.int_vreg();
                self.asm.alu(AluOp::Xor, wr(t), a, b)?;
                self.asm.alu_imm(AluImmOp::Sltiu, wr(rd), t, 1)?;
            }
            BinaryOp::CmpNe => {
                let t = self.int_vreg();
                self.asm.alu(AluOp::Xor, wr(t), a, b)?;
                self.asm.alu(AluOp::Sltu, wr(rd), zero_reg(), t)?;
            }
            BinaryOp::CmpGt => {
                if ty.class() == TypeClass::SignedInteger {
                    if ty.width() < 64 {
                        a = self.sext_to_64(ty.width(), a)?;
                        b = self.sext_to_64(ty.width(), b)?;
                    }
                    self.asm.alu(AluOp::Slt, wr(rd), b, a)?;
                } else {
                    self.asm.alu(AluOp::Sltu, wr(rd), b, a)?;
                }
            }
            _ => unreachable!(),
        }
        self.cache(node, PortTag::Value, ValueRegs::one(rd));
        Ok(())
    }

    fn lower_ternary(
        &mut self,
        node: Node,
        op: TernaryOp,
        ty: ValueType,
        lhs: PortRef,
        rhs: PortRef,
        carry: PortRef,
    ) -> LowerResult<()> {
        let bits = ty.width();
        if bits > 64 {
            return Err(BackendError::Unsupported(format!("{op:?} on {ty}")));
        }
        let a = self.port_reg(lhs)?;
        let b = self.port_reg(rhs)?;
        let c = self.port_reg(carry)?;
        let t = self.int_vreg();
        let full = self.int_vreg();
        let kind = match op {
            TernaryOp::Adc => {
                self.asm.alu(AluOp::Add, wr(t), a, b)?;
                self.asm.alu(AluOp::Add, wr(full), t, c)?;
                FlagKind::Add
            }
            TernaryOp::Sbb => {
                self.asm.alu(AluOp::Sub, wr(t), a, b)?;
                self.asm.alu(AluOp::Sub, wr(full), t, c)?;
                FlagKind::Sub
            }
        };
        let masked = self.mask_to(bits, full)?;
        self.cache(node, PortTag::Value, ValueRegs::one(masked));
        self.flags.insert(
            node,
            FlagInfo {
                kind,
                bits,
                lhs: a,
                rhs: b,
                full,
                zero_src: masked,
                carry_in: Some(c),
            },
        );
        Ok(())
    }

    fn lower_cast(&mut self, node: Node, op: CastOp, ty: ValueType, value: PortRef) -> LowerResult<()> {
        let src_ty = self.port_ty(value);
        match op {
            CastOp::Zx => {
                let v = self.port_regs(value)?;
                if ty.width() <= 64 {
                    self.cache(node, PortTag::Value, v);
                } else {
                    let hi = self.li(0)?;
                    self.cache(node, PortTag::Value, ValueRegs::two(v.lo(), hi));
                }
            }
            CastOp::Sx => {
                let v = self.port_reg(value)?;
                let wide = self.sext_to_64(src_ty.width(), v)?;
                if ty.width() <= 64 {
                    let masked = self.mask_to(ty.width(), wide)?;
                    self.cache(node, PortTag::Value, ValueRegs::one(masked));
                } else {
                    let hi = self.int_vreg();
                    self.asm.alu_imm(AluImmOp::Srai, wr(hi), wide, 63)?;
                    self.cache(node, PortTag::Value, ValueRegs::two(wide, hi));
                }
            }
            CastOp::Trunc => {
                let v = self.port_regs(value)?;
                if ty.width() > 64 {
                    return Err(BackendError::Unsupported(format!("trunc to {ty}")));
                }
                let src = if v.len() == 2 {
                    v.lo()
                } else {
                    self.to_int(v.only(), src_ty)?
                };
                let masked = self.mask_to(ty.width(), src)?;
                self.cache(node, PortTag::Value, ValueRegs::one(masked));
            }
            CastOp::Bitcast => {
                let (dc, dn) = Self::shape(ty)?;
                let (sc, sn) = Self::shape(src_ty)?;
                let v = self.port_regs(value)?;
                if dc == sc && dn == sn {
                    self.cache(node, PortTag::Value, v);
                } else if sc == RegClass::Int && dc == RegClass::Float {
                    let rd = self.float_vreg();
                    self.asm.fmv_from_x(ty.width() as u8, wr(rd), v.only())?;
                    self.cache(node, PortTag::Value, ValueRegs::one(rd));
                } else if sc == RegClass::Float && dc == RegClass::Int && dn == 1 {
                    let rd = self.to_int(v.only(), src_ty)?;
                    self.cache(node, PortTag::Value, ValueRegs::one(rd));
                } else {
                    return Err(BackendError::Unsupported(format!(
                        "bitcast {src_ty} -> {ty}"
                    )));
                }
            }
            CastOp::Convert(rounding) => {
                self.lower_convert(node, ty, src_ty, value, rounding)?;
            }
        }
        Ok(())
    }

    fn lower_convert(
        &mut self,
        node: Node,
        ty: ValueType,
        src_ty: ValueType,
        value: PortRef,
        rounding: Rounding,
    ) -> LowerResult<()> {
        match (src_ty.is_float(), ty.is_float()) {
            (false, true) => {
                let v = self.port_reg(value)?;
                let (v, int_bits) = if src_ty.width() < 32 {
                    (self.sext_to_64(src_ty.width(), v)?, 64)
                } else {
                    (v, src_ty.width() as u8)
                };
                let rd = self.float_vreg();
                self.asm.fcvt_from_int(int_bits, ty.width() as u8, wr(rd), v)?;
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            (true, false) => {
                let v = self.port_regs(value)?.only();
                let int_bits = if ty.width() <= 32 { 32u8 } else { 64 };
                let rd = self.int_vreg();
                self.asm.fcvt_to_int(
                    src_ty.width() as u8,
                    int_bits,
                    rounding == Rounding::Trunc,
                    wr(rd),
                    v,
                )?;
                let masked = self.mask_to(ty.width().min(64), rd)?;
                self.cache(node, PortTag::Value, ValueRegs::one(masked));
            }
            (true, true) => {
                let v = self.port_regs(value)?.only();
                let rd = self.float_vreg();
                self.asm
                    .fcvt(src_ty.width() as u8, ty.width() as u8, wr(rd), v)?;
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            (false, false) => {
                return Err(BackendError::Unsupported("int-to-int convert".to_string()))
            }
        }
        Ok(())
    }

    fn lower_csel(
        &mut self,
        node: Node,
        ty: ValueType,
        cond: PortRef,
        tval: PortRef,
        fval: PortRef,
    ) -> LowerResult<()> {
        let c = self.port_reg(cond)?;
        let t = self.port_regs(tval)?;
        let f = self.port_regs(fval)?;
        let (class, n) = Self::shape(ty)?;
        let skip = self.asm.new_label();
        match (class, n) {
            (RegClass::Int, 1) => {
                let rd = self.int_vreg();
                self.asm.mv(wr(rd), f.only())?;
                self.asm.branch(BrOp::Beq, c, zero_reg(), skip);
                self.asm.mv(wr(rd), t.only())?;
                self.asm.bind(skip);
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            (RegClass::Int, 2) => {
                let lo = self.int_vreg();
                let hi = self.int_vreg();
                self.asm.mv(wr(lo), f.lo())?;
                self.asm.mv(wr(hi), f.hi())?;
                self.asm.branch(BrOp::Beq, c, zero_reg(), skip);
                self.asm.mv(wr(lo), t.lo())?;
                self.asm.mv(wr(hi), t.hi())?;
                self.asm.bind(skip);
                self.cache(node, PortTag::Value, ValueRegs::two(lo, hi));
            }
            (RegClass::Float, _) => {
                let rd = self.float_vreg();
                self.asm.fmv(ty.width() as u8, wr(rd), f.only())?;
                self.asm.branch(BrOp::Beq, c, zero_reg(), skip);
                self.asm.fmv(ty.width() as u8, wr(rd), t.only())?;
                self.asm.bind(skip);
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            (class, n) => {
                return Err(BackendError::Unsupported(format!(
                    "csel of {n}-register {class:?} value"
                )))
            }
        }
        Ok(())
    }

    fn lower_shift(
        &mut self,
        node: Node,
        op: ShiftOp,
        ty: ValueType,
        value: PortRef,
        amount: PortRef,
    ) -> LowerResult<()> {
        let bits = ty.width();
        if bits > 64 {
            return Err(BackendError::Unsupported(format!("{op:?} on {ty}")));
        }
        let v = self.port_reg(value)?;
        let amt = self.port_reg(amount)?;
        let full = self.int_vreg();
        match op {
            ShiftOp::Lsl => self.asm.alu(AluOp::Sll, wr(full), v, amt)?,
            ShiftOp::Lsr => self.asm.alu(AluOp::Srl, wr(full), v, amt)?,
            ShiftOp::Asr => {
                let sv = self.sext_to_64(bits, v)?;
                self.asm.alu(AluOp::Sra, wr(full), sv, amt)?;
            }
        }
        let masked = self.mask_to(bits, full)?;
        self.cache(node, PortTag::Value, ValueRegs::one(masked));
        self.flags.insert(
            node,
            FlagInfo {
                kind: FlagKind::Logic,
                bits,
                lhs: v,
                rhs: amt,
                full,
                zero_src: masked,
                carry_in: None,
            },
        );
        Ok(())
    }

    fn lower_bit_insert(
        &mut self,
        node: Node,
        ty: ValueType,
        value: PortRef,
        bits: PortRef,
        to: u32,
        length: u32,
    ) -> LowerResult<()> {
        let v = self.port_regs(value)?;
        let b = self.port_regs(bits)?;
        let bits_ty = self.port_ty(bits);
        let b = if b.len() == 2 { b.lo() } else { self.to_int(b.only(), bits_ty)? };

        if v.len() == 1 && ty.width() <= 64 {
            let rd = self.insert_bits(v.only(), b, to, length)?;
            self.cache(node, PortTag::Value, ValueRegs::one(rd));
            return Ok(());
        }
        if v.len() == 2 {
            let (lo, hi) = (v.lo(), v.hi());
            let (new_lo, new_hi) = if to + length <= 64 {
                (self.insert_bits(lo, b, to, length)?, hi)
            } else if to >= 64 {
                (lo, self.insert_bits(hi, b, to - 64, length)?)
            } else {
                return Err(BackendError::Unsupported(format!(
                    "bit insert [{to}, {to}+{length}) spans register halves"
                )));
            };
            self.cache(node, PortTag::Value, ValueRegs::two(new_lo, new_hi));
            return Ok(());
        }
        Err(BackendError::Unsupported(format!("bit insert into {ty}")))
    }

    /* Atomics */

    fn lower_binary_atomic(
        &mut self,
        node: Node,
        op: AtomicOp,
        ty: ValueType,
        addr: PortRef,
        src: PortRef,
    ) -> LowerResult<()> {
        let bits = ty.width();
        if bits != 32 && bits != 64 {
            return Err(BackendError::Unsupported(format!(
                "{bits}-bit atomics (A extension covers 32 and 64 bits)"
            )));
        }
        let is64 = bits == 64;
        let haddr = self.guest_addr(addr)?;
        let s = self.port_reg(src)?;

        let (amo, operand, kind) = match op {
            AtomicOp::Add | AtomicOp::Xadd => (AmoOp::Add, s, FlagKind::Add),
            AtomicOp::Sub => {
                let neg = self.int_vreg();
                self.asm.alu(AluOp::Sub, wr(neg), zero_reg(), s)?;
                (AmoOp::Add, neg, FlagKind::Sub)
            }
            AtomicOp::And => (AmoOp::And, s, FlagKind::Logic),
            AtomicOp::Or => (AmoOp::Or, s, FlagKind::Logic),
            AtomicOp::Xor => (AmoOp::Xor, s, FlagKind::Logic),
            AtomicOp::Xchg => (AmoOp::Swap, s, FlagKind::Logic),
        };
        let raw_old = self.int_vreg();
        self.asm.amo(amo, is64, wr(raw_old), operand, haddr)?;
        // AMO*.W sign-extends; keep the old value canonical.
        let old = self.mask_to(bits, raw_old)?;

        // Reconstruct the stored value for the flag ports.
        let full = self.int_vreg();
        match op {
            AtomicOp::Add | AtomicOp::Xadd => self.asm.alu(AluOp::Add, wr(full), old, s)?,
            AtomicOp::Sub => self.asm.alu(AluOp::Sub, wr(full), old, s)?,
            AtomicOp::And => self.asm.alu(AluOp::And, wr(full), old, s)?,
            AtomicOp::Or => self.asm.alu(AluOp::Or, wr(full), old, s)?,
            AtomicOp::Xor => self.asm.alu(AluOp::Xor, wr(full), old, s)?,
            AtomicOp::Xchg => self.asm.mv(wr(full), s)?,
        }
        let zero_src = self.mask_to(bits, full)?;

        self.cache(node, PortTag::Value, ValueRegs::one(old));
        self.flags.insert(
            node,
            FlagInfo {
                kind,
                bits,
                lhs: old,
                rhs: s,
                full,
                zero_src,
                carry_in: None,
            },
        );
        Ok(())
    }

    fn lower_cmpxchg(
        &mut self,
        node: Node,
        ty: ValueType,
        addr: PortRef,
        expected: PortRef,
        desired: PortRef,
    ) -> LowerResult<()> {
        let bits = ty.width();
        if bits != 32 && bits != 64 {
            return Err(BackendError::Unsupported(format!(
                "{bits}-bit compare-exchange"
            )));
        }
        let is64 = bits == 64;
        let haddr = self.guest_addr(addr)?;
        let exp = self.port_reg(expected)?;
        let des = self.port_reg(desired)?;

        let raw_old = self.int_vreg();
        let old = self.int_vreg();
        let status = self.int_vreg();
        let retry = self.asm.new_label();
        let done = self.asm.new_label();

        self.asm.bind(retry);
        self.asm.lr(is64, wr(raw_old), haddr)?;
        if is64 {
            self.asm.mv(wr(old), raw_old)?;
        } else {
            let t = self.int_vreg();
            self.asm.alu_imm(AluImmOp::Slli, wr(t), raw_old, 32)?;
            self.asm.alu_imm(AluImmOp::Srli, wr(old), t, 32)?;
        }
        self.asm.branch(BrOp::Bne, old, exp, done);
        self.asm.sc(is64, wr(status), des, haddr)?;
        self.asm.branch(BrOp::Bne, status, zero_reg(), retry);
        self.asm.bind(done);

        let diff = self.int_vreg();
        self.asm.alu(AluOp::Sub, wr(diff), exp, old)?;
        let zero_src = self.mask_to(bits, diff)?;

        self.cache(node, PortTag::Value, ValueRegs::one(old));
        self.flags.insert(
            node,
            FlagInfo {
                kind: FlagKind::Sub,
                bits,
                lhs: exp,
                rhs: old,
                full: diff,
                zero_src,
                carry_in: None,
            },
        );
        Ok(())
    }

    /* Flag ports */

    fn materialize_flag(&mut self, node: Node, tag: PortTag) -> LowerResult<()> {
        self.materialize(node)?;
        let info = *self.flags.get(&node).ok_or_else(|| {
            BackendError::Unsupported(format!("flag port requested on {node} without flag info"))
        })?;

        let rd = match tag {
            PortTag::Zero => {
                let rd = self.int_vreg();
                self.asm.alu_imm(AluImmOp::Sltiu, wr(rd), info.zero_src, 1)?;
                rd
            }
            PortTag::Negative => self.extract_single_bit(info.full, info.bits - 1)?,
            PortTag::Carry => self.flag_carry(&info)?,
            PortTag::Overflow => self.flag_overflow(&info)?,
            PortTag::Value => unreachable!(),
        };
        self.cache(node, tag, ValueRegs::one(rd));
        Ok(())
    }

    fn extract_single_bit(&mut self, src: Reg, bit: u32) -> LowerResult<Reg> {
        let t = self.int_vreg();
        self.asm.alu_imm(AluImmOp::Srli, wr(t), src, bit as i64)?;
        let rd = self.int_vreg();
        self.asm.alu_imm(AluImmOp::Andi, wr(rd), t, 1)?;
        Ok(rd)
    }

    fn flag_carry(&mut self, info: &FlagInfo) -> LowerResult<Reg> {
        match info.kind {
            FlagKind::Logic => self.li(0),
            FlagKind::Add => {
                if info.bits < 64 {
                    self.extract_single_bit(info.full, info.bits)
                } else {
                    let rd = self.int_vreg();
                    self.asm.alu(AluOp::Sltu, wr(rd), info.full, info.lhs)?;
                    if let Some(cin) = info.carry_in {
                        let t = self.int_vreg();
                        self.asm.alu(AluOp::Xor, wr(t), info.full, info.lhs)?;
                        let eq = self.int_vreg();
                        self.asm.alu_imm(AluImmOp::Sltiu, wr(eq), t, 1)?;
                        let both = self.int_vreg();
                        self.asm.alu(AluOp::And, wr(both), eq, cin)?;
                        let merged = self.int_vreg();
                        self.asm.alu(AluOp::Or, wr(merged), rd, both)?;
                        return Ok(merged);
                    }
                    Ok(rd)
                }
            }
            FlagKind::Sub => {
                let rd = self.int_vreg();
                self.asm.alu(AluOp::Sltu, wr(rd), info.lhs, info.rhs)?;
                if let Some(cin) = info.carry_in {
                    let t = self.int_vreg();
                    self.asm.alu(AluOp::Sub, wr(t), info.lhs, info.rhs)?;
                    let extra = self.int_vreg();
                    self.asm.alu(AluOp::Sltu, wr(extra), t, cin)?;
                    let merged = self.int_vreg();
                    self.asm.alu(AluOp::Or, wr(merged), rd, extra)?;
                    return Ok(merged);
                }
                Ok(rd)
            }
        }
    }

    fn flag_overflow(&mut self, info: &FlagInfo) -> LowerResult<Reg> {
        match info.kind {
            FlagKind::Logic => self.li(0),
            FlagKind::Add => {
                let t1 = self.int_vreg();
                self.asm.alu(AluOp::Xor, wr(t1), info.lhs, info.full)?;
                let t2 = self.int_vreg();
                self.asm.alu(AluOp::Xor, wr(t2), info.rhs, info.full)?;
                let t3 = self.int_vreg();
                self.asm.alu(AluOp::And, wr(t3), t1, t2)?;
                self.extract_single_bit(t3, info.bits - 1)
            }
            FlagKind::Sub => {
                let t1 = self.int_vreg();
                self.asm.alu(AluOp::Xor, wr(t1), info.lhs, info.rhs)?;
                let t2 = self.int_vreg();
                self.asm.alu(AluOp::Xor, wr(t2), info.lhs, info.full)?;
                let t3 = self.int_vreg();
                self.asm.alu(AluOp::And, wr(t3), t1, t2)?;
                self.extract_single_bit(t3, info.bits - 1)
            }
        }
    }
}

fn store_op(width: u32) -> StoreOp {
    match width {
        1 | 8 => StoreOp::Sb,
        16 => StoreOp::Sh,
        32 => StoreOp::Sw,
        _ => StoreOp::Sd,
    }
}

fn load_op(width: u32) -> LoadOp {
    match width {
        1 | 8 => LoadOp::Lbu,
        16 => LoadOp::Lhu,
        32 => LoadOp::Lwu,
        _ => LoadOp::Ld,
    }
}
