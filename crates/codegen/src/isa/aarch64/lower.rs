//! AArch64 translation context: walks chunk nodes and emits instructions.
//!
//! Value representation: integers up to 64 bits and `f80` halves live in
//! X registers (always zero-extended to the register width); 128-bit
//! scalars are an X-register pair; `f32`/`f64` live in V registers; vector
//! types occupy one V register. Ports are materialized on demand and
//! memoized, so a node is lowered once no matter how many consumers it
//! has; flag ports generate code only when referenced.

use super::inst::{AMode, Asm, Cond, FpuOp, Inst, OperandSize, VecOp};
use super::regs::{
    allocator_config, membase_reg, scratch_reg, state_reg, writable_xreg, xreg, zero_reg,
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
    /// Unmasked result, for carry extraction.
    full: Reg,
    /// Masked result (or comparison difference) driving the zero flag.
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

        // Locals live above the save area, 8 or 16 bytes each.
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
        let sp = super::regs::stack_reg();
        self.asm
            .sub_imm(OperandSize::Size64, wr(sp), sp, self.frame as u64)?;
        self.asm.str(64, state_reg(), AMode::Offset { rn: sp, off: 0 })?;
        self.asm
            .str(64, super::regs::link_reg(), AMode::Offset { rn: sp, off: 8 })?;
        self.asm
            .str(64, membase_reg(), AMode::Offset { rn: sp, off: 16 })?;
        self.asm.mov(OperandSize::Size64, wr(state_reg()), xreg(0))?;
        self.asm.ldr(
            64,
            wr(membase_reg()),
            AMode::Offset {
                rn: state_reg(),
                off: guest::MEM_BASE.offset as i32,
            },
        )?;
        Ok(())
    }

    fn epilogue(&mut self) -> LowerResult<()> {
        let sp = super::regs::stack_reg();
        let epilogue = self.epilogue;
        self.asm.bind(epilogue);
        self.asm
            .ldr(64, wr(super::regs::link_reg()), AMode::Offset { rn: sp, off: 8 })?;
        self.asm
            .ldr(64, wr(membase_reg()), AMode::Offset { rn: sp, off: 16 })?;
        self.asm.ldr(64, wr(state_reg()), AMode::Offset { rn: sp, off: 0 })?;
        self.asm
            .add_imm(OperandSize::Size64, wr(sp), sp, self.frame as u64)?;
        // Status 0: translated code ran to a synchronized PC.
        self.asm.stream.push_keep(Inst::MovZ {
            size: OperandSize::Size32,
            rd: writable_xreg(0),
            imm16: 0,
            shift: 0,
        });
        self.asm.ret();
        Ok(())
    }

    /* Value representation */

    fn shape(ty: ValueType) -> LowerResult<(RegClass, usize)> {
        if ty.is_vector() {
            if ty.width() != 128 {
                return Err(BackendError::Unsupported(format!(
                    "vector type {ty} wider than 128 bits"
                )));
            }
            return Ok((RegClass::Float, 1));
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
            128 => Ok((RegClass::Int, 2)),
            w => Err(BackendError::Unsupported(format!("integer width {w}"))),
        }
    }

    fn alloc_for(&mut self, ty: ValueType) -> LowerResult<ValueRegs> {
        let (class, n) = Self::shape(ty)?;
        Ok(if n == 1 {
            ValueRegs::one(self.vregs.alloc(class))
        } else {
            ValueRegs::two(self.vregs.alloc(class), self.vregs.alloc(class))
        })
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

    fn imm_into(&mut self, rd: Writable<Reg>, value: u64) -> LowerResult<()> {
        self.asm.move_immediate(rd, value)?;
        Ok(())
    }

    fn ir_label(&mut self, node: Node) -> Label {
        if let Some(&l) = self.ir_labels.get(&node) {
            return l;
        }
        let l = self.asm.new_label();
        self.ir_labels.insert(node, l);
        l
    }

    /// Mask `src` down to `bits`, producing a canonical zero-extended
    /// value.
    fn mask_to(&mut self, bits: u32, src: Reg) -> LowerResult<Reg> {
        if bits >= 64 {
            return Ok(src);
        }
        let rd = self.int_vreg();
        self.asm.ubfx(OperandSize::Size64, wr(rd), src, 0, bits as u8)?;
        Ok(rd)
    }

    /// Sign-extend the low `bits` of `src` into a full 64-bit value.
    fn sext_to_64(&mut self, bits: u32, src: Reg) -> LowerResult<Reg> {
        if bits >= 64 {
            return Ok(src);
        }
        let rd = self.int_vreg();
        self.asm.sbfx(OperandSize::Size64, wr(rd), src, 0, bits as u8)?;
        Ok(rd)
    }

    /* Actions */

    fn lower_action(&mut self, node: Node) -> LowerResult<()> {
        match self.chunk.node(node).clone() {
            NodeData::WriteReg { offset, value, .. } => {
                let ty = self.port_ty(value);
                let v = self.port_regs(value)?;
                self.store_state(offset as i32, ty, &v)
            }
            NodeData::WriteMem { addr, value } => {
                let ty = self.port_ty(value);
                let a = self.guest_addr(addr)?;
                let v = self.port_regs(value)?;
                self.store_mem(a, ty, &v)
            }
            NodeData::WritePc { value, hint } => self.lower_write_pc(value, hint),
            NodeData::Label { .. } => {
                let l = self.ir_label(node);
                self.asm.bind(l);
                Ok(())
            }
            NodeData::Br { target } => {
                let l = self.ir_label(target);
                self.asm.b(l);
                Ok(())
            }
            NodeData::CondBr { cond, target } => {
                let c = self.port_reg(cond)?;
                let l = self.ir_label(target);
                self.asm.cbnz(OperandSize::Size64, c, l);
                Ok(())
            }
            NodeData::InternalCall { func, args } => {
                // Helper ABI: (state, args...).
                self.asm.mov(OperandSize::Size64, writable_xreg(0), state_reg())?;
                for (i, arg) in args.iter().enumerate() {
                    let rd = writable_xreg(1 + i as u8);
                    if let NodeData::Label { .. } = self.chunk.node(arg.node) {
                        // Pass the site label by index.
                        self.imm_into(rd, arg.node.index() as u64)?;
                    } else {
                        let v = self.port_reg(*arg)?;
                        self.asm.mov(OperandSize::Size64, rd, v)?;
                    }
                }
                self.imm_into(wr(scratch_reg()), self.ifr.address(func))?;
                self.asm.blr(scratch_reg())?;
                Ok(())
            }
            NodeData::WriteLocal { local, value } => {
                let off = self.local_offsets[&local];
                let ty = self.port_ty(value);
                let v = self.port_regs(value)?;
                let sp = super::regs::stack_reg();
                self.store_at(sp, off, ty, &v)
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
            // Recover (cond, target, fallthrough) and branch instead of
            // materializing the select.
            if let NodeData::Csel {
                cond, tval, fval, ..
            } = self.chunk.node(value.node).clone()
            {
                let c = self.port_reg(cond)?;
                let taken = self.asm.new_label();
                self.asm.cbnz(OperandSize::Size64, c, taken);
                let f = self.port_regs(fval)?;
                self.store_state(rip, ValueType::u64(), &f)?;
                let epilogue = self.epilogue;
                self.asm.b(epilogue);
                self.asm.bind(taken);
                let t = self.port_regs(tval)?;
                self.store_state(rip, ValueType::u64(), &t)?;
                return Ok(());
            }
        }
        let v = self.port_regs(value)?;
        self.store_state(rip, ValueType::u64(), &v)
    }

    /* Memory helpers */

    /// Host address of a guest address: membase + addr.
    fn guest_addr(&mut self, addr: PortRef) -> LowerResult<Reg> {
        let a = self.port_reg(addr)?;
        let rd = self.int_vreg();
        self.asm.add(OperandSize::Size64, wr(rd), membase_reg(), a)?;
        Ok(rd)
    }

    fn store_state(&mut self, offset: i32, ty: ValueType, v: &ValueRegs) -> LowerResult<()> {
        self.store_at(state_reg(), offset, ty, v)
    }

    fn store_at(&mut self, base: Reg, offset: i32, ty: ValueType, v: &ValueRegs) -> LowerResult<()> {
        match (v.len(), ty.width()) {
            (1, w) if w <= 64 => {
                let bits = store_bits(w);
                let r = self.to_int(v.lo(), ty)?;
                self.asm.str(bits, r, AMode::Offset { rn: base, off: offset })
            }
            (1, 128) => {
                // A vector-typed value: move the halves out of the V reg.
                let lo = self.int_vreg();
                let hi = self.int_vreg();
                self.asm.ext_lane(64, 0, wr(lo), v.only())?;
                self.asm.ext_lane(64, 1, wr(hi), v.only())?;
                self.asm.str(64, lo, AMode::Offset { rn: base, off: offset })?;
                self.asm.str(64, hi, AMode::Offset { rn: base, off: offset + 8 })
            }
            (2, 80) => {
                self.asm
                    .str(64, v.lo(), AMode::Offset { rn: base, off: offset })?;
                self.asm
                    .str(16, v.hi(), AMode::Offset { rn: base, off: offset + 8 })
            }
            (2, _) => {
                self.asm
                    .str(64, v.lo(), AMode::Offset { rn: base, off: offset })?;
                self.asm
                    .str(64, v.hi(), AMode::Offset { rn: base, off: offset + 8 })
            }
            (n, w) => Err(BackendError::Unsupported(format!(
                "store of {w}-bit value in {n} registers"
            ))),
        }
    }

    fn store_mem(&mut self, haddr: Reg, ty: ValueType, v: &ValueRegs) -> LowerResult<()> {
        self.store_at(haddr, 0, ty, v)
    }

    /// Get an integer register holding a single-register value, moving out
    /// of the float bank when the type is f32/f64.
    fn to_int(&mut self, r: Reg, ty: ValueType) -> LowerResult<Reg> {
        if r.class() == RegClass::Int {
            return Ok(r);
        }
        let bits = if ty.width() <= 32 { 32 } else { 64 };
        let rd = self.int_vreg();
        self.asm.fmov_from_fpu(bits as u8, wr(rd), r)?;
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
                    let tmp = self.int_vreg();
                    self.imm_into(wr(tmp), bits)?;
                    let rd = self.float_vreg();
                    let fb = if ty.width() <= 32 { 32 } else { 64 };
                    self.asm.fmov_to_fpu(fb as u8, wr(rd), tmp)?;
                    self.cache(node, PortTag::Value, ValueRegs::one(rd));
                } else if n == 2 {
                    let lo = self.int_vreg();
                    let hi = self.int_vreg();
                    self.imm_into(wr(lo), bits)?;
                    self.imm_into(wr(hi), 0)?;
                    self.cache(node, PortTag::Value, ValueRegs::two(lo, hi));
                } else {
                    let rd = self.int_vreg();
                    self.imm_into(wr(rd), bits)?;
                    self.cache(node, PortTag::Value, ValueRegs::one(rd));
                }
            }

            NodeData::ReadPc => {
                let rd = self.int_vreg();
                let pc = self.this_pc;
                self.imm_into(wr(rd), pc)?;
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
                let sp = super::regs::stack_reg();
                let v = self.load_at(sp, off, ty)?;
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
            } => self.lower_bit_extract(node, value, from, length)?,
            NodeData::BitInsert {
                ty,
                value,
                bits,
                to,
                length,
            } => self.lower_bit_insert(node, ty, value, bits, to, length)?,
            NodeData::VectorExtract { ty, value, index } => {
                self.lower_vector_extract(node, ty, value, index)?
            }
            NodeData::VectorInsert {
                ty,
                value,
                elem,
                index,
            } => self.lower_vector_insert(node, ty, value, elem, index)?,
            NodeData::Label { .. } => {
                // A label used as a value: its identity.
                let rd = self.int_vreg();
                self.imm_into(wr(rd), node.index() as u64)?;
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

    fn load_at(&mut self, base: Reg, offset: i32, ty: ValueType) -> LowerResult<ValueRegs> {
        let (class, n) = Self::shape(ty)?;
        match (class, n, ty.width()) {
            (RegClass::Int, 1, w) => {
                let rd = self.int_vreg();
                self.asm
                    .ldr(store_bits(w), wr(rd), AMode::Offset { rn: base, off: offset })?;
                Ok(ValueRegs::one(rd))
            }
            (RegClass::Int, 2, w) => {
                let lo = self.int_vreg();
                let hi = self.int_vreg();
                self.asm.ldr(64, wr(lo), AMode::Offset { rn: base, off: offset })?;
                let hi_bits = if w == 80 { 16 } else { 64 };
                self.asm
                    .ldr(hi_bits, wr(hi), AMode::Offset { rn: base, off: offset + 8 })?;
                Ok(ValueRegs::two(lo, hi))
            }
            (RegClass::Float, 1, 128) => {
                // Load halves and assemble the vector.
                let lo = self.int_vreg();
                let hi = self.int_vreg();
                self.asm.ldr(64, wr(lo), AMode::Offset { rn: base, off: offset })?;
                self.asm
                    .ldr(64, wr(hi), AMode::Offset { rn: base, off: offset + 8 })?;
                let q = self.float_vreg();
                self.asm.ins_lane(64, 0, wr(q), lo)?;
                self.asm.ins_lane(64, 1, wr(q), hi)?;
                Ok(ValueRegs::one(q))
            }
            (RegClass::Float, 1, w) => {
                let tmp = self.int_vreg();
                self.asm
                    .ldr(store_bits(w), wr(tmp), AMode::Offset { rn: base, off: offset })?;
                let rd = self.float_vreg();
                self.asm.fmov_to_fpu(if w <= 32 { 32 } else { 64 }, wr(rd), tmp)?;
                Ok(ValueRegs::one(rd))
            }
            _ => Err(BackendError::Unsupported(format!("load of {ty}"))),
        }
    }

    /* Arithmetic */

    fn lower_unary(&mut self, node: Node, op: UnaryOp, ty: ValueType, value: PortRef) -> LowerResult<()> {
        let bits = ty.width();
        if bits > 64 {
            let v = self.port_regs(value)?;
            if v.len() != 2 || op != UnaryOp::Not {
                return Err(BackendError::Unsupported(format!("{op:?} on {ty}")));
            }
            let lo = self.int_vreg();
            let hi = self.int_vreg();
            self.asm.mvn(OperandSize::Size64, wr(lo), v.lo())?;
            self.asm.mvn(OperandSize::Size64, wr(hi), v.hi())?;
            self.cache(node, PortTag::Value, ValueRegs::two(lo, hi));
            return Ok(());
        }

        let v = self.port_reg(value)?;
        let full = self.int_vreg();
        match op {
            UnaryOp::Not => {
                self.asm.mvn(OperandSize::Size64, wr(full), v)?;
            }
            UnaryOp::Neg => {
                self.asm.sub(OperandSize::Size64, wr(full), zero_reg(), v)?;
            }
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
        // Vector and scalar-float forms.
        if ty.is_vector() {
            return self.lower_vector_binary(node, op, ty, lhs, rhs);
        }
        if ty.is_float() {
            return self.lower_float_binary(node, op, ty, lhs, rhs);
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
        let size = OperandSize::Size64;
        let kind = match op {
            BinaryOp::Add => {
                self.asm.add(size, wr(full), a, b)?;
                FlagKind::Add
            }
            BinaryOp::Sub => {
                self.asm.sub(size, wr(full), a, b)?;
                FlagKind::Sub
            }
            BinaryOp::Mul => {
                self.asm.mul(size, wr(full), a, b)?;
                FlagKind::Logic
            }
            BinaryOp::Div => {
                let (a, b) = if ty.class() == TypeClass::SignedInteger {
                    (self.sext_to_64(bits, a)?, self.sext_to_64(bits, b)?)
                } else {
                    (a, b)
                };
                if ty.class() == TypeClass::SignedInteger {
                    self.asm.sdiv(size, wr(full), a, b)?;
                } else {
                    self.asm.udiv(size, wr(full), a, b)?;
                }
                FlagKind::Logic
            }
            BinaryOp::Rem => {
                let (a, b) = if ty.class() == TypeClass::SignedInteger {
                    (self.sext_to_64(bits, a)?, self.sext_to_64(bits, b)?)
                } else {
                    (a, b)
                };
                let q = self.int_vreg();
                if ty.class() == TypeClass::SignedInteger {
                    self.asm.sdiv(size, wr(q), a, b)?;
                } else {
                    self.asm.udiv(size, wr(q), a, b)?;
                }
                self.asm.msub(size, wr(full), q, b, a)?;
                FlagKind::Logic
            }
            BinaryOp::And => {
                self.asm.and_(size, wr(full), a, b)?;
                FlagKind::Logic
            }
            BinaryOp::Or => {
                self.asm.orr(size, wr(full), a, b)?;
                FlagKind::Logic
            }
            BinaryOp::Xor => {
                self.asm.eor(size, wr(full), a, b)?;
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
        let size = OperandSize::Size64;
        let lo = self.int_vreg();
        let hi = self.int_vreg();
        match op {
            BinaryOp::And => {
                self.asm.and_(size, wr(lo), a.lo(), b.lo())?;
                self.asm.and_(size, wr(hi), a.hi(), b.hi())?;
            }
            BinaryOp::Or => {
                self.asm.orr(size, wr(lo), a.lo(), b.lo())?;
                self.asm.orr(size, wr(hi), a.hi(), b.hi())?;
            }
            BinaryOp::Xor => {
                self.asm.eor(size, wr(lo), a.lo(), b.lo())?;
                self.asm.eor(size, wr(hi), a.hi(), b.hi())?;
            }
            BinaryOp::Add => {
                // adds/adc through the real carry flag.
                self.asm.adds(size, wr(lo), a.lo(), b.lo())?;
                self.asm.adc(size, wr(hi), a.hi(), b.hi())?;
            }
            BinaryOp::Mul => {
                // Low 128 bits of the product: lo = a.lo*b.lo and
                // hi = umulh(a.lo, b.lo) + a.lo*b.hi + a.hi*b.lo.
                self.asm.mul(size, wr(lo), a.lo(), b.lo())?;
                let t = self.int_vreg();
                self.asm.umulh(wr(t), a.lo(), b.lo())?;
                let t2 = self.int_vreg();
                self.asm.madd(size, wr(t2), a.lo(), b.hi(), t)?;
                self.asm.madd(size, wr(hi), a.hi(), b.lo(), t2)?;
            }
            _ => {
                return Err(BackendError::Unsupported(format!("{op:?} on 128-bit values")));
            }
        }
        self.cache(node, PortTag::Value, ValueRegs::two(lo, hi));
        Ok(())
    }

    fn lower_vector_binary(
        &mut self,
        node: Node,
        op: BinaryOp,
        ty: ValueType,
        lhs: PortRef,
        rhs: PortRef,
    ) -> LowerResult<()> {
        let a = self.port_regs(lhs)?.only();
        let b = self.port_regs(rhs)?.only();
        let lane = ty.element_width() as u8;
        let vop = match (op, ty.is_float()) {
            (BinaryOp::Add, false) => VecOp::Add,
            (BinaryOp::Sub, false) => VecOp::Sub,
            (BinaryOp::And, _) => VecOp::And,
            (BinaryOp::Or, _) => VecOp::Orr,
            (BinaryOp::Xor, _) => VecOp::Eor,
            (BinaryOp::Add, true) => VecOp::Fadd,
            (BinaryOp::Sub, true) => VecOp::Fsub,
            (BinaryOp::Mul, true) => VecOp::Fmul,
            (BinaryOp::Div, true) => VecOp::Fdiv,
            (op, _) => {
                return Err(BackendError::Unsupported(format!("vector {op:?} on {ty}")))
            }
        };
        let rd = self.float_vreg();
        self.asm.vec_rrr(vop, lane, wr(rd), a, b)?;
        self.cache(node, PortTag::Value, ValueRegs::one(rd));
        Ok(())
    }

    fn lower_float_binary(
        &mut self,
        node: Node,
        op: BinaryOp,
        ty: ValueType,
        lhs: PortRef,
        rhs: PortRef,
    ) -> LowerResult<()> {
        let a = self.port_regs(lhs)?.only();
        let b = self.port_regs(rhs)?.only();
        let fop = match op {
            BinaryOp::Add => FpuOp::Add,
            BinaryOp::Sub => FpuOp::Sub,
            BinaryOp::Mul => FpuOp::Mul,
            BinaryOp::Div => FpuOp::Div,
            _ => {
                return Err(BackendError::Unsupported(format!("float {op:?}")));
            }
        };
        let rd = self.float_vreg();
        self.asm.fpu_op(fop, ty.width() as u8, wr(rd), a, b)?;
        self.cache(node, PortTag::Value, ValueRegs::one(rd));
        Ok(())
    }

    fn lower_compare(&mut self, node: Node, op: BinaryOp, lhs: PortRef, rhs: PortRef) -> LowerResult<()> {
        let ty = self.port_ty(lhs);
        let mut a = self.port_reg(lhs)?;
        let mut b = self.port_reg(rhs)?;
        if op == BinaryOp::CmpGt && ty.class() == TypeClass::SignedInteger && ty.width() < 64 {
            a = self.sext_to_64(ty.width(), a)?;
            b = self.sext_to_64(ty.width(), b)?;
        }
        self.asm.cmp(OperandSize::Size64, a, b)?;
        let cond = match op {
            BinaryOp::CmpEq => Cond::Eq,
            BinaryOp::CmpNe => Cond::Ne,
            BinaryOp::CmpGt => Cond::Gt,
            _ => unreachable!(),
        };
        let rd = self.int_vreg();
        self.asm.cset(wr(rd), cond)?;
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
        let size = OperandSize::Size64;
        let t = self.int_vreg();
        let full = self.int_vreg();
        let kind = match op {
            TernaryOp::Adc => {
                self.asm.add(size, wr(t), a, b)?;
                self.asm.add(size, wr(full), t, c)?;
                FlagKind::Add
            }
            TernaryOp::Sbb => {
                self.asm.sub(size, wr(t), a, b)?;
                self.asm.sub(size, wr(full), t, c)?;
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

    /* Casts, selects, shifts, bit fields, vectors */

    fn lower_cast(&mut self, node: Node, op: CastOp, ty: ValueType, value: PortRef) -> LowerResult<()> {
        let src_ty = self.port_ty(value);
        match op {
            CastOp::Zx => {
                let v = self.port_regs(value)?;
                // Sources are canonical (zero-extended) already.
                if ty.width() <= 64 {
                    self.cache(node, PortTag::Value, v);
                } else if ty.width() == 128 {
                    let hi = self.int_vreg();
                    self.imm_into(wr(hi), 0)?;
                    self.cache(node, PortTag::Value, ValueRegs::two(v.lo(), hi));
                } else {
                    return Err(BackendError::Unsupported(format!("zx to {ty}")));
                }
            }
            CastOp::Sx => {
                let v = self.port_reg(value)?;
                let wide = self.sext_to_64(src_ty.width(), v)?;
                if ty.width() <= 64 {
                    let masked = self.mask_to(ty.width(), wide)?;
                    self.cache(node, PortTag::Value, ValueRegs::one(masked));
                } else if ty.width() == 128 {
                    let hi = self.int_vreg();
                    let shift = self.int_vreg();
                    self.imm_into(wr(shift), 63)?;
                    self.asm.asr(OperandSize::Size64, wr(hi), wide, shift)?;
                    self.cache(node, PortTag::Value, ValueRegs::two(wide, hi));
                } else {
                    return Err(BackendError::Unsupported(format!("sx to {ty}")));
                }
            }
            CastOp::Trunc => {
                let v = self.port_regs(value)?;
                if ty.width() > 64 {
                    return Err(BackendError::Unsupported(format!("trunc to {ty}")));
                }
                let src = if v.len() == 2 { v.lo() } else { self.from_any(v, src_ty)? };
                let masked = self.mask_to(ty.width(), src)?;
                self.cache(node, PortTag::Value, ValueRegs::one(masked));
            }
            CastOp::Bitcast => self.lower_bitcast(node, ty, src_ty, value)?,
            CastOp::Convert(rounding) => self.lower_convert(node, ty, src_ty, value, rounding)?,
        }
        Ok(())
    }

    /// Get a single int register out of a single-register value of any
    /// class.
    fn from_any(&mut self, v: ValueRegs, ty: ValueType) -> LowerResult<Reg> {
        if v.len() != 1 {
            return Err(BackendError::Unsupported(format!(
                "expected single register for {ty}"
            )));
        }
        self.to_int(v.only(), ty)
    }

    fn lower_bitcast(
        &mut self,
        node: Node,
        ty: ValueType,
        src_ty: ValueType,
        value: PortRef,
    ) -> LowerResult<()> {
        let (dst_class, dst_n) = Self::shape(ty)?;
        let (src_class, src_n) = Self::shape(src_ty)?;
        let v = self.port_regs(value)?;

        // Same representation: alias.
        if dst_class == src_class && dst_n == src_n {
            self.cache(node, PortTag::Value, v);
            return Ok(());
        }

        match (src_class, src_n, dst_class, dst_n) {
            // Scalar int <-> scalar float.
            (RegClass::Int, 1, RegClass::Float, 1) if ty.width() == 128 => {
                unreachable!("128-bit scalar is an int pair")
            }
            (RegClass::Int, 1, RegClass::Float, 1) => {
                let rd = self.float_vreg();
                let bits = if ty.width() <= 32 { 32 } else { 64 };
                self.asm.fmov_to_fpu(bits, wr(rd), v.only())?;
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            (RegClass::Float, 1, RegClass::Int, 1) if src_ty.width() <= 64 => {
                let rd = self.int_vreg();
                let bits = if src_ty.width() <= 32 { 32 } else { 64 };
                self.asm.fmov_from_fpu(bits, wr(rd), v.only())?;
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            // 128-bit pair -> vector register.
            (RegClass::Int, 2, RegClass::Float, 1) => {
                let q = self.float_vreg();
                self.asm.ins_lane(64, 0, wr(q), v.lo())?;
                self.asm.ins_lane(64, 1, wr(q), v.hi())?;
                self.cache(node, PortTag::Value, ValueRegs::one(q));
            }
            // Vector register -> 128-bit pair.
            (RegClass::Float, 1, RegClass::Int, 2) => {
                let lo = self.int_vreg();
                let hi = self.int_vreg();
                self.asm.ext_lane(64, 0, wr(lo), v.only())?;
                self.asm.ext_lane(64, 1, wr(hi), v.only())?;
                self.cache(node, PortTag::Value, ValueRegs::two(lo, hi));
            }
            _ => {
                return Err(BackendError::Unsupported(format!(
                    "bitcast {src_ty} -> {ty}"
                )))
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
                // Integer to float; the translator sign-casts first.
                let v = self.port_reg(value)?;
                let src_bits = if src_ty.width() <= 32 { 32 } else { 64 };
                let v = if src_ty.width() < 32 {
                    self.sext_to_64(src_ty.width(), v)?
                } else {
                    v
                };
                let rd = self.float_vreg();
                self.asm
                    .scvtf(src_bits, ty.width() as u8, wr(rd), v)?;
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            (true, false) => {
                let v = self.port_regs(value)?.only();
                let dst_bits = if ty.width() <= 32 { 32 } else { 64 };
                let rd = self.int_vreg();
                self.asm.fcvt_to_int(
                    src_ty.width() as u8,
                    dst_bits,
                    rounding == Rounding::Round,
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
                return Err(BackendError::Unsupported(
                    "int-to-int convert".to_string(),
                ))
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
        self.asm.cmp_imm(OperandSize::Size64, c, 0)?;

        let (class, n) = Self::shape(ty)?;
        match (class, n) {
            (RegClass::Int, 1) => {
                let rd = self.int_vreg();
                self.asm
                    .csel(OperandSize::Size64, Cond::Ne, wr(rd), t.only(), f.only())?;
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            (RegClass::Int, 2) => {
                let lo = self.int_vreg();
                let hi = self.int_vreg();
                self.asm
                    .csel(OperandSize::Size64, Cond::Ne, wr(lo), t.lo(), f.lo())?;
                self.asm
                    .csel(OperandSize::Size64, Cond::Ne, wr(hi), t.hi(), f.hi())?;
                self.cache(node, PortTag::Value, ValueRegs::two(lo, hi));
            }
            (RegClass::Float, 1) if !ty.is_vector() => {
                let rd = self.float_vreg();
                self.asm
                    .fcsel(ty.width() as u8, Cond::Ne, wr(rd), t.only(), f.only())?;
                self.cache(node, PortTag::Value, ValueRegs::one(rd));
            }
            _ => return Err(BackendError::Unsupported(format!("csel of {ty}"))),
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
        let size = OperandSize::Size64;
        let full = self.int_vreg();
        match op {
            ShiftOp::Lsl => self.asm.lsl(size, wr(full), v, amt)?,
            ShiftOp::Lsr => self.asm.lsr(size, wr(full), v, amt)?,
            ShiftOp::Asr => {
                let sv = self.sext_to_64(bits, v)?;
                self.asm.asr(size, wr(full), sv, amt)?;
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

    fn lower_bit_extract(&mut self, node: Node, value: PortRef, from: u32, length: u32) -> LowerResult<()> {
        let v = self.port_regs(value)?;
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
        let rd = self.int_vreg();
        if from == 0 && length == 64 {
            self.asm.mov(OperandSize::Size64, wr(rd), src)?;
        } else {
            self.asm
                .ubfx(OperandSize::Size64, wr(rd), src, from as u8, length as u8)?;
        }
        self.cache(node, PortTag::Value, ValueRegs::one(rd));
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
        let b = self.from_any(b, bits_ty)?;

        if v.len() == 1 && ty.width() <= 64 {
            let rd = self.int_vreg();
            self.asm.mov(OperandSize::Size64, wr(rd), v.only())?;
            self.asm
                .bfi(OperandSize::Size64, wr(rd), b, to as u8, length as u8)?;
            self.cache(node, PortTag::Value, ValueRegs::one(rd));
            return Ok(());
        }

        if v.len() == 2 {
            let (lo, hi) = (v.lo(), v.hi());
            let (new_lo, new_hi);
            if to + length <= 64 {
                let rd = self.int_vreg();
                if to == 0 && length == 64 {
                    self.asm.mov(OperandSize::Size64, wr(rd), b)?;
                } else {
                    self.asm.mov(OperandSize::Size64, wr(rd), lo)?;
                    self.asm
                        .bfi(OperandSize::Size64, wr(rd), b, to as u8, length as u8)?;
                }
                new_lo = rd;
                new_hi = hi;
            } else if to >= 64 {
                let rd = self.int_vreg();
                if to == 64 && length == 64 {
                    self.asm.mov(OperandSize::Size64, wr(rd), b)?;
                } else {
                    self.asm.mov(OperandSize::Size64, wr(rd), hi)?;
                    self.asm.bfi(
                        OperandSize::Size64,
                        wr(rd),
                        b,
                        (to - 64) as u8,
                        length as u8,
                    )?;
                }
                new_lo = lo;
                new_hi = rd;
            } else {
                return Err(BackendError::Unsupported(format!(
                    "bit insert [{to}, {to}+{length}) spans register halves"
                )));
            }
            self.cache(node, PortTag::Value, ValueRegs::two(new_lo, new_hi));
            return Ok(());
        }

        Err(BackendError::Unsupported(format!("bit insert into {ty}")))
    }

    fn lower_vector_extract(&mut self, node: Node, ty: ValueType, value: PortRef, index: u32) -> LowerResult<()> {
        let v = self.port_regs(value)?.only();
        let lane = self.port_ty(value).element_width() as u8;
        if ty.is_float() {
            let rd = self.float_vreg();
            self.asm.dup_elem(lane, index as u8, wr(rd), v)?;
            self.cache(node, PortTag::Value, ValueRegs::one(rd));
        } else {
            let rd = self.int_vreg();
            self.asm.ext_lane(lane, index as u8, wr(rd), v)?;
            self.cache(node, PortTag::Value, ValueRegs::one(rd));
        }
        Ok(())
    }

    fn lower_vector_insert(
        &mut self,
        node: Node,
        ty: ValueType,
        value: PortRef,
        elem: PortRef,
        index: u32,
    ) -> LowerResult<()> {
        let v = self.port_regs(value)?.only();
        let e = self.port_regs(elem)?;
        let lane = ty.element_width() as u8;
        let rd = self.float_vreg();
        self.asm.vec_mov(wr(rd), v)?;
        if ty.is_float() {
            self.asm.ins_elem(lane, index as u8, wr(rd), e.only())?;
        } else {
            let ei = self.to_int(e.only(), ty.element_type())?;
            self.asm.ins_lane(lane, index as u8, wr(rd), ei)?;
        }
        self.cache(node, PortTag::Value, ValueRegs::one(rd));
        Ok(())
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
        if bits > 64 {
            return Err(BackendError::Unsupported(format!("atomic on {ty}")));
        }
        let haddr = self.guest_addr(addr)?;
        let s = self.port_reg(src)?;
        let old = self.int_vreg();
        let newv = self.int_vreg();
        let status = self.int_vreg();
        let size = OperandSize::Size64;

        let retry = self.asm.new_label();
        self.asm.bind(retry);
        self.asm.ldaxr(store_bits(bits), wr(old), haddr)?;
        let kind = match op {
            AtomicOp::Add | AtomicOp::Xadd => {
                self.asm.add(size, wr(newv), old, s)?;
                FlagKind::Add
            }
            AtomicOp::Sub => {
                self.asm.sub(size, wr(newv), old, s)?;
                FlagKind::Sub
            }
            AtomicOp::And => {
                self.asm.and_(size, wr(newv), old, s)?;
                FlagKind::Logic
            }
            AtomicOp::Or => {
                self.asm.orr(size, wr(newv), old, s)?;
                FlagKind::Logic
            }
            AtomicOp::Xor => {
                self.asm.eor(size, wr(newv), old, s)?;
                FlagKind::Logic
            }
            AtomicOp::Xchg => {
                self.asm.mov(size, wr(newv), s)?;
                FlagKind::Logic
            }
        };
        let store_val = self.mask_to(bits, newv)?;
        self.asm.stlxr(store_bits(bits), wr(status), store_val, haddr)?;
        self.asm.cbnz(OperandSize::Size32, status, retry);

        self.cache(node, PortTag::Value, ValueRegs::one(old));
        self.flags.insert(
            node,
            FlagInfo {
                kind,
                bits,
                lhs: old,
                rhs: s,
                full: newv,
                zero_src: store_val,
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
        if bits > 64 {
            return Err(BackendError::Unsupported(format!("cmpxchg on {ty}")));
        }
        let haddr = self.guest_addr(addr)?;
        let exp = self.port_reg(expected)?;
        let des = self.port_reg(desired)?;
        let old = self.int_vreg();
        let status = self.int_vreg();

        let retry = self.asm.new_label();
        let done = self.asm.new_label();
        self.asm.bind(retry);
        self.asm.ldaxr(store_bits(bits), wr(old), haddr)?;
        self.asm.cmp(OperandSize::Size64, old, exp)?;
        self.asm.b_cond(Cond::Ne, done);
        self.asm.stlxr(store_bits(bits), wr(status), des, haddr)?;
        self.asm.cbnz(OperandSize::Size32, status, retry);
        self.asm.bind(done);

        // Flags mirror `cmp expected, old`.
        let diff = self.int_vreg();
        self.asm.sub(OperandSize::Size64, wr(diff), exp, old)?;
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
        // Materialize the value first so the flag inputs exist.
        self.materialize(node)?;
        let info = *self.flags.get(&node).ok_or_else(|| {
            BackendError::Unsupported(format!("flag port requested on {node} without flag info"))
        })?;

        let rd = match tag {
            PortTag::Zero => {
                let rd = self.int_vreg();
                self.asm.cmp_imm(OperandSize::Size64, info.zero_src, 0)?;
                self.asm.cset(wr(rd), Cond::Eq)?;
                rd
            }
            PortTag::Negative => {
                let rd = self.int_vreg();
                self.asm.ubfx(
                    OperandSize::Size64,
                    wr(rd),
                    info.full,
                    (info.bits - 1) as u8,
                    1,
                )?;
                rd
            }
            PortTag::Carry => self.flag_carry(&info)?,
            PortTag::Overflow => self.flag_overflow(&info)?,
            PortTag::Value => unreachable!(),
        };
        self.cache(node, tag, ValueRegs::one(rd));
        Ok(())
    }

    fn flag_carry(&mut self, info: &FlagInfo) -> LowerResult<Reg> {
        let rd = self.int_vreg();
        match info.kind {
            FlagKind::Logic => {
                self.imm_into(wr(rd), 0)?;
            }
            FlagKind::Add => {
                if info.bits < 64 {
                    // The unmasked sum keeps the carry at bit `bits`.
                    self.asm.ubfx(
                        OperandSize::Size64,
                        wr(rd),
                        info.full,
                        info.bits as u8,
                        1,
                    )?;
                } else {
                    // carry = full < lhs, plus the carry-in wrap case.
                    self.asm.cmp(OperandSize::Size64, info.full, info.lhs)?;
                    self.asm.cset(wr(rd), Cond::Lo)?;
                    if let Some(cin) = info.carry_in {
                        let eq = self.int_vreg();
                        self.asm.cmp(OperandSize::Size64, info.full, info.lhs)?;
                        self.asm.cset(wr(eq), Cond::Eq)?;
                        let both = self.int_vreg();
                        self.asm.and_(OperandSize::Size64, wr(both), eq, cin)?;
                        let merged = self.int_vreg();
                        self.asm.orr(OperandSize::Size64, wr(merged), rd, both)?;
                        return Ok(merged);
                    }
                }
            }
            FlagKind::Sub => {
                // Borrow: lhs < rhs, or the borrow-in tipped it over.
                self.asm.cmp(OperandSize::Size64, info.lhs, info.rhs)?;
                self.asm.cset(wr(rd), Cond::Lo)?;
                if let Some(cin) = info.carry_in {
                    // t = lhs - rhs; borrow also when t < cin.
                    let t = self.int_vreg();
                    self.asm.sub(OperandSize::Size64, wr(t), info.lhs, info.rhs)?;
                    let extra = self.int_vreg();
                    self.asm.cmp(OperandSize::Size64, t, cin)?;
                    self.asm.cset(wr(extra), Cond::Lo)?;
                    let merged = self.int_vreg();
                    self.asm.orr(OperandSize::Size64, wr(merged), rd, extra)?;
                    return Ok(merged);
                }
            }
        }
        Ok(rd)
    }

    fn flag_overflow(&mut self, info: &FlagInfo) -> LowerResult<Reg> {
        let rd = self.int_vreg();
        match info.kind {
            FlagKind::Logic => {
                self.imm_into(wr(rd), 0)?;
            }
            FlagKind::Add => {
                // (lhs ^ res) & (rhs ^ res), sign bit.
                let t1 = self.int_vreg();
                let t2 = self.int_vreg();
                self.asm.eor(OperandSize::Size64, wr(t1), info.lhs, info.full)?;
                self.asm.eor(OperandSize::Size64, wr(t2), info.rhs, info.full)?;
                let t3 = self.int_vreg();
                self.asm.and_(OperandSize::Size64, wr(t3), t1, t2)?;
                self.asm.ubfx(OperandSize::Size64, wr(rd), t3, (info.bits - 1) as u8, 1)?;
            }
            FlagKind::Sub => {
                // (lhs ^ rhs) & (lhs ^ res), sign bit.
                let t1 = self.int_vreg();
                let t2 = self.int_vreg();
                self.asm.eor(OperandSize::Size64, wr(t1), info.lhs, info.rhs)?;
                self.asm.eor(OperandSize::Size64, wr(t2), info.lhs, info.full)?;
                let t3 = self.int_vreg();
                self.asm.and_(OperandSize::Size64, wr(t3), t1, t2)?;
                self.asm.ubfx(OperandSize::Size64, wr(rd), t3, (info.bits - 1) as u8, 1)?;
            }
        }
        Ok(rd)
    }
}

fn store_bits(width: u32) -> u8 {
    match width {
        1 | 8 => 8,
        16 => 16,
        32 => 32,
        _ => 64,
    }
}
