//! Chunk construction.
//!
//! [`ChunkBuilder`] is the only way to create IR. It owns the chunk under
//! construction, enforces the packet lifecycle, and checks operand types at
//! node creation so that downstream passes and backends can rely on a
//! well-formed graph.

use crate::chunk::{Chunk, Packet, PacketKind};
use crate::node::{
    AtomicOp, BinaryOp, BranchHint, CastOp, Local, Node, NodeData, PortRef, Rounding, ShiftOp,
    TernaryOp, UnaryOp,
};
use crate::types::{TypeClass, ValueType};
use crate::{InternalFunction, InternalFunctionResolver};
use smallvec::SmallVec;
use std::fmt;

/// An IR construction contract violation.
#[derive(Debug, PartialEq, Eq)]
pub enum BuilderError {
    /// An action node was inserted outside `begin_packet`/`end_packet`.
    NoCurrentPacket,
    /// Operand types are incompatible with the constructed operation.
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
    },
    /// A width or vector shape that the value-type lattice cannot represent.
    UnsupportedWidth(u32),
}

impl fmt::Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BuilderError::NoCurrentPacket => {
                write!(f, "action node inserted outside an open packet")
            }
            BuilderError::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            BuilderError::UnsupportedWidth(bits) => {
                write!(f, "unsupported width: {bits} bits")
            }
        }
    }
}

impl std::error::Error for BuilderError {}

/// A convenient alias for builder results.
pub type BuildResult<T> = Result<T, BuilderError>;

/// Arena-owning factory that constructs nodes for one chunk.
pub struct ChunkBuilder<'a> {
    chunk: Chunk,
    ifr: &'a InternalFunctionResolver,
    current: Option<Packet>,
}

impl<'a> ChunkBuilder<'a> {
    /// Begin a new chunk anchored at `address`.
    pub fn new(address: u64, ifr: &'a InternalFunctionResolver) -> Self {
        Self {
            chunk: Chunk::new(address),
            ifr,
            current: None,
        }
    }

    /// The resolver used for internal calls.
    pub fn ifr(&self) -> &InternalFunctionResolver {
        self.ifr
    }

    /// Read-only view of the chunk under construction.
    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    /// Finish the chunk. Panics if a packet is still open.
    pub fn finish(self) -> Chunk {
        assert!(self.current.is_none(), "finish() with an open packet");
        self.chunk
    }

    /// Open the packet for one guest instruction.
    pub fn begin_packet(&mut self, address: u64, disasm: &str) {
        debug_assert!(self.current.is_none(), "begin_packet without end_packet");
        self.current = Some(Packet::new(address, disasm.to_string()));
    }

    /// Close the current packet and append it to the chunk, reporting
    /// whether it ended the block.
    pub fn end_packet(&mut self) -> PacketKind {
        let packet = self.current.take().expect("end_packet without begin_packet");
        let mut kind = PacketKind::Normal;
        for &a in packet.actions() {
            if let NodeData::WritePc { hint, .. } = self.chunk.node(a) {
                if *hint != BranchHint::Fallthrough {
                    kind = PacketKind::EndOfBlock;
                }
            }
        }
        self.chunk.add_packet(packet);
        kind
    }

    fn ty(&self, p: PortRef) -> ValueType {
        self.chunk.port_ty(p)
    }

    fn insert(&mut self, data: NodeData) -> BuildResult<Node> {
        let is_action = data.is_action();
        let n = self.chunk.add_node(data);
        if is_action {
            match &mut self.current {
                Some(p) => p.push_action(n),
                None => return Err(BuilderError::NoCurrentPacket),
            }
        }
        Ok(n)
    }

    fn expect_ty(&self, p: PortRef, expected: ValueType) -> BuildResult<()> {
        let found = self.ty(p);
        if found == expected {
            Ok(())
        } else {
            Err(BuilderError::TypeMismatch { expected, found })
        }
    }

    fn expect_bool(&self, p: PortRef) -> BuildResult<()> {
        let found = self.ty(p);
        if found.is_int() && found.width() == 1 {
            Ok(())
        } else {
            Err(BuilderError::TypeMismatch {
                expected: ValueType::u1(),
                found,
            })
        }
    }

    fn expect_addr(&self, p: PortRef) -> BuildResult<()> {
        let found = self.ty(p);
        if found.is_int() && found.width() == 64 {
            Ok(())
        } else {
            Err(BuilderError::TypeMismatch {
                expected: ValueType::u64(),
                found,
            })
        }
    }

    /* Constants */

    /// An integer constant of type `ty`. Works for constants up to 64 bits
    /// of significant value; wider types are zero-filled above bit 63.
    pub fn constant_i(&mut self, ty: ValueType, bits: u64) -> BuildResult<Node> {
        if !ty.is_int() {
            return Err(BuilderError::TypeMismatch {
                expected: ValueType::u64(),
                found: ty,
            });
        }
        let masked = if ty.width() >= 64 {
            bits
        } else {
            bits & (u64::MAX >> (64 - ty.width()))
        };
        self.insert(NodeData::Constant { ty, bits: masked })
    }

    pub fn constant_u1(&mut self, v: bool) -> BuildResult<Node> {
        self.constant_i(ValueType::u1(), v as u64)
    }
    pub fn constant_u8(&mut self, v: u8) -> BuildResult<Node> {
        self.constant_i(ValueType::u8(), v as u64)
    }
    pub fn constant_u16(&mut self, v: u16) -> BuildResult<Node> {
        self.constant_i(ValueType::u16(), v as u64)
    }
    pub fn constant_u32(&mut self, v: u32) -> BuildResult<Node> {
        self.constant_i(ValueType::u32(), v as u64)
    }
    pub fn constant_u64(&mut self, v: u64) -> BuildResult<Node> {
        self.constant_i(ValueType::u64(), v)
    }
    pub fn constant_u128(&mut self, v: u64) -> BuildResult<Node> {
        self.constant_i(ValueType::u128(), v)
    }
    pub fn constant_s8(&mut self, v: i8) -> BuildResult<Node> {
        self.constant_i(ValueType::s8(), v as u64)
    }
    pub fn constant_s16(&mut self, v: i16) -> BuildResult<Node> {
        self.constant_i(ValueType::s16(), v as u64)
    }
    pub fn constant_s32(&mut self, v: i32) -> BuildResult<Node> {
        self.constant_i(ValueType::s32(), v as u64)
    }
    pub fn constant_s64(&mut self, v: i64) -> BuildResult<Node> {
        self.constant_i(ValueType::s64(), v as u64)
    }
    pub fn constant_f32(&mut self, v: f32) -> BuildResult<Node> {
        self.insert(NodeData::Constant {
            ty: ValueType::f32(),
            bits: v.to_bits() as u64,
        })
    }
    pub fn constant_f64(&mut self, v: f64) -> BuildResult<Node> {
        self.insert(NodeData::Constant {
            ty: ValueType::f64(),
            bits: v.to_bits(),
        })
    }

    /* Registers, memory, PC */

    /// Read of the guest register slot at `offset` in the CPU state.
    pub fn read_reg(
        &mut self,
        ty: ValueType,
        offset: u32,
        index: u16,
        name: &'static str,
    ) -> BuildResult<Node> {
        self.insert(NodeData::ReadReg {
            ty,
            offset,
            index,
            name,
        })
    }

    /// Write of the guest register slot at `offset`.
    pub fn write_reg(
        &mut self,
        offset: u32,
        index: u16,
        name: &'static str,
        value: PortRef,
    ) -> BuildResult<Node> {
        self.insert(NodeData::WriteReg {
            offset,
            index,
            name,
            value,
        })
    }

    /// Typed read of guest memory at `addr`.
    pub fn read_mem(&mut self, ty: ValueType, addr: PortRef) -> BuildResult<Node> {
        self.expect_addr(addr)?;
        self.insert(NodeData::ReadMem { ty, addr })
    }

    /// Write of guest memory at `addr`.
    pub fn write_mem(&mut self, addr: PortRef, value: PortRef) -> BuildResult<Node> {
        self.expect_addr(addr)?;
        self.insert(NodeData::WriteMem { addr, value })
    }

    /// Read of the guest program counter.
    pub fn read_pc(&mut self) -> BuildResult<Node> {
        self.insert(NodeData::ReadPc)
    }

    /// Write of the guest program counter.
    pub fn write_pc(&mut self, value: PortRef, hint: BranchHint) -> BuildResult<Node> {
        self.expect_addr(value)?;
        if hint == BranchHint::Csel {
            // The backend relies on recovering (cond, target, fallthrough)
            // from the producing csel.
            if !matches!(self.chunk.node(value.node), NodeData::Csel { .. }) {
                return Err(BuilderError::TypeMismatch {
                    expected: ValueType::u64(),
                    found: self.ty(value),
                });
            }
        }
        self.insert(NodeData::WritePc { value, hint })
    }

    /* Arithmetic */

    fn binary(&mut self, op: BinaryOp, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        let lt = self.ty(lhs);
        self.expect_ty(rhs, lt)?;
        let ty = if op.is_comparison() {
            ValueType::u1()
        } else {
            lt
        };
        self.insert(NodeData::BinaryArith { op, ty, lhs, rhs })
    }

    pub fn add(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::Add, lhs, rhs)
    }
    pub fn sub(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }
    pub fn mul(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }
    pub fn div(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::Div, lhs, rhs)
    }
    pub fn rem(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::Rem, lhs, rhs)
    }
    pub fn band(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::And, lhs, rhs)
    }
    pub fn bor(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::Or, lhs, rhs)
    }
    pub fn bxor(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::Xor, lhs, rhs)
    }
    pub fn cmpeq(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::CmpEq, lhs, rhs)
    }
    pub fn cmpne(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::CmpNe, lhs, rhs)
    }
    pub fn cmpgt(&mut self, lhs: PortRef, rhs: PortRef) -> BuildResult<Node> {
        self.binary(BinaryOp::CmpGt, lhs, rhs)
    }

    /// Bitwise complement.
    pub fn bnot(&mut self, value: PortRef) -> BuildResult<Node> {
        let ty = self.ty(value);
        self.insert(NodeData::UnaryArith {
            op: UnaryOp::Not,
            ty,
            value,
        })
    }

    /// Two's complement negation.
    pub fn neg(&mut self, value: PortRef) -> BuildResult<Node> {
        let ty = self.ty(value);
        self.insert(NodeData::UnaryArith {
            op: UnaryOp::Neg,
            ty,
            value,
        })
    }

    fn ternary(
        &mut self,
        op: TernaryOp,
        lhs: PortRef,
        rhs: PortRef,
        carry: PortRef,
    ) -> BuildResult<Node> {
        let ty = self.ty(lhs);
        self.expect_ty(rhs, ty)?;
        self.expect_bool(carry)?;
        self.insert(NodeData::TernaryArith {
            op,
            ty,
            lhs,
            rhs,
            carry,
        })
    }

    /// Add with carry-in.
    pub fn adc(&mut self, lhs: PortRef, rhs: PortRef, carry: PortRef) -> BuildResult<Node> {
        self.ternary(TernaryOp::Adc, lhs, rhs, carry)
    }

    /// Subtract with borrow-in.
    pub fn sbb(&mut self, lhs: PortRef, rhs: PortRef, carry: PortRef) -> BuildResult<Node> {
        self.ternary(TernaryOp::Sbb, lhs, rhs, carry)
    }

    /* Casts */

    /// Zero extension. Short-circuits when the widths already match.
    pub fn zx(&mut self, target: ValueType, value: PortRef) -> BuildResult<Node> {
        let vt = self.ty(value);
        if target.width() == vt.width() {
            return Ok(value.node);
        }
        if target.width() < vt.width() || !target.is_int() || !vt.is_int() {
            return Err(BuilderError::TypeMismatch {
                expected: target,
                found: vt,
            });
        }
        self.insert(NodeData::Cast {
            op: CastOp::Zx,
            ty: target,
            value,
        })
    }

    /// Sign extension. Short-circuits when the widths already match.
    pub fn sx(&mut self, target: ValueType, value: PortRef) -> BuildResult<Node> {
        let vt = self.ty(value);
        if target.width() == vt.width() {
            return Ok(value.node);
        }
        if target.width() < vt.width() || !target.is_int() || !vt.is_int() {
            return Err(BuilderError::TypeMismatch {
                expected: target,
                found: vt,
            });
        }
        self.insert(NodeData::Cast {
            op: CastOp::Sx,
            ty: target,
            value,
        })
    }

    /// Truncation to a strictly narrower type.
    pub fn trunc(&mut self, target: ValueType, value: PortRef) -> BuildResult<Node> {
        let vt = self.ty(value);
        if target.width() >= vt.width() {
            return Err(BuilderError::TypeMismatch {
                expected: target,
                found: vt,
            });
        }
        self.insert(NodeData::Cast {
            op: CastOp::Trunc,
            ty: target,
            value,
        })
    }

    /// Same-width reinterpretation. Short-circuits when the types already
    /// match exactly.
    pub fn bitcast(&mut self, target: ValueType, value: PortRef) -> BuildResult<Node> {
        let vt = self.ty(value);
        if target == vt {
            return Ok(value.node);
        }
        if target.width() != vt.width() {
            return Err(BuilderError::TypeMismatch {
                expected: target,
                found: vt,
            });
        }
        self.insert(NodeData::Cast {
            op: CastOp::Bitcast,
            ty: target,
            value,
        })
    }

    /// Class-changing numeric conversion with the given rounding.
    pub fn convert(
        &mut self,
        target: ValueType,
        value: PortRef,
        rounding: Rounding,
    ) -> BuildResult<Node> {
        let vt = self.ty(value);
        if target.class() == vt.class() && target.is_int() {
            return Err(BuilderError::TypeMismatch {
                expected: target,
                found: vt,
            });
        }
        self.insert(NodeData::Cast {
            op: CastOp::Convert(rounding),
            ty: target,
            value,
        })
    }

    /* Selection, shifts, bit fields */

    /// Conditional select: `cond ? tval : fval`.
    pub fn csel(&mut self, cond: PortRef, tval: PortRef, fval: PortRef) -> BuildResult<Node> {
        self.expect_bool(cond)?;
        let ty = self.ty(tval);
        self.expect_ty(fval, ty)?;
        self.insert(NodeData::Csel {
            ty,
            cond,
            tval,
            fval,
        })
    }

    fn shift(&mut self, op: ShiftOp, value: PortRef, amount: PortRef) -> BuildResult<Node> {
        let ty = self.ty(value);
        let at = self.ty(amount);
        if !at.is_int() || at.is_vector() {
            return Err(BuilderError::TypeMismatch {
                expected: ValueType::u64(),
                found: at,
            });
        }
        self.insert(NodeData::BitShift {
            op,
            ty,
            value,
            amount,
        })
    }

    pub fn lsl(&mut self, value: PortRef, amount: PortRef) -> BuildResult<Node> {
        self.shift(ShiftOp::Lsl, value, amount)
    }
    pub fn lsr(&mut self, value: PortRef, amount: PortRef) -> BuildResult<Node> {
        self.shift(ShiftOp::Lsr, value, amount)
    }
    pub fn asr(&mut self, value: PortRef, amount: PortRef) -> BuildResult<Node> {
        self.shift(ShiftOp::Asr, value, amount)
    }

    /// Extract bits `[from .. from+length)` of `value` as an unsigned
    /// integer. Field widths that fall between the recognized type widths
    /// (such as the 3-bit x87 TOP field) round up to the next one, zero
    /// filled.
    pub fn bit_extract(&mut self, value: PortRef, from: u32, length: u32) -> BuildResult<Node> {
        let vt = self.ty(value);
        let bits = [1u16, 8, 16, 32, 64, 128]
            .into_iter()
            .find(|&w| w as u32 >= length)
            .ok_or(BuilderError::UnsupportedWidth(length))?;
        let ty = ValueType::scalar(TypeClass::UnsignedInteger, bits)
            .ok_or(BuilderError::UnsupportedWidth(length))?;
        if length == 0 || from + length > vt.width() {
            return Err(BuilderError::TypeMismatch {
                expected: ty,
                found: vt,
            });
        }
        self.insert(NodeData::BitExtract {
            ty,
            value,
            from,
            length,
        })
    }

    /// Insert the low `length` bits of `bits` into `value` at bit `to`.
    pub fn bit_insert(
        &mut self,
        value: PortRef,
        bits: PortRef,
        to: u32,
        length: u32,
    ) -> BuildResult<Node> {
        let vt = self.ty(value);
        let bt = self.ty(bits);
        if to + length > vt.width() || bt.width() < length {
            return Err(BuilderError::TypeMismatch {
                expected: vt,
                found: bt,
            });
        }
        self.insert(NodeData::BitInsert {
            ty: vt,
            value,
            bits,
            to,
            length,
        })
    }

    /* Vectors */

    /// Extract lane `index` of a vector.
    pub fn vector_extract(&mut self, value: PortRef, index: u32) -> BuildResult<Node> {
        let vt = self.ty(value);
        if !vt.is_vector() || index >= vt.lanes() as u32 {
            return Err(BuilderError::TypeMismatch {
                expected: vt,
                found: vt,
            });
        }
        self.insert(NodeData::VectorExtract {
            ty: vt.element_type(),
            value,
            index,
        })
    }

    /// Replace lane `index` of a vector with `elem`.
    pub fn vector_insert(&mut self, value: PortRef, index: u32, elem: PortRef) -> BuildResult<Node> {
        let vt = self.ty(value);
        if !vt.is_vector() || index >= vt.lanes() as u32 {
            return Err(BuilderError::TypeMismatch {
                expected: vt,
                found: vt,
            });
        }
        self.expect_ty(elem, vt.element_type())?;
        self.insert(NodeData::VectorInsert {
            ty: vt,
            value,
            elem,
            index,
        })
    }

    /* Control */

    /// A fresh label for intra-chunk control flow.
    pub fn label(&mut self, name: Option<&str>) -> BuildResult<Node> {
        self.insert(NodeData::Label {
            name: name.map(str::to_string),
        })
    }

    /// Unconditional branch to `target`, which must be a label node.
    pub fn br(&mut self, target: Node) -> BuildResult<Node> {
        debug_assert!(matches!(self.chunk.node(target), NodeData::Label { .. }));
        self.insert(NodeData::Br { target })
    }

    /// Branch to `target` when `cond` is non-zero.
    pub fn cond_br(&mut self, cond: PortRef, target: Node) -> BuildResult<Node> {
        self.expect_bool(cond)?;
        debug_assert!(matches!(self.chunk.node(target), NodeData::Label { .. }));
        self.insert(NodeData::CondBr { cond, target })
    }

    /* Locals */

    /// Allocate a chunk-local variable slot.
    pub fn alloc_local(&mut self, ty: ValueType) -> Local {
        self.chunk.add_local(ty)
    }

    /// Read a local variable.
    pub fn read_local(&mut self, local: Local) -> BuildResult<Node> {
        let ty = self.chunk.local_ty(local);
        self.insert(NodeData::ReadLocal { ty, local })
    }

    /// Write a local variable.
    pub fn write_local(&mut self, local: Local, value: PortRef) -> BuildResult<Node> {
        let ty = self.chunk.local_ty(local);
        self.expect_ty(value, ty)?;
        self.insert(NodeData::WriteLocal { local, value })
    }

    /* Internal calls */

    /// Call a helper routine resolved through the internal function
    /// resolver.
    pub fn internal_call(&mut self, func: InternalFunction, args: &[PortRef]) -> BuildResult<Node> {
        self.insert(NodeData::InternalCall {
            func,
            args: SmallVec::from_slice(args),
        })
    }

    /* Atomics */

    /// Atomic binary read-modify-write on `[addr]`.
    pub fn atomic_binop(&mut self, op: AtomicOp, addr: PortRef, src: PortRef) -> BuildResult<Node> {
        self.expect_addr(addr)?;
        let ty = self.ty(src);
        self.insert(NodeData::BinaryAtomic { op, ty, addr, src })
    }

    /// Atomic exchange-and-add.
    pub fn atomic_xadd(&mut self, addr: PortRef, src: PortRef) -> BuildResult<Node> {
        self.atomic_binop(AtomicOp::Xadd, addr, src)
    }

    /// Atomic exchange.
    pub fn atomic_xchg(&mut self, addr: PortRef, src: PortRef) -> BuildResult<Node> {
        self.atomic_binop(AtomicOp::Xchg, addr, src)
    }

    /// Atomic compare-and-exchange: if `[addr] == expected`, store
    /// `desired`. The value port is the old memory value and the zero port
    /// is the success flag.
    pub fn atomic_cmpxchg(
        &mut self,
        addr: PortRef,
        expected: PortRef,
        desired: PortRef,
    ) -> BuildResult<Node> {
        self.expect_addr(addr)?;
        let ty = self.ty(expected);
        self.expect_ty(desired, ty)?;
        self.insert(NodeData::TernaryAtomic {
            ty,
            addr,
            expected,
            desired,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PortTag;

    fn ifr() -> InternalFunctionResolver {
        InternalFunctionResolver::new()
    }

    #[test]
    fn action_outside_packet_fails() {
        let ifr = ifr();
        let mut b = ChunkBuilder::new(0x1000, &ifr);
        b.begin_packet(0x1000, "mov rax, 1");
        let c = b.constant_u64(1).unwrap();
        b.end_packet();
        let err = b.write_reg(8, 1, "rax", c.val()).unwrap_err();
        assert_eq!(err, BuilderError::NoCurrentPacket);
    }

    #[test]
    fn end_packet_reports_end_of_block() {
        let ifr = ifr();
        let mut b = ChunkBuilder::new(0x1000, &ifr);
        b.begin_packet(0x1000, "jmp 0x2000");
        let t = b.constant_u64(0x2000).unwrap();
        b.write_pc(t.val(), BranchHint::Direct).unwrap();
        assert_eq!(b.end_packet(), PacketKind::EndOfBlock);

        b.begin_packet(0x1005, "mov rax, rbx");
        let v = b.read_reg(ValueType::u64(), 32, 4, "rbx").unwrap();
        b.write_reg(8, 1, "rax", v.val()).unwrap();
        assert_eq!(b.end_packet(), PacketKind::Normal);
    }

    #[test]
    fn binary_type_mismatch() {
        let ifr = ifr();
        let mut b = ChunkBuilder::new(0, &ifr);
        b.begin_packet(0, "");
        let a = b.constant_u64(1).unwrap();
        let c = b.constant_u32(2).unwrap();
        let err = b.add(a.val(), c.val()).unwrap_err();
        assert!(matches!(err, BuilderError::TypeMismatch { .. }));
        b.end_packet();
    }

    #[test]
    fn zx_short_circuits_on_equal_width() {
        let ifr = ifr();
        let mut b = ChunkBuilder::new(0, &ifr);
        b.begin_packet(0, "");
        let a = b.constant_u64(1).unwrap();
        assert_eq!(b.zx(ValueType::u64(), a.val()).unwrap(), a);
        let widened = b.zx(ValueType::u128(), a.val()).unwrap();
        assert_ne!(widened, a);
        b.end_packet();
    }

    #[test]
    fn trunc_must_narrow() {
        let ifr = ifr();
        let mut b = ChunkBuilder::new(0, &ifr);
        b.begin_packet(0, "");
        let a = b.constant_u32(7).unwrap();
        assert!(b.trunc(ValueType::u64(), a.val()).is_err());
        assert!(b.trunc(ValueType::u8(), a.val()).is_ok());
        b.end_packet();
    }

    #[test]
    fn bit_extract_range_checked() {
        let ifr = ifr();
        let mut b = ChunkBuilder::new(0, &ifr);
        b.begin_packet(0, "");
        let a = b.constant_u16(7).unwrap();
        // A 3-bit field rounds up to u8.
        let top = b.bit_extract(a.val(), 11, 3).unwrap();
        assert_eq!(b.chunk().port_ty(top.val()), ValueType::u8());
        assert!(b.bit_extract(a.val(), 14, 3).is_err());
        assert!(b.bit_extract(a.val(), 0, 17).is_err());
        b.end_packet();
    }

    #[test]
    fn flag_ports_are_u1() {
        let ifr = ifr();
        let mut b = ChunkBuilder::new(0, &ifr);
        b.begin_packet(0, "");
        let x = b.constant_u64(1).unwrap();
        let y = b.constant_u64(2).unwrap();
        let s = b.add(x.val(), y.val()).unwrap();
        b.end_packet();
        let chunk = b.finish();
        assert_eq!(chunk.port_ty(s.val()), ValueType::u64());
        for tag in [PortTag::Zero, PortTag::Negative, PortTag::Overflow, PortTag::Carry] {
            assert_eq!(chunk.port_ty(PortRef { node: s, tag }), ValueType::u1());
        }
    }

    #[test]
    fn csel_hint_requires_csel_producer() {
        let ifr = ifr();
        let mut b = ChunkBuilder::new(0, &ifr);
        b.begin_packet(0, "");
        let t = b.constant_u64(0x10).unwrap();
        assert!(b.write_pc(t.val(), BranchHint::Csel).is_err());
        let cond = b.constant_u1(true).unwrap();
        let f = b.constant_u64(0x20).unwrap();
        let sel = b.csel(cond.val(), t.val(), f.val()).unwrap();
        assert!(b.write_pc(sel.val(), BranchHint::Csel).is_ok());
        b.end_packet();
    }

    #[test]
    fn def_use_graph_is_acyclic() {
        // Operand ids always precede their users; verify over a small chunk.
        let ifr = ifr();
        let mut b = ChunkBuilder::new(0, &ifr);
        b.begin_packet(0, "");
        let x = b.constant_u64(1).unwrap();
        let y = b.constant_u64(2).unwrap();
        let s = b.add(x.val(), y.val()).unwrap();
        let n = b.bnot(s.val()).unwrap();
        b.write_reg(8, 1, "rax", n.val()).unwrap();
        b.end_packet();
        let chunk = b.finish();
        for (node, data) in chunk.nodes() {
            data.visit_operands(&mut |p| assert!(p.node < node));
        }
    }
}
