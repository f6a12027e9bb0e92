//! IR nodes and ports.
//!
//! A node is one element of the dataflow graph of a packet: either an
//! *action* with an observable side effect (register/memory/PC writes,
//! branches, helper calls), a pure *value* producer, or an atomic
//! read-modify-write. Nodes live in the chunk's arena and reference their
//! operands through [`PortRef`]s, which name an output port of an earlier
//! node. All edges point from consumer to producer, so the graph is acyclic
//! by construction.

use crate::entity::entity_ref;
use crate::types::ValueType;
use crate::InternalFunction;
use smallvec::SmallVec;

/// An opaque reference to a node in a [`Chunk`](crate::Chunk).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node(pub(crate) u32);
entity_ref!(Node, "n");

/// An opaque reference to a local variable slot of a chunk.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Local(pub(crate) u32);
entity_ref!(Local, "loc");

/// Which output port of a node a [`PortRef`] names.
///
/// Every value-producing node has a `Value` port. Arithmetic and atomic
/// nodes additionally expose companion flag ports which backends compute
/// only when referenced.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PortTag {
    Value,
    Zero,
    Negative,
    Overflow,
    Carry,
}

/// A reference to an output port: the producing node plus a port tag.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node: Node,
    pub tag: PortTag,
}

impl Node {
    /// The primary value port of this node.
    pub fn val(self) -> PortRef {
        PortRef {
            node: self,
            tag: PortTag::Value,
        }
    }

    /// The zero flag port (`value == 0`).
    pub fn zero(self) -> PortRef {
        PortRef {
            node: self,
            tag: PortTag::Zero,
        }
    }

    /// The negative flag port (`value < 0` as signed).
    pub fn negative(self) -> PortRef {
        PortRef {
            node: self,
            tag: PortTag::Negative,
        }
    }

    /// The overflow flag port, following the host's ADD/SUB rules.
    pub fn overflow(self) -> PortRef {
        PortRef {
            node: self,
            tag: PortTag::Overflow,
        }
    }

    /// The carry flag port, following the host's ADD/SUB rules.
    pub fn carry(self) -> PortRef {
        PortRef {
            node: self,
            tag: PortTag::Carry,
        }
    }
}

impl core::fmt::Display for PortRef {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.tag {
            PortTag::Value => write!(f, "{}", self.node),
            PortTag::Zero => write!(f, "{}.z", self.node),
            PortTag::Negative => write!(f, "{}.n", self.node),
            PortTag::Overflow => write!(f, "{}.v", self.node),
            PortTag::Carry => write!(f, "{}.c", self.node),
        }
    }
}

impl core::fmt::Debug for PortRef {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        (self as &dyn core::fmt::Display).fmt(f)
    }
}

/// A resolved port: its type and owning node. Ports are not stored; they
/// are reconstructed from the owning node on demand.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Port {
    pub owner: Node,
    pub tag: PortTag,
    pub ty: ValueType,
}

/// Unary arithmetic operations.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum UnaryOp {
    /// Bitwise complement.
    Not,
    /// Two's complement negation.
    Neg,
}

/// Binary arithmetic operations.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    /// Equality comparison, producing `u1`.
    CmpEq,
    /// Inequality comparison, producing `u1`.
    CmpNe,
    /// Greater-than comparison, producing `u1`.
    CmpGt,
}

impl BinaryOp {
    /// Comparisons produce a `u1` rather than the operand type.
    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::CmpEq | BinaryOp::CmpNe | BinaryOp::CmpGt)
    }
}

/// Ternary arithmetic operations taking a carry/borrow input.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TernaryOp {
    /// Add with carry-in.
    Adc,
    /// Subtract with borrow-in.
    Sbb,
}

/// Rounding behavior of a class-changing `convert` cast.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Rounding {
    /// Round to nearest.
    Round,
    /// Round toward zero.
    Trunc,
    /// The conversion is exact; no rounding applies.
    None,
}

/// Cast operations.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CastOp {
    /// Zero extension to a strictly wider type.
    Zx,
    /// Sign extension to a strictly wider type.
    Sx,
    /// Truncation to a strictly narrower type.
    Trunc,
    /// Reinterpretation at the same width.
    Bitcast,
    /// Class-changing numeric conversion (int <-> float).
    Convert(Rounding),
}

/// Bit shift operations. The shift amount is a separate port whose width is
/// independent of the shifted value's width.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ShiftOp {
    Lsl,
    Lsr,
    Asr,
}

/// Binary atomic read-modify-write operations.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AtomicOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    /// Exchange-and-add: memory gets `old + src`, the value port is `old`.
    Xadd,
    /// Exchange: memory gets `src`, the value port is `old`.
    Xchg,
}

/// A hint attached to a `write_pc` describing the shape of the transfer,
/// used by backends to pick a branch form.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BranchHint {
    /// The write merely advances the PC past the packet.
    Fallthrough,
    /// Unconditional transfer to a value known at lift time.
    Direct,
    /// The value is produced by a `csel` node; the backend may emit a
    /// conditional branch on the csel's condition instead of materializing
    /// the select.
    Csel,
    /// Computed transfer (returns, indirect jumps).
    Indirect,
}

/// The payload of a node.
///
/// Variants that produce a value carry their result type; flag ports are
/// always `u1`. Operand `PortRef`s must name earlier nodes.
#[derive(Clone, Debug)]
pub enum NodeData {
    /// An integer or float constant. The bits are stored zero-extended; the
    /// type gives the interpretation. Constants wider than 64 bits store
    /// their low 64 bits (the rest is zero).
    Constant { ty: ValueType, bits: u64 },
    /// Read of the guest program counter, resolved by the backend to the
    /// address of the current packet.
    ReadPc,
    /// Read of a guest register slot in the CPU state.
    ReadReg {
        ty: ValueType,
        offset: u32,
        index: u16,
        name: &'static str,
    },
    /// Read of guest memory.
    ReadMem { ty: ValueType, addr: PortRef },
    /// Read of a chunk-local variable.
    ReadLocal { ty: ValueType, local: Local },
    /// Unary arithmetic. Exposes `zero` and `negative` flag ports.
    UnaryArith {
        op: UnaryOp,
        ty: ValueType,
        value: PortRef,
    },
    /// Binary arithmetic. Exposes all four flag ports.
    BinaryArith {
        op: BinaryOp,
        ty: ValueType,
        lhs: PortRef,
        rhs: PortRef,
    },
    /// Add/subtract with carry input. Exposes all four flag ports.
    TernaryArith {
        op: TernaryOp,
        ty: ValueType,
        lhs: PortRef,
        rhs: PortRef,
        carry: PortRef,
    },
    /// Width- or class-changing cast.
    Cast {
        op: CastOp,
        ty: ValueType,
        value: PortRef,
    },
    /// Conditional select: `cond ? tval : fval`.
    Csel {
        ty: ValueType,
        cond: PortRef,
        tval: PortRef,
        fval: PortRef,
    },
    /// Bit shift. Exposes `zero` and `negative` flag ports.
    BitShift {
        op: ShiftOp,
        ty: ValueType,
        value: PortRef,
        amount: PortRef,
    },
    /// Extract bits `[from .. from+length)` of `value`, producing a
    /// `length`-bit unsigned integer.
    BitExtract {
        ty: ValueType,
        value: PortRef,
        from: u32,
        length: u32,
    },
    /// Insert the low `length` bits of `bits` into `value` at `to`.
    BitInsert {
        ty: ValueType,
        value: PortRef,
        bits: PortRef,
        to: u32,
        length: u32,
    },
    /// Extract lane `index` of a vector.
    VectorExtract {
        ty: ValueType,
        value: PortRef,
        index: u32,
    },
    /// Replace lane `index` of a vector with `elem`.
    VectorInsert {
        ty: ValueType,
        value: PortRef,
        elem: PortRef,
        index: u32,
    },

    /// Write a guest register slot.
    WriteReg {
        offset: u32,
        index: u16,
        name: &'static str,
        value: PortRef,
    },
    /// Write guest memory.
    WriteMem { addr: PortRef, value: PortRef },
    /// Write the guest program counter.
    WritePc { value: PortRef, hint: BranchHint },
    /// An intra-chunk branch target. The node id is the label's identity;
    /// the name is used in debug output only.
    Label { name: Option<String> },
    /// Unconditional branch to a label node.
    Br { target: Node },
    /// Branch to a label node if `cond` is non-zero.
    CondBr { cond: PortRef, target: Node },
    /// Call to a helper routine resolved by the internal function resolver.
    InternalCall {
        func: InternalFunction,
        args: SmallVec<[PortRef; 4]>,
    },
    /// Write a chunk-local variable.
    WriteLocal { local: Local, value: PortRef },

    /// Atomic binary read-modify-write on memory. The value port is the old
    /// memory value; the flag ports reflect the operation result (the new
    /// value), matching the x86 LOCK-prefixed forms.
    BinaryAtomic {
        op: AtomicOp,
        ty: ValueType,
        addr: PortRef,
        src: PortRef,
    },
    /// Atomic compare-and-exchange: if `[addr] == expected` store `desired`.
    /// The value port is the old memory value; the `zero` port is the
    /// success flag (`old == expected`).
    TernaryAtomic {
        ty: ValueType,
        addr: PortRef,
        expected: PortRef,
        desired: PortRef,
    },
}

impl NodeData {
    /// Does this node have an observable side effect? Action nodes are kept
    /// in packet order; value nodes are reached through their consumers.
    pub fn is_action(&self) -> bool {
        matches!(
            self,
            NodeData::WriteReg { .. }
                | NodeData::WriteMem { .. }
                | NodeData::WritePc { .. }
                | NodeData::Label { .. }
                | NodeData::Br { .. }
                | NodeData::CondBr { .. }
                | NodeData::InternalCall { .. }
                | NodeData::WriteLocal { .. }
                | NodeData::BinaryAtomic { .. }
                | NodeData::TernaryAtomic { .. }
        )
    }

    /// The type of the primary value port, or `void` for pure actions.
    pub fn result_ty(&self) -> ValueType {
        match *self {
            NodeData::Constant { ty, .. }
            | NodeData::ReadReg { ty, .. }
            | NodeData::ReadMem { ty, .. }
            | NodeData::ReadLocal { ty, .. }
            | NodeData::UnaryArith { ty, .. }
            | NodeData::BinaryArith { ty, .. }
            | NodeData::TernaryArith { ty, .. }
            | NodeData::Cast { ty, .. }
            | NodeData::Csel { ty, .. }
            | NodeData::BitShift { ty, .. }
            | NodeData::BitExtract { ty, .. }
            | NodeData::BitInsert { ty, .. }
            | NodeData::VectorExtract { ty, .. }
            | NodeData::VectorInsert { ty, .. }
            | NodeData::BinaryAtomic { ty, .. }
            | NodeData::TernaryAtomic { ty, .. } => ty,
            NodeData::ReadPc => ValueType::u64(),
            // A label's value is its resolved address; it can be passed to
            // helper calls to identify a site.
            NodeData::Label { .. } => ValueType::u64(),
            _ => ValueType::void(),
        }
    }

    /// Which flag ports this node exposes.
    pub fn has_port(&self, tag: PortTag) -> bool {
        match tag {
            PortTag::Value => self.result_ty().class() != crate::TypeClass::None,
            PortTag::Zero | PortTag::Negative => matches!(
                self,
                NodeData::UnaryArith { .. }
                    | NodeData::BinaryArith { .. }
                    | NodeData::TernaryArith { .. }
                    | NodeData::BitShift { .. }
                    | NodeData::BinaryAtomic { .. }
                    | NodeData::TernaryAtomic { .. }
            ),
            PortTag::Overflow | PortTag::Carry => matches!(
                self,
                NodeData::BinaryArith { .. }
                    | NodeData::TernaryArith { .. }
                    | NodeData::BinaryAtomic { .. }
                    | NodeData::TernaryAtomic { .. }
            ),
        }
    }

    /// Visit every operand port of this node, producers before consumers.
    pub fn visit_operands(&self, f: &mut impl FnMut(PortRef)) {
        match self {
            NodeData::Constant { .. }
            | NodeData::ReadPc
            | NodeData::ReadReg { .. }
            | NodeData::ReadLocal { .. }
            | NodeData::Label { .. }
            | NodeData::Br { .. } => {}
            NodeData::ReadMem { addr, .. } => f(*addr),
            NodeData::UnaryArith { value, .. } => f(*value),
            NodeData::BinaryArith { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            NodeData::TernaryArith {
                lhs, rhs, carry, ..
            } => {
                f(*lhs);
                f(*rhs);
                f(*carry);
            }
            NodeData::Cast { value, .. } => f(*value),
            NodeData::Csel {
                cond, tval, fval, ..
            } => {
                f(*cond);
                f(*tval);
                f(*fval);
            }
            NodeData::BitShift { value, amount, .. } => {
                f(*value);
                f(*amount);
            }
            NodeData::BitExtract { value, .. } => f(*value),
            NodeData::BitInsert { value, bits, .. } => {
                f(*value);
                f(*bits);
            }
            NodeData::VectorExtract { value, .. } => f(*value),
            NodeData::VectorInsert { value, elem, .. } => {
                f(*value);
                f(*elem);
            }
            NodeData::WriteReg { value, .. } => f(*value),
            NodeData::WriteMem { addr, value } => {
                f(*addr);
                f(*value);
            }
            NodeData::WritePc { value, .. } => f(*value),
            NodeData::CondBr { cond, .. } => f(*cond),
            NodeData::InternalCall { args, .. } => {
                for a in args {
                    f(*a);
                }
            }
            NodeData::WriteLocal { value, .. } => f(*value),
            NodeData::BinaryAtomic { addr, src, .. } => {
                f(*addr);
                f(*src);
            }
            NodeData::TernaryAtomic {
                addr,
                expected,
                desired,
                ..
            } => {
                f(*addr);
                f(*expected);
                f(*desired);
            }
        }
    }
}
