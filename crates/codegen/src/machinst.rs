//! Host-agnostic instruction machinery.
//!
//! Each backend defines its own instruction enum; the shared register
//! allocator and emission driver see instructions through the [`MachInst`]
//! trait: operand traversal with use/def marks, move/branch/label queries,
//! and the implicit (side-effect) register sets. A [`VInst`] wrapper adds
//! the keep/dead bits the allocator works with, and [`CodeBuffer`] collects
//! encoded bytes with label fixups.

use crate::reg::Reg;
use core::fmt;
use smallvec::SmallVec;

/// A branch target or bind point within one instruction stream.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

impl Label {
    /// The index of this label.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}

/// How an instruction treats a register operand.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum OperandKind {
    Use,
    Def,
    UseDef,
}

impl OperandKind {
    pub fn is_use(self) -> bool {
        matches!(self, OperandKind::Use | OperandKind::UseDef)
    }

    pub fn is_def(self) -> bool {
        matches!(self, OperandKind::Def | OperandKind::UseDef)
    }
}

/// The interface a backend instruction exposes to the shared machinery.
pub trait MachInst: fmt::Display {
    /// Visit every register operand, in operand order, allowing rewrites.
    /// Memory-operand base registers are visited as uses.
    fn map_regs(&mut self, f: &mut dyn FnMut(&mut Reg, OperandKind));

    /// If this is a plain register-to-register copy, its (dst, src) pair.
    fn is_move(&self) -> Option<(Reg, Reg)>;

    /// Does this instruction transfer control to a label?
    fn is_branch(&self) -> bool;

    /// The label a branch targets.
    fn branch_target(&self) -> Option<Label>;

    /// The label this instruction binds, for label-definition pseudo
    /// instructions.
    fn defines_label(&self) -> Option<Label>;

    /// Physical registers read beyond the explicit operands.
    fn implicit_uses(&self) -> SmallVec<[Reg; 2]>;

    /// Physical registers written beyond the explicit operands.
    fn implicit_defs(&self) -> SmallVec<[Reg; 2]>;
}

/// One instruction plus the allocator's bookkeeping bits.
pub struct VInst<I> {
    pub inst: I,
    /// Must not be eliminated even if its definition is unused.
    pub keep: bool,
    /// Eliminated; skipped at emission.
    pub dead: bool,
}

impl<I> VInst<I> {
    fn new(inst: I, keep: bool) -> Self {
        Self {
            inst,
            keep,
            dead: false,
        }
    }
}

/// An append-only instruction stream with label bookkeeping.
pub struct InstStream<I> {
    insts: Vec<VInst<I>>,
    num_labels: u32,
    /// Number of branches referencing each label.
    label_refs: Vec<u32>,
}

impl<I: MachInst> InstStream<I> {
    pub fn new() -> Self {
        Self {
            insts: Vec::new(),
            num_labels: 0,
            label_refs: Vec::new(),
        }
    }

    /// Allocate a fresh label.
    pub fn new_label(&mut self) -> Label {
        let l = Label(self.num_labels);
        self.num_labels += 1;
        self.label_refs.push(0);
        l
    }

    /// Number of labels allocated so far.
    pub fn num_labels(&self) -> usize {
        self.num_labels as usize
    }

    /// How many branches reference `l`.
    pub fn label_refcount(&self, l: Label) -> u32 {
        self.label_refs[l.index()]
    }

    /// Append an instruction, counting any label reference it carries.
    pub fn push(&mut self, inst: I) {
        self.push_inner(inst, false);
    }

    /// Append an instruction the allocator must preserve.
    pub fn push_keep(&mut self, inst: I) {
        self.push_inner(inst, true);
    }

    fn push_inner(&mut self, inst: I, keep: bool) {
        if let Some(target) = inst.branch_target() {
            self.label_refs[target.index()] += 1;
        }
        self.insts.push(VInst::new(inst, keep));
    }

    /// Number of appended instructions, dead ones included.
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn insts(&self) -> &[VInst<I>] {
        &self.insts
    }

    pub fn insts_mut(&mut self) -> &mut [VInst<I>] {
        &mut self.insts
    }

    /// Render the stream as assembler-like text, one instruction per
    /// appended line, dead instructions skipped.
    pub fn display(&self) -> String {
        use core::fmt::Write;
        let mut s = String::new();
        for vi in &self.insts {
            if vi.dead {
                continue;
            }
            let _ = writeln!(s, "{}", vi.inst);
        }
        s
    }
}

impl<I: MachInst> Default for InstStream<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Label fixup kinds understood by [`CodeBuffer::finish`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FixupKind {
    /// AArch64 B/BL: 26-bit word offset in bits [25:0].
    A64Branch26,
    /// AArch64 B.cond/CBZ/CBNZ: 19-bit word offset in bits [23:5].
    A64Branch19,
    /// RISC-V JAL: 20-bit immediate in J-type layout.
    RvJal20,
    /// RISC-V conditional branch: 12-bit immediate in B-type layout.
    RvBranch12,
}

struct Fixup {
    offset: u32,
    label: Label,
    kind: FixupKind,
}

/// Emission failure.
#[derive(Debug, PartialEq, Eq)]
pub enum EmitError {
    /// A referenced label was never bound.
    UnboundLabel(u32),
    /// A branch displacement does not fit its encoding.
    BranchOutOfRange { at: u32, kind: FixupKind },
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EmitError::UnboundLabel(l) => write!(f, "unbound label L{l}"),
            EmitError::BranchOutOfRange { at, kind } => {
                write!(f, "branch at offset {at:#x} out of range for {kind:?}")
            }
        }
    }
}

impl std::error::Error for EmitError {}

/// An append-only byte buffer with label binding and branch fixups.
pub struct CodeBuffer {
    bytes: Vec<u8>,
    label_offsets: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
}

impl CodeBuffer {
    pub fn new(num_labels: usize) -> Self {
        Self {
            bytes: Vec::new(),
            label_offsets: vec![None; num_labels],
            fixups: Vec::new(),
        }
    }

    /// Current offset from the start of the buffer.
    pub fn cur_offset(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Append one 32-bit instruction word, little endian.
    pub fn put4(&mut self, word: u32) {
        self.bytes.extend_from_slice(&word.to_le_bytes());
    }

    /// Bind `label` to the current offset.
    pub fn bind_label(&mut self, label: Label) {
        debug_assert!(
            self.label_offsets[label.index()].is_none(),
            "label bound twice"
        );
        self.label_offsets[label.index()] = Some(self.cur_offset());
    }

    /// Record that the word most recently appended references `label`.
    pub fn use_label(&mut self, label: Label, kind: FixupKind) {
        debug_assert!(self.bytes.len() >= 4);
        self.fixups.push(Fixup {
            offset: self.cur_offset() - 4,
            label,
            kind,
        });
    }

    /// Apply all fixups and return the finished bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, EmitError> {
        for fixup in &self.fixups {
            let target = self.label_offsets[fixup.label.index()]
                .ok_or(EmitError::UnboundLabel(fixup.label.0))?;
            let delta = target as i64 - fixup.offset as i64;
            let at = fixup.offset as usize;
            let mut word = u32::from_le_bytes(self.bytes[at..at + 4].try_into().unwrap());
            match fixup.kind {
                FixupKind::A64Branch26 => {
                    let words = delta >> 2;
                    if !(-(1 << 25)..(1 << 25)).contains(&words) {
                        return Err(EmitError::BranchOutOfRange {
                            at: fixup.offset,
                            kind: fixup.kind,
                        });
                    }
                    word |= (words as u32) & 0x03ff_ffff;
                }
                FixupKind::A64Branch19 => {
                    let words = delta >> 2;
                    if !(-(1 << 18)..(1 << 18)).contains(&words) {
                        return Err(EmitError::BranchOutOfRange {
                            at: fixup.offset,
                            kind: fixup.kind,
                        });
                    }
                    word |= ((words as u32) & 0x7ffff) << 5;
                }
                FixupKind::RvJal20 => {
                    if !(-(1 << 20)..(1 << 20)).contains(&delta) {
                        return Err(EmitError::BranchOutOfRange {
                            at: fixup.offset,
                            kind: fixup.kind,
                        });
                    }
                    let d = delta as u32;
                    let imm = ((d >> 20) & 1) << 31
                        | ((d >> 1) & 0x3ff) << 21
                        | ((d >> 11) & 1) << 20
                        | ((d >> 12) & 0xff) << 12;
                    word |= imm;
                }
                FixupKind::RvBranch12 => {
                    if !(-(1 << 12)..(1 << 12)).contains(&delta) {
                        return Err(EmitError::BranchOutOfRange {
                            at: fixup.offset,
                            kind: fixup.kind,
                        });
                    }
                    let d = delta as u32;
                    let imm = ((d >> 12) & 1) << 31
                        | ((d >> 5) & 0x3f) << 25
                        | ((d >> 1) & 0xf) << 8
                        | ((d >> 11) & 1) << 7;
                    word |= imm;
                }
            }
            self.bytes[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }
        Ok(self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_branch_fixup_a64() {
        let mut buf = CodeBuffer::new(1);
        let l = Label(0);
        buf.put4(0x14000000); // b <l>
        buf.use_label(l, FixupKind::A64Branch26);
        buf.put4(0xd503201f); // nop
        buf.bind_label(l);
        buf.put4(0xd65f03c0); // ret
        let bytes = buf.finish().unwrap();
        // Branch skips two words.
        assert_eq!(&bytes[0..4], &0x14000002u32.to_le_bytes());
    }

    #[test]
    fn backward_branch_fixup_a64() {
        let mut buf = CodeBuffer::new(1);
        let l = Label(0);
        buf.bind_label(l);
        buf.put4(0xd503201f);
        buf.put4(0x54000000); // b.eq <l>
        buf.use_label(l, FixupKind::A64Branch19);
        let bytes = buf.finish().unwrap();
        let word = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        // Offset is -1 word, in bits [23:5].
        assert_eq!(word, 0x54000000 | (0x7ffff << 5));
    }

    #[test]
    fn unbound_label_is_an_error() {
        let mut buf = CodeBuffer::new(1);
        buf.put4(0x14000000);
        buf.use_label(Label(0), FixupKind::A64Branch26);
        assert_eq!(buf.finish(), Err(EmitError::UnboundLabel(0)));
    }
}
