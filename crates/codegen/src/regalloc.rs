//! Reverse linear-scan register allocation.
//!
//! The stream is scanned from last instruction to first. A physical
//! register is assigned at a virtual register's last use (the first
//! encountered) and released at its definition, so an allocation spans
//! exactly the live range. Definitions that never saw a use kill their
//! instruction, unless it is marked keep or its implicit writes satisfy an
//! outstanding implicit read (a flags producer feeding a flags consumer).
//!
//! Around branches the scan is conservative: between a branch and its
//! label (in either direction) definitions do not release their
//! allocation, because a reaching definition may span the edge. When the
//! outermost branch region closes, allocations whose virtual registers
//! have no definition earlier in the stream are released.

use crate::machinst::{InstStream, Label, MachInst, OperandKind};
use crate::reg::{Reg, RegClass};
use crate::regset::RegSet;
use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// Allocation failure.
#[derive(Debug, PartialEq, Eq)]
pub enum AllocError {
    /// No free register of the class remains.
    OutOfRegisters(RegClass),
    /// The free sets did not return to their initial value.
    DanglingAllocations,
    /// An implicit register read was never matched by a write.
    UnsatisfiedImplicit,
    /// A branch region never closed.
    OpenBranchBlock,
    /// A virtual register survived allocation.
    UnresolvedVirtual,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocError::OutOfRegisters(class) => {
                write!(f, "out of {class:?} registers (spilling unsupported)")
            }
            AllocError::DanglingAllocations => {
                write!(f, "dangling register allocations after the scan")
            }
            AllocError::UnsatisfiedImplicit => {
                write!(f, "unsatisfied implicit register dependency")
            }
            AllocError::OpenBranchBlock => write!(f, "unmatched branch/label pair"),
            AllocError::UnresolvedVirtual => {
                write!(f, "virtual register remains after allocation")
            }
        }
    }
}

impl std::error::Error for AllocError {}

/// The initial free sets; reserved registers are excluded up front.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AllocatorConfig {
    pub int_free: RegSet,
    pub float_free: RegSet,
}

struct FreeSets {
    int: RegSet,
    float: RegSet,
}

impl FreeSets {
    fn set(&mut self, class: RegClass) -> &mut RegSet {
        match class {
            RegClass::Int => &mut self.int,
            RegClass::Float => &mut self.float,
        }
    }

    fn allocate(&mut self, class: RegClass) -> Result<Reg, AllocError> {
        let set = self.set(class);
        let enc = set.find_first().ok_or(AllocError::OutOfRegisters(class))?;
        set.take(enc);
        Ok(Reg::new_real(class, enc))
    }

    fn release(&mut self, preg: Reg) {
        self.set(preg.class()).free(preg.hw_enc());
    }
}

#[derive(Default)]
struct BranchTracker {
    /// Forward branches: label -> count of unmatched references.
    forward: FxHashMap<Label, u32>,
    /// Labels of backward branches not yet seen.
    expected: FxHashSet<Label>,
}

impl BranchTracker {
    fn track_label(&mut self, label: Label, refcount: u32) {
        if self.expected.remove(&label) {
            trace!("label {label} closes a backward branch");
        } else if refcount > 0 {
            trace!("label {label} opens {refcount} forward branches");
            self.forward.insert(label, refcount);
        }
    }

    fn track_branch(&mut self, target: Label) {
        match self.forward.get_mut(&target) {
            Some(count) => {
                *count -= 1;
                if *count == 0 {
                    self.forward.remove(&target);
                }
            }
            None => {
                // Target label is below us in the scan: a backward branch.
                self.expected.insert(target);
            }
        }
    }

    fn in_block(&self) -> bool {
        !(self.forward.is_empty() && self.expected.is_empty())
    }
}

/// Run reverse linear-scan allocation over `stream`, rewriting virtual
/// registers to physical ones in place and killing dead instructions.
pub fn allocate_registers<I: MachInst>(
    stream: &mut InstStream<I>,
    config: &AllocatorConfig,
) -> Result<(), AllocError> {
    let mut free = FreeSets {
        int: config.int_free,
        float: config.float_free,
    };
    let mut map: FxHashMap<Reg, Reg> = FxHashMap::default();
    let mut tracker = BranchTracker::default();
    let mut deps: FxHashSet<Reg> = FxHashSet::default();
    let mut in_block = false;

    // Label refcounts are snapshotted before the scan mutates anything.
    let label_refs: Vec<u32> = (0..stream.num_labels())
        .map(|i| stream.label_refcount(Label(i as u32)))
        .collect();

    for i in (0..stream.insts().len()).rev() {
        // Release allocations whose definitions were all inside a branch
        // region we just left.
        let bound_label = stream.insts()[i].inst.defines_label();
        let was_in_block = in_block;
        if let Some(label) = bound_label {
            tracker.track_label(label, label_refs[label.index()]);
        }
        if was_in_block && !tracker.in_block() {
            release_loop_mappings(stream, i, &mut map, &mut free);
        }
        // Snapshot before this instruction's own branch is tracked, so a
        // block closed here is released at the next iteration's check.
        in_block = tracker.in_block();

        let vi = &mut stream.insts_mut()[i];
        let mut keep = vi.keep;

        for dep in vi.inst.implicit_uses() {
            deps.insert(dep);
        }
        for def in vi.inst.implicit_defs() {
            if deps.remove(&def) {
                trace!("implicit write of {def} satisfies a dependency; keeping");
                keep = true;
            }
        }

        // Inspect the definition operand, and whether the same register is
        // also read by a use operand (a chained redefinition): those keep
        // their allocation alive across the instruction.
        let mut def: Option<(Reg, OperandKind)> = None;
        let mut def_also_used = false;
        vi.inst.map_regs(&mut |r, k| {
            if k.is_def() && def.is_none() {
                def = Some((*r, k));
            } else if k == OperandKind::Use {
                if let Some((d, _)) = def {
                    def_also_used |= *r == d;
                }
            }
        });

        let mut def_rewrite: Option<Reg> = None;
        let mut unused_keep: Option<Reg> = None;
        if let Some((dreg, kind)) = def {
            if dreg.is_virtual() {
                let prior = map.get(&dreg).copied();
                if let Some(preg) = prior {
                    def_rewrite = Some(preg);
                    deps.remove(&preg);
                    if !tracker.in_block() && !kind.is_use() && !def_also_used {
                        trace!("definition of {dreg} releases {preg}");
                        map.remove(&dreg);
                        free.release(preg);
                    }
                } else if keep || tracker.in_block() {
                    // No user below, but the instruction must survive.
                    let preg = free.allocate(dreg.class())?;
                    trace!("unused keep definition {dreg} gets {preg}");
                    map.insert(dreg, preg);
                    def_rewrite = Some(preg);
                    if !tracker.in_block() {
                        unused_keep = Some(dreg);
                    }
                } else {
                    trace!("definition {dreg} has no users; killing instruction");
                    vi.dead = true;
                }
            } else if deps.remove(&dreg) {
                keep = true;
            }
        }
        vi.keep = keep;

        if vi.dead {
            continue;
        }

        // Rewrite the operands: the decided definition, and every use,
        // allocating at first sight.
        let mut alloc_failed = None;
        vi.inst.map_regs(&mut |r, k| {
            if !r.is_virtual() || alloc_failed.is_some() {
                return;
            }
            if k.is_def() && !k.is_use() {
                if let Some(p) = def_rewrite {
                    *r = p;
                }
            } else {
                match map.get(r).copied() {
                    Some(p) => *r = p,
                    None => match free.allocate(r.class()) {
                        Ok(p) => {
                            trace!("use of {r} gets {p}");
                            map.insert(*r, p);
                            *r = p;
                        }
                        Err(e) => alloc_failed = Some(e),
                    },
                }
            }
        });
        if let Some(e) = alloc_failed {
            return Err(e);
        }

        // A keep-definition with no users holds its register only for this
        // instruction.
        if let Some(dreg) = unused_keep {
            if let Some(preg) = map.remove(&dreg) {
                free.release(preg);
            }
        }

        // Copy elimination: moves that landed on one register.
        if !vi.keep {
            if let Some((dst, src)) = vi.inst.is_move() {
                if dst == src {
                    trace!("killing self-move of {dst}");
                    vi.dead = true;
                }
            }
        }

        if vi.inst.is_branch() {
            if let Some(target) = vi.inst.branch_target() {
                tracker.track_branch(target);
            }
        }
    }

    if tracker.in_block() {
        return Err(AllocError::OpenBranchBlock);
    }
    if !deps.is_empty() {
        return Err(AllocError::UnsatisfiedImplicit);
    }
    if free.int != config.int_free || free.float != config.float_free {
        return Err(AllocError::DanglingAllocations);
    }

    // Post-condition: nothing virtual survives.
    for vi in stream.insts_mut() {
        if vi.dead {
            continue;
        }
        let mut bad = false;
        vi.inst.map_regs(&mut |r, _| bad |= r.is_virtual());
        if bad {
            return Err(AllocError::UnresolvedVirtual);
        }
    }
    Ok(())
}

/// On leaving the outermost branch region, release mappings for virtual
/// registers with no definition at or before the current instruction.
fn release_loop_mappings<I: MachInst>(
    stream: &mut InstStream<I>,
    upto: usize,
    map: &mut FxHashMap<Reg, Reg>,
    free: &mut FreeSets,
) {
    let mut defined: FxHashSet<Reg> = FxHashSet::default();
    for j in 0..=upto {
        let vj = &mut stream.insts_mut()[j];
        if vj.dead {
            continue;
        }
        vj.inst.map_regs(&mut |r, k| {
            if k.is_def() && r.is_virtual() {
                defined.insert(*r);
            }
        });
    }

    let stale: Vec<Reg> = map
        .keys()
        .filter(|vreg| !defined.contains(vreg))
        .copied()
        .collect();
    for vreg in stale {
        if let Some(preg) = map.remove(&vreg) {
            trace!("releasing loop mapping {vreg} -> {preg}");
            free.release(preg);
        }
    }
}
