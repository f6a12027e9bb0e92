//! Reverse linear-scan allocator behavior, driven through the AArch64
//! instruction builder.

use magpie_codegen::isa::aarch64::inst::{AMode, Asm, Cond, OperandSize};
use magpie_codegen::isa::aarch64::regs::{allocator_config, state_reg};
use magpie_codegen::machinst::MachInst;
use magpie_codegen::regalloc::{allocate_registers, AllocError};
use magpie_codegen::{Reg, RegClass, VRegAllocator, Writable};

fn wr(r: Reg) -> Writable<Reg> {
    Writable::from_reg(r)
}

fn no_virtuals_remain(asm: &mut Asm) {
    for vi in asm.stream.insts_mut() {
        if vi.dead {
            continue;
        }
        vi.inst.map_regs(&mut |r, _| assert!(!r.is_virtual(), "virtual {r} survived"));
    }
}

#[test]
fn linear_chain_allocates() {
    let mut asm = Asm::new();
    let mut vregs = VRegAllocator::new();
    let v0 = vregs.alloc(RegClass::Int);
    let v1 = vregs.alloc(RegClass::Int);

    asm.move_immediate(wr(v0), 42).unwrap();
    asm.add(OperandSize::Size64, wr(v1), v0, v0).unwrap();
    asm.str(64, v1, AMode::Base { rn: state_reg() }).unwrap();

    allocate_registers(&mut asm.stream, &allocator_config()).unwrap();
    no_virtuals_remain(&mut asm);
    assert!(asm.stream.insts().iter().all(|vi| !vi.dead));
}

#[test]
fn unused_definition_is_killed() {
    let mut asm = Asm::new();
    let mut vregs = VRegAllocator::new();
    let v0 = vregs.alloc(RegClass::Int);
    let dead = vregs.alloc(RegClass::Int);

    asm.move_immediate(wr(v0), 1).unwrap();
    asm.move_immediate(wr(dead), 2).unwrap();
    asm.str(64, v0, AMode::Base { rn: state_reg() }).unwrap();

    allocate_registers(&mut asm.stream, &allocator_config()).unwrap();
    let dead_count = asm.stream.insts().iter().filter(|vi| vi.dead).count();
    assert_eq!(dead_count, 1);
}

#[test]
fn implicit_flags_dependency_keeps_producer() {
    let mut asm = Asm::new();
    let mut vregs = VRegAllocator::new();
    let a = vregs.alloc(RegClass::Int);
    let b = vregs.alloc(RegClass::Int);
    let scratch = vregs.alloc(RegClass::Int);
    let out = vregs.alloc(RegClass::Int);

    asm.move_immediate(wr(a), 1).unwrap();
    asm.move_immediate(wr(b), 2).unwrap();
    // The subs result is unused; only its NZCV write matters.
    asm.subs(OperandSize::Size64, wr(scratch), a, b).unwrap();
    asm.cset(wr(out), Cond::Eq).unwrap();
    asm.str(64, out, AMode::Base { rn: state_reg() }).unwrap();

    allocate_registers(&mut asm.stream, &allocator_config()).unwrap();
    let subs = &asm.stream.insts()[2];
    assert!(!subs.dead, "flags producer must survive");
    assert!(subs.keep, "satisfying an implicit read marks keep");
}

#[test]
fn self_move_is_eliminated() {
    let mut asm = Asm::new();
    let mut vregs = VRegAllocator::new();
    let v0 = vregs.alloc(RegClass::Int);
    let v1 = vregs.alloc(RegClass::Int);

    asm.move_immediate(wr(v0), 5).unwrap();
    asm.mov(OperandSize::Size64, wr(v1), v0).unwrap();
    asm.str(64, v1, AMode::Base { rn: state_reg() }).unwrap();

    allocate_registers(&mut asm.stream, &allocator_config()).unwrap();
    // v1's register is released at the move's def and immediately reused
    // for v0, so the copy collapses.
    assert!(asm.stream.insts()[1].dead, "same-register move survives");
}

#[test]
fn backward_branch_keeps_loop_carried_values() {
    let mut asm = Asm::new();
    let mut vregs = VRegAllocator::new();
    let counter = vregs.alloc(RegClass::Int);
    let step = vregs.alloc(RegClass::Int);

    asm.move_immediate(wr(counter), 10).unwrap();
    asm.move_immediate(wr(step), 1).unwrap();
    let top = asm.new_label();
    asm.bind(top);
    asm.sub(OperandSize::Size64, wr(counter), counter, step)
        .unwrap();
    asm.cbnz(OperandSize::Size64, counter, top);
    asm.str(64, counter, AMode::Base { rn: state_reg() }).unwrap();

    allocate_registers(&mut asm.stream, &allocator_config()).unwrap();
    no_virtuals_remain(&mut asm);
    // Nothing may be eliminated: every def feeds the loop or the store.
    assert!(asm.stream.insts().iter().all(|vi| !vi.dead));
}

#[test]
fn undefined_use_is_a_dangling_allocation() {
    let mut asm = Asm::new();
    let mut vregs = VRegAllocator::new();
    let ghost = vregs.alloc(RegClass::Int);
    asm.str(64, ghost, AMode::Base { rn: state_reg() }).unwrap();

    let err = allocate_registers(&mut asm.stream, &allocator_config()).unwrap_err();
    assert_eq!(err, AllocError::DanglingAllocations);
}

#[test]
fn forward_branch_diamond_allocates() {
    // The riscv-style csel shape: rd is written on both paths.
    let mut asm = Asm::new();
    let mut vregs = VRegAllocator::new();
    let cond = vregs.alloc(RegClass::Int);
    let rd = vregs.alloc(RegClass::Int);

    asm.move_immediate(wr(cond), 1).unwrap();
    asm.move_immediate(wr(rd), 100).unwrap();
    let skip = asm.new_label();
    asm.cbnz(OperandSize::Size64, cond, skip);
    asm.move_immediate(wr(rd), 200).unwrap();
    asm.bind(skip);
    asm.str(64, rd, AMode::Base { rn: state_reg() }).unwrap();

    allocate_registers(&mut asm.stream, &allocator_config()).unwrap();
    no_virtuals_remain(&mut asm);
    assert!(asm.stream.insts().iter().all(|vi| !vi.dead));
}
