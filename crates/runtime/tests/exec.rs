//! Lift-lower-execute round trips. These run generated code, so the
//! architectural checks are gated to hosts with a matching backend; the
//! shared scaffolding still compiles everywhere.

#![cfg(any(target_arch = "aarch64", target_arch = "riscv64"))]

use magpie_runtime::Engine;

const CODE_BASE: u64 = 0x400000;

fn engine() -> Engine {
    let _ = env_logger::builder().is_test(true).try_init();
    Engine::new(8 << 20).unwrap()
}

#[test]
fn xor_rax_rax_clears_and_sets_flags() {
    let engine = engine();
    engine.memory().write(CODE_BASE, &[0x48, 0x31, 0xc0]);
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    state.rax = 0xdead;

    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(state.rax, 0);
    assert_eq!(state.zf, 1);
    assert_eq!(state.cf, 0);
    assert_eq!(state.of, 0);
    assert_eq!(state.sf, 0);
    assert_eq!(state.rip, CODE_BASE + 3);
}

#[test]
fn add_eax_wraps_and_zero_extends() {
    let engine = engine();
    // add eax, 1
    engine.memory().write(CODE_BASE, &[0x83, 0xc0, 0x01]);
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    state.rax = 0xffff_ffff;

    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(state.rax, 0, "32-bit write must clear the upper half");
    assert_eq!(state.zf, 1);
    assert_eq!(state.cf, 1);
    assert_eq!(state.of, 0);
}

#[test]
fn cmp_then_jb_takes_the_branch() {
    let engine = engine();
    // cmp al, 0x10 ; jb +8
    engine.memory().write(CODE_BASE, &[0x3c, 0x10, 0x72, 0x08]);
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    state.rax = 0x0f;

    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(state.cf, 1);
    assert_eq!(state.rip, CODE_BASE + 4 + 8);
}

#[test]
fn cmp_then_jb_falls_through() {
    let engine = engine();
    engine.memory().write(CODE_BASE, &[0x3c, 0x10, 0x72, 0x08]);
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    state.rax = 0x20;

    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(state.cf, 0);
    assert_eq!(state.rip, CODE_BASE + 4);
}

#[test]
fn emulated_ret_pops_and_jumps() {
    let engine = engine();
    // mov rax, [rsp] ; add rsp, 8 ; jmp rax
    engine.memory().write(
        CODE_BASE,
        &[0x48, 0x8b, 0x04, 0x24, 0x48, 0x83, 0xc4, 0x08, 0xff, 0xe0],
    );
    engine.memory().write(0x7ff0, &0xcafeu64.to_le_bytes());
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    state.rsp = 0x7ff0;

    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(state.rip, 0xcafe);
    assert_eq!(state.rsp, 0x7ff8);
    assert_eq!(state.rax, 0xcafe);
}

#[test]
fn imul_multiplies_without_overflow() {
    let engine = engine();
    // imul rax, rbx
    engine.memory().write(CODE_BASE, &[0x48, 0x0f, 0xaf, 0xc3]);
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    state.rax = 3;
    state.rbx = 7;

    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(state.rax, 21);
    assert_eq!(state.cf, 0);
    assert_eq!(state.of, 0);
}

#[test]
fn cmpxchg_success_and_failure() {
    let engine = engine();
    // lock cmpxchg [rdi], rsi
    engine
        .memory()
        .write(CODE_BASE, &[0xf0, 0x48, 0x0f, 0xb1, 0x37]);

    // Success: accumulator matches memory.
    engine.memory().write(0x2000, &5u64.to_le_bytes());
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    state.rdi = 0x2000;
    state.rax = 5;
    state.rsi = 9;
    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(engine.memory().read_u64(0x2000), Some(9));
    assert_eq!(state.zf, 1);

    // Failure: accumulator differs; memory kept, RAX loaded.
    engine.memory().write(0x2000, &5u64.to_le_bytes());
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    state.rdi = 0x2000;
    state.rax = 4;
    state.rsi = 9;
    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(engine.memory().read_u64(0x2000), Some(5));
    assert_eq!(state.rax, 5);
    assert_eq!(state.zf, 0);
}

#[test]
fn push_call_ret_round_trip() {
    let engine = engine();
    // call +3 ; (skipped: 3 nops) ; target: ret
    // Layout: call rel32 (5 bytes) -> target at +8; ret jumps back to +5.
    engine.memory().write(
        CODE_BASE,
        &[
            0xe8, 0x03, 0x00, 0x00, 0x00, // call +3
            0x90, 0x90, 0x90, // landing pad after return
            0xc3, // ret
        ],
    );
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    state.rsp = 0x8000;

    // The call chunk ends the block.
    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(state.rip, CODE_BASE + 8);
    assert_eq!(state.rsp, 0x7ff8);
    assert_eq!(engine.memory().read_u64(0x7ff8), Some(CODE_BASE + 5));

    // Run the ret.
    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(state.rip, CODE_BASE + 5);
    assert_eq!(state.rsp, 0x8000);
}

#[test]
fn dispatch_loop_runs_a_small_program() {
    let engine = engine();
    // mov rax, 0 ; mov rcx, 5 ; loop: add rax, rcx ; sub rcx, 1 ; jnz loop
    engine.memory().write(
        CODE_BASE,
        &[
            0x48, 0xc7, 0xc0, 0x00, 0x00, 0x00, 0x00, // mov rax, 0
            0x48, 0xc7, 0xc1, 0x05, 0x00, 0x00, 0x00, // mov rcx, 5
            0x48, 0x01, 0xc8, // add rax, rcx
            0x48, 0x83, 0xe9, 0x01, // sub rcx, 1
            0x75, 0xf7, // jnz -9
        ],
    );
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    engine.run(&mut state, CODE_BASE + 23).unwrap();
    assert_eq!(state.rax, 5 + 4 + 3 + 2 + 1);
    assert_eq!(state.rcx, 0);
}

#[test]
fn setcc_and_cmov() {
    let engine = engine();
    // cmp rax, rbx ; setz cl ; cmovz rdx, rbx
    engine.memory().write(
        CODE_BASE,
        &[
            0x48, 0x39, 0xd8, // cmp rax, rbx
            0x0f, 0x94, 0xc1, // setz cl
            0x48, 0x0f, 0x44, 0xd3, // cmovz rdx, rbx
        ],
    );
    let mut state = engine.new_state();
    state.rip = CODE_BASE;
    state.rax = 42;
    state.rbx = 42;
    state.rdx = 7;
    assert_eq!(engine.invoke(&mut state), 0);
    assert_eq!(state.rcx & 0xff, 1);
    assert_eq!(state.rdx, 42);
}
