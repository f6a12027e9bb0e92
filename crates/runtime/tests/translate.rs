//! Full-pipeline translation tests that run on any build host: lift,
//! optimize, lower, allocate and encode for both backends, without
//! executing the result. Register-allocation post-conditions (no virtual
//! registers remain, free sets restored) are enforced inside the
//! allocator, so a successful translation carries those checks.

use magpie_runtime::Engine;
use std::str::FromStr;
use target_lexicon::Triple;

fn engine_for(triple: &str) -> Engine {
    let triple = Triple::from_str(triple).unwrap();
    Engine::with_triple(&triple, 8 << 20).unwrap()
}

const CASES: &[(&str, &[u8])] = &[
    ("xor rax, rax", &[0x48, 0x31, 0xc0]),
    ("add eax, 1", &[0x83, 0xc0, 0x01]),
    ("cmp al; jb", &[0x3c, 0x10, 0x72, 0x08]),
    (
        "emulated ret",
        &[0x48, 0x8b, 0x04, 0x24, 0x48, 0x83, 0xc4, 0x08, 0xff, 0xe0],
    ),
    ("imul rax, rbx", &[0x48, 0x0f, 0xaf, 0xc3]),
    ("lock cmpxchg", &[0xf0, 0x48, 0x0f, 0xb1, 0x37]),
    ("push/pop", &[0x55, 0x58]),
    ("call rel", &[0xe8, 0x00, 0x01, 0x00, 0x00]),
    ("movzx", &[0x0f, 0xb6, 0x07]),
    ("shl rax, cl", &[0x48, 0xd3, 0xe0]),
    ("cqo", &[0x48, 0x99]),
    ("cmovz", &[0x48, 0x0f, 0x44, 0xc3]),
    ("setnz", &[0x0f, 0x95, 0xc0]),
    ("repe cmpsb", &[0xf3, 0xa6]),
    ("lea rip-relative", &[0x48, 0x8d, 0x05, 0x34, 0x12, 0x00, 0x00]),
    ("div rcx", &[0x48, 0xf7, 0xf1]),
    ("neg rax", &[0x48, 0xf7, 0xd8]),
    ("ud2 poison", &[0x0f, 0x0b]),
    ("pxor xmm0, xmm1", &[0x66, 0x0f, 0xef, 0xc1]),
    ("addsd xmm0, xmm1", &[0xf2, 0x0f, 0x58, 0xc1]),
    ("cvtsi2sd", &[0xf2, 0x48, 0x0f, 0x2a, 0xc0]),
    ("pshufd", &[0x66, 0x0f, 0x70, 0xc1, 0x1b]),
    ("punpcklqdq", &[0x66, 0x0f, 0x6c, 0xc1]),
    ("movsd load", &[0xf2, 0x0f, 0x10, 0x07]),
];

fn translate_all(triple: &str) {
    let engine = engine_for(triple);
    for (i, (name, bytes)) in CASES.iter().enumerate() {
        // One address per case; the cache is keyed by PC.
        let base = 0x1000u64 + (i as u64) * 0x100;
        assert!(engine.memory().write(base, bytes), "loading {name}");
        let entry = engine
            .translate(base)
            .unwrap_or_else(|e| panic!("translating `{name}` for {triple}: {e:#}"));
        assert_ne!(entry, 0, "{name}");
    }
}

#[test]
fn aarch64_translates_whole_suite() {
    translate_all("aarch64-unknown-linux-gnu");
}

#[test]
fn riscv64_translates_whole_suite() {
    translate_all("riscv64gc-unknown-linux-gnu");
}

#[test]
fn cache_returns_same_entry() {
    let engine = engine_for("aarch64-unknown-linux-gnu");
    engine.memory().write(0x1000, &[0x48, 0x31, 0xc0]);
    let first = engine.translate(0x1000).unwrap();
    let second = engine.translate(0x1000).unwrap();
    assert_eq!(first, second);
}

#[test]
fn pc_outside_memory_fails() {
    let engine = engine_for("aarch64-unknown-linux-gnu");
    assert!(engine.translate(u64::MAX).is_err());
}
