//! IR-level checks of the instruction translators: lift short byte
//! sequences and assert the shapes of the emitted packets.

use magpie_ir::{
    eliminate_dead_flags, AtomicOp, BinaryOp, BranchHint, CastOp, Chunk, ChunkBuilder,
    InternalFunctionResolver, NodeData,
};
use magpie_x86::translate::lift_chunk;

fn lift(bytes: &[u8], base: u64) -> Chunk {
    let mut ifr = InternalFunctionResolver::new();
    ifr.register(magpie_ir::HANDLE_POISON, 0);
    let mut b = ChunkBuilder::new(base, &ifr);
    lift_chunk(&mut b, bytes, base, 128).expect("lift");
    b.finish()
}

fn count_nodes(chunk: &Chunk, pred: impl Fn(&NodeData) -> bool) -> usize {
    chunk.nodes().filter(|(_, d)| pred(d)).count()
}

fn flag_writes(chunk: &Chunk, packet: usize) -> Vec<&'static str> {
    chunk.packets()[packet]
        .actions()
        .iter()
        .filter_map(|&a| match chunk.node(a) {
            NodeData::WriteReg { name, .. }
                if ["zf", "cf", "of", "sf", "pf", "af"].contains(name) =>
            {
                Some(*name)
            }
            _ => None,
        })
        .collect()
}

#[test]
fn xor_rax_rax_shape() {
    // xor rax, rax
    let chunk = lift(&[0x48, 0x31, 0xc0], 0x400000);
    // The xor packet plus the trailing PC resynchronization.
    assert_eq!(chunk.packets().len(), 2);
    assert_eq!(chunk.packets()[0].address(), 0x400000);
    assert_eq!(
        count_nodes(&chunk, |d| matches!(
            d,
            NodeData::BinaryArith {
                op: BinaryOp::Xor,
                ..
            }
        )),
        1
    );
    // Result write plus ZF/CF/OF/SF (PF is requested but unmodeled).
    let flags = flag_writes(&chunk, 0);
    assert!(flags.contains(&"zf"));
    assert!(flags.contains(&"cf"));
    assert!(flags.contains(&"of"));
    assert!(flags.contains(&"sf"));
    assert!(
        chunk.packets()[0]
            .actions()
            .iter()
            .any(|&a| matches!(chunk.node(a), NodeData::WriteReg { name: "rax", .. })),
        "missing rax write"
    );
}

#[test]
fn add_eax_writes_zero_extended() {
    // add eax, 1: the 32-bit write must zero-extend to 64 bits.
    let chunk = lift(&[0x83, 0xc0, 0x01], 0x1000);
    assert!(count_nodes(&chunk, |d| matches!(
        d,
        NodeData::Cast {
            op: CastOp::Zx,
            ty,
            ..
        } if ty.width() == 64
    )) >= 1);
}

#[test]
fn cmp_discards_result_jb_selects_pc() {
    // cmp al, 0x10 ; jb +8
    let chunk = lift(&[0x3c, 0x10, 0x72, 0x08], 0x2000);
    assert_eq!(chunk.packets().len(), 2);

    // cmp writes flags but not al.
    assert!(
        !chunk.packets()[0]
            .actions()
            .iter()
            .any(|&a| matches!(chunk.node(a), NodeData::WriteReg { name: "rax", .. })),
        "cmp must not write its operand"
    );
    assert!(flag_writes(&chunk, 0).contains(&"cf"));

    // jb ends the block with a csel-hinted PC write.
    let jb = &chunk.packets()[1];
    let has_csel_pc = jb.actions().iter().any(|&a| {
        matches!(
            chunk.node(a),
            NodeData::WritePc {
                hint: BranchHint::Csel,
                ..
            }
        )
    });
    assert!(has_csel_pc);
    assert_eq!(count_nodes(&chunk, |d| matches!(d, NodeData::Csel { .. })), 1);
}

#[test]
fn chunk_stops_at_end_of_block() {
    // jmp +0 ; int3 (0xcc would not decode; must never be reached)
    let chunk = lift(&[0xeb, 0x00, 0xcc], 0x3000);
    assert_eq!(chunk.packets().len(), 1);
    assert!(matches!(
        chunk.node(*chunk.packets()[0].actions().last().unwrap()),
        NodeData::WritePc {
            hint: BranchHint::Direct,
            ..
        }
    ));
}

#[test]
fn ret_shape() {
    // ret: load [rsp], bump rsp by 8, indirect PC write.
    let chunk = lift(&[0xc3], 0);
    let p = &chunk.packets()[0];
    assert!(p
        .actions()
        .iter()
        .any(|&a| matches!(chunk.node(a), NodeData::WriteReg { name: "rsp", .. })));
    assert!(p.actions().iter().any(|&a| matches!(
        chunk.node(a),
        NodeData::WritePc {
            hint: BranchHint::Indirect,
            ..
        }
    )));
    assert_eq!(
        count_nodes(&chunk, |d| matches!(d, NodeData::ReadMem { .. })),
        1
    );
}

#[test]
fn call_pushes_return_address() {
    // call +0x100
    let chunk = lift(&[0xe8, 0x00, 0x01, 0x00, 0x00], 0x4000);
    let p = &chunk.packets()[0];
    assert!(p
        .actions()
        .iter()
        .any(|&a| matches!(chunk.node(a), NodeData::WriteMem { .. })));
    assert!(p
        .actions()
        .iter()
        .any(|&a| matches!(chunk.node(a), NodeData::WriteReg { name: "rsp", .. })));
    assert!(p.actions().iter().any(|&a| matches!(
        chunk.node(a),
        NodeData::WritePc {
            hint: BranchHint::Direct,
            ..
        }
    )));
}

#[test]
fn lock_cmpxchg_is_one_ternary_atomic() {
    // lock cmpxchg [rdi], rsi
    let chunk = lift(&[0xf0, 0x48, 0x0f, 0xb1, 0x37], 0);
    assert_eq!(
        count_nodes(&chunk, |d| matches!(d, NodeData::TernaryAtomic { .. })),
        1
    );
    // The accumulator is written back unconditionally.
    assert!(chunk.packets()[0]
        .actions()
        .iter()
        .any(|&a| matches!(chunk.node(a), NodeData::WriteReg { name: "rax", .. })));
    assert!(flag_writes(&chunk, 0).contains(&"zf"));
}

#[test]
fn lock_add_is_binary_atomic() {
    // lock add [rdi], eax
    let chunk = lift(&[0xf0, 0x01, 0x07], 0);
    assert_eq!(
        count_nodes(&chunk, |d| matches!(
            d,
            NodeData::BinaryAtomic {
                op: AtomicOp::Add,
                ..
            }
        )),
        1
    );
}

#[test]
fn repe_cmpsb_loops() {
    let chunk = lift(&[0xf3, 0xa6], 0);
    assert_eq!(count_nodes(&chunk, |d| matches!(d, NodeData::Label { .. })), 1);
    assert_eq!(
        count_nodes(&chunk, |d| matches!(d, NodeData::CondBr { .. })),
        1
    );
    // RSI, RDI and RCX all step.
    for reg in ["rsi", "rdi", "rcx"] {
        assert!(
            chunk.packets()[0]
                .actions()
                .iter()
                .any(|&a| matches!(chunk.node(a), NodeData::WriteReg { name, .. } if *name == reg)),
            "missing {reg} update"
        );
    }
}

#[test]
fn movzx_uses_zero_extension() {
    // movzx eax, byte [rdi]
    let chunk = lift(&[0x0f, 0xb6, 0x07], 0);
    assert!(count_nodes(&chunk, |d| matches!(
        d,
        NodeData::Cast { op: CastOp::Zx, .. }
    )) >= 1);
}

#[test]
fn movsx_uses_sign_extension() {
    // movsx eax, byte [rdi]
    let chunk = lift(&[0x0f, 0xbe, 0x07], 0);
    assert!(count_nodes(&chunk, |d| matches!(
        d,
        NodeData::Cast { op: CastOp::Sx, .. }
    )) >= 1);
}

#[test]
fn unknown_instruction_becomes_poison_call() {
    // ud2
    let chunk = lift(&[0x0f, 0x0b], 0);
    assert_eq!(
        count_nodes(&chunk, |d| matches!(d, NodeData::InternalCall { .. })),
        1
    );
}

#[test]
fn nop_classes_lift_to_empty_packets() {
    for bytes in [&[0x90u8][..], &[0xf3, 0x90], &[0x0f, 0x1f, 0x40, 0x00], &[0xf4]] {
        let chunk = lift(bytes, 0);
        assert_eq!(chunk.packets().len(), 2, "{bytes:02x?}");
        assert!(chunk.packets()[0].actions().is_empty(), "{bytes:02x?}");
    }
}

#[test]
fn decode_error_truncates_after_first_instruction() {
    // A valid mov, then garbage: one real packet plus the PC
    // resynchronization packet.
    let chunk = lift(&[0x48, 0x89, 0xd8, 0x06], 0);
    assert_eq!(chunk.packets().len(), 2);
    let sync = &chunk.packets()[1];
    assert_eq!(sync.address(), 3);
    assert!(matches!(
        chunk.node(sync.actions()[0]),
        NodeData::WritePc {
            hint: BranchHint::Fallthrough,
            ..
        }
    ));
}

#[test]
fn imul_narrow_form_truncates_double_width() {
    // imul rax, rbx
    let chunk = lift(&[0x48, 0x0f, 0xaf, 0xc3], 0);
    // 128-bit product, truncated back to 64.
    assert!(count_nodes(&chunk, |d| matches!(
        d,
        NodeData::BinaryArith { op: BinaryOp::Mul, ty, .. } if ty.width() == 128
    )) == 1);
    assert!(count_nodes(&chunk, |d| matches!(
        d,
        NodeData::Cast { op: CastOp::Trunc, ty, .. } if ty.width() == 64
    )) >= 1);
    // CF/OF written explicitly.
    assert!(flag_writes(&chunk, 0).contains(&"cf"));
    assert!(flag_writes(&chunk, 0).contains(&"of"));
}

#[test]
fn pshufd_reads_selector_two_bits_at_a_time() {
    // pshufd xmm0, xmm1, 0x1b (reverse lanes)
    let chunk = lift(&[0x66, 0x0f, 0x70, 0xc1, 0x1b], 0);
    assert_eq!(
        count_nodes(&chunk, |d| matches!(d, NodeData::VectorExtract { .. })),
        4
    );
    assert_eq!(
        count_nodes(&chunk, |d| matches!(d, NodeData::VectorInsert { .. })),
        4
    );
}

#[test]
fn dead_flags_eliminated_across_packets() {
    // add rax, rbx ; add rax, rbx — the first packet's flag writes are all
    // clobbered by the second, which is the chunk's last flag writer.
    let mut chunk = lift(&[0x48, 0x01, 0xd8, 0x48, 0x01, 0xd8], 0);
    let before = flag_writes(&chunk, 0).len();
    assert!(before >= 4);
    let stats = eliminate_dead_flags(&mut chunk);
    assert_eq!(stats.optimized, before);
    assert!(flag_writes(&chunk, 0).is_empty());
    assert_eq!(flag_writes(&chunk, 1).len(), before);
}

#[test]
fn end_packet_kinds_via_translate_one() {
    use magpie_x86::decode::decode;
    let ifr = InternalFunctionResolver::new();
    let mut b = ChunkBuilder::new(0, &ifr);

    let mov = decode(&[0x48, 0x89, 0xd8]).unwrap();
    let out = magpie_x86::translate::translate_one(&mut b, &mov, 0).unwrap();
    assert_eq!(out, magpie_x86::Outcome::Normal);

    let jmp = decode(&[0xeb, 0x00]).unwrap();
    let out = magpie_x86::translate::translate_one(&mut b, &jmp, 3).unwrap();
    assert_eq!(out, magpie_x86::Outcome::EndOfBlock);

    let chunk = b.finish();
    assert_eq!(chunk.packets().len(), 2);
    assert_eq!(chunk.packets()[1].address(), 3);
}
