//! Dead flag elimination.
//!
//! x86 translation writes the full flag set after most arithmetic, but the
//! vast majority of those writes are clobbered before anything reads them.
//! This pass walks a chunk in reverse (packets reversed, actions within a
//! packet reversed) tracking which flag registers are live, and deletes
//! flag writes that are never read. Writes in the last packet that touches
//! flags are kept: a successor chunk may observe them.
//!
//! Deleting the `write_reg` is sufficient to disconnect the producer's flag
//! port; backends materialize flag ports only on demand, so an unreferenced
//! port generates no code.

use crate::chunk::Chunk;
use crate::node::NodeData;
use log::debug;
use rustc_hash::FxHashSet;

const FLAG_NAMES: [&str; 6] = ["zf", "cf", "of", "sf", "pf", "af"];

fn is_flag(name: &str) -> bool {
    FLAG_NAMES.contains(&name)
}

/// Counters reported by [`eliminate_dead_flags`].
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct DeadFlagStats {
    /// Flag writes removed.
    pub optimized: usize,
    /// Flag writes inspected.
    pub total: usize,
}

/// Run dead-flag elimination over one chunk. Idempotent.
pub fn eliminate_dead_flags(chunk: &mut Chunk) -> DeadFlagStats {
    let mut stats = DeadFlagStats::default();
    let mut live: FxHashSet<u16> = FxHashSet::default();

    // The last packet with a flag write must keep its writes.
    let last_flag_packet = chunk.packets().iter().rposition(|p| {
        p.actions().iter().any(|&a| {
            matches!(chunk.node(a), NodeData::WriteReg { name, .. } if is_flag(name))
        })
    });

    let num_packets = chunk.packets().len();
    let mut deleted: Vec<Vec<usize>> = vec![Vec::new(); num_packets];

    for pi in (0..num_packets).rev() {
        let actions: Vec<_> = chunk.packets()[pi].actions().to_vec();
        for (ai, &action) in actions.iter().enumerate().rev() {
            if let NodeData::WriteReg { index, name, .. } = chunk.node(action) {
                if is_flag(name) {
                    stats.total += 1;
                    if Some(pi) == last_flag_packet {
                        // Kept unconditionally; may be read by a successor.
                    } else if live.remove(index) {
                        // Read later; keep, and the write kills liveness.
                    } else {
                        deleted[pi].push(ai);
                        stats.optimized += 1;
                        continue;
                    }
                }
            }
            // Reads reachable from this (kept) action make flags live.
            mark_reads(chunk, action, &mut live);
        }
    }

    for (pi, dead) in deleted.into_iter().enumerate() {
        if dead.is_empty() {
            continue;
        }
        let dead: FxHashSet<usize> = dead.into_iter().collect();
        let packet = &mut chunk.packets_mut()[pi];
        let kept = packet
            .actions()
            .iter()
            .enumerate()
            .filter(|(i, _)| !dead.contains(i))
            .map(|(_, &a)| a)
            .collect();
        packet.set_actions(kept);
    }

    debug!(
        "dead flags pass: removed {}/{} flag writes",
        stats.optimized, stats.total
    );
    stats
}

fn mark_reads(chunk: &Chunk, node: crate::Node, live: &mut FxHashSet<u16>) {
    let data = chunk.node(node);
    if let NodeData::ReadReg { index, name, .. } = data {
        if is_flag(name) {
            live.insert(*index);
        }
    }
    data.visit_operands(&mut |p| mark_reads(chunk, p.node, live));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChunkBuilder, InternalFunctionResolver, ValueType};

    // Flag slots used by the tests; offsets/indices mimic the guest layout.
    const ZF: (u32, u16) = (136, 17);
    const CF: (u32, u16) = (137, 18);

    fn write_both_flags(b: &mut ChunkBuilder, addr: u64) {
        b.begin_packet(addr, "add rax, rbx");
        let l = b.read_reg(ValueType::u64(), 8, 1, "rax").unwrap();
        let r = b.read_reg(ValueType::u64(), 32, 4, "rbx").unwrap();
        let s = b.add(l.val(), r.val()).unwrap();
        b.write_reg(8, 1, "rax", s.val()).unwrap();
        b.write_reg(ZF.0, ZF.1, "zf", s.zero()).unwrap();
        b.write_reg(CF.0, CF.1, "cf", s.carry()).unwrap();
        b.end_packet();
    }

    #[test]
    fn clobbered_flags_removed_last_packet_kept() {
        let ifr = InternalFunctionResolver::new();
        let mut b = ChunkBuilder::new(0, &ifr);
        write_both_flags(&mut b, 0);
        write_both_flags(&mut b, 4);
        let mut chunk = b.finish();

        let stats = eliminate_dead_flags(&mut chunk);
        // First packet's two writes are clobbered by the second packet's;
        // the second packet is the last flag writer and is kept.
        assert_eq!(stats, DeadFlagStats { optimized: 2, total: 4 });
        assert_eq!(chunk.packets()[0].actions().len(), 1);
        assert_eq!(chunk.packets()[1].actions().len(), 3);
    }

    #[test]
    fn read_keeps_flag_alive() {
        let ifr = InternalFunctionResolver::new();
        let mut b = ChunkBuilder::new(0, &ifr);
        write_both_flags(&mut b, 0);

        // A packet reading ZF (a setcc shape).
        b.begin_packet(4, "setz cl");
        let zf = b.read_reg(ValueType::u1(), ZF.0, ZF.1, "zf").unwrap();
        let wide = b.zx(ValueType::u8(), zf.val()).unwrap();
        b.write_reg(16, 2, "rcx", wide.val()).unwrap();
        b.end_packet();

        write_both_flags(&mut b, 8);
        let mut chunk = b.finish();

        let stats = eliminate_dead_flags(&mut chunk);
        // Packet 0: ZF read by packet 1, kept; CF dead, removed.
        assert_eq!(stats, DeadFlagStats { optimized: 1, total: 4 });
        assert_eq!(chunk.packets()[0].actions().len(), 2);
    }

    #[test]
    fn pass_is_idempotent() {
        let ifr = InternalFunctionResolver::new();
        let mut b = ChunkBuilder::new(0, &ifr);
        write_both_flags(&mut b, 0);
        write_both_flags(&mut b, 4);
        let mut chunk = b.finish();

        eliminate_dead_flags(&mut chunk);
        let after_once: Vec<Vec<_>> = chunk
            .packets()
            .iter()
            .map(|p| p.actions().to_vec())
            .collect();
        let second = eliminate_dead_flags(&mut chunk);
        let after_twice: Vec<Vec<_>> = chunk
            .packets()
            .iter()
            .map(|p| p.actions().to_vec())
            .collect();
        assert_eq!(second.optimized, 0);
        assert_eq!(after_once, after_twice);
    }
}
