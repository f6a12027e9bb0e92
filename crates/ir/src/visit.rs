//! Chunk traversal.
//!
//! Consumers of the IR (debug dump, dot output, external emitters) walk a
//! chunk through the [`Visitor`] trait. The walk is read-only and has no
//! side effects on the chunk: action nodes are visited in packet order and
//! value nodes are visited once each, producers before their first
//! consumer. Dispatch always reaches the most-specific callback for a
//! node's kind; the generic [`Visitor::visit_node`] hook runs first.

use crate::chunk::{Chunk, Packet};
use crate::node::{Node, NodeData};
use rustc_hash::FxHashSet;

/// Traversal callbacks. All methods have empty defaults; implement the ones
/// of interest.
pub trait Visitor {
    fn visit_chunk_start(&mut self, _chunk: &Chunk) {}
    fn visit_chunk_end(&mut self, _chunk: &Chunk) {}
    fn visit_packet_start(&mut self, _chunk: &Chunk, _packet: &Packet) {}
    fn visit_packet_end(&mut self, _chunk: &Chunk, _packet: &Packet) {}

    /// Called for every node before its kind-specific callback.
    fn visit_node(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}

    fn visit_constant(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_read_pc(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_read_reg(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_read_mem(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_read_local(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_unary_arith(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_binary_arith(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_ternary_arith(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_cast(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_csel(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_bit_shift(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_bit_extract(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_bit_insert(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_vector_extract(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_vector_insert(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_write_reg(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_write_mem(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_write_pc(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_label(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_br(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_cond_br(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_internal_call(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_write_local(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_binary_atomic(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
    fn visit_ternary_atomic(&mut self, _chunk: &Chunk, _node: Node, _data: &NodeData) {}
}

fn dispatch<V: Visitor + ?Sized>(v: &mut V, chunk: &Chunk, node: Node, data: &NodeData) {
    v.visit_node(chunk, node, data);
    match data {
        NodeData::Constant { .. } => v.visit_constant(chunk, node, data),
        NodeData::ReadPc => v.visit_read_pc(chunk, node, data),
        NodeData::ReadReg { .. } => v.visit_read_reg(chunk, node, data),
        NodeData::ReadMem { .. } => v.visit_read_mem(chunk, node, data),
        NodeData::ReadLocal { .. } => v.visit_read_local(chunk, node, data),
        NodeData::UnaryArith { .. } => v.visit_unary_arith(chunk, node, data),
        NodeData::BinaryArith { .. } => v.visit_binary_arith(chunk, node, data),
        NodeData::TernaryArith { .. } => v.visit_ternary_arith(chunk, node, data),
        NodeData::Cast { .. } => v.visit_cast(chunk, node, data),
        NodeData::Csel { .. } => v.visit_csel(chunk, node, data),
        NodeData::BitShift { .. } => v.visit_bit_shift(chunk, node, data),
        NodeData::BitExtract { .. } => v.visit_bit_extract(chunk, node, data),
        NodeData::BitInsert { .. } => v.visit_bit_insert(chunk, node, data),
        NodeData::VectorExtract { .. } => v.visit_vector_extract(chunk, node, data),
        NodeData::VectorInsert { .. } => v.visit_vector_insert(chunk, node, data),
        NodeData::WriteReg { .. } => v.visit_write_reg(chunk, node, data),
        NodeData::WriteMem { .. } => v.visit_write_mem(chunk, node, data),
        NodeData::WritePc { .. } => v.visit_write_pc(chunk, node, data),
        NodeData::Label { .. } => v.visit_label(chunk, node, data),
        NodeData::Br { .. } => v.visit_br(chunk, node, data),
        NodeData::CondBr { .. } => v.visit_cond_br(chunk, node, data),
        NodeData::InternalCall { .. } => v.visit_internal_call(chunk, node, data),
        NodeData::WriteLocal { .. } => v.visit_write_local(chunk, node, data),
        NodeData::BinaryAtomic { .. } => v.visit_binary_atomic(chunk, node, data),
        NodeData::TernaryAtomic { .. } => v.visit_ternary_atomic(chunk, node, data),
    }
}

fn walk_value<V: Visitor + ?Sized>(
    v: &mut V,
    chunk: &Chunk,
    node: Node,
    seen: &mut FxHashSet<Node>,
) {
    if !seen.insert(node) {
        return;
    }
    let data = chunk.node(node);
    // Producers first.
    data.visit_operands(&mut |p| walk_value(v, chunk, p.node, seen));
    dispatch(v, chunk, node, data);
}

/// Walk one packet: operand trees of each action in order, then the action
/// itself.
pub fn walk_packet<V: Visitor + ?Sized>(
    v: &mut V,
    chunk: &Chunk,
    packet: &Packet,
    seen: &mut FxHashSet<Node>,
) {
    v.visit_packet_start(chunk, packet);
    for &action in packet.actions() {
        let data = chunk.node(action);
        data.visit_operands(&mut |p| walk_value(v, chunk, p.node, seen));
        dispatch(v, chunk, action, data);
    }
    v.visit_packet_end(chunk, packet);
}

/// Walk a whole chunk in packet order.
pub fn walk_chunk<V: Visitor + ?Sized>(v: &mut V, chunk: &Chunk) {
    let mut seen = FxHashSet::default();
    v.visit_chunk_start(chunk);
    for packet in chunk.packets() {
        walk_packet(v, chunk, packet, &mut seen);
    }
    v.visit_chunk_end(chunk);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChunkBuilder, InternalFunctionResolver, ValueType};

    #[derive(Default)]
    struct Counter {
        nodes: usize,
        constants: usize,
        writes: usize,
        packets: usize,
    }

    impl Visitor for Counter {
        fn visit_node(&mut self, _: &Chunk, _: Node, _: &NodeData) {
            self.nodes += 1;
        }
        fn visit_constant(&mut self, _: &Chunk, _: Node, _: &NodeData) {
            self.constants += 1;
        }
        fn visit_write_reg(&mut self, _: &Chunk, _: Node, _: &NodeData) {
            self.writes += 1;
        }
        fn visit_packet_start(&mut self, _: &Chunk, _: &Packet) {
            self.packets += 1;
        }
    }

    #[test]
    fn walk_visits_values_once() {
        let ifr = InternalFunctionResolver::new();
        let mut b = ChunkBuilder::new(0, &ifr);
        b.begin_packet(0, "");
        let c = b.constant_u64(1).unwrap();
        let r = b.read_reg(ValueType::u64(), 8, 1, "rax").unwrap();
        let s = b.add(r.val(), c.val()).unwrap();
        // Shared producer: two writes of the same sum.
        b.write_reg(8, 1, "rax", s.val()).unwrap();
        b.write_reg(16, 2, "rcx", s.val()).unwrap();
        b.end_packet();
        let chunk = b.finish();

        let mut counter = Counter::default();
        walk_chunk(&mut counter, &chunk);
        assert_eq!(counter.packets, 1);
        assert_eq!(counter.constants, 1);
        assert_eq!(counter.writes, 2);
        // constant + read + add + 2 writes
        assert_eq!(counter.nodes, 5);
    }
}
