//! Graphviz output.
//!
//! Renders a chunk as a dot digraph: one subgraph cluster per packet, one
//! record node per IR node, and an edge from every producer port to its
//! consumer.

use crate::chunk::{Chunk, Packet};
use crate::node::{Node, NodeData, PortRef};
use crate::visit::{walk_chunk, Visitor};
use crate::write::node_to_string;
use core::fmt::Write;

struct DotGenerator {
    out: String,
    cluster: usize,
    in_packet: bool,
    edges: Vec<(PortRef, Node)>,
}

impl DotGenerator {
    fn close_packet(&mut self) {
        if self.in_packet {
            self.out.push_str("  }\n");
            self.in_packet = false;
        }
    }
}

impl Visitor for DotGenerator {
    fn visit_packet_start(&mut self, _chunk: &Chunk, packet: &Packet) {
        self.close_packet();
        let _ = writeln!(self.out, "  subgraph cluster_{} {{", self.cluster);
        let _ = writeln!(
            self.out,
            "    label=\"{:#x}: {}\";",
            packet.address(),
            packet.disasm().replace('"', "\\\"")
        );
        self.cluster += 1;
        self.in_packet = true;
    }

    fn visit_node(&mut self, chunk: &Chunk, node: Node, data: &NodeData) {
        let shape = if data.is_action() { "box" } else { "ellipse" };
        let label = node_to_string(chunk, node).replace('"', "\\\"");
        let _ = writeln!(
            self.out,
            "    {node} [shape={shape}, label=\"{label}\"];"
        );
        data.visit_operands(&mut |p| self.edges.push((p, node)));
    }

    fn visit_chunk_end(&mut self, _chunk: &Chunk) {
        self.close_packet();
        for (port, user) in &self.edges {
            let tag = match port.tag {
                crate::PortTag::Value => "",
                crate::PortTag::Zero => " [label=\"z\"]",
                crate::PortTag::Negative => " [label=\"n\"]",
                crate::PortTag::Overflow => " [label=\"v\"]",
                crate::PortTag::Carry => " [label=\"c\"]",
            };
            let _ = writeln!(self.out, "  {} -> {}{};", port.node, user, tag);
        }
    }
}

/// Render `chunk` as a Graphviz digraph.
pub fn chunk_to_dot(chunk: &Chunk) -> String {
    let mut gen = DotGenerator {
        out: format!("digraph chunk_{:x} {{\n  rankdir=TB;\n", chunk.address()),
        cluster: 0,
        in_packet: false,
        edges: Vec::new(),
    };
    walk_chunk(&mut gen, chunk);
    gen.out.push_str("}\n");
    gen.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChunkBuilder, InternalFunctionResolver, ValueType};

    #[test]
    fn dot_output_is_wellformed() {
        let ifr = InternalFunctionResolver::new();
        let mut b = ChunkBuilder::new(0x1000, &ifr);
        b.begin_packet(0x1000, "add rax, 1");
        let r = b.read_reg(ValueType::u64(), 8, 1, "rax").unwrap();
        let one = b.constant_u64(1).unwrap();
        let s = b.add(r.val(), one.val()).unwrap();
        b.write_reg(8, 1, "rax", s.val()).unwrap();
        b.end_packet();
        let dot = chunk_to_dot(&b.finish());
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("subgraph cluster_0"));
        assert!(dot.contains("->"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
