//! Text dump of chunks.

use crate::chunk::{Chunk, Packet};
use crate::node::{CastOp, Node, NodeData};
use crate::visit::{walk_chunk, Visitor};
use core::fmt::Write;

/// Render one node as a line of text, e.g. `n5 = add n3, n4 : u64`.
pub fn node_to_string(chunk: &Chunk, node: Node) -> String {
    let data = chunk.node(node);
    let mut s = String::new();
    if !data.is_action() {
        let _ = write!(s, "{node} = ");
    }
    match data {
        NodeData::Constant { ty, bits } => {
            let _ = write!(s, "const {bits:#x} : {ty}");
        }
        NodeData::ReadPc => {
            let _ = write!(s, "read_pc : u64");
        }
        NodeData::ReadReg { ty, name, .. } => {
            let _ = write!(s, "read_reg {name} : {ty}");
        }
        NodeData::ReadMem { ty, addr } => {
            let _ = write!(s, "read_mem [{addr}] : {ty}");
        }
        NodeData::ReadLocal { ty, local } => {
            let _ = write!(s, "read_local {local} : {ty}");
        }
        NodeData::UnaryArith { op, ty, value } => {
            let _ = write!(s, "{op:?} {value} : {ty}");
        }
        NodeData::BinaryArith { op, ty, lhs, rhs } => {
            let _ = write!(s, "{op:?} {lhs}, {rhs} : {ty}");
        }
        NodeData::TernaryArith {
            op,
            ty,
            lhs,
            rhs,
            carry,
        } => {
            let _ = write!(s, "{op:?} {lhs}, {rhs}, {carry} : {ty}");
        }
        NodeData::Cast { op, ty, value } => {
            let name = match op {
                CastOp::Zx => "zx",
                CastOp::Sx => "sx",
                CastOp::Trunc => "trunc",
                CastOp::Bitcast => "bitcast",
                CastOp::Convert(_) => "convert",
            };
            let _ = write!(s, "{name} {value} : {ty}");
        }
        NodeData::Csel {
            ty,
            cond,
            tval,
            fval,
        } => {
            let _ = write!(s, "csel {cond}, {tval}, {fval} : {ty}");
        }
        NodeData::BitShift {
            op,
            ty,
            value,
            amount,
        } => {
            let _ = write!(s, "{op:?} {value}, {amount} : {ty}");
        }
        NodeData::BitExtract {
            ty,
            value,
            from,
            length,
        } => {
            let _ = write!(s, "bit_extract {value}, {from}, {length} : {ty}");
        }
        NodeData::BitInsert {
            ty,
            value,
            bits,
            to,
            length,
        } => {
            let _ = write!(s, "bit_insert {value}, {bits}, {to}, {length} : {ty}");
        }
        NodeData::VectorExtract { ty, value, index } => {
            let _ = write!(s, "vextract {value}, {index} : {ty}");
        }
        NodeData::VectorInsert {
            ty,
            value,
            elem,
            index,
        } => {
            let _ = write!(s, "vinsert {value}, {index}, {elem} : {ty}");
        }
        NodeData::WriteReg { name, value, .. } => {
            let _ = write!(s, "write_reg {name}, {value}");
        }
        NodeData::WriteMem { addr, value } => {
            let _ = write!(s, "write_mem [{addr}], {value}");
        }
        NodeData::WritePc { value, hint } => {
            let _ = write!(s, "write_pc {value} ({hint:?})");
        }
        NodeData::Label { name } => match name {
            Some(n) => {
                let _ = write!(s, "label {node} \"{n}\":");
            }
            None => {
                let _ = write!(s, "label {node}:");
            }
        },
        NodeData::Br { target } => {
            let _ = write!(s, "br {target}");
        }
        NodeData::CondBr { cond, target } => {
            let _ = write!(s, "cond_br {cond}, {target}");
        }
        NodeData::InternalCall { func, args } => {
            let _ = write!(s, "call {func}(");
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    let _ = write!(s, ", ");
                }
                let _ = write!(s, "{a}");
            }
            let _ = write!(s, ")");
        }
        NodeData::WriteLocal { local, value } => {
            let _ = write!(s, "write_local {local}, {value}");
        }
        NodeData::BinaryAtomic { op, ty, addr, src } => {
            let _ = write!(s, "atomic_{op:?} [{addr}], {src} : {ty}");
        }
        NodeData::TernaryAtomic {
            ty,
            addr,
            expected,
            desired,
        } => {
            let _ = write!(s, "atomic_cmpxchg [{addr}], {expected}, {desired} : {ty}");
        }
    }
    s
}

struct Printer {
    out: String,
}

impl Visitor for Printer {
    fn visit_packet_start(&mut self, _chunk: &Chunk, packet: &Packet) {
        let _ = writeln!(self.out, "{:#x}: {}", packet.address(), packet.disasm());
    }

    fn visit_node(&mut self, chunk: &Chunk, node: Node, _data: &NodeData) {
        let _ = writeln!(self.out, "    {}", node_to_string(chunk, node));
    }
}

/// Dump a whole chunk as text.
pub fn chunk_to_string(chunk: &Chunk) -> String {
    let mut p = Printer {
        out: format!("chunk @ {:#x}\n", chunk.address()),
    };
    walk_chunk(&mut p, chunk);
    p.out
}

impl core::fmt::Display for Chunk {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&chunk_to_string(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChunkBuilder, InternalFunctionResolver, ValueType};

    #[test]
    fn dump_contains_actions_and_values() {
        let ifr = InternalFunctionResolver::new();
        let mut b = ChunkBuilder::new(0x400000, &ifr);
        b.begin_packet(0x400000, "xor rax, rax");
        let r = b.read_reg(ValueType::u64(), 8, 1, "rax").unwrap();
        let x = b.bxor(r.val(), r.val()).unwrap();
        b.write_reg(8, 1, "rax", x.val()).unwrap();
        b.end_packet();
        let text = b.finish().to_string();
        assert!(text.contains("xor rax, rax"));
        assert!(text.contains("read_reg rax"));
        assert!(text.contains("write_reg rax"));
    }
}
