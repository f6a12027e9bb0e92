//! Packets and chunks.
//!
//! A packet is the IR of one guest instruction: the guest address, the
//! disassembly text for debug output, and the ordered list of action nodes.
//! A chunk is a lifted region (typically one guest function or basic-block
//! region) and owns the arena backing every node in it.

use crate::entity::PrimaryMap;
use crate::node::{Local, Node, NodeData, Port, PortRef, PortTag};
use crate::types::ValueType;

/// How a packet ended.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PacketKind {
    /// Control continues to the next instruction.
    Normal,
    /// The packet wrote the PC with something other than a fall-through
    /// advance; the chunk ends here.
    EndOfBlock,
}

/// The IR representation of one guest instruction.
#[derive(Clone)]
pub struct Packet {
    address: u64,
    disasm: String,
    actions: Vec<Node>,
}

impl Packet {
    pub(crate) fn new(address: u64, disasm: String) -> Self {
        Self {
            address,
            disasm,
            actions: Vec::new(),
        }
    }

    /// Guest address of the instruction this packet was lifted from.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Disassembly of the source instruction. Debug output only.
    pub fn disasm(&self) -> &str {
        &self.disasm
    }

    /// The action nodes of this packet, in insertion order.
    pub fn actions(&self) -> &[Node] {
        &self.actions
    }

    pub(crate) fn push_action(&mut self, n: Node) {
        self.actions.push(n);
    }

    /// Replace the action list. Used by optimization passes that delete
    /// actions; the replacement must be a subsequence of the original.
    pub fn set_actions(&mut self, actions: Vec<Node>) {
        self.actions = actions;
    }
}

/// A lifted region: a sequence of packets in address order plus the arena
/// that owns their nodes and local variable slots.
pub struct Chunk {
    address: u64,
    nodes: PrimaryMap<Node, NodeData>,
    locals: PrimaryMap<Local, ValueType>,
    packets: Vec<Packet>,
}

impl Chunk {
    /// Create an empty chunk anchored at `address`.
    pub fn new(address: u64) -> Self {
        Self {
            address,
            nodes: PrimaryMap::new(),
            locals: PrimaryMap::new(),
            packets: Vec::new(),
        }
    }

    /// Guest address of the chunk entry.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// The packets of this chunk in address order.
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Mutable access to the packets, for optimization passes.
    pub fn packets_mut(&mut self) -> &mut [Packet] {
        &mut self.packets
    }

    /// Look up a node's data.
    pub fn node(&self, n: Node) -> &NodeData {
        &self.nodes[n]
    }

    /// Number of nodes in the chunk arena.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over every node in creation order.
    pub fn nodes(&self) -> impl DoubleEndedIterator<Item = (Node, &NodeData)> {
        self.nodes.iter()
    }

    /// The declared type of a local variable slot.
    pub fn local_ty(&self, local: Local) -> ValueType {
        self.locals[local]
    }

    /// Iterate over the local variable slots.
    pub fn locals(&self) -> impl Iterator<Item = (Local, ValueType)> + '_ {
        self.locals.iter().map(|(l, t)| (l, *t))
    }

    /// Resolve a port reference into its type and owner.
    ///
    /// Panics if the node does not expose the referenced port; the builder
    /// only hands out references to ports that exist.
    pub fn port(&self, p: PortRef) -> Port {
        let data = self.node(p.node);
        debug_assert!(data.has_port(p.tag), "{} has no {:?} port", p.node, p.tag);
        let ty = match p.tag {
            PortTag::Value => data.result_ty(),
            _ => ValueType::u1(),
        };
        Port {
            owner: p.node,
            tag: p.tag,
            ty,
        }
    }

    /// Shorthand for the type of a port.
    pub fn port_ty(&self, p: PortRef) -> ValueType {
        self.port(p).ty
    }

    pub(crate) fn add_node(&mut self, data: NodeData) -> Node {
        self.nodes.push(data)
    }

    pub(crate) fn add_local(&mut self, ty: ValueType) -> Local {
        self.locals.push(ty)
    }

    pub(crate) fn add_packet(&mut self, p: Packet) {
        self.packets.push(p);
    }
}
