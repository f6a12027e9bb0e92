//! Typed intermediate representation for the Magpie binary translator.
//!
//! The IR models one lifted region (a [`Chunk`]) as a list of [`Packet`]s,
//! one per guest instruction. A packet holds an ordered list of *action*
//! nodes (register/memory/PC writes, branches, helper calls); pure *value*
//! nodes hang off the actions through typed port references and are ordered
//! only by data dependence. The [`ChunkBuilder`] is the sole constructor of
//! IR and enforces the typing rules at node creation.
//!
//! Frontends (the x86-64 lifter) drive the builder; backends and external
//! emitters consume chunks either through the side-effect-free
//! [`visit`] protocol or by matching on [`NodeData`] directly.

#![deny(trivial_numeric_casts, unused_extern_crates)]
#![warn(missing_docs, unused_import_braces)]

mod entity;

mod builder;
mod chunk;
mod dot;
mod ifr;
mod node;
mod opt;
mod types;
pub mod visit;
mod write;

pub use crate::builder::{BuildResult, BuilderError, ChunkBuilder};
pub use crate::chunk::{Chunk, Packet, PacketKind};
pub use crate::dot::chunk_to_dot;
pub use crate::entity::{EntityRef, PrimaryMap};
pub use crate::ifr::{InternalFunction, InternalFunctionResolver, HANDLE_POISON};
pub use crate::node::{
    AtomicOp, BinaryOp, BranchHint, CastOp, Local, Node, NodeData, Port, PortRef, PortTag,
    Rounding, ShiftOp, TernaryOp, UnaryOp,
};
pub use crate::opt::{eliminate_dead_flags, DeadFlagStats};
pub use crate::types::{TypeClass, ValueType};
pub use crate::write::{chunk_to_string, node_to_string};
