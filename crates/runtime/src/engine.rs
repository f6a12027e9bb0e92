//! The execution engine: translation cache and dispatch loop.

use crate::arena::{CodeArena, GuestMemory};
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};
use magpie_codegen::TargetIsa;
use magpie_ir::{eliminate_dead_flags, ChunkBuilder, InternalFunctionResolver, HANDLE_POISON};
use magpie_x86::state::CpuState;
use magpie_x86::translate::lift_chunk;
use rustc_hash::FxHashMap;
use std::sync::Mutex;
use target_lexicon::Triple;

/// Entry signature of translated chunks: CPU state in, status out.
type EntryFn = unsafe extern "C" fn(*mut CpuState) -> i32;

/// Status returned by [`Engine::invoke`] when the PC cannot be translated.
pub const INVOKE_UNTRANSLATABLE: i32 = 1;

/// The poison helper: called by translated code for instructions without a
/// translator. Logs and continues; hard trapping is the embedder's call.
extern "C" fn magpie_handle_poison(state: *mut CpuState, site: u64) {
    let rip = unsafe { (*state).rip };
    warn!("poison instruction at rip={rip:#x} (site label {site})");
}

fn poison_address() -> u64 {
    magpie_handle_poison as extern "C" fn(*mut CpuState, u64) as usize as u64
}

/// Maximum guest instructions lifted into one chunk.
const CHUNK_BUDGET: usize = 64;

/// Owns the translation pipeline and the guest's memory.
///
/// Translation is single-threaded per chunk; the cache and arena are the
/// only shared state, each behind its own mutex. Cache entries are never
/// mutated after insertion.
pub struct Engine {
    isa: Box<dyn TargetIsa>,
    ifr: InternalFunctionResolver,
    memory: GuestMemory,
    arena: Mutex<CodeArena>,
    cache: Mutex<FxHashMap<u64, usize>>,
}

impl Engine {
    /// An engine targeting the host, with `mem_size` bytes of guest
    /// memory.
    pub fn new(mem_size: usize) -> Result<Engine> {
        Self::with_triple(&Triple::host(), mem_size)
    }

    /// An engine for an explicit target triple. Only useful for inspecting
    /// translation output when the target is not the host.
    pub fn with_triple(triple: &Triple, mem_size: usize) -> Result<Engine> {
        let isa = magpie_codegen::lookup(triple)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("selecting backend for {triple}"))?;
        let mut ifr = InternalFunctionResolver::new();
        ifr.register(HANDLE_POISON, poison_address());
        Ok(Engine {
            isa,
            ifr,
            memory: GuestMemory::new(mem_size).context("mapping guest memory")?,
            arena: Mutex::new(CodeArena::new(16 << 20).context("mapping code arena")?),
            cache: Mutex::new(FxHashMap::default()),
        })
    }

    /// The guest memory region.
    pub fn memory(&self) -> &GuestMemory {
        &self.memory
    }

    /// A zeroed CPU state wired to this engine's guest memory.
    pub fn new_state(&self) -> CpuState {
        let mut state = CpuState::new();
        state.mem_base = self.memory.base();
        state
    }

    /// Translate the chunk at `pc` (or find it in the cache) and return
    /// its host code address.
    pub fn translate(&self, pc: u64) -> Result<usize> {
        if let Some(&entry) = self.cache.lock().unwrap().get(&pc) {
            return Ok(entry);
        }

        let window_len = (self.memory.size() as u64)
            .checked_sub(pc)
            .ok_or_else(|| anyhow!("guest PC {pc:#x} outside guest memory"))?;
        let window = self
            .memory
            .slice(pc, window_len as usize)
            .ok_or_else(|| anyhow!("guest PC {pc:#x} outside guest memory"))?;

        let mut builder = ChunkBuilder::new(pc, &self.ifr);
        lift_chunk(&mut builder, window, pc, CHUNK_BUDGET)
            .with_context(|| format!("lifting chunk at {pc:#x}"))?;
        let mut chunk = builder.finish();

        let stats = eliminate_dead_flags(&mut chunk);
        debug!(
            "chunk {pc:#x}: {} packets, dead flags {}/{}",
            chunk.packets().len(),
            stats.optimized,
            stats.total
        );

        let code = self
            .isa
            .translate_chunk(&chunk, &self.ifr)
            .with_context(|| format!("lowering chunk at {pc:#x} for {}", self.isa.name()))?;

        let entry = {
            let mut arena = self.arena.lock().unwrap();
            arena.commit(&code).context("committing code")? as usize
        };

        // Lookup-or-insert: a racing translation of the same PC wins
        // harmlessly; entries are equivalent.
        let mut cache = self.cache.lock().unwrap();
        let entry = *cache.entry(pc).or_insert(entry);
        debug!(
            "chunk {pc:#x}: {} bytes of {} code at {entry:#x}",
            code.len(),
            self.isa.name()
        );
        Ok(entry)
    }

    /// Translate on demand and enter generated code at the state's PC.
    /// Returns 0 after the chunk ran, [`INVOKE_UNTRANSLATABLE`] when the
    /// PC has no translation.
    pub fn invoke(&self, state: &mut CpuState) -> i32 {
        let pc = state.rip;
        let entry = match self.translate(pc) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("cannot translate pc {pc:#x}: {e:#}");
                return INVOKE_UNTRANSLATABLE;
            }
        };
        let f: EntryFn = unsafe { std::mem::transmute::<usize, EntryFn>(entry) };
        unsafe { f(state as *mut CpuState) }
    }

    /// Dispatch loop: translate and run chunks until the guest reaches
    /// `stop_pc` or a chunk fails. The final status is returned.
    pub fn run(&self, state: &mut CpuState, stop_pc: u64) -> Result<()> {
        loop {
            if state.rip == stop_pc {
                return Ok(());
            }
            let status = self.invoke(state);
            if status != 0 {
                bail!(
                    "invoke failed with status {status} at rip={:#x}",
                    state.rip
                );
            }
        }
    }
}
