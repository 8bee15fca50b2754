//! Embedding facade
//!
//! [`KarelVm`] owns the compiled program, the world, and the run status.
//! Hosts sequence it as: load (source or file) → load_world → run_symbol →
//! read_world. A cloneable [`ExecHandle`] carries the status cell and the
//! cancellation flag to other threads, so a GUI can short-circuit a run it
//! started on a worker thread. Dropping the VM releases everything.

use crate::bytecode::{disassemble, validate, Bytecode};
use crate::compiler::{CompileError, Compiler};
use crate::vm::{Interpreter, RunError, RunStats};
use crate::world::{City, Karel, World, WorldError, CITY_AREA};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Result codes exposed at the embedding boundary.
///
/// Every facade outcome collapses to one of these; [`Status::UnknownError`]
/// absorbs anything without a closer code. `NotInitialized` is reserved for
/// hosts that layer an init/deinit shim over the handle API.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success = 0,
    UnknownError = 1,
    NotInitialized = 2,
    FileNotFound = 3,
    CompilationError = 4,
    StateNotValid = 5,
    SymbolNotFound = 6,
    StepOutOfBounds = 7,
    PickupZeroFlags = 8,
    PlaceMaxFlags = 9,
    StopEncountered = 10,
    InProgress = 11,
}

impl Status {
    fn from_u8(code: u8) -> Self {
        match code {
            0 => Status::Success,
            2 => Status::NotInitialized,
            3 => Status::FileNotFound,
            4 => Status::CompilationError,
            5 => Status::StateNotValid,
            6 => Status::SymbolNotFound,
            7 => Status::StepOutOfBounds,
            8 => Status::PickupZeroFlags,
            9 => Status::PlaceMaxFlags,
            10 => Status::StopEncountered,
            11 => Status::InProgress,
            _ => Status::UnknownError,
        }
    }

    fn from_run_error(err: &RunError) -> Self {
        match err {
            RunError::StepOutOfBounds { .. } => Status::StepOutOfBounds,
            RunError::PickupZeroFlags { .. } => Status::PickupZeroFlags,
            RunError::PlaceMaxFlags { .. } => Status::PlaceMaxFlags,
            RunError::StopEncountered { .. } => Status::StopEncountered,
            // A cancelled run parks the status back at success.
            RunError::Cancelled => Status::Success,
            RunError::InvalidInstruction { .. } => Status::UnknownError,
        }
    }
}

impl From<&VmError> for Status {
    fn from(err: &VmError) -> Self {
        match err {
            VmError::Compile(_) => Status::CompilationError,
            VmError::Run(run) => Status::from_run_error(run),
            VmError::World(_) => Status::UnknownError,
            VmError::StateNotValid => Status::StateNotValid,
            VmError::SymbolNotFound { .. } => Status::SymbolNotFound,
            VmError::FileNotFound { .. } => Status::FileNotFound,
        }
    }
}

/// Facade-level error: everything a host call can fail with.
#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    World(#[from] WorldError),
    /// Program or world not loaded yet
    #[error("no valid program and world loaded")]
    StateNotValid,
    #[error("symbol {name:?} is not defined")]
    SymbolNotFound { name: String },
    #[error("cannot read {path}: {source}")]
    FileNotFound {
        path: String,
        source: std::io::Error,
    },
}

/// One entry of the symbol dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedSymbol {
    pub name: String,
    pub addr: u32,
}

#[derive(Debug, Default)]
struct ExecShared {
    /// Current [`Status`] as its `u8` discriminant
    status: AtomicU8,
    cancel: AtomicBool,
}

/// Cloneable view of a VM's run status plus the cancellation switch.
///
/// Obtained from [`KarelVm::handle`] before handing the VM to a worker
/// thread; all methods are safe to call from any thread.
#[derive(Debug, Clone)]
pub struct ExecHandle {
    shared: Arc<ExecShared>,
}

impl ExecHandle {
    /// Current interpreter status.
    pub fn status(&self) -> Status {
        Status::from_u8(self.shared.status.load(Ordering::Acquire))
    }

    /// Cancel an in-progress run and block until it has stopped.
    ///
    /// The dispatch loop observes the flag within one instruction; this
    /// returns once the status has left [`Status::InProgress`]. Calling it
    /// with no run in flight is a no-op.
    pub fn short_circuit(&self) {
        self.shared.cancel.store(true, Ordering::Relaxed);
        while self.status() == Status::InProgress {
            std::thread::yield_now();
        }
    }
}

/// The virtual machine facade. See the module docs for the call sequence.
#[derive(Debug)]
pub struct KarelVm {
    bytecode: Bytecode,
    world: World,
    bytecode_valid: bool,
    world_valid: bool,
    exec: Arc<ExecShared>,
}

impl Default for KarelVm {
    fn default() -> Self {
        Self::new()
    }
}

impl KarelVm {
    /// Create a VM with no program and no world loaded.
    pub fn new() -> Self {
        Self {
            bytecode: Bytecode::default(),
            world: World::default(),
            bytecode_valid: false,
            world_valid: false,
            exec: Arc::new(ExecShared::default()),
        }
    }

    /// Compile `source`, replacing any previously loaded program.
    ///
    /// On error nothing of the previous or the failed program remains
    /// loaded.
    pub fn load(&mut self, source: &str) -> Result<(), VmError> {
        self.bytecode = Bytecode::default();
        self.bytecode_valid = false;

        let bytecode = Compiler::compile(source)?;
        debug_assert!(
            validate(&bytecode).is_ok(),
            "compiler emitted invalid bytecode"
        );
        self.bytecode = bytecode;
        self.bytecode_valid = true;
        Ok(())
    }

    /// Read and compile a source file.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), VmError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| VmError::FileNotFound {
            path: path.display().to_string(),
            source,
        })?;
        self.load(&source)
    }

    /// Install a world from the external city/karel images.
    ///
    /// City bytes are one square each, row-major: `0..=8` flags or `255`
    /// wall. The karel array is `[x, y, dir, home_x, home_y]`. Out-of-domain
    /// input is rejected before any state changes.
    pub fn load_world(
        &mut self,
        city: &[u8; CITY_AREA],
        karel: &[u32; 5],
    ) -> Result<(), VmError> {
        let city = City::from_external(city)?;
        let karel = Karel::from_external(karel)?;
        self.world = World { karel, city };
        self.world_valid = true;
        Ok(())
    }

    /// Copy the world back out in the external encoding.
    pub fn read_world(
        &self,
        city_out: &mut [u8; CITY_AREA],
        karel_out: &mut [u32; 5],
    ) -> Result<(), VmError> {
        if !self.world_valid {
            return Err(VmError::StateNotValid);
        }
        self.world.city.to_external(city_out);
        self.world.karel.to_external(karel_out);
        Ok(())
    }

    /// Execute the named entry point.
    ///
    /// Requires a loaded program and world. The status cell reads
    /// [`Status::InProgress`] for the duration and the final code
    /// afterwards; on failure the world keeps the partial state the run
    /// produced.
    pub fn run_symbol(&mut self, name: &str) -> Result<RunStats, VmError> {
        if !self.bytecode_valid || !self.world_valid {
            return Err(VmError::StateNotValid);
        }
        let entry = self
            .bytecode
            .symbol(name)
            .ok_or_else(|| VmError::SymbolNotFound {
                name: name.to_owned(),
            })?;

        let exec = Arc::clone(&self.exec);
        exec.cancel.store(false, Ordering::Relaxed);
        exec.status
            .store(Status::InProgress as u8, Ordering::Release);

        let result = Interpreter::new(&self.bytecode, &mut self.world, &exec.cancel).run(entry);

        let status = match &result {
            Ok(_) => Status::Success,
            Err(err) => Status::from_run_error(err),
        };
        exec.cancel.store(false, Ordering::Relaxed);
        exec.status.store(status as u8, Ordering::Release);

        result.map_err(VmError::Run)
    }

    /// Current interpreter status.
    pub fn status(&self) -> Status {
        Status::from_u8(self.exec.status.load(Ordering::Acquire))
    }

    /// Status/cancellation handle for other threads.
    pub fn handle(&self) -> ExecHandle {
        ExecHandle {
            shared: Arc::clone(&self.exec),
        }
    }

    /// Loaded symbols and their func addresses, in address order.
    pub fn dump_loaded(&self) -> Vec<LoadedSymbol> {
        let mut dump: Vec<LoadedSymbol> = self
            .bytecode
            .symbols
            .iter()
            .map(|(name, &addr)| LoadedSymbol {
                name: name.clone(),
                addr,
            })
            .collect();
        dump.sort_by(|a, b| a.addr.cmp(&b.addr).then_with(|| a.name.cmp(&b.name)));
        dump
    }

    /// Disassembly of the loaded program, or `None` before a load.
    pub fn disassemble(&self) -> Option<String> {
        self.bytecode_valid.then(|| disassemble(&self.bytecode))
    }
}
