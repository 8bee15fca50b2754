//! Bytecode interpreter
//!
//! Executes a compiled program against the world state.
//! - One dispatch loop over the flat instruction buffer; no yields
//! - Return addresses and saved repeat origins share the call stack, with
//!   repeat counters on a parallel stack popped in lockstep
//! - A host-set atomic flag is checked once per instruction for
//!   cooperative cancellation

mod stacks;

use crate::bytecode::{
    branch_target, decode_header, repeat_count, repeat_target, Bytecode, Condition, Opcode,
};
use crate::world::{Direction, World, MAX_FLAGS};
use stacks::ExecStack;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Fatal runtime error. The world keeps whatever partial state the run
/// produced before the failing instruction; that is intentionally visible
/// to the host for debugging.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    /// `STEP` off the grid or into a wall
    #[error("step blocked at ({x}, {y}) facing {dir:?}")]
    StepOutOfBounds { x: u8, y: u8, dir: Direction },
    /// `PICK` on a square with no flags
    #[error("nothing to pick up at ({x}, {y})")]
    PickupZeroFlags { x: u8, y: u8 },
    /// `PLACE` on a square already holding the maximum
    #[error("square ({x}, {y}) already holds {MAX_FLAGS} flags")]
    PlaceMaxFlags { x: u8, y: u8 },
    /// Reached a `STOP` instruction
    #[error("stop instruction at address {addr:#x}")]
    StopEncountered { addr: u32 },
    /// The host short-circuited the run
    #[error("run cancelled by the host")]
    Cancelled,
    /// Undecodable instruction; only reachable if the buffer was corrupted
    /// after load. Surfaces as the unknown-error status.
    #[error("invalid instruction at address {addr:#x}")]
    InvalidInstruction { addr: u32 },
}

/// Metrics of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Number of instructions dispatched.
    pub instructions: u64,
}

/// Interpreter state for a single run
pub struct Interpreter<'run> {
    code: &'run [u8],
    world: &'run mut World,
    cancel: &'run AtomicBool,
    /// Current instruction address
    pc: usize,
    /// Return addresses, interleaved with saved repeat origins
    call_stack: ExecStack<u32>,
    /// Saved repeat counters, lockstep with the origins on `call_stack`
    repeat_stack: ExecStack<u16>,
    /// Address of the active `Repeat` instruction, if a loop is in flight
    cur_repeat_origin: Option<u32>,
    cur_repeat_remaining: u16,
    executed: u64,
}

impl<'run> Interpreter<'run> {
    pub fn new(bytecode: &'run Bytecode, world: &'run mut World, cancel: &'run AtomicBool) -> Self {
        Self {
            code: &bytecode.instructions,
            world,
            cancel,
            pc: 0,
            call_stack: ExecStack::new(),
            repeat_stack: ExecStack::new(),
            cur_repeat_origin: None,
            cur_repeat_remaining: 0,
            executed: 0,
        }
    }

    /// Run from `entry` until the entry symbol returns or a runtime error.
    pub fn run(mut self, entry: u32) -> Result<RunStats, RunError> {
        self.pc = entry as usize;
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                self.call_stack.clear();
                self.repeat_stack.clear();
                return Err(RunError::Cancelled);
            }

            let header = *self
                .code
                .get(self.pc)
                .ok_or(RunError::InvalidInstruction { addr: self.pc as u32 })?;
            let (opcode, condition, invert) =
                decode_header(header).ok_or(RunError::InvalidInstruction {
                    addr: self.pc as u32,
                })?;
            self.executed += 1;

            match opcode {
                Opcode::Step => {
                    let karel = self.world.karel;
                    match self.world.get_step() {
                        Some((x, y)) if !self.world.city.is_wall(x, y) => {
                            self.world.karel.x = x;
                            self.world.karel.y = y;
                            self.pc += 1;
                        }
                        _ => {
                            return Err(RunError::StepOutOfBounds {
                                x: karel.x,
                                y: karel.y,
                                dir: karel.dir,
                            })
                        }
                    }
                }
                Opcode::Left => {
                    self.world.turn_left();
                    self.pc += 1;
                }
                Opcode::PickUp => {
                    let (x, y) = (self.world.karel.x, self.world.karel.y);
                    let flags = self.world.city.get_square(x, y);
                    if flags == 0 {
                        return Err(RunError::PickupZeroFlags { x, y });
                    }
                    self.world.city.set_square(x, y, flags - 1);
                    self.pc += 1;
                }
                Opcode::Place => {
                    let (x, y) = (self.world.karel.x, self.world.karel.y);
                    let flags = self.world.city.get_square(x, y);
                    if flags == MAX_FLAGS {
                        return Err(RunError::PlaceMaxFlags { x, y });
                    }
                    self.world.city.set_square(x, y, flags + 1);
                    self.pc += 1;
                }
                Opcode::Repeat => {
                    let instr = &self.code[self.pc..];
                    if self.cur_repeat_origin != Some(self.pc as u32) {
                        // Entering a new loop; save the one in flight, if any.
                        if let Some(active) = self.cur_repeat_origin {
                            self.call_stack.push(active);
                            self.repeat_stack.push(self.cur_repeat_remaining);
                        }
                        self.cur_repeat_origin = Some(self.pc as u32);
                        self.cur_repeat_remaining = repeat_count(instr);
                    }
                    // A count of 0 also finishes here: the body sits before
                    // this instruction and has already run once.
                    if self.cur_repeat_remaining <= 1 {
                        match self.repeat_stack.pop() {
                            Some(remaining) => {
                                let origin = self
                                    .call_stack
                                    .pop()
                                    .expect("saved origin paired with every saved counter");
                                self.cur_repeat_origin = Some(origin);
                                self.cur_repeat_remaining = remaining;
                            }
                            None => self.cur_repeat_origin = None,
                        }
                        self.pc += Opcode::Repeat.len();
                    } else {
                        self.cur_repeat_remaining -= 1;
                        self.pc = repeat_target(instr) as usize;
                    }
                }
                Opcode::Branch => {
                    let instr = &self.code[self.pc..];
                    if self.eval_condition(condition) != invert {
                        self.pc = branch_target(instr) as usize;
                    } else {
                        self.pc += Opcode::Branch.len();
                    }
                }
                Opcode::BranchLinked => {
                    let instr = &self.code[self.pc..];
                    self.call_stack
                        .push(self.pc as u32 + Opcode::BranchLinked.len() as u32);
                    self.pc = branch_target(instr) as usize;
                }
                Opcode::Retn => match self.call_stack.pop() {
                    Some(ret) => self.pc = ret as usize,
                    None => {
                        return Ok(RunStats {
                            instructions: self.executed,
                        })
                    }
                },
                Opcode::Stop => {
                    return Err(RunError::StopEncountered {
                        addr: self.pc as u32,
                    })
                }
            }
        }
    }

    /// Evaluate a sense predicate against the world. The caller applies the
    /// header's inversion flag.
    fn eval_condition(&self, condition: Condition) -> bool {
        let karel = self.world.karel;
        match condition {
            Condition::None => true,
            Condition::IsWall => match self.world.get_step() {
                None => true,
                Some((x, y)) => self.world.city.is_wall(x, y),
            },
            Condition::IsFlag => self.world.city.get_square(karel.x, karel.y) >= 1,
            Condition::IsHome => karel.is_home(),
            Condition::IsNorth => karel.dir == Direction::North,
            Condition::IsEast => karel.dir == Direction::East,
            Condition::IsSouth => karel.dir == Direction::South,
            Condition::IsWest => karel.dir == Direction::West,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;

    fn run_program(source: &str, world: &mut World) -> Result<RunStats, RunError> {
        let bytecode = Compiler::compile(source).expect("compilation failed");
        let entry = bytecode.symbol("TEST").expect("TEST symbol");
        let cancel = AtomicBool::new(false);
        Interpreter::new(&bytecode, world, &cancel).run(entry)
    }

    #[test]
    fn test_step_moves_and_counts_instructions() {
        let mut world = World::default();
        let stats = run_program("TEST\n  STEP\nEND\n", &mut world).unwrap();
        assert_eq!((world.karel.x, world.karel.y), (0, 1));
        // STEP plus the trailing RETN.
        assert_eq!(stats.instructions, 2);
    }

    #[test]
    fn test_stop_reports_address() {
        let mut world = World::default();
        let err = run_program("TEST\n  STOP\nEND\n", &mut world).unwrap_err();
        assert!(matches!(err, RunError::StopEncountered { addr: 2 }));
    }

    #[test]
    fn test_pickup_on_empty_square_fails() {
        let mut world = World::default();
        let err = run_program("TEST\n  PICK\nEND\n", &mut world).unwrap_err();
        assert_eq!(err, RunError::PickupZeroFlags { x: 0, y: 0 });
    }

    #[test]
    fn test_place_respects_flag_limit() {
        let mut world = World::default();
        world.city.set_square(0, 0, MAX_FLAGS);
        let err = run_program("TEST\n  PLACE\nEND\n", &mut world).unwrap_err();
        assert_eq!(err, RunError::PlaceMaxFlags { x: 0, y: 0 });
    }

    #[test]
    fn test_cancel_flag_stops_the_loop() {
        let bytecode = Compiler::compile("TEST\n  UNTIL IS WALL\n    LEFT\n  END\nEND\n").unwrap();
        let entry = bytecode.symbol("TEST").unwrap();
        let mut world = World::default();
        world.karel.x = 10;
        world.karel.y = 10;
        let cancel = AtomicBool::new(true);
        let err = Interpreter::new(&bytecode, &mut world, &cancel)
            .run(entry)
            .unwrap_err();
        assert_eq!(err, RunError::Cancelled);
    }

    #[test]
    fn test_repeat_zero_runs_body_once() {
        let mut world = World::default();
        run_program("TEST\n  REPEAT 0-TIMES\n    PLACE\n  END\nEND\n", &mut world).unwrap();
        assert_eq!(world.city.get_square(0, 0), 1);
    }
}
