//! Shared test utilities for the integration suites

#![allow(dead_code)]

use karel_runtime::world::CITY_AREA;
use karel_runtime::{KarelVm, RunStats, VmError};

// Re-export testing utilities
pub use pretty_assertions::assert_eq;

/// A city with no walls and no flags.
pub const EMPTY_CITY: [u8; CITY_AREA] = [0; CITY_AREA];

/// External wall byte.
pub const WALL: u8 = 255;

/// Index of `(x, y)` in the external city image.
pub fn city_index(x: u8, y: u8) -> usize {
    x as usize + y as usize * 20
}

/// An empty city with walls at the given squares.
pub fn city_with_walls(walls: &[(u8, u8)]) -> [u8; CITY_AREA] {
    let mut city = EMPTY_CITY;
    for &(x, y) in walls {
        city[city_index(x, y)] = WALL;
    }
    city
}

/// Karel at `(x, y)` facing `dir`, home at the origin.
pub fn karel_at(x: u32, y: u32, dir: u32) -> [u32; 5] {
    [x, y, dir, 0, 0]
}

/// A VM with `source` compiled and the given world installed.
pub fn vm_with(source: &str, city: &[u8; CITY_AREA], karel: &[u32; 5]) -> KarelVm {
    let mut vm = KarelVm::new();
    vm.load(source).expect("compilation failed");
    vm.load_world(city, karel).expect("world rejected");
    vm
}

/// Compile, load, and run `symbol`; returns the VM for post-run inspection.
pub fn run_scenario(
    source: &str,
    city: &[u8; CITY_AREA],
    karel: &[u32; 5],
    symbol: &str,
) -> (KarelVm, Result<RunStats, VmError>) {
    let mut vm = vm_with(source, city, karel);
    let result = vm.run_symbol(symbol);
    (vm, result)
}

/// Read the world back out of the VM.
pub fn read_world(vm: &KarelVm) -> ([u8; CITY_AREA], [u32; 5]) {
    let mut city = [0u8; CITY_AREA];
    let mut karel = [0u32; 5];
    vm.read_world(&mut city, &mut karel).expect("world not loaded");
    (city, karel)
}
