// stackless coroutines for single-core targets without an OS

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod kernel;

pub use kernel::*;
