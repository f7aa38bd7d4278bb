//! cmdrun process abstraction layer (HAL).
//!
//! Spawning external programs is world-touching, so it sits behind the
//! [`ProcessOps`] trait. [`LinuxHal`] does the real work; [`FakeHal`] records
//! requests and replays scripted outcomes so executor logic can be tested
//! without spawning anything.

pub mod hal;

pub use cmdrun_error::{HalError, HalResult};
pub use hal::{FakeHal, FakeReply, LinuxHal, Operation, ProcessExit, ProcessOps, ProcessRequest};
