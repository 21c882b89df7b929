//! Intersection Simulation Library
//!
//! A four-way signalised intersection with emergency-vehicle preemption.
//! The core runs deterministically from a seed; the runtime drives it in
//! real time with background tasks.

pub mod runtime;
pub mod simulation;
