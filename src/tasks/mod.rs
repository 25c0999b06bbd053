//! Background Tasks Module
//!
//! Contains background tasks that run alongside an in-process store.
//!
//! # Tasks
//! - TTL Sweep: Removes expired `MemoryStore` entries at a fixed interval

mod sweep;

pub use sweep::spawn_sweep_task;
