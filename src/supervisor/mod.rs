//! Supervisor fan-out (spec §4.6): the process-wide registry of attached
//! supervisor transports and the broadcast mechanism with drop-on-slow.

pub mod registry;

pub use registry::SupervisorRegistry;
