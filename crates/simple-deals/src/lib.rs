//! Model-assisted real-estate question answering: listing search, market analysis,
//! document intake and property reports.

pub mod assistant;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
