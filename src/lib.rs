pub mod api;
pub mod cli;
pub mod consts;
pub mod function;
pub mod orchestrator;
pub mod runtime;
pub mod substrate;
