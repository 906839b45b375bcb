#[macro_use]
extern crate log;

pub mod env;
pub mod error;
pub mod launcher;
pub mod logger;
pub mod port;
pub mod procs;
pub mod scheduler;
pub mod settings;
pub mod terminate;
pub mod trigger;
pub mod validate;
pub mod web;

pub use miette::Result;
