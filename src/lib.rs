pub mod logging;
pub mod error;

pub mod components;
pub mod agents;
pub mod envs;

pub mod engines;
pub mod session;
