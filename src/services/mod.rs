pub mod backend;
pub mod quiz;
pub mod setup;
pub mod store;
pub mod workflow;
