pub mod action;
pub mod coordinator;
pub mod input;
