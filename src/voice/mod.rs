pub mod audio;
pub mod command;
pub mod listener;
pub mod microphone;
pub mod transcribe;
