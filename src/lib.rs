//! stenod: stenotype machine capture and keyboard emulation
//!
//! Machines (a computer keyboard, Stenograph USB writers, Treal, Palantype)
//! are driven by one capture worker each and produce strokes of steno keys.
//! Key combinations and text go the other way, out through the OS.

pub mod config;
pub mod events;
pub mod ipc;
pub mod keycombo;
pub mod keymap;
pub mod lifecycle;
pub mod machine;
pub mod output;
pub mod platform;
pub mod protocol;
