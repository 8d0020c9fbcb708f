//! Traffic Control Library
//!
//! A tick-driven simulation of a signalised city grid that can be driven
//! from the headless runner or embedded behind any front end.

pub mod simulation;
