//! # Architecture Abstraction Layer
//!
//! Provides the hardware boundary for the runtime: the static serial link,
//! its interrupt service and the board I/O the tasks sample.
//! Currently implements the Cortex-M4 (STM32F4) port; extensible to other
//! boards by adding sibling modules.

pub mod cortex_m4;
