//! # Boot-Time Memory Layout
//!
//! This crate defines the virtual memory layout the boot-time translation-table
//! builder works against. It is the single source of truth for where the
//! shared kernel window starts, where auto-assigned mappings are placed and
//! where the translation tables keep themselves addressable once the MMU is
//! switched on.
//!
//! ## Virtual Address Space Layout (32-bit)
//!
//! ```text
//! 0x0000_0000 ┌──────────────────────────────┐
//!             │ private region               │  identity maps, boot trampolines,
//!             │ (core-private mappings)      │  per-core windows
//! 0xC000_0000 ├──────────────────────────────┤
//!             │ kernel image window          │  replicated on every core
//! 0xE000_0000 ├──────────────────────────────┤
//!             │ auto-assign window           │  device registers, scratch
//! 0xFFC0_0000 ├──────────────────────────────┤
//!             │ self-map window (2 MiB)      │  translation tables
//! 0xFFE0_0000 ├──────────────────────────────┤
//!             │ vectors / unused             │
//! 0xFFFF_FFFF └──────────────────────────────┘
//! ```
//!
//! Every address from [`memory::SHARED_REGION_BASE`] upwards is shared: a
//! mapping installed there must look identical from every core's tables.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
