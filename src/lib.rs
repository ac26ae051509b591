// src/lib.rs

//! Syn-Syu update orchestration engine
//!
//! Reads a pre-computed update manifest for an Arch-based system and drives
//! the package managers through it: repository packages in bounded `pacman`
//! batches, AUR packages one by one through a helper, and optionally Flatpak
//! and firmware updates afterwards.
//!
//! # Architecture
//!
//! - Manifest-driven: resolution happens elsewhere; this crate only reads
//!   the manifest and never mutates it
//! - Safety gate: aggregate and per-package disk checks, snapshot hooks
//! - Failure isolation: per-package failures are recorded, never fatal
//! - Audit trail: one session log per run with a SHA-256 sidecar
//! - External managers behind the `Invoker` trait, so runs can be tested
//!   against fakes

pub mod audit;
pub mod config;
mod error;
pub mod filter;
pub mod helper;
pub mod invoke;
pub mod ledger;
pub mod manifest;
pub mod orchestrator;
pub mod safety;

pub use error::{Error, Result, exit};
