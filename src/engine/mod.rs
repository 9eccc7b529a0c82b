//! # Engine Module
//!
//! ECS engine implementation.
//!
//! This module contains all core ECS building blocks such as:
//! - Entity allocation and identifiers
//! - Component registration, tables and sparse sets
//! - Archetypes and structural moves
//! - Access analysis and queries
//! - Systems, commands, events and schedules
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod identifier;
pub mod error;
pub mod component;
pub mod bundle;
pub mod storage;
pub mod sparse_set;
pub mod table;
pub mod resource;
pub mod entity;
pub mod archetype;
pub mod access;
pub mod query;
pub mod change;
pub mod world;
pub mod commands;
pub mod event;
pub mod system;
pub mod schedule;
