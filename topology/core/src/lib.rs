// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! ECS Workspace Core
//!
//! Resolution and composition engine for the ECS workspace topology: binds
//! the pre-existing network, roles, security group and cluster, then declares
//! the access policies, per-architecture launch profiles and the workload
//! definition on top of them.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Domain:** pure composition, no I/O
//! - **Application:** [`application::TopologyComposer`]
//! - **Infrastructure:** snapshot directory and CloudFormation synthesis

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
