// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Topology Domain Layer
//!
//! Pure domain types for the workspace topology. No I/O; the only external
//! seam is the [`environment::EnvironmentDirectory`] trait.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`architecture`] | `Architecture`, `ArchitectureCatalog`, `DeferredReference` |
//! | [`network_policy`] | `AccessPolicy`, `NetworkPolicyBuilder` |
//! | [`environment`] | `EnvironmentBinder`, `ExternalResourceRef`, `Selector` |
//! | [`launch_profile`] | `LaunchProfile`, `LaunchProfileComposer`, `PropertyOverride` |
//! | [`workload`] | `WorkloadDefinition`, `WorkloadDefinitionBuilder` |
//! | [`declaration`] | `DeclarationSet` |
//! | [`plan`] | `TopologyPlan` |

pub mod architecture;
pub mod network_policy;
pub mod environment;
pub mod launch_profile;
pub mod workload;
pub mod declaration;
pub mod plan;
