// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod compose_topology;

// Re-export use cases for convenience
pub use compose_topology::{ComposeTopologyUseCase, TopologyComposer, TopologyError};
