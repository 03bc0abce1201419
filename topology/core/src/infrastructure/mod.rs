// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod directory;
pub mod cloudformation;

pub use cloudformation::{CloudFormationSynthesizer, SynthesisError, Template};
pub use directory::{EnvironmentSnapshot, InMemoryEnvironmentDirectory};
