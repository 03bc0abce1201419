// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use ecs_workspace_core::environment::TargetEnvironment;
use ecs_workspace_core::infrastructure::directory::InMemoryEnvironmentDirectory;

pub const ACCOUNT: &str = "123456789012";
pub const REGION: &str = "eu-west-1";

/// Environment shaped the way the workspace expects: one default network with
/// its `default` group, both ECS roles and the `default` cluster.
pub const WORKSPACE_SNAPSHOT: &str = r#"
networks:
  - id: vpc-0a1b2c3d
    default: true
  - id: vpc-9f8e7d6c
roles:
  - name: ecsInstanceRole
    arn: arn:aws:iam::123456789012:role/ecsInstanceRole
  - name: ecsExecutionRole
    arn: arn:aws:iam::123456789012:role/ecsExecutionRole
securityGroups:
  - id: sg-0def0001
    name: default
    networkId: vpc-0a1b2c3d
  - id: sg-0def0002
    name: default
    networkId: vpc-9f8e7d6c
clusters:
  - name: default
    arn: arn:aws:ecs:eu-west-1:123456789012:cluster/default
"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .with_target(false)
        .compact()
        .try_init();
}

pub fn workspace_directory() -> InMemoryEnvironmentDirectory {
    InMemoryEnvironmentDirectory::from_yaml(WORKSPACE_SNAPSHOT).expect("fixture snapshot parses")
}

pub fn directory_from(yaml: &str) -> InMemoryEnvironmentDirectory {
    InMemoryEnvironmentDirectory::from_yaml(yaml).expect("snapshot parses")
}

pub fn target() -> TargetEnvironment {
    TargetEnvironment::new(ACCOUNT, REGION).expect("valid target environment")
}
