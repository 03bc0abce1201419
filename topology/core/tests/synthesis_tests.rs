// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Template shape and override rendering for the workspace topology.

mod common;

use common::{init_tracing, target, workspace_directory};
use ecs_workspace_core::application::{ComposeTopologyUseCase, TopologyComposer};
use ecs_workspace_core::infrastructure::cloudformation::{
    logical_id, Template, BINDINGS_METADATA_KEY, OVERRIDES_METADATA_KEY, TEMPLATE_FORMAT_VERSION,
};
use ecs_workspace_core::plan::TopologyPlan;
use serde_json::{json, Value};

const STACK: &str = "EcsWorkspaceStack";

fn workspace_template() -> Template {
    init_tracing();
    let directory = workspace_directory();
    TopologyComposer::new(&directory)
        .synthesize(&target(), &TopologyPlan::default())
        .unwrap()
}

fn resource<'a>(template: &'a Template, construct_path: &str) -> &'a Value {
    template
        .resource(&logical_id(STACK, construct_path))
        .unwrap_or_else(|| panic!("no resource for {}", construct_path))
}

#[test]
fn test_template_resource_inventory() {
    let template = workspace_template();

    assert_eq!(template.as_value()["AWSTemplateFormatVersion"], json!(TEMPLATE_FORMAT_VERSION));
    assert_eq!(template.description(), Some("EcsWorkspaceStack (123456789012/eu-west-1)"));
    assert_eq!(template.resources().unwrap().len(), 7);
    assert_eq!(template.resources_of_type("AWS::EC2::SecurityGroup").len(), 2);
    assert_eq!(template.resources_of_type("AWS::IAM::InstanceProfile").len(), 2);
    assert_eq!(template.resources_of_type("AWS::EC2::LaunchTemplate").len(), 2);
    assert_eq!(template.resources_of_type("AWS::ECS::TaskDefinition").len(), 1);
}

#[test]
fn test_external_resources_are_not_declared() {
    let template = workspace_template();

    for resource_type in ["AWS::EC2::VPC", "AWS::IAM::Role", "AWS::ECS::Cluster"] {
        assert!(template.resources_of_type(resource_type).is_empty(), "{}", resource_type);
    }

    let bindings = template.metadata(BINDINGS_METADATA_KEY).unwrap();
    assert_eq!(bindings["defaultVpc"]["id"], json!("vpc-0a1b2c3d"));
    assert_eq!(bindings["defaultVpc"]["selector"], json!("network:default"));
    assert_eq!(bindings["securityGroupDefault"]["kind"], json!("security_group"));
    assert_eq!(
        bindings["defaultEcsCluster"]["arn"],
        json!("arn:aws:ecs:eu-west-1:123456789012:cluster/default")
    );
}

#[test]
fn test_security_group_rendering() {
    let template = workspace_template();
    let http = &resource(&template, "securityGroupHttp")["Properties"];

    assert_eq!(http["GroupName"], json!("http/https"));
    assert_eq!(http["GroupDescription"], json!("EcsWorkspaceStack/securityGroupHttp"));
    assert_eq!(http["VpcId"], json!("vpc-0a1b2c3d"));
    assert_eq!(
        http["SecurityGroupIngress"],
        json!([
            { "CidrIp": "0.0.0.0/0", "Description": "http access", "FromPort": 80, "IpProtocol": "tcp", "ToPort": 80 },
            { "CidrIp": "0.0.0.0/0", "Description": "https access", "FromPort": 443, "IpProtocol": "tcp", "ToPort": 443 },
        ])
    );
    assert_eq!(
        http["SecurityGroupEgress"],
        json!([{ "CidrIp": "0.0.0.0/0", "Description": "Allow all outbound traffic by default", "IpProtocol": "-1" }])
    );
}

#[test]
fn test_launch_template_overrides_are_applied() {
    let template = workspace_template();

    let arm = resource(&template, "arm");
    let data = &arm["Properties"]["LaunchTemplateData"];
    assert_eq!(
        data["ImageId"],
        json!("resolve:ssm:/aws/service/ecs/optimized-ami/amazon-linux-2/kernel-5.10/arm64/recommended/image_id")
    );
    assert_eq!(data["UserData"], json!(""));
    assert_eq!(data["InstanceType"], json!("t4g.medium"));
    assert_eq!(data["CreditSpecification"]["CpuCredits"], json!("unlimited"));
    assert_eq!(data["EbsOptimized"], json!(true));
    assert_eq!(data["SecurityGroupIds"], json!(["sg-0def0001"]));
    assert_eq!(
        data["IamInstanceProfile"]["Arn"]["Fn::GetAtt"][0],
        json!(logical_id(STACK, "arm/InstanceProfile"))
    );

    let x86 = &resource(&template, "x86")["Properties"]["LaunchTemplateData"];
    assert_eq!(
        x86["ImageId"],
        json!("resolve:ssm:/aws/service/ecs/optimized-ami/amazon-linux-2/kernel-5.10/recommended/image_id")
    );
    assert_eq!(x86["InstanceType"], json!("t3a.medium"));
}

#[test]
fn test_overrides_are_visible_in_metadata() {
    let template = workspace_template();
    let overrides = &resource(&template, "x86")["Metadata"][OVERRIDES_METADATA_KEY];

    assert_eq!(
        overrides,
        &json!([
            {
                "field": "launchData.image",
                "path": "Properties.LaunchTemplateData.ImageId",
                "value": "resolve:ssm:/aws/service/ecs/optimized-ami/amazon-linux-2/kernel-5.10/recommended/image_id",
            },
            {
                "field": "launchData.bootstrap",
                "path": "Properties.LaunchTemplateData.UserData",
                "value": "",
            },
        ])
    );
}

#[test]
fn test_task_definition_rendering() {
    let template = workspace_template();
    let task = resource(&template, "nginxTaskDef");

    assert_eq!(task["Type"], json!("AWS::ECS::TaskDefinition"));
    let properties = &task["Properties"];
    assert_eq!(properties["Family"], json!("nginx"));
    assert_eq!(properties["Cpu"], json!("256"));
    assert_eq!(properties["Memory"], json!("512"));
    assert_eq!(properties["NetworkMode"], json!("awsvpc"));
    assert_eq!(properties["RequiresCompatibilities"], json!(["EC2", "FARGATE"]));
    assert_eq!(
        properties["ExecutionRoleArn"],
        json!("arn:aws:iam::123456789012:role/ecsExecutionRole")
    );
    assert_eq!(
        properties["ContainerDefinitions"],
        json!([{
            "Essential": true,
            "Image": "public.ecr.aws/nginx/nginx:stable",
            "MemoryReservation": 512,
            "Name": "web",
            "PortMappings": [{ "ContainerPort": 80, "HostPort": 80, "Protocol": "tcp" }],
        }])
    );
}

#[test]
fn test_rendering_formats() {
    let template = workspace_template();

    let rendered = template.to_json_pretty().unwrap();
    let reparsed: Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(&reparsed, template.as_value());

    let yaml = template.to_yaml().unwrap();
    assert!(yaml.contains("AWS::ECS::TaskDefinition"));
    assert_eq!(template.fingerprint().len(), 64);
}
