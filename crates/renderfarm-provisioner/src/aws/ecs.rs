//! ECS task definition and container-instance role drivers

use crate::aws::error::SdkResultExt;
use crate::aws::iam::instance_profile_role;
use crate::reconcile::{Document, ReconcileError, ResourceDriver};
use aws_sdk_ecs::Client;
use aws_sdk_ecs::types::{ContainerDefinition, KeyValuePair, TaskDefinition};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnvironmentEntry {
    name: String,
    value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Container {
    name: String,
    image: String,
    cpu: i32,
    memory: Option<i32>,
    essential: Option<bool>,
    #[serde(default)]
    environment: Vec<EnvironmentEntry>,
}

impl Container {
    fn from_sdk(def: &ContainerDefinition) -> Self {
        let mut environment: Vec<EnvironmentEntry> = def
            .environment()
            .iter()
            .map(|kv| EnvironmentEntry {
                name: kv.name().unwrap_or_default().to_string(),
                value: kv.value().unwrap_or_default().to_string(),
            })
            .collect();
        // ECS does not preserve environment order
        environment.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            name: def.name().unwrap_or_default().to_string(),
            image: def.image().unwrap_or_default().to_string(),
            cpu: def.cpu(),
            memory: def.memory(),
            essential: def.essential(),
            environment,
        }
    }

    fn to_sdk(&self) -> ContainerDefinition {
        ContainerDefinition::builder()
            .name(&self.name)
            .image(&self.image)
            .cpu(self.cpu)
            .set_memory(self.memory)
            .set_essential(self.essential)
            .set_environment(Some(
                self.environment
                    .iter()
                    .map(|e| KeyValuePair::builder().name(&e.name).value(&e.value).build())
                    .collect(),
            ))
            .build()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskDefinitionDocument {
    family: String,
    container_definitions: Vec<Container>,
}

fn task_definition_state(td: &TaskDefinition) -> Document {
    let containers: Vec<Container> = td
        .container_definitions()
        .iter()
        .map(Container::from_sdk)
        .collect();
    json!({
        "Family": td.family(),
        "TaskDefinitionArn": td.task_definition_arn(),
        "Revision": td.revision(),
        "ContainerDefinitions": containers,
    })
}

/// Task definition family, identified by family name.
///
/// `find` describes the latest active revision. Revisions are immutable, so
/// create and update both register a new one.
pub struct TaskDefinitionDriver {
    client: Client,
}

impl TaskDefinitionDriver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn register(&self, desired: &Document) -> Result<Document, ReconcileError> {
        let parsed: TaskDefinitionDocument = serde_json::from_value(desired.clone())
            .map_err(|e| ReconcileError::malformed("task definition", e.to_string()))?;
        let resource = format!("task definition '{}'", parsed.family);

        info!(family = %parsed.family, "Registering task definition");
        let output = self
            .client
            .register_task_definition()
            .family(&parsed.family)
            .set_container_definitions(Some(
                parsed.container_definitions.iter().map(Container::to_sdk).collect(),
            ))
            .send()
            .await
            .or_reconcile_error(&resource)?;

        let td = output.task_definition().ok_or_else(|| {
            ReconcileError::malformed(&resource, "RegisterTaskDefinition returned no definition")
        })?;
        info!(
            family = %parsed.family,
            revision = td.revision(),
            "Registered task definition"
        );
        Ok(task_definition_state(td))
    }
}

impl ResourceDriver for TaskDefinitionDriver {
    async fn find(&self, family: &str) -> Result<Option<Document>, ReconcileError> {
        let resource = format!("task definition '{family}'");
        let Some(output) = self
            .client
            .describe_task_definition()
            .task_definition(family)
            .send()
            .await
            .not_found_as_none(&resource)?
        else {
            return Ok(None);
        };
        let Some(td) = output.task_definition() else {
            return Ok(None);
        };
        debug!(family = %family, revision = td.revision(), "Found task definition");
        Ok(Some(task_definition_state(td)))
    }

    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError> {
        self.register(desired).await
    }

    async fn update(&self, _family: &str, desired: &Document) -> Result<Document, ReconcileError> {
        self.register(desired).await
    }
}

/// Profile name from an instance profile ARN
/// (`arn:aws:iam::123456789012:instance-profile/path/name`).
fn profile_name_from_arn(arn: &str) -> Option<&str> {
    arn.rsplit('/').next().filter(|name| !name.is_empty() && *name != arn)
}

/// Role of the first container instance in a cluster, identified by cluster
/// name.
///
/// Discovery only: the chain is container instance, EC2 instance, instance
/// profile, first role. Any existing role satisfies the desired state.
pub struct ContainerInstanceRoleDriver {
    ecs: Client,
    ec2: aws_sdk_ec2::Client,
    iam: aws_sdk_iam::Client,
}

impl ContainerInstanceRoleDriver {
    pub fn new(ecs: Client, ec2: aws_sdk_ec2::Client, iam: aws_sdk_iam::Client) -> Self {
        Self { ecs, ec2, iam }
    }

    async fn first_instance_id(
        &self,
        cluster: &str,
        resource: &str,
    ) -> Result<Option<(String, String)>, ReconcileError> {
        let Some(listed) = self
            .ecs
            .list_container_instances()
            .cluster(cluster)
            .send()
            .await
            .not_found_as_none(resource)?
        else {
            return Ok(None);
        };
        let Some(container_instance_arn) = listed.container_instance_arns().first() else {
            return Ok(None);
        };

        let described = self
            .ecs
            .describe_container_instances()
            .cluster(cluster)
            .container_instances(container_instance_arn)
            .send()
            .await
            .or_reconcile_error(resource)?;
        let instance_id = described
            .container_instances()
            .first()
            .and_then(|ci| ci.ec2_instance_id())
            .ok_or_else(|| {
                ReconcileError::malformed(resource, "container instance has no EC2 instance ID")
            })?;

        Ok(Some((container_instance_arn.clone(), instance_id.to_string())))
    }

    async fn instance_profile_arn(
        &self,
        instance_id: &str,
        resource: &str,
    ) -> Result<String, ReconcileError> {
        let output = self
            .ec2
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .or_reconcile_error(resource)?;
        output
            .reservations()
            .first()
            .and_then(|r| r.instances().first())
            .and_then(|i| i.iam_instance_profile())
            .and_then(|p| p.arn())
            .map(str::to_string)
            .ok_or_else(|| {
                ReconcileError::malformed(
                    resource,
                    format!("instance {instance_id} has no IAM instance profile"),
                )
            })
    }
}

impl ResourceDriver for ContainerInstanceRoleDriver {
    async fn find(&self, cluster: &str) -> Result<Option<Document>, ReconcileError> {
        let resource = format!("container instance role in cluster '{cluster}'");
        let Some((container_instance_arn, instance_id)) =
            self.first_instance_id(cluster, &resource).await?
        else {
            return Ok(None);
        };

        let profile_arn = self.instance_profile_arn(&instance_id, &resource).await?;
        let profile_name = profile_name_from_arn(&profile_arn).ok_or_else(|| {
            ReconcileError::malformed(&resource, format!("unexpected profile ARN {profile_arn}"))
        })?;
        let role_name = instance_profile_role(&self.iam, profile_name)
            .await?
            .ok_or_else(|| {
                ReconcileError::malformed(
                    &resource,
                    format!("instance profile {profile_name} has no role"),
                )
            })?;

        info!(cluster = %cluster, instance_id = %instance_id, role = %role_name, "Found container instance role");
        Ok(Some(json!({
            "Cluster": cluster,
            "ContainerInstanceArn": container_instance_arn,
            "Ec2InstanceId": instance_id,
            "InstanceProfileArn": profile_arn,
            "RoleName": role_name,
        })))
    }

    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError> {
        let cluster = desired["Cluster"].as_str().unwrap_or("<unknown>");
        Err(ReconcileError::NotFound {
            resource: format!(
                "container instances in cluster '{cluster}' (launch at least one before this step)"
            ),
        })
    }

    fn compare(&self, _existing: &Document, _desired: &Document) -> bool {
        true
    }

    async fn update(&self, cluster: &str, _desired: &Document) -> Result<Document, ReconcileError> {
        Err(ReconcileError::DriftNotRepairable {
            resource: format!("container instance role in cluster '{cluster}'"),
            message: "discovered resources are never modified".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::policy;
    use crate::reconcile::converged;

    #[test]
    fn test_profile_name_from_arn() {
        assert_eq!(
            profile_name_from_arn("arn:aws:iam::123456789012:instance-profile/ecsInstanceRole"),
            Some("ecsInstanceRole")
        );
        assert_eq!(
            profile_name_from_arn("arn:aws:iam::123456789012:instance-profile/path/to/prof"),
            Some("prof")
        );
        assert_eq!(profile_name_from_arn("no-slash"), None);
        assert_eq!(profile_name_from_arn("trailing/"), None);
    }

    #[test]
    fn test_sdk_container_matches_desired_document() {
        let config = PipelineConfig {
            app_name: "App".to_string(),
            ..Default::default()
        };
        let desired = policy::task_definition(&config, "me/worker:latest", "https://sqs/q");

        // ECS hands the environment back in arbitrary order
        let def = ContainerDefinition::builder()
            .name("App")
            .image("me/worker:latest")
            .cpu(512)
            .memory(512)
            .essential(true)
            .environment(KeyValuePair::builder().name("SQS_QUEUE_URL").value("https://sqs/q").build())
            .environment(KeyValuePair::builder().name("AWS_REGION").value("us-east-1").build())
            .build();
        let td = TaskDefinition::builder()
            .family("AppTask")
            .revision(3)
            .container_definitions(def)
            .build();

        let state = task_definition_state(&td);
        assert_eq!(state["Revision"], 3);
        assert!(converged(&state, &desired));
    }

    #[test]
    fn test_desired_document_roundtrips_through_sdk_types() {
        let config = PipelineConfig::default();
        let desired = policy::task_definition(&config, "img", "https://sqs/q");
        let parsed: TaskDefinitionDocument = serde_json::from_value(desired).unwrap();
        let sdk = parsed.container_definitions[0].to_sdk();
        assert_eq!(sdk.environment().len(), 2);
        assert_eq!(Container::from_sdk(&sdk), parsed.container_definitions[0]);
    }
}
