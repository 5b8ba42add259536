//! Identity roles (IAM role plus an instance profile of the same name)
//!
//! Roles are created under the path `/stackflow/<deployment>/`, which is how
//! they are listed per deployment. The role name is the provider id.

use crate::error::from_sdk;
use crate::gateway::{AwsGateway, physical_name};
use crate::tags::{TAG_DEPLOYMENT, TAG_NAME};
use crate::types::AwsResourceType;
use aws_sdk_iam::types::Tag;
use stackflow_cloud::{DiscoveredResource, Filter, GatewayError, GatewayResult, ResourceSpec};
use tracing::{debug, info};

const PATH_ROOT: &str = "/stackflow/";

/// Trust policy used when the topology gives none
const EC2_ASSUME_ROLE_POLICY: &str = r#"{
  "Version": "2012-10-17",
  "Statement": [
    {
      "Effect": "Allow",
      "Principal": { "Service": "ec2.amazonaws.com" },
      "Action": "sts:AssumeRole"
    }
  ]
}"#;

fn role_path(deployment: &str) -> String {
    format!("{PATH_ROOT}{deployment}/")
}

fn build_tag(key: &str, value: &str) -> GatewayResult<Tag> {
    Tag::builder()
        .key(key)
        .value(value)
        .build()
        .map_err(|e| GatewayError::validation(format!("invalid role tag: {e}")))
}

/// Run an IAM call whose `not-found` means the work is already done
fn ignore_not_found<T>(result: GatewayResult<T>) -> GatewayResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

impl AwsGateway {
    async fn role_resource(&self, role_name: &str) -> GatewayResult<DiscoveredResource> {
        let output = self
            .iam
            .list_role_tags()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| from_sdk("list role tags", e))?;
        let tag = |key: &str| {
            output
                .tags()
                .iter()
                .find(|t| t.key() == key)
                .map(|t| t.value().to_string())
        };

        let mut found = DiscoveredResource::new(AwsResourceType::IdentityRole.as_str(), role_name);
        found.deployment = tag(TAG_DEPLOYMENT);
        found.name = tag(TAG_NAME);
        Ok(found)
    }

    async fn list_role_names(&self, path_prefix: &str) -> GatewayResult<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .iam
                .list_roles()
                .path_prefix(path_prefix)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| from_sdk("list roles", e))?;
            names.extend(output.roles().iter().map(|r| r.role_name().to_string()));

            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(names)
    }

    pub(crate) async fn describe_roles(&self, filter: &Filter) -> GatewayResult<Vec<DiscoveredResource>> {
        if filter.attached_to.is_some() {
            return Ok(Vec::new());
        }

        let role_names = match (&filter.id, &filter.deployment) {
            (Some(id), _) => {
                let found = ignore_not_found(
                    self.iam
                        .get_role()
                        .role_name(id)
                        .send()
                        .await
                        .map_err(|e| from_sdk("get role", e)),
                )?;
                found.map(|_| vec![id.clone()]).unwrap_or_default()
            }
            (None, Some(deployment)) => self.list_role_names(&role_path(deployment)).await?,
            (None, None) => self.list_role_names(PATH_ROOT).await?,
        };

        let mut found = Vec::new();
        for role_name in role_names {
            let Some(resource) = ignore_not_found(self.role_resource(&role_name).await)? else {
                continue;
            };
            let matches = filter
                .deployment
                .as_ref()
                .is_none_or(|d| resource.deployment.as_ref() == Some(d))
                && filter.name.as_ref().is_none_or(|n| resource.name.as_ref() == Some(n));
            if matches {
                found.push(resource);
            }
        }
        Ok(found)
    }

    pub(crate) async fn create_role(&self, spec: &ResourceSpec) -> GatewayResult<String> {
        let role_name = physical_name(spec, "role-name");
        let path = role_path(&spec.deployment);
        let policy = spec
            .attribute("assume-role-policy")
            .unwrap_or(EC2_ASSUME_ROLE_POLICY);

        info!(role_name = %role_name, path = %path, "Creating IAM role");
        self.iam
            .create_role()
            .role_name(&role_name)
            .path(&path)
            .assume_role_policy_document(policy)
            .tags(build_tag(TAG_DEPLOYMENT, &spec.deployment)?)
            .tags(build_tag(TAG_NAME, &spec.name)?)
            .send()
            .await
            .map_err(|e| from_sdk("create role", e))?;

        if let Some(policy_arn) = spec.attribute("policy-arn") {
            self.iam
                .attach_role_policy()
                .role_name(&role_name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|e| from_sdk("attach role policy", e))?;
            debug!(role_name = %role_name, policy_arn, "Attached managed policy");
        }

        self.iam
            .create_instance_profile()
            .instance_profile_name(&role_name)
            .path(&path)
            .send()
            .await
            .map_err(|e| from_sdk("create instance profile", e))?;
        self.iam
            .add_role_to_instance_profile()
            .instance_profile_name(&role_name)
            .role_name(&role_name)
            .send()
            .await
            .map_err(|e| from_sdk("add role to instance profile", e))?;

        Ok(role_name)
    }

    pub(crate) async fn delete_role(&self, role_name: &str) -> GatewayResult<()> {
        info!(role_name = %role_name, "Deleting IAM role and instance profile");

        ignore_not_found(
            self.iam
                .remove_role_from_instance_profile()
                .instance_profile_name(role_name)
                .role_name(role_name)
                .send()
                .await
                .map_err(|e| from_sdk("remove role from instance profile", e)),
        )?;
        ignore_not_found(
            self.iam
                .delete_instance_profile()
                .instance_profile_name(role_name)
                .send()
                .await
                .map_err(|e| from_sdk("delete instance profile", e)),
        )?;

        let attached = self
            .iam
            .list_attached_role_policies()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| from_sdk("list attached role policies", e))?;
        for policy_arn in attached.attached_policies().iter().filter_map(|p| p.policy_arn()) {
            self.iam
                .detach_role_policy()
                .role_name(role_name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|e| from_sdk("detach role policy", e))?;
        }

        let inline = self
            .iam
            .list_role_policies()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| from_sdk("list role policies", e))?;
        for policy_name in inline.policy_names() {
            self.iam
                .delete_role_policy()
                .role_name(role_name)
                .policy_name(policy_name)
                .send()
                .await
                .map_err(|e| from_sdk("delete role policy", e))?;
        }

        self.iam
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| from_sdk("delete role", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackflow_cloud::ErrorKind;

    #[test]
    fn test_role_path() {
        assert_eq!(role_path("web"), "/stackflow/web/");
        assert!(role_path("web").starts_with(PATH_ROOT));
    }

    #[test]
    fn test_ignore_not_found() {
        assert_eq!(ignore_not_found(Ok::<_, GatewayError>(1)).unwrap(), Some(1));
        assert_eq!(
            ignore_not_found::<()>(Err(GatewayError::not_found("gone"))).unwrap(),
            None
        );
        let err = ignore_not_found::<()>(Err(GatewayError::conflict("in use"))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }
}
