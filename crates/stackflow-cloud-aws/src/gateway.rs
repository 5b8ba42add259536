//! AWS gateway

use crate::types::AwsResourceType;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use stackflow_cloud::{
    CloudGateway, DiscoveredResource, Filter, GatewayError, GatewayResult, ResourceSpec,
};
use std::collections::BTreeMap;
use tracing::info;

/// Gateway backed by the EC2, S3 and IAM APIs of one account and region
#[derive(Clone)]
pub struct AwsGateway {
    pub(crate) ec2: aws_sdk_ec2::Client,
    pub(crate) s3: aws_sdk_s3::Client,
    pub(crate) iam: aws_sdk_iam::Client,
    pub(crate) region: String,
}

impl AwsGateway {
    /// Load credentials and region from the environment, optionally
    /// overriding the region and the shared config profile
    pub async fn new(region: Option<&str>, profile: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        let region = config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "us-east-1".to_string());
        info!(region = %region, profile = profile.unwrap_or("default"), "AWS gateway ready");

        Self {
            ec2: aws_sdk_ec2::Client::new(&config),
            s3: aws_sdk_s3::Client::new(&config),
            iam: aws_sdk_iam::Client::new(&config),
            region,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl std::fmt::Debug for AwsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsGateway")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

fn resource_type(name: &str) -> GatewayResult<AwsResourceType> {
    AwsResourceType::parse(name)
        .ok_or_else(|| GatewayError::validation(format!("unsupported resource type '{name}'")))
}

/// Provider id of a required parent
pub(crate) fn required_parent<'a>(
    parent_ids: &'a BTreeMap<String, String>,
    parent: AwsResourceType,
    child: AwsResourceType,
) -> GatewayResult<&'a str> {
    parent_ids
        .get(parent.as_str())
        .map(String::as_str)
        .ok_or_else(|| GatewayError::validation(format!("{child} requires a {parent} parent")))
}

/// Value of a required spec attribute
pub(crate) fn required_attribute<'a>(
    spec: &'a ResourceSpec,
    key: &str,
    child: AwsResourceType,
) -> GatewayResult<&'a str> {
    spec.attribute(key)
        .ok_or_else(|| GatewayError::validation(format!("{child} '{}' requires '{key}'", spec.name)))
}

/// Physical name for resources addressed by name rather than generated id
pub(crate) fn physical_name(spec: &ResourceSpec, attribute: &str) -> String {
    spec.attribute(attribute)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}", spec.deployment, spec.name))
}

#[async_trait]
impl CloudGateway for AwsGateway {
    fn name(&self) -> &str {
        "aws"
    }

    async fn describe(
        &self,
        resource_type_name: &str,
        filter: &Filter,
    ) -> GatewayResult<Vec<DiscoveredResource>> {
        match resource_type(resource_type_name)? {
            AwsResourceType::StorageBucket => self.describe_buckets(filter).await,
            AwsResourceType::IdentityRole => self.describe_roles(filter).await,
            ec2_type => self.describe_ec2(ec2_type, filter).await,
        }
    }

    async fn create(
        &self,
        resource_type_name: &str,
        spec: &ResourceSpec,
        parent_ids: &BTreeMap<String, String>,
    ) -> GatewayResult<String> {
        let t = resource_type(resource_type_name)?;
        let id = match t {
            AwsResourceType::Network => self.create_network(spec).await?,
            AwsResourceType::Subnet => self.create_subnet(spec, parent_ids).await?,
            AwsResourceType::InternetGateway => self.create_internet_gateway(spec, parent_ids).await?,
            AwsResourceType::RouteTable => self.create_route_table(spec, parent_ids).await?,
            AwsResourceType::SecurityGroup => self.create_security_group(spec, parent_ids).await?,
            AwsResourceType::NetworkInterface => {
                return Err(GatewayError::validation(
                    "network interfaces are discovered, not created",
                ));
            }
            AwsResourceType::ComputeInstance => self.create_instance(spec, parent_ids).await?,
            AwsResourceType::CredentialPair => self.create_key_pair(spec).await?,
            AwsResourceType::StorageBucket => self.create_bucket(spec).await?,
            AwsResourceType::IdentityRole => self.create_role(spec).await?,
        };
        info!(resource_type = %t, name = %spec.name, id = %id, "Created");
        Ok(id)
    }

    async fn delete(&self, resource_type_name: &str, id: &str) -> GatewayResult<()> {
        let t = resource_type(resource_type_name)?;
        match t {
            AwsResourceType::Network => self.delete_network(id).await?,
            AwsResourceType::Subnet => self.delete_subnet(id).await?,
            AwsResourceType::InternetGateway => self.delete_internet_gateway(id).await?,
            AwsResourceType::RouteTable => self.delete_route_table(id).await?,
            AwsResourceType::SecurityGroup => self.delete_security_group(id).await?,
            AwsResourceType::NetworkInterface => self.delete_network_interface(id).await?,
            AwsResourceType::ComputeInstance => self.terminate_instance(id).await?,
            AwsResourceType::CredentialPair => self.delete_key_pair(id).await?,
            AwsResourceType::StorageBucket => self.delete_bucket(id).await?,
            AwsResourceType::IdentityRole => self.delete_role(id).await?,
        }
        info!(resource_type = %t, id, "Deleted");
        Ok(())
    }

    async fn detach(
        &self,
        resource_type_name: &str,
        id: &str,
        from_parent_id: &str,
    ) -> GatewayResult<()> {
        match resource_type(resource_type_name)? {
            AwsResourceType::NetworkInterface => {
                self.detach_network_interface(id, from_parent_id).await
            }
            AwsResourceType::InternetGateway => {
                self.detach_internet_gateway(id, from_parent_id).await
            }
            other => Err(GatewayError::validation(format!(
                "{other} cannot be detached"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_is_validation_error() {
        let err = resource_type("database").unwrap_err();
        assert_eq!(err.kind, stackflow_cloud::ErrorKind::Validation);
    }

    #[test]
    fn test_required_parent() {
        let mut parents = BTreeMap::new();
        parents.insert("network".to_string(), "vpc-123".to_string());

        assert_eq!(
            required_parent(&parents, AwsResourceType::Network, AwsResourceType::Subnet).unwrap(),
            "vpc-123"
        );
        let err = required_parent(&parents, AwsResourceType::Subnet, AwsResourceType::ComputeInstance)
            .unwrap_err();
        assert!(err.message.contains("compute-instance requires a subnet parent"));
    }

    #[test]
    fn test_physical_name() {
        let spec = ResourceSpec::new("web", "assets");
        assert_eq!(physical_name(&spec, "bucket-name"), "web-assets");

        let spec = spec.with_attribute("bucket-name", "acme-web-assets");
        assert_eq!(physical_name(&spec, "bucket-name"), "acme-web-assets");
    }
}
