//! EC2 resources: networks, subnets, gateways, route tables, security
//! groups, network interfaces, instances and key pairs

use crate::error::from_sdk;
use crate::gateway::{AwsGateway, physical_name, required_attribute, required_parent};
use crate::tags::{TAG_DEPLOYMENT, TAG_NAME, ec2_filter, ec2_filters, ec2_tag, ec2_tag_spec};
use crate::types::AwsResourceType;
use aws_sdk_ec2::primitives::Blob;
use aws_sdk_ec2::types::{
    Filter as Ec2Filter, IamInstanceProfileSpecification, InstanceStateName, InstanceType,
    ResourceType, Tag,
};
use stackflow_cloud::{
    DiscoveredResource, Filter, GatewayError, GatewayResult, Lifecycle, ResourceSpec,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const DEFAULT_INSTANCE_TYPE: &str = "t3.micro";
const DEFAULT_SG_NAME: &str = "default";

fn discovered(t: AwsResourceType, id: &str, tags: &[Tag]) -> DiscoveredResource {
    let mut found = DiscoveredResource::new(t.as_str(), id);
    found.deployment = ec2_tag(tags, TAG_DEPLOYMENT).map(str::to_string);
    found.name = ec2_tag(tags, TAG_NAME).map(str::to_string);
    found
}

fn with_parent(mut found: DiscoveredResource, parent: AwsResourceType, id: Option<&str>) -> DiscoveredResource {
    if let Some(id) = id {
        found.parent_ids.insert(parent.as_str().to_string(), id.to_string());
    }
    found
}

fn tag_spec(t: AwsResourceType, spec: &ResourceSpec) -> aws_sdk_ec2::types::TagSpecification {
    ec2_tag_spec(t.ec2_resource_type().unwrap_or(ResourceType::Vpc), spec)
}

fn missing_id(t: AwsResourceType) -> GatewayError {
    GatewayError::new(
        stackflow_cloud::ErrorKind::Unknown,
        format!("no {t} id in create response"),
    )
}

impl AwsGateway {
    pub(crate) async fn describe_ec2(
        &self,
        t: AwsResourceType,
        filter: &Filter,
    ) -> GatewayResult<Vec<DiscoveredResource>> {
        let mut filters = ec2_filters(filter, t.id_filter().unwrap_or("resource-id"));
        if let Some(holder) = &filter.attached_to {
            if t != AwsResourceType::NetworkInterface {
                debug!(resource_type = %t, holder = %holder, "Type has no attachments");
                return Ok(Vec::new());
            }
            filters.push(ec2_filter("group-id", holder));
        }

        match t {
            AwsResourceType::Network => self.describe_networks(filters).await,
            AwsResourceType::Subnet => self.describe_subnets(filters).await,
            AwsResourceType::InternetGateway => self.describe_internet_gateways(filters).await,
            AwsResourceType::RouteTable => self.describe_route_tables(filters).await,
            AwsResourceType::SecurityGroup => self.describe_security_groups(filters).await,
            AwsResourceType::NetworkInterface => self.describe_network_interfaces(filters).await,
            AwsResourceType::ComputeInstance => self.describe_instances(filters).await,
            AwsResourceType::CredentialPair => self.describe_key_pairs(filters).await,
            AwsResourceType::StorageBucket | AwsResourceType::IdentityRole => Ok(Vec::new()),
        }
    }

    // ---- network (VPC) ----

    async fn describe_networks(&self, filters: Vec<Ec2Filter>) -> GatewayResult<Vec<DiscoveredResource>> {
        let t = AwsResourceType::Network;
        let mut found = Vec::new();
        let mut pages = self
            .ec2
            .describe_vpcs()
            .set_filters(Some(filters))
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| from_sdk("describe vpcs", e))?;
            for vpc in page.vpcs() {
                let Some(id) = vpc.vpc_id() else { continue };
                let mut resource = discovered(t, id, vpc.tags());
                resource.protected = vpc.is_default() == Some(true);
                found.push(resource);
            }
        }
        Ok(found)
    }

    pub(crate) async fn create_network(&self, spec: &ResourceSpec) -> GatewayResult<String> {
        let t = AwsResourceType::Network;
        let cidr = required_attribute(spec, "cidr-block", t)?;
        let output = self
            .ec2
            .create_vpc()
            .cidr_block(cidr)
            .tag_specifications(tag_spec(t, spec))
            .send()
            .await
            .map_err(|e| from_sdk("create vpc", e))?;
        output
            .vpc()
            .and_then(|v| v.vpc_id())
            .map(str::to_string)
            .ok_or_else(|| missing_id(t))
    }

    pub(crate) async fn delete_network(&self, id: &str) -> GatewayResult<()> {
        self.ec2
            .delete_vpc()
            .vpc_id(id)
            .send()
            .await
            .map_err(|e| from_sdk("delete vpc", e))?;
        Ok(())
    }

    // ---- subnet ----

    async fn describe_subnets(&self, filters: Vec<Ec2Filter>) -> GatewayResult<Vec<DiscoveredResource>> {
        let t = AwsResourceType::Subnet;
        let mut found = Vec::new();
        let mut pages = self
            .ec2
            .describe_subnets()
            .set_filters(Some(filters))
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| from_sdk("describe subnets", e))?;
            for subnet in page.subnets() {
                let Some(id) = subnet.subnet_id() else { continue };
                found.push(with_parent(
                    discovered(t, id, subnet.tags()),
                    AwsResourceType::Network,
                    subnet.vpc_id(),
                ));
            }
        }
        Ok(found)
    }

    pub(crate) async fn create_subnet(
        &self,
        spec: &ResourceSpec,
        parent_ids: &BTreeMap<String, String>,
    ) -> GatewayResult<String> {
        let t = AwsResourceType::Subnet;
        let vpc_id = required_parent(parent_ids, AwsResourceType::Network, t)?;
        let cidr = required_attribute(spec, "cidr-block", t)?;
        let output = self
            .ec2
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr)
            .set_availability_zone(spec.attribute("availability-zone").map(str::to_string))
            .tag_specifications(tag_spec(t, spec))
            .send()
            .await
            .map_err(|e| from_sdk("create subnet", e))?;
        output
            .subnet()
            .and_then(|s| s.subnet_id())
            .map(str::to_string)
            .ok_or_else(|| missing_id(t))
    }

    pub(crate) async fn delete_subnet(&self, id: &str) -> GatewayResult<()> {
        self.ec2
            .delete_subnet()
            .subnet_id(id)
            .send()
            .await
            .map_err(|e| from_sdk("delete subnet", e))?;
        Ok(())
    }

    // ---- internet gateway ----

    async fn describe_internet_gateways(
        &self,
        filters: Vec<Ec2Filter>,
    ) -> GatewayResult<Vec<DiscoveredResource>> {
        let t = AwsResourceType::InternetGateway;
        let mut found = Vec::new();
        let mut pages = self
            .ec2
            .describe_internet_gateways()
            .set_filters(Some(filters))
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| from_sdk("describe internet gateways", e))?;
            for igw in page.internet_gateways() {
                let Some(id) = igw.internet_gateway_id() else { continue };
                let vpc_id = igw.attachments().iter().find_map(|a| a.vpc_id());
                found.push(with_parent(
                    discovered(t, id, igw.tags()),
                    AwsResourceType::Network,
                    vpc_id,
                ));
            }
        }
        Ok(found)
    }

    pub(crate) async fn create_internet_gateway(
        &self,
        spec: &ResourceSpec,
        parent_ids: &BTreeMap<String, String>,
    ) -> GatewayResult<String> {
        let t = AwsResourceType::InternetGateway;
        let output = self
            .ec2
            .create_internet_gateway()
            .tag_specifications(tag_spec(t, spec))
            .send()
            .await
            .map_err(|e| from_sdk("create internet gateway", e))?;
        let id = output
            .internet_gateway()
            .and_then(|g| g.internet_gateway_id())
            .map(str::to_string)
            .ok_or_else(|| missing_id(t))?;

        if let Some(vpc_id) = parent_ids.get(AwsResourceType::Network.as_str()) {
            let attached = self
                .ec2
                .attach_internet_gateway()
                .internet_gateway_id(&id)
                .vpc_id(vpc_id)
                .send()
                .await;
            if let Err(e) = attached {
                let err = from_sdk("attach internet gateway", e);
                // an unattached gateway would pass the next existence check
                if let Err(cleanup) = self.delete_internet_gateway(&id).await {
                    warn!(igw_id = %id, error = %cleanup, "Failed to remove unattached internet gateway");
                }
                return Err(err);
            }
            debug!(igw_id = %id, vpc_id = %vpc_id, "Attached internet gateway");
        }
        Ok(id)
    }

    pub(crate) async fn detach_internet_gateway(&self, id: &str, vpc_id: &str) -> GatewayResult<()> {
        self.ec2
            .detach_internet_gateway()
            .internet_gateway_id(id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| from_sdk("detach internet gateway", e))?;
        Ok(())
    }

    pub(crate) async fn delete_internet_gateway(&self, id: &str) -> GatewayResult<()> {
        let filters = vec![ec2_filter("internet-gateway-id", id)];
        for igw in self.describe_internet_gateways(filters).await? {
            for vpc_id in igw.parent_ids.values() {
                match self.detach_internet_gateway(id, vpc_id).await {
                    Ok(()) => debug!(igw_id = %id, vpc_id = %vpc_id, "Detached internet gateway"),
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            }
        }
        self.ec2
            .delete_internet_gateway()
            .internet_gateway_id(id)
            .send()
            .await
            .map_err(|e| from_sdk("delete internet gateway", e))?;
        Ok(())
    }

    // ---- route table ----

    async fn describe_route_tables(&self, filters: Vec<Ec2Filter>) -> GatewayResult<Vec<DiscoveredResource>> {
        let t = AwsResourceType::RouteTable;
        let mut found = Vec::new();
        let mut pages = self
            .ec2
            .describe_route_tables()
            .set_filters(Some(filters))
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| from_sdk("describe route tables", e))?;
            for table in page.route_tables() {
                let Some(id) = table.route_table_id() else { continue };
                let igw_id = table
                    .routes()
                    .iter()
                    .filter_map(|r| r.gateway_id())
                    .find(|g| g.starts_with("igw-"));
                let mut resource = with_parent(
                    with_parent(discovered(t, id, table.tags()), AwsResourceType::Network, table.vpc_id()),
                    AwsResourceType::InternetGateway,
                    igw_id,
                );
                resource.protected = table.associations().iter().any(|a| a.main() == Some(true));
                found.push(resource);
            }
        }
        Ok(found)
    }

    pub(crate) async fn create_route_table(
        &self,
        spec: &ResourceSpec,
        parent_ids: &BTreeMap<String, String>,
    ) -> GatewayResult<String> {
        let t = AwsResourceType::RouteTable;
        let vpc_id = required_parent(parent_ids, AwsResourceType::Network, t)?;
        let output = self
            .ec2
            .create_route_table()
            .vpc_id(vpc_id)
            .tag_specifications(tag_spec(t, spec))
            .send()
            .await
            .map_err(|e| from_sdk("create route table", e))?;
        let id = output
            .route_table()
            .and_then(|r| r.route_table_id())
            .map(str::to_string)
            .ok_or_else(|| missing_id(t))?;

        if let Some(igw_id) = parent_ids.get(AwsResourceType::InternetGateway.as_str()) {
            let destination = spec.attribute("destination-cidr-block").unwrap_or("0.0.0.0/0");
            self.ec2
                .create_route()
                .route_table_id(&id)
                .destination_cidr_block(destination)
                .gateway_id(igw_id)
                .send()
                .await
                .map_err(|e| from_sdk("create route", e))?;
            debug!(route_table_id = %id, igw_id = %igw_id, destination, "Added route");
        }
        Ok(id)
    }

    pub(crate) async fn delete_route_table(&self, id: &str) -> GatewayResult<()> {
        let output = self
            .ec2
            .describe_route_tables()
            .route_table_ids(id)
            .send()
            .await
            .map_err(|e| from_sdk("describe route table", e))?;

        let associations: Vec<String> = output
            .route_tables()
            .iter()
            .flat_map(|t| t.associations())
            .filter(|a| a.main() != Some(true))
            .filter_map(|a| a.route_table_association_id().map(str::to_string))
            .collect();
        for association_id in associations {
            match self
                .ec2
                .disassociate_route_table()
                .association_id(&association_id)
                .send()
                .await
                .map_err(|e| from_sdk("disassociate route table", e))
            {
                Ok(_) => debug!(route_table_id = %id, association_id = %association_id, "Disassociated"),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }

        self.ec2
            .delete_route_table()
            .route_table_id(id)
            .send()
            .await
            .map_err(|e| from_sdk("delete route table", e))?;
        Ok(())
    }

    // ---- security group ----

    async fn describe_security_groups(
        &self,
        filters: Vec<Ec2Filter>,
    ) -> GatewayResult<Vec<DiscoveredResource>> {
        let t = AwsResourceType::SecurityGroup;
        let mut found = Vec::new();
        let mut pages = self
            .ec2
            .describe_security_groups()
            .set_filters(Some(filters))
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| from_sdk("describe security groups", e))?;
            for group in page.security_groups() {
                let Some(id) = group.group_id() else { continue };
                let mut resource = with_parent(
                    discovered(t, id, group.tags()),
                    AwsResourceType::Network,
                    group.vpc_id(),
                );
                resource.protected = group.group_name() == Some(DEFAULT_SG_NAME);
                found.push(resource);
            }
        }
        Ok(found)
    }

    pub(crate) async fn create_security_group(
        &self,
        spec: &ResourceSpec,
        parent_ids: &BTreeMap<String, String>,
    ) -> GatewayResult<String> {
        let t = AwsResourceType::SecurityGroup;
        let group_name = physical_name(spec, "group-name");
        let description = spec
            .attribute("description")
            .map(str::to_string)
            .unwrap_or_else(|| format!("stackflow {} {}", spec.deployment, spec.name));

        info!(name = %group_name, "Creating security group");
        let output = self
            .ec2
            .create_security_group()
            .group_name(&group_name)
            .description(description)
            .set_vpc_id(parent_ids.get(AwsResourceType::Network.as_str()).cloned())
            .tag_specifications(tag_spec(t, spec))
            .send()
            .await
            .map_err(|e| from_sdk("create security group", e))?;
        output
            .group_id()
            .map(str::to_string)
            .ok_or_else(|| missing_id(t))
    }

    pub(crate) async fn delete_security_group(&self, id: &str) -> GatewayResult<()> {
        self.ec2
            .delete_security_group()
            .group_id(id)
            .send()
            .await
            .map_err(|e| from_sdk("delete security group", e))?;
        Ok(())
    }

    // ---- network interface (attachment) ----

    async fn describe_network_interfaces(
        &self,
        filters: Vec<Ec2Filter>,
    ) -> GatewayResult<Vec<DiscoveredResource>> {
        let t = AwsResourceType::NetworkInterface;
        let mut found = Vec::new();
        let mut pages = self
            .ec2
            .describe_network_interfaces()
            .set_filters(Some(filters))
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| from_sdk("describe network interfaces", e))?;
            for eni in page.network_interfaces() {
                let Some(id) = eni.network_interface_id() else { continue };
                let mut resource = with_parent(
                    discovered(t, id, eni.tag_set()),
                    AwsResourceType::Subnet,
                    eni.subnet_id(),
                );
                resource.attached_to = eni
                    .groups()
                    .iter()
                    .filter_map(|g| g.group_id().map(str::to_string))
                    .collect();
                // interfaces owned by another service cannot be modified
                resource.protected = eni.requester_managed() == Some(true);
                found.push(resource);
            }
        }
        Ok(found)
    }

    /// Remove a security group from an interface's group list
    ///
    /// An interface needs at least one group, so the last one is replaced
    /// with the default group of its VPC.
    pub(crate) async fn detach_network_interface(&self, id: &str, group_id: &str) -> GatewayResult<()> {
        let output = self
            .ec2
            .describe_network_interfaces()
            .network_interface_ids(id)
            .send()
            .await
            .map_err(|e| from_sdk("describe network interface", e))?;
        let eni = output
            .network_interfaces()
            .first()
            .ok_or_else(|| GatewayError::not_found(format!("network interface '{id}' not found")))?;

        let groups: Vec<String> = eni
            .groups()
            .iter()
            .filter_map(|g| g.group_id().map(str::to_string))
            .collect();
        if !groups.iter().any(|g| g == group_id) {
            return Err(GatewayError::not_found(format!("{id} is not in {group_id}")));
        }

        let mut remaining: Vec<String> = groups.into_iter().filter(|g| g != group_id).collect();
        if remaining.is_empty() {
            let vpc_id = eni
                .vpc_id()
                .ok_or_else(|| GatewayError::validation(format!("{id} has no VPC")))?;
            remaining.push(self.default_security_group(vpc_id).await?);
        }

        self.ec2
            .modify_network_interface_attribute()
            .network_interface_id(id)
            .set_groups(Some(remaining))
            .send()
            .await
            .map_err(|e| from_sdk("modify network interface", e))?;
        debug!(eni_id = %id, group_id = %group_id, "Removed security group from interface");
        Ok(())
    }

    async fn default_security_group(&self, vpc_id: &str) -> GatewayResult<String> {
        let output = self
            .ec2
            .describe_security_groups()
            .filters(ec2_filter("vpc-id", vpc_id))
            .filters(ec2_filter("group-name", DEFAULT_SG_NAME))
            .send()
            .await
            .map_err(|e| from_sdk("describe default security group", e))?;
        output
            .security_groups()
            .first()
            .and_then(|g| g.group_id())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::not_found(format!("no default security group in {vpc_id}")))
    }

    pub(crate) async fn delete_network_interface(&self, id: &str) -> GatewayResult<()> {
        self.ec2
            .delete_network_interface()
            .network_interface_id(id)
            .send()
            .await
            .map_err(|e| from_sdk("delete network interface", e))?;
        Ok(())
    }

    // ---- compute instance ----

    async fn describe_instances(&self, filters: Vec<Ec2Filter>) -> GatewayResult<Vec<DiscoveredResource>> {
        let t = AwsResourceType::ComputeInstance;
        let mut found = Vec::new();
        let mut pages = self
            .ec2
            .describe_instances()
            .set_filters(Some(filters))
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| from_sdk("describe instances", e))?;
            for instance in page.reservations().iter().flat_map(|r| r.instances()) {
                let Some(id) = instance.instance_id() else { continue };
                let profile = instance
                    .iam_instance_profile()
                    .and_then(|p| p.arn())
                    .and_then(|arn| arn.rsplit('/').next());

                let mut resource = discovered(t, id, instance.tags());
                resource = with_parent(resource, AwsResourceType::Subnet, instance.subnet_id());
                resource = with_parent(
                    resource,
                    AwsResourceType::SecurityGroup,
                    instance.security_groups().first().and_then(|g| g.group_id()),
                );
                resource = with_parent(resource, AwsResourceType::CredentialPair, instance.key_name());
                resource = with_parent(resource, AwsResourceType::IdentityRole, profile);

                let state = instance.state().and_then(|s| s.name());
                if matches!(
                    state,
                    Some(InstanceStateName::Terminated | InstanceStateName::ShuttingDown)
                ) {
                    resource.lifecycle = Lifecycle::Terminated;
                }
                found.push(resource);
            }
        }
        Ok(found)
    }

    pub(crate) async fn create_instance(
        &self,
        spec: &ResourceSpec,
        parent_ids: &BTreeMap<String, String>,
    ) -> GatewayResult<String> {
        let t = AwsResourceType::ComputeInstance;
        let image_id = required_attribute(spec, "image-id", t)?;
        let instance_type = spec.attribute("instance-type").unwrap_or(DEFAULT_INSTANCE_TYPE);
        let parent = |p: AwsResourceType| parent_ids.get(p.as_str()).cloned();

        info!(name = %spec.name, image_id, instance_type, "Launching instance");
        let output = self
            .ec2
            .run_instances()
            .image_id(image_id)
            .instance_type(InstanceType::from(instance_type))
            .min_count(1)
            .max_count(1)
            .set_subnet_id(parent(AwsResourceType::Subnet))
            .set_security_group_ids(parent(AwsResourceType::SecurityGroup).map(|g| vec![g]))
            .set_key_name(parent(AwsResourceType::CredentialPair))
            .set_iam_instance_profile(
                parent(AwsResourceType::IdentityRole)
                    .map(|name| IamInstanceProfileSpecification::builder().name(name).build()),
            )
            .tag_specifications(tag_spec(t, spec))
            .send()
            .await
            .map_err(|e| from_sdk("run instances", e))?;
        output
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .map(str::to_string)
            .ok_or_else(|| missing_id(t))
    }

    pub(crate) async fn terminate_instance(&self, id: &str) -> GatewayResult<()> {
        self.ec2
            .terminate_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| from_sdk("terminate instances", e))?;
        Ok(())
    }

    // ---- credential pair (key pair) ----

    async fn describe_key_pairs(&self, filters: Vec<Ec2Filter>) -> GatewayResult<Vec<DiscoveredResource>> {
        let t = AwsResourceType::CredentialPair;
        let output = self
            .ec2
            .describe_key_pairs()
            .set_filters(Some(filters))
            .send()
            .await
            .map_err(|e| from_sdk("describe key pairs", e))?;
        Ok(output
            .key_pairs()
            .iter()
            .filter_map(|k| Some(discovered(t, k.key_name()?, k.tags())))
            .collect())
    }

    /// Key pairs are addressed by name; the name is the provider id
    pub(crate) async fn create_key_pair(&self, spec: &ResourceSpec) -> GatewayResult<String> {
        let t = AwsResourceType::CredentialPair;
        let key_name = physical_name(spec, "key-name");

        let created = match spec.attribute("public-key") {
            Some(public_key) => self
                .ec2
                .import_key_pair()
                .key_name(&key_name)
                .public_key_material(Blob::new(public_key.as_bytes()))
                .tag_specifications(tag_spec(t, spec))
                .send()
                .await
                .map_err(|e| from_sdk("import key pair", e))?
                .key_name()
                .map(str::to_string),
            None => {
                warn!(
                    key_name = %key_name,
                    "No public-key given, the generated private key is not kept"
                );
                self.ec2
                    .create_key_pair()
                    .key_name(&key_name)
                    .tag_specifications(tag_spec(t, spec))
                    .send()
                    .await
                    .map_err(|e| from_sdk("create key pair", e))?
                    .key_name()
                    .map(str::to_string)
            }
        };
        created.ok_or_else(|| missing_id(t))
    }

    pub(crate) async fn delete_key_pair(&self, id: &str) -> GatewayResult<()> {
        self.ec2
            .delete_key_pair()
            .key_name(id)
            .send()
            .await
            .map_err(|e| from_sdk("delete key pair", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Vec<Tag> {
        pairs
            .iter()
            .map(|(k, v)| Tag::builder().key(*k).value(*v).build())
            .collect()
    }

    #[test]
    fn test_discovered_reads_tags() {
        let found = discovered(
            AwsResourceType::Subnet,
            "subnet-1",
            &tags(&[(TAG_DEPLOYMENT, "web"), (TAG_NAME, "a"), ("Owner", "ops")]),
        );
        assert_eq!(found.resource_type, "subnet");
        assert_eq!(found.deployment.as_deref(), Some("web"));
        assert_eq!(found.name.as_deref(), Some("a"));
        assert!(!found.protected);
    }

    #[test]
    fn test_untagged_resource_has_no_deployment() {
        let found = discovered(AwsResourceType::Network, "vpc-1", &[]);
        assert!(found.deployment.is_none());
        assert!(found.name.is_none());
    }

    #[test]
    fn test_with_parent_skips_missing_ids() {
        let found = with_parent(
            discovered(AwsResourceType::Subnet, "subnet-1", &[]),
            AwsResourceType::Network,
            Some("vpc-1"),
        );
        let found = with_parent(found, AwsResourceType::InternetGateway, None);
        assert_eq!(found.parent_ids.len(), 1);
        assert_eq!(found.parent_ids.get("network").map(String::as_str), Some("vpc-1"));
    }
}
