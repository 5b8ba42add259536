//! Resource types the AWS gateway understands

use aws_sdk_ec2::types::ResourceType;

/// A topology type name mapped onto an AWS resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwsResourceType {
    Network,
    Subnet,
    InternetGateway,
    RouteTable,
    SecurityGroup,
    NetworkInterface,
    ComputeInstance,
    CredentialPair,
    StorageBucket,
    IdentityRole,
}

impl AwsResourceType {
    pub const ALL: [AwsResourceType; 10] = [
        AwsResourceType::Network,
        AwsResourceType::Subnet,
        AwsResourceType::InternetGateway,
        AwsResourceType::RouteTable,
        AwsResourceType::SecurityGroup,
        AwsResourceType::NetworkInterface,
        AwsResourceType::ComputeInstance,
        AwsResourceType::CredentialPair,
        AwsResourceType::StorageBucket,
        AwsResourceType::IdentityRole,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AwsResourceType::Network => "network",
            AwsResourceType::Subnet => "subnet",
            AwsResourceType::InternetGateway => "internet-gateway",
            AwsResourceType::RouteTable => "route-table",
            AwsResourceType::SecurityGroup => "security-group",
            AwsResourceType::NetworkInterface => "network-interface",
            AwsResourceType::ComputeInstance => "compute-instance",
            AwsResourceType::CredentialPair => "credential-pair",
            AwsResourceType::StorageBucket => "storage-bucket",
            AwsResourceType::IdentityRole => "identity-role",
        }
    }

    /// EC2 resource type used in tag specifications
    pub fn ec2_resource_type(self) -> Option<ResourceType> {
        match self {
            AwsResourceType::Network => Some(ResourceType::Vpc),
            AwsResourceType::Subnet => Some(ResourceType::Subnet),
            AwsResourceType::InternetGateway => Some(ResourceType::InternetGateway),
            AwsResourceType::RouteTable => Some(ResourceType::RouteTable),
            AwsResourceType::SecurityGroup => Some(ResourceType::SecurityGroup),
            AwsResourceType::NetworkInterface => Some(ResourceType::NetworkInterface),
            AwsResourceType::ComputeInstance => Some(ResourceType::Instance),
            AwsResourceType::CredentialPair => Some(ResourceType::KeyPair),
            AwsResourceType::StorageBucket | AwsResourceType::IdentityRole => None,
        }
    }

    /// EC2 describe filter that selects by provider id
    pub fn id_filter(self) -> Option<&'static str> {
        match self {
            AwsResourceType::Network => Some("vpc-id"),
            AwsResourceType::Subnet => Some("subnet-id"),
            AwsResourceType::InternetGateway => Some("internet-gateway-id"),
            AwsResourceType::RouteTable => Some("route-table-id"),
            AwsResourceType::SecurityGroup => Some("group-id"),
            AwsResourceType::NetworkInterface => Some("network-interface-id"),
            AwsResourceType::ComputeInstance => Some("instance-id"),
            // key pairs are addressed by name
            AwsResourceType::CredentialPair => Some("key-name"),
            AwsResourceType::StorageBucket | AwsResourceType::IdentityRole => None,
        }
    }
}

impl std::fmt::Display for AwsResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
