//! AWS gateway for StackFlow
//!
//! Maps the topology types onto EC2, S3 and IAM:
//!
//! | Type | AWS resource | Provider id |
//! |------|--------------|-------------|
//! | `network` | VPC | `vpc-…` |
//! | `subnet` | Subnet | `subnet-…` |
//! | `internet-gateway` | Internet gateway, attached to its network | `igw-…` |
//! | `route-table` | Route table, default route to its internet gateway | `rtb-…` |
//! | `security-group` | Security group | `sg-…` |
//! | `network-interface` | ENI (attachment, detached from security groups) | `eni-…` |
//! | `compute-instance` | EC2 instance | `i-…` |
//! | `credential-pair` | EC2 key pair | key name |
//! | `storage-bucket` | S3 bucket, emptied before deletion | bucket name |
//! | `identity-role` | IAM role and instance profile | role name |
//!
//! Resources are tagged with `stackflow:deployment` and `Name`. Default VPCs,
//! main route tables and `default` security groups are reported as protected.

mod ec2;
pub mod error;
mod gateway;
mod iam;
mod s3;
pub mod tags;
pub mod types;

pub use error::{classify_code, from_sdk};
pub use gateway::AwsGateway;
pub use types::AwsResourceType;
