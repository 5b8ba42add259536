//! Tags that mark resources as belonging to a deployment
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `stackflow:deployment` | Deployment (scope) name |
//! | `Name` | Logical name within the deployment |

use aws_sdk_ec2::types::{Filter as Ec2Filter, ResourceType, Tag, TagSpecification};
use stackflow_cloud::{Filter, ResourceSpec};

pub const TAG_DEPLOYMENT: &str = "stackflow:deployment";
pub const TAG_NAME: &str = "Name";

/// Tag specification for an EC2 create call
pub fn ec2_tag_spec(resource_type: ResourceType, spec: &ResourceSpec) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(resource_type)
        .tags(Tag::builder().key(TAG_DEPLOYMENT).value(&spec.deployment).build())
        .tags(Tag::builder().key(TAG_NAME).value(&spec.name).build())
        .build()
}

/// Value of `key` in an EC2 tag list
pub fn ec2_tag<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.key() == Some(key))
        .and_then(|t| t.value())
}

/// Translate a gateway filter into EC2 describe filters
///
/// `id_filter` names the filter that selects by provider id for the type
/// being described.
pub fn ec2_filters(filter: &Filter, id_filter: &str) -> Vec<Ec2Filter> {
    let mut filters = Vec::new();
    if let Some(deployment) = &filter.deployment {
        filters.push(ec2_filter(&format!("tag:{TAG_DEPLOYMENT}"), deployment));
    }
    if let Some(name) = &filter.name {
        filters.push(ec2_filter(&format!("tag:{TAG_NAME}"), name));
    }
    if let Some(id) = &filter.id {
        filters.push(ec2_filter(id_filter, id));
    }
    filters
}

pub fn ec2_filter(name: &str, value: &str) -> Ec2Filter {
    Ec2Filter::builder().name(name).values(value).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_from_gateway_filter() {
        let filter = Filter::deployment("web").with_name("main");
        let filters = ec2_filters(&filter, "vpc-id");
        let names: Vec<_> = filters.iter().filter_map(|f| f.name()).collect();
        assert_eq!(names, vec!["tag:stackflow:deployment", "tag:Name"]);
        assert_eq!(filters[1].values(), ["main".to_string()]);

        let by_id = ec2_filters(&Filter::id("vpc-123"), "vpc-id");
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].name(), Some("vpc-id"));
    }

    #[test]
    fn test_tag_spec_carries_deployment_and_name() {
        let spec = ResourceSpec::new("web", "main");
        let tag_spec = ec2_tag_spec(ResourceType::Vpc, &spec);
        let tags = tag_spec.tags();
        assert_eq!(ec2_tag(tags, TAG_DEPLOYMENT), Some("web"));
        assert_eq!(ec2_tag(tags, TAG_NAME), Some("main"));
        assert_eq!(ec2_tag(tags, "Owner"), None);
    }
}
