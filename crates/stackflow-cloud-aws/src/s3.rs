//! Storage buckets (S3)
//!
//! Bucket names are global, so the name is the provider id. Buckets are
//! emptied before they are deleted.

use crate::error::from_sdk;
use crate::gateway::{AwsGateway, physical_name};
use crate::tags::{TAG_DEPLOYMENT, TAG_NAME};
use crate::types::AwsResourceType;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, Tag, Tagging};
use stackflow_cloud::{DiscoveredResource, ErrorKind, Filter, GatewayError, GatewayResult, ResourceSpec};
use tracing::{debug, info};

/// Buckets in this region are created without a location constraint
const DEFAULT_REGION: &str = "us-east-1";

fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter().find(|t| t.key() == key).map(|t| t.value())
}

fn build_tag(key: &str, value: &str) -> GatewayResult<Tag> {
    Tag::builder()
        .key(key)
        .value(value)
        .build()
        .map_err(|e| GatewayError::validation(format!("invalid bucket tag: {e}")))
}

impl AwsGateway {
    /// Tags of one bucket, `None` when it has none
    async fn bucket_tags(&self, bucket: &str) -> GatewayResult<Option<Vec<Tag>>> {
        match self.s3.get_bucket_tagging().bucket(bucket).send().await {
            Ok(output) => Ok(Some(output.tag_set().to_vec())),
            Err(e) => {
                let err = from_sdk("get bucket tagging", e);
                if err.is_not_found() { Ok(None) } else { Err(err) }
            }
        }
    }

    fn bucket_resource(&self, bucket: &str, tags: Option<&[Tag]>) -> DiscoveredResource {
        let mut found = DiscoveredResource::new(AwsResourceType::StorageBucket.as_str(), bucket);
        if let Some(tags) = tags {
            found.deployment = tag_value(tags, TAG_DEPLOYMENT).map(str::to_string);
            found.name = tag_value(tags, TAG_NAME).map(str::to_string);
        }
        found
    }

    pub(crate) async fn describe_buckets(&self, filter: &Filter) -> GatewayResult<Vec<DiscoveredResource>> {
        if filter.attached_to.is_some() {
            return Ok(Vec::new());
        }

        let candidates: Vec<String> = match &filter.id {
            Some(bucket) => match self.s3.head_bucket().bucket(bucket).send().await {
                Ok(_) => vec![bucket.clone()],
                Err(e) => {
                    let err = from_sdk("head bucket", e);
                    if err.is_not_found() {
                        return Ok(Vec::new());
                    }
                    return Err(err);
                }
            },
            None => self
                .s3
                .list_buckets()
                .send()
                .await
                .map_err(|e| from_sdk("list buckets", e))?
                .buckets()
                .iter()
                .filter_map(|b| b.name().map(str::to_string))
                .collect(),
        };

        let mut found = Vec::new();
        for bucket in candidates {
            let tags = match self.bucket_tags(&bucket).await {
                Ok(tags) => tags,
                Err(err) if err.kind == ErrorKind::RateLimited => return Err(err),
                // buckets in other regions or owned by other tooling
                Err(err) if filter.id.is_none() => {
                    debug!(bucket = %bucket, error = %err, "Skipping unreadable bucket");
                    continue;
                }
                Err(err) => return Err(err),
            };
            let resource = self.bucket_resource(&bucket, tags.as_deref());
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

    pub(crate) async fn create_bucket(&self, spec: &ResourceSpec) -> GatewayResult<String> {
        let bucket = physical_name(spec, "bucket-name");
        info!(bucket = %bucket, region = %self.region, "Creating S3 bucket");

        let mut request = self.s3.create_bucket().bucket(&bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request.send().await.map_err(|e| from_sdk("create bucket", e))?;

        let tagging = Tagging::builder()
            .tag_set(build_tag(TAG_DEPLOYMENT, &spec.deployment)?)
            .tag_set(build_tag(TAG_NAME, &spec.name)?)
            .build()
            .map_err(|e| GatewayError::validation(format!("invalid bucket tagging: {e}")))?;
        self.s3
            .put_bucket_tagging()
            .bucket(&bucket)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| from_sdk("put bucket tagging", e))?;

        Ok(bucket)
    }

    pub(crate) async fn delete_bucket(&self, bucket: &str) -> GatewayResult<()> {
        info!(bucket = %bucket, "Emptying bucket");

        let mut continuation_token: Option<String> = None;
        loop {
            let response = self
                .s3
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| from_sdk("list objects", e))?;

            for key in response.contents().iter().filter_map(|o| o.key()) {
                debug!(bucket = %bucket, key = %key, "Deleting object");
                self.s3
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| from_sdk("delete object", e))?;
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        self.s3
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| from_sdk("delete bucket", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_value() {
        let tags = vec![
            build_tag(TAG_DEPLOYMENT, "web").unwrap(),
            build_tag(TAG_NAME, "assets").unwrap(),
        ];
        assert_eq!(tag_value(&tags, TAG_DEPLOYMENT), Some("web"));
        assert_eq!(tag_value(&tags, TAG_NAME), Some("assets"));
        assert_eq!(tag_value(&tags, "Owner"), None);
    }
}
