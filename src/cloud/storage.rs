//! S3 buckets. The engine names the bucket; only tags are declared.

use super::Properties;
use crate::core::types::CloudResource;

pub fn bucket_properties(_resource: &CloudResource) -> Properties {
    Properties::new()
}
