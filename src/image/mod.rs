// Local image records and their parsed references

mod reference;

pub use reference::{parse_reference, ImageReference};

use serde::{Deserialize, Serialize};

/// An image as reported by the container engine
///
/// Field names follow the Docker Engine API so that `docker image inspect`
/// style JSON can be deserialized directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub repo_tags: Vec<String>,
    #[serde(default)]
    pub repo_digests: Vec<String>,
}

impl ImageRecord {
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn new(
        id: impl Into<String>,
        repo_tags: impl IntoIterator<Item = impl Into<String>>,
        repo_digests: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            repo_tags: repo_tags.into_iter().map(Into::into).collect(),
            repo_digests: repo_digests.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_engine_json() {
        let json = r#"{
            "Id": "sha256:0123",
            "RepoTags": ["alpinelinux/base:1.0"],
            "RepoDigests": ["alpinelinux/base@sha256:abcd"],
            "Size": 1234
        }"#;

        let record: ImageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "sha256:0123");
        assert_eq!(record.repo_tags, vec!["alpinelinux/base:1.0"]);
        assert_eq!(record.repo_digests, vec!["alpinelinux/base@sha256:abcd"]);
    }

    #[test]
    fn test_deserialize_missing_lists() {
        // Dangling images may omit RepoTags entirely
        let record: ImageRecord = serde_json::from_str(r#"{"Id": "sha256:ff"}"#).unwrap();
        assert!(record.repo_tags.is_empty());
        assert!(record.repo_digests.is_empty());
    }
}
