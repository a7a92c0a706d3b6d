// Image reference decomposition (registry/user/name:tag@digest)

use serde::Serialize;

use super::ImageRecord;

/// Structured view of a local image's first tag and first digest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageReference {
    /// First raw "name:tag" string reported by the engine
    pub repo_tag: String,
    /// Everything before the tag
    pub repo_name: String,
    /// Only set when the name has a leading registry segment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    pub user: String,
    pub name: String,
    pub tag: String,
    pub digest: String,
    pub image_id: String,
    /// Result of the most recent verification attempt
    pub verified: bool,
}

impl ImageReference {
    /// Build a reference from an engine record
    ///
    /// Only the first tag and the first digest are used. Returns `None` when
    /// the record has no tags or no digests (e.g. locally built images that
    /// were never pushed or pulled by digest).
    pub fn from_record(record: &ImageRecord) -> Option<Self> {
        let repo_tag = record.repo_tags.first()?;
        let repo_digest = record.repo_digests.first()?;

        let mut reference = parse_reference(repo_tag);
        // The engine's tag string is what gets verified, so keep it verbatim
        reference.repo_tag = repo_tag.clone();
        reference.digest = split_digest(repo_digest).to_string();
        reference.image_id = record.id.clone();
        Some(reference)
    }

    /// Identifier used when merging verification results into a snapshot
    pub fn key(&self) -> &str {
        &self.repo_tag
    }
}

/// Parse a bare reference string such as `registry.io/team/app:2.3`
///
/// A trailing `@digest` is accepted and stored in `digest`. Parsing never
/// fails; path segments that are empty in the input (an empty string or a
/// trailing `/`) stay empty in the result.
pub fn parse_reference(reference: &str) -> ImageReference {
    let (name_and_tag, digest) = match reference.split_once('@') {
        Some((name_and_tag, digest)) => (name_and_tag, digest),
        None => (reference, ""),
    };

    let (repo_name, tag) = split_tag(name_and_tag);
    let (registry, user, name) = split_path(repo_name);

    ImageReference {
        repo_tag: name_and_tag.to_string(),
        repo_name: repo_name.to_string(),
        registry,
        user,
        name,
        tag: tag.to_string(),
        digest: digest.to_string(),
        image_id: String::new(),
        verified: false,
    }
}

/// Split `name:tag`, ignoring colons that belong to a registry port
fn split_tag(name_and_tag: &str) -> (&str, &str) {
    let last_segment_start = name_and_tag.rfind('/').map(|i| i + 1).unwrap_or(0);

    match name_and_tag[last_segment_start..].rfind(':') {
        Some(offset) => {
            let colon = last_segment_start + offset;
            (&name_and_tag[..colon], &name_and_tag[colon + 1..])
        }
        None => (name_and_tag, ""),
    }
}

/// `alpine@sha256:abcd` -> `sha256:abcd`
fn split_digest(repo_digest: &str) -> &str {
    repo_digest
        .split_once('@')
        .map(|(_, digest)| digest)
        .unwrap_or(repo_digest)
}

fn split_path(repo_name: &str) -> (Option<String>, String, String) {
    let segments: Vec<&str> = repo_name.split('/').collect();

    match segments.as_slice() {
        [name] => (None, String::new(), name.to_string()),
        [user, name] => (None, user.to_string(), name.to_string()),
        [registry, user, name] => (
            Some(registry.to_string()),
            user.to_string(),
            name.to_string(),
        ),
        // Deeper namespaces (e.g. ghcr.io/org/group/app) keep the middle part as user
        [registry, middle @ .., name] => (
            Some(registry.to_string()),
            middle.join("/"),
            name.to_string(),
        ),
        [] => (None, String::new(), String::new()),
    }
}
