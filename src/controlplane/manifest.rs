//! Rendered manifest decoding
//!
//! Releases hand back their rendered objects as multi-document YAML (Helm)
//! or JSON. Objects are kept open-schema; the helpers here only pick out the
//! kinds the status probes care about.

use crate::domain::record::{RenderedResource, MAX_REPLICAS};
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Reference to a named object in a rendered manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Decode a raw manifest into its objects
///
/// Empty documents (Helm emits `---` separators and `# Source:` comments)
/// are skipped and `kind: List` wrappers are flattened. Anything that is
/// not an object with a string `kind` is rejected.
pub fn decode_manifest(raw: &str) -> Result<Vec<RenderedResource>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let documents: Vec<Value> = if trimmed.starts_with('[') || trimmed.starts_with('{') {
        match serde_json::from_str(trimmed).map_err(|e| Error::Decode(e.to_string()))? {
            Value::Array(items) => items,
            other => vec![other],
        }
    } else {
        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_str(raw) {
            let value = Value::deserialize(document).map_err(|e| Error::Decode(e.to_string()))?;
            documents.push(value);
        }
        documents
    };

    let mut resources = Vec::new();
    for document in documents {
        push_object(&mut resources, document)?;
    }
    Ok(resources)
}

fn push_object(out: &mut Vec<RenderedResource>, document: Value) -> Result<()> {
    match document {
        Value::Null => Ok(()),
        Value::Object(mut object) => {
            let kind = object
                .get("kind")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Decode("object without a 'kind'".into()))?;

            if kind == "List" {
                if let Some(Value::Array(items)) = object.remove("items") {
                    for item in items {
                        push_object(out, item)?;
                    }
                }
                return Ok(());
            }

            out.push(object);
            Ok(())
        }
        other => Err(Error::Decode(format!(
            "expected an object, found {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `kind` of a rendered object
pub fn kind_of(resource: &RenderedResource) -> Option<&str> {
    resource.get("kind").and_then(Value::as_str)
}

fn object_ref(resource: &RenderedResource) -> Option<ObjectRef> {
    let kind = kind_of(resource)?;
    let metadata = resource.get("metadata")?;
    let name = metadata.get("name").and_then(Value::as_str)?;
    Some(ObjectRef {
        kind: kind.to_string(),
        name: name.to_string(),
        namespace: metadata
            .get("namespace")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn refs_of_kind<'a>(
    resources: &'a [RenderedResource],
    kinds: &'a [&'a str],
) -> impl Iterator<Item = ObjectRef> + 'a {
    resources
        .iter()
        .filter(move |r| kind_of(r).is_some_and(|k| kinds.contains(&k)))
        .filter_map(object_ref)
}

/// Deployments and StatefulSets rendered by the release
pub fn workloads(resources: &[RenderedResource]) -> Vec<ObjectRef> {
    refs_of_kind(resources, &["Deployment", "StatefulSet"]).collect()
}

/// Services rendered by the release
pub fn services(resources: &[RenderedResource]) -> Vec<ObjectRef> {
    refs_of_kind(resources, &["Service"]).collect()
}

/// Most ordinals expanded per StatefulSet claim template
pub const MAX_TEMPLATE_ORDINALS: u64 = MAX_REPLICAS as u64;

/// Persistent volume claims the release owns
///
/// Includes explicitly rendered claims and the per-replica claims that
/// StatefulSet `volumeClaimTemplates` produce
/// (`<template>-<statefulset>-<ordinal>`), at most
/// [`MAX_TEMPLATE_ORDINALS`] per template.
pub fn volume_claims(resources: &[RenderedResource]) -> Vec<ObjectRef> {
    let mut claims: Vec<ObjectRef> =
        refs_of_kind(resources, &["PersistentVolumeClaim"]).collect();

    for resource in resources
        .iter()
        .filter(|r| kind_of(r) == Some("StatefulSet"))
    {
        let Some(set) = object_ref(resource) else {
            continue;
        };
        let spec = resource.get("spec");
        let replicas = spec
            .and_then(|s| s.get("replicas"))
            .and_then(Value::as_u64)
            .unwrap_or(1);
        if replicas > MAX_TEMPLATE_ORDINALS {
            warn!(
                "{} asks for {} replicas, expanding claims for the first {}",
                set, replicas, MAX_TEMPLATE_ORDINALS
            );
        }
        let replicas = replicas.min(MAX_TEMPLATE_ORDINALS);
        let templates = spec
            .and_then(|s| s.get("volumeClaimTemplates"))
            .and_then(Value::as_array);

        for template in templates.into_iter().flatten() {
            let Some(template_name) = template
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            for ordinal in 0..replicas {
                claims.push(ObjectRef {
                    kind: "PersistentVolumeClaim".into(),
                    name: format!("{}-{}-{}", template_name, set.name, ordinal),
                    namespace: set.namespace.clone(),
                });
            }
        }
    }

    claims
}
