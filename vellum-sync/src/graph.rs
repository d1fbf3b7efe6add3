//! Compacted JSON-LD responses → [`GraphNode`]s.
//!
//! A repository describes a resource either as one node object carrying an
//! `@id`, or as an `@graph` array whose first node is the requested resource
//! and whose remaining nodes are its contained descriptions. Property names
//! arrive short (`title`) or prefixed (`dc:title`) depending on the context the
//! server applied; both are accepted.

use serde_json::Value;

use vellum_core::ResourceKind;

use crate::error::SyncError;

const TITLE: &[&str] = &["title", "dc:title", "http://purl.org/dc/elements/1.1/title"];
const CONTAINS: &[&str] = &["contains", "ldp:contains", "http://www.w3.org/ns/ldp#contains"];
const DIGEST: &[&str] = &[
    "hasMessageDigest",
    "premis:hasMessageDigest",
    "http://www.loc.gov/premis/rdf/v1#hasMessageDigest",
];
const SIZE: &[&str] = &["hasSize", "premis:hasSize", "http://www.loc.gov/premis/rdf/v1#hasSize"];
const MIME_TYPE: &[&str] = &[
    "hasMimeType",
    "ebucore:hasMimeType",
    "http://www.ebu.ch/metadata/ontologies/ebucore/ebucore#hasMimeType",
];
const FILENAME: &[&str] = &[
    "filename",
    "ebucore:filename",
    "http://www.ebu.ch/metadata/ontologies/ebucore/ebucore#filename",
];

/// One described resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    /// `None` when the node advertises neither container nor binary type.
    pub kind: Option<ResourceKind>,
    pub title: Option<String>,
    pub contains: Vec<String>,
    /// The SHA-256 entry of the node's digests, as lowercase hex.
    pub digest: Option<String>,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
}

/// Parse a response body into nodes; the first node is the described resource.
pub fn parse_graph(body: &Value, requested: &str) -> Result<Vec<GraphNode>, SyncError> {
    let malformed = |reason: &str| SyncError::MalformedGraph {
        path: requested.to_string(),
        reason: reason.to_string(),
    };
    let raw: Vec<&Value> = match body.get("@graph") {
        Some(Value::Array(nodes)) => nodes.iter().collect(),
        Some(_) => return Err(malformed("@graph is not an array")),
        None if body.get("@id").is_some() => vec![body],
        None => return Err(malformed("neither @graph nor @id present")),
    };
    let nodes = raw
        .into_iter()
        .map(|v| parse_node(v).ok_or_else(|| malformed("node without @id")))
        .collect::<Result<Vec<_>, _>>()?;
    match nodes.first() {
        Some(first) if same_resource(&first.id, requested) => Ok(nodes),
        Some(first) => Err(malformed(&format!("first node is {}", first.id))),
        None => Err(malformed("empty graph")),
    }
}

fn same_resource(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

fn parse_node(value: &Value) -> Option<GraphNode> {
    let id = value.get("@id")?.as_str()?.to_string();
    let types = strings(value.get("@type"));
    let kind = if types.iter().any(|t| is_type(t, "Binary") || is_type(t, "NonRDFSource")) {
        Some(ResourceKind::Binary)
    } else if types.iter().any(|t| is_type(t, "ArchivalGroup")) {
        Some(ResourceKind::ArchivalGroup)
    } else if types.iter().any(|t| is_type(t, "Container")) {
        Some(ResourceKind::Container)
    } else {
        None
    };
    Some(GraphNode {
        id,
        kind,
        title: first_string(value, TITLE),
        contains: CONTAINS
            .iter()
            .find_map(|k| value.get(*k))
            .map(|v| strings(Some(v)))
            .unwrap_or_default(),
        digest: sha256_digest(value),
        size: SIZE.iter().find_map(|k| value.get(*k)).and_then(as_u64),
        mime_type: first_string(value, MIME_TYPE),
        filename: first_string(value, FILENAME),
    })
}

fn is_type(t: &str, local: &str) -> bool {
    t == local
        || t.rsplit_once(':').map(|(_, l)| l) == Some(local)
        || t.rsplit_once('#').map(|(_, l)| l) == Some(local)
}

/// The `urn:sha-256:` value among a node's digests. Repositories may list
/// digests of other algorithms alongside it; those are never returned.
fn sha256_digest(value: &Value) -> Option<String> {
    let values = DIGEST.iter().find_map(|k| value.get(*k));
    strings(values).iter().find_map(|d| {
        let lower = d.trim().to_ascii_lowercase();
        lower
            .strip_prefix("urn:sha-256:")
            .or_else(|| lower.strip_prefix("urn:sha256:"))
            .map(str::to_string)
    })
}

/// Literal text from a plain string, `{"@value": …}` or `{"@id": …}`.
fn literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("@value")
            .or_else(|| map.get("@id"))
            .and_then(literal),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(literal).collect(),
        Some(other) => literal(other).into_iter().collect(),
        None => vec![],
    }
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k))
        .and_then(|v| strings(Some(v)).into_iter().next())
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        other => literal(other).and_then(|s| s.parse().ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn graph_form_keeps_requested_node_first() {
        let body = json!({
            "@graph": [
                {"@id": "http://r/rest/obj", "@type": ["fedora:Container", "fedora:ArchivalGroup"],
                 "title": "Object", "contains": ["http://r/rest/obj/a", "http://r/rest/obj/f.txt"]},
                {"@id": "http://r/rest/obj/a", "@type": "fedora:Container", "title": "A"},
                {"@id": "http://r/rest/obj/f.txt", "@type": ["fedora:Binary"],
                 "hasMessageDigest": "urn:sha-256:ABC", "hasSize": "12",
                 "hasMimeType": "text/plain", "filename": "f.txt"}
            ]
        });
        let nodes = parse_graph(&body, "http://r/rest/obj").expect("parse");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].kind, Some(ResourceKind::ArchivalGroup));
        assert_eq!(nodes[0].contains.len(), 2);
        assert_eq!(nodes[1].kind, Some(ResourceKind::Container));
        assert_eq!(nodes[2].kind, Some(ResourceKind::Binary));
        assert_eq!(nodes[2].digest.as_deref(), Some("abc"));
        assert_eq!(nodes[2].size, Some(12));
    }

    #[test]
    fn single_node_form_with_scalar_contains() {
        let body = json!({
            "@id": "http://r/rest/obj/a",
            "@type": "Container",
            "dc:title": {"@value": "A"},
            "ldp:contains": {"@id": "http://r/rest/obj/a/b"}
        });
        let nodes = parse_graph(&body, "http://r/rest/obj/a/").expect("parse");
        assert_eq!(nodes[0].title.as_deref(), Some("A"));
        assert_eq!(nodes[0].contains, vec!["http://r/rest/obj/a/b"]);
    }

    #[test]
    fn sha256_is_chosen_among_several_digests() {
        let body = json!({
            "@id": "http://r/rest/obj/f.txt",
            "@type": "fedora:Binary",
            "hasMessageDigest": ["urn:sha-512:aaaa", "urn:SHA-256:BBBB"]
        });
        let nodes = parse_graph(&body, "http://r/rest/obj/f.txt").expect("parse");
        assert_eq!(nodes[0].digest.as_deref(), Some("bbbb"));

        let other_only = json!({
            "@id": "http://r/rest/obj/g.txt",
            "@type": "fedora:Binary",
            "hasMessageDigest": [{"@id": "urn:sha-512:aaaa"}, "urn:md5:cccc"]
        });
        let nodes = parse_graph(&other_only, "http://r/rest/obj/g.txt").expect("parse");
        assert_eq!(nodes[0].digest, None);
    }

    #[test]
    fn first_node_must_be_requested_resource() {
        let body = json!({"@graph": [{"@id": "http://r/rest/other"}]});
        let err = parse_graph(&body, "http://r/rest/obj").unwrap_err();
        assert!(matches!(err, SyncError::MalformedGraph { .. }));
        assert!(parse_graph(&json!({"title": "x"}), "http://r/rest/obj").is_err());
    }
}
