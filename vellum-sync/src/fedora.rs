//! [`Repository`] over the Fedora REST API, using a blocking `ureq` agent.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use vellum_core::{slug, ResourceKind, VersionDescriptor};

use crate::error::SyncError;
use crate::graph;
use crate::repository::{
    PutOutcome, Repository, RequestOptions, TransactionHandle, TransactionReply,
};

const ATOMIC_ID: &str = "Atomic-ID";
const ATOMIC_EXPIRES: &str = "Atomic-Expires";
const ARCHIVAL_GROUP: &str = "http://fedora.info/definitions/v4/repository#ArchivalGroup";
const NON_RDF_SOURCE: &str = "http://www.w3.org/ns/ldp#NonRDFSource";
const JSON_LD: &str = "application/ld+json; profile=\"http://www.w3.org/ns/json-ld#compacted\"";
const PREFER_CONTAINED: &str =
    "return=representation; include=\"http://www.w3.org/ns/oa#PreferContainedDescriptions\"";

pub struct FedoraRepository {
    agent: ureq::Agent,
    base: String,
}

impl FedoraRepository {
    pub fn new(base_uri: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(120))
            .build();
        Self {
            agent,
            base: base_uri.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: &str, url: &str, options: &RequestOptions) -> ureq::Request {
        let mut request = self.agent.request(method, url);
        if let Some(tx) = &options.transaction {
            request = request.set(ATOMIC_ID, tx);
        }
        if let Some(memento) = &options.memento {
            if let Ok(version) = VersionDescriptor::from_memento(memento) {
                request = request.set("Accept-Datetime", &http_date(version.created));
            }
        }
        request
    }

    fn read(&self, method: &'static str, url: &str, options: &RequestOptions) -> Result<ureq::Response, SyncError> {
        let mut request = self.request(method, url, options).set("Accept", JSON_LD);
        if options.contained_descriptions {
            request = request.set("Prefer", PREFER_CONTAINED);
        }
        respond(request.call())
    }

    fn json(&self, method: &'static str, url: &str, options: &RequestOptions) -> Result<Option<Value>, SyncError> {
        let response = self.read(method, url, options)?;
        match response.status() {
            200 => response
                .into_json::<Value>()
                .map(Some)
                .map_err(|e| SyncError::Transport(format!("{method} {url}: {e}"))),
            404 => Ok(None),
            status => Err(http(method, url, status)),
        }
    }

    fn tx_call(&self, method: &'static str, location: &str) -> Result<TransactionReply, SyncError> {
        let response = respond(self.agent.request(method, location).call())?;
        Ok(match response.status() {
            200 | 204 => TransactionReply::Ok {
                expires: response.header(ATOMIC_EXPIRES).and_then(parse_http_date),
            },
            409 => TransactionReply::Conflict,
            410 => TransactionReply::Gone,
            404 => TransactionReply::NotFound,
            status => return Err(http(method, location, status)),
        })
    }
}

/// Non-2xx statuses come back as responses; only transport failures are errors.
fn respond(result: Result<ureq::Response, ureq::Error>) -> Result<ureq::Response, SyncError> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(_, response)) => Ok(response),
        Err(ureq::Error::Transport(t)) => Err(SyncError::Transport(t.to_string())),
    }
}

fn http(method: &'static str, url: &str, status: u16) -> SyncError {
    SyncError::Http {
        method,
        url: url.to_string(),
        status,
    }
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Resource kind from the `rel="type"` entries of one or more Link headers.
pub fn kind_from_links<'h>(links: impl IntoIterator<Item = &'h str>) -> ResourceKind {
    let types: Vec<String> = links
        .into_iter()
        .flat_map(|header| header.split(','))
        .filter(|link| link.contains("rel=\"type\"") || link.contains("rel=type"))
        .filter_map(|link| {
            let start = link.find('<')?;
            let end = link[start..].find('>')? + start;
            Some(link[start + 1..end].to_string())
        })
        .collect();
    if types.iter().any(|t| t == NON_RDF_SOURCE) {
        ResourceKind::Binary
    } else if types.iter().any(|t| t == ARCHIVAL_GROUP) {
        ResourceKind::ArchivalGroup
    } else {
        ResourceKind::Container
    }
}

/// Turtle body of a container create carrying its title.
pub fn container_body(title: Option<&str>) -> String {
    match title {
        Some(title) => {
            let escaped = title.replace('\\', "\\\\").replace('"', "\\\"");
            format!("PREFIX dc: <http://purl.org/dc/elements/1.1/>\n<> dc:title \"{escaped}\" .\n")
        }
        None => String::new(),
    }
}

impl Repository for FedoraRepository {
    fn base_uri(&self) -> &str {
        &self.base
    }

    fn kind_of(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Option<ResourceKind>, SyncError> {
        let url = self.uri_for(path);
        let response = respond(self.request("HEAD", &url, options).call())?;
        match response.status() {
            200 => Ok(Some(kind_from_links(response.all("Link")))),
            404 => Ok(None),
            status => Err(http("HEAD", &url, status)),
        }
    }

    fn describe(&self, path: &str, options: &RequestOptions) -> Result<Option<Value>, SyncError> {
        self.json("GET", &self.uri_for(path), options)
    }

    fn create_container(
        &self,
        parent: &str,
        options: &RequestOptions,
    ) -> Result<String, SyncError> {
        let url = self.uri_for(parent);
        let mut request = self
            .request("POST", &url, options)
            .set("Content-Type", "text/turtle");
        if let Some(slug) = &options.slug {
            request = request.set("Slug", slug);
        }
        if options.archival_group {
            request = request.set("Link", &format!("<{ARCHIVAL_GROUP}>;rel=\"type\""));
        }
        let response = respond(request.send_string(&container_body(options.title.as_deref())))?;
        match response.status() {
            201 => {
                let created = response
                    .header("Location")
                    .and_then(|l| self.path_of(l))
                    .or_else(|| options.slug.as_deref().map(|s| slug::join(parent, s)));
                created.ok_or_else(|| SyncError::Transport(format!("POST {url}: no Location")))
            }
            status => Err(http("POST", &url, status)),
        }
    }

    fn put_binary(
        &self,
        path: &str,
        content: &[u8],
        options: &RequestOptions,
    ) -> Result<PutOutcome, SyncError> {
        let url = self.uri_for(path);
        let mut request = self.request("PUT", &url, options);
        if let Some(content_type) = &options.content_type {
            request = request.set("Content-Type", content_type);
        }
        if let Some(digest) = &options.digest {
            request = request.set("digest", &format!("sha-256={digest}"));
        }
        if let Some(name) = &options.file_name {
            request = request.set(
                "Content-Disposition",
                &format!("attachment; filename=\"{}\"", name.replace('"', "")),
            );
        }
        if options.overwrite_tombstone {
            request = request.set("Overwrite-Tombstone", "true");
        }
        let response = respond(request.send_bytes(content))?;
        match response.status() {
            200 | 201 | 204 => Ok(PutOutcome::Stored),
            410 => Ok(PutOutcome::Tombstoned),
            status => Err(http("PUT", &url, status)),
        }
    }

    fn describe_binary(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Option<Value>, SyncError> {
        let url = format!("{}/fcr:metadata", self.uri_for(path));
        let options = RequestOptions {
            contained_descriptions: false,
            ..options.clone()
        };
        let body = self.json("GET", &url, &options)?;
        Ok(body.map(|b| rebase_binary_graph(b, &url, &self.uri_for(path))))
    }

    fn delete(&self, path: &str, options: &RequestOptions) -> Result<(), SyncError> {
        let url = self.uri_for(path);
        let response = respond(self.request("DELETE", &url, options).call())?;
        match response.status() {
            200 | 204 => Ok(()),
            status => Err(http("DELETE", &url, status)),
        }
    }

    fn mementos(&self, path: &str) -> Result<Vec<String>, SyncError> {
        let url = format!("{}/fcr:versions", self.uri_for(path));
        let Some(body) = self.json("GET", &url, &RequestOptions::new())? else {
            return Ok(vec![]);
        };
        let nodes = graph::parse_graph(&body, &url)?;
        let mut mementos: Vec<String> = nodes
            .first()
            .map(|n| {
                n.contains
                    .iter()
                    .filter_map(|uri| uri.trim_end_matches('/').rsplit('/').next())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        mementos.sort();
        Ok(mementos)
    }

    fn begin_transaction(&self) -> Result<TransactionHandle, SyncError> {
        let url = format!("{}/fcr:tx", self.base);
        let response = respond(self.agent.post(&url).call())?;
        if response.status() != 201 {
            return Err(http("POST", &url, response.status()));
        }
        let location = response
            .header("Location")
            .map(str::to_string)
            .ok_or_else(|| SyncError::Transport(format!("POST {url}: no Location")))?;
        Ok(TransactionHandle {
            location,
            expires: response.header(ATOMIC_EXPIRES).and_then(parse_http_date),
        })
    }

    fn renew_transaction(&self, location: &str) -> Result<TransactionReply, SyncError> {
        self.tx_call("POST", location)
    }

    fn commit_transaction(&self, location: &str) -> Result<TransactionReply, SyncError> {
        self.tx_call("PUT", location)
    }

    fn rollback_transaction(&self, location: &str) -> Result<TransactionReply, SyncError> {
        self.tx_call("DELETE", location)
    }
}

/// The metadata of a binary is served from `…/fcr:metadata` but describes
/// the binary itself; make the first node's id the binary's URI.
fn rebase_binary_graph(mut body: Value, metadata_url: &str, binary_url: &str) -> Value {
    let fix = |node: &mut Value| {
        if node.get("@id").and_then(Value::as_str) == Some(metadata_url) {
            node["@id"] = Value::String(binary_url.to_string());
        }
    };
    match body.get_mut("@graph").and_then(Value::as_array_mut) {
        Some(nodes) => nodes.iter_mut().for_each(fix),
        None => fix(&mut body),
    }
    body
}
