//! Export: copy a preserved object's binaries back out to a staging location.

use serde::Serialize;

use vellum_core::PreservedObject;

use crate::error::SyncError;
use crate::store::{Location, ObjectStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    pub path: String,
    pub origin: String,
    pub destination: String,
    pub size: u64,
}

/// Copy every binary of `object` from its storage origin to `destination`,
/// keeping relative paths. Binaries without an origin fail the export.
pub fn export(
    store: &dyn ObjectStore,
    object: &PreservedObject,
    destination: &Location,
) -> Result<Vec<ExportedFile>, SyncError> {
    let mut exported = Vec::new();
    for binary in object.root.all_binaries() {
        let origin = binary
            .origin
            .as_deref()
            .ok_or_else(|| SyncError::SourceObjectMissing {
                origin: binary.location.clone(),
            })?;
        let from = Location::parse(origin)?;
        let to = destination.child(&binary.path);
        store.copy(&from, &to)?;
        tracing::debug!("exported {} to {to}", binary.path);
        exported.push(ExportedFile {
            path: binary.path.clone(),
            origin: origin.to_string(),
            destination: to.to_string(),
            size: binary.size,
        });
    }
    tracing::info!(
        "exported {} files of {} to {destination}",
        exported.len(),
        object.path
    );
    Ok(exported)
}
