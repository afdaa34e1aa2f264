use async_trait::async_trait;
use craft_types::{ArtifactKind, ImageKind, PlanId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub mod fs;
pub use fs::FsBlobStore;

pub mod memory;
pub use memory::InMemoryBlobStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("blob store io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("blob {key} is not valid JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid blob key: {0}")]
    InvalidKey(String),
}

/// Plan-scoped key-value storage. Writes are whole-object overwrites.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// `None` when the key is absent; absence is never an error.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Full overwrite; parent structure is created implicitly.
    async fn write_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;
}

pub fn artifact_key(plan: PlanId, kind: ArtifactKind) -> String {
    format!("{plan}/{}", kind.file_name())
}

pub fn image_key(plan: PlanId, extension: &str) -> String {
    format!("{plan}/image.{extension}")
}

pub async fn read_json<T: DeserializeOwned>(
    store: &dyn BlobStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(bytes) = store.read_bytes(key).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })
}

pub async fn write_json<T: Serialize + Sync>(
    store: &dyn BlobStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        key: key.to_string(),
        source,
    })?;
    store.write_bytes(key, bytes, "application/json").await
}

pub async fn read_artifact<T: DeserializeOwned>(
    store: &dyn BlobStore,
    plan: PlanId,
    kind: ArtifactKind,
) -> Result<Option<T>, StoreError> {
    read_json(store, &artifact_key(plan, kind)).await
}

pub async fn write_artifact<T: Serialize + Sync>(
    store: &dyn BlobStore,
    plan: PlanId,
    kind: ArtifactKind,
    value: &T,
) -> Result<(), StoreError> {
    write_json(store, &artifact_key(plan, kind), value).await
}

pub async fn artifact_exists(
    store: &dyn BlobStore,
    plan: PlanId,
    kind: ArtifactKind,
) -> Result<bool, StoreError> {
    store.exists(&artifact_key(plan, kind)).await
}

/// Find the submitted image under any accepted extension.
pub async fn find_image(
    store: &dyn BlobStore,
    plan: PlanId,
) -> Result<Option<(String, ImageKind)>, StoreError> {
    for (ext, kind) in ImageKind::PROBE_EXTENSIONS {
        let key = image_key(plan, ext);
        if store.exists(&key).await? {
            return Ok(Some((key, kind)));
        }
    }
    Ok(None)
}

/// Key segments must stay inside the store root.
pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_plan_scoped() {
        let plan: PlanId = "749dae63-e297-41bf-82bc-74b5d735b8fd".parse().unwrap();
        assert_eq!(
            artifact_key(plan, ArtifactKind::Parts3d),
            "749dae63-e297-41bf-82bc-74b5d735b8fd/parts3d.json"
        );
        assert_eq!(
            image_key(plan, "png"),
            "749dae63-e297-41bf-82bc-74b5d735b8fd/image.png"
        );
    }

    #[test]
    fn traversal_keys_are_rejected() {
        assert!(check_key("a/b.json").is_ok());
        assert!(check_key("../etc/passwd").is_err());
        assert!(check_key("/abs").is_err());
        assert!(check_key("a//b").is_err());
    }

    #[tokio::test]
    async fn json_helpers_treat_absence_as_none() {
        let store = InMemoryBlobStore::new();
        let plan = PlanId::new();
        let got: Option<Vec<u32>> = read_artifact(&store, plan, ArtifactKind::PartsList)
            .await
            .unwrap();
        assert!(got.is_none());

        write_artifact(&store, plan, ArtifactKind::PartsList, &vec![1u32, 2])
            .await
            .unwrap();
        let got: Option<Vec<u32>> = read_artifact(&store, plan, ArtifactKind::PartsList)
            .await
            .unwrap();
        assert_eq!(got, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn image_probe_finds_png() {
        let store = InMemoryBlobStore::new();
        let plan = PlanId::new();
        assert!(find_image(&store, plan).await.unwrap().is_none());
        store
            .write_bytes(&image_key(plan, "png"), vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        let (key, kind) = find_image(&store, plan).await.unwrap().unwrap();
        assert!(key.ends_with("image.png"));
        assert_eq!(kind, ImageKind::Png);
    }
}
