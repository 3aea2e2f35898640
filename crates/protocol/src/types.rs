use serde::{Deserialize, Deserializer, Serialize};

type Extra = serde_json::Map<String, serde_json::Value>;

/// A dataset as returned by `/datasets/` and `/datasets/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub content: DatasetContent,
    /// Owner, organization, permissions and anything else the server sends.
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetContent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub int_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A package (collection, file package, ...) inside a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub content: PackageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Package>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageContent {
    pub id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub package_type: Option<String>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Body of `/packages/{pid}/files/{fid}`; `url` is a pre-signed download link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDownload {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Import manifest produced by a completed upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadManifest {
    #[serde(default, rename = "type")]
    pub manifest_type: Option<String>,
    #[serde(default)]
    pub import_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub content: ManifestContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestContent {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub package_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Accepts ids the server sends either as numbers or strings.
fn opt_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_keeps_unknown_fields() {
        let json = r#"{
            "content": {"id":"N:dataset:1","name":"Rats","intId":422,"createdAt":"2019-11-01"},
            "owner": "N:user:9",
            "role": "owner"
        }"#;
        let ds: Dataset = serde_json::from_str(json).unwrap();
        assert_eq!(ds.content.id, "N:dataset:1");
        assert_eq!(ds.content.int_id.as_deref(), Some("422"));
        assert_eq!(ds.content.extra["createdAt"], "2019-11-01");
        assert_eq!(ds.extra["owner"], "N:user:9");
    }

    #[test]
    fn package_with_children() {
        let json = r#"{
            "content": {"id":"N:collection:1","name":"raw","packageType":"Collection",
                        "datasetId":"N:dataset:1","state":"READY"},
            "children": [{"content":{"id":"N:package:2","name":"a.csv","parentId":17}}]
        }"#;
        let pkg: Package = serde_json::from_str(json).unwrap();
        assert_eq!(pkg.content.package_type.as_deref(), Some("Collection"));
        assert_eq!(pkg.children.len(), 1);
        assert_eq!(pkg.children[0].content.parent_id.as_deref(), Some("17"));
    }

    #[test]
    fn file_download_url() {
        let f: FileDownload =
            serde_json::from_str(r#"{"url":"https://s3/x?sig=1","name":"a.bin"}"#).unwrap();
        assert_eq!(f.url.as_deref(), Some("https://s3/x?sig=1"));
        assert_eq!(f.extra["name"], "a.bin");
    }

    #[test]
    fn null_ids_are_none() {
        let c: PackageContent =
            serde_json::from_str(r#"{"id":"p","parentId":null}"#).unwrap();
        assert!(c.parent_id.is_none());
    }
}
