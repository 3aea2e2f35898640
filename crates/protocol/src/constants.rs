use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://api.blackfynn.io";

/// Query parameter carrying the session token on non-upload calls.
pub const API_KEY_PARAM: &str = "api_key";

/// Default number of packages requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Package type sent when creating a collection.
pub const COLLECTION_PACKAGE_TYPE: &str = "collection";

/// Characters escaped inside a single path segment.
///
/// Server ids look like `N:dataset:<uuid>`; colons stay literal.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// How the session token is attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPlacement {
    /// `?api_key=<token>`
    Query,
    /// `Authorization: Bearer <token>`
    Bearer,
}

/// Every remote operation the client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    Session,
    Datasets,
    Dataset {
        dataset_id: &'a str,
    },
    CreateDataset,
    Readme {
        dataset_id: &'a str,
    },
    Packages,
    DatasetPackages {
        dataset_id: &'a str,
    },
    PackageFile {
        package_id: &'a str,
        file_id: &'a str,
    },
    UploadPreview {
        organization_id: &'a str,
    },
    UploadChunk {
        organization_id: &'a str,
        import_id: &'a str,
    },
    UploadComplete {
        organization_id: &'a str,
        import_id: &'a str,
    },
    UploadStatus {
        organization_id: &'a str,
        import_id: &'a str,
    },
}

impl Endpoint<'_> {
    /// Path relative to the API base URL, with ids escaped.
    pub fn path(&self) -> String {
        match self {
            Self::Session => "/account/api/session".into(),
            Self::Datasets => "/datasets/".into(),
            Self::Dataset { dataset_id } => format!("/datasets/{}", seg(dataset_id)),
            Self::CreateDataset => "/datasets".into(),
            Self::Readme { dataset_id } => format!("/datasets/{}/readme", seg(dataset_id)),
            Self::Packages => "/packages".into(),
            Self::DatasetPackages { dataset_id } => {
                format!("/datasets/{}/packages", seg(dataset_id))
            }
            Self::PackageFile {
                package_id,
                file_id,
            } => format!("/packages/{}/files/{}", seg(package_id), seg(file_id)),
            Self::UploadPreview { organization_id } => {
                format!("/upload/preview/organizations/{}", seg(organization_id))
            }
            Self::UploadChunk {
                organization_id,
                import_id,
            } => format!(
                "/upload/chunk/organizations/{}/id/{}",
                seg(organization_id),
                seg(import_id)
            ),
            Self::UploadComplete {
                organization_id,
                import_id,
            } => format!(
                "/upload/complete/organizations/{}/id/{}",
                seg(organization_id),
                seg(import_id)
            ),
            Self::UploadStatus {
                organization_id,
                import_id,
            } => format!(
                "/upload/status/organizations/{}/id/{}",
                seg(organization_id),
                seg(import_id)
            ),
        }
    }

    /// Where this endpoint expects the session token.
    ///
    /// The authentication call itself carries no token; it reports `Query`
    /// and callers never attach one.
    pub fn token_placement(&self) -> TokenPlacement {
        match self {
            Self::UploadPreview { .. }
            | Self::UploadChunk { .. }
            | Self::UploadComplete { .. }
            | Self::UploadStatus { .. } => TokenPlacement::Bearer,
            _ => TokenPlacement::Query,
        }
    }

    /// Short name used in log fields and operation labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Session => "authenticate",
            Self::Datasets => "list_datasets",
            Self::Dataset { .. } => "get_dataset",
            Self::CreateDataset => "create_dataset",
            Self::Readme { .. } => "readme",
            Self::Packages => "create_package",
            Self::DatasetPackages { .. } => "list_packages",
            Self::PackageFile { .. } => "get_file",
            Self::UploadPreview { .. } => "upload_preview",
            Self::UploadChunk { .. } => "upload_chunk",
            Self::UploadComplete { .. } => "upload_complete",
            Self::UploadStatus { .. } => "upload_status",
        }
    }
}

fn seg(s: &str) -> String {
    utf8_percent_encode(s, SEGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_paths_keep_colons() {
        let ep = Endpoint::Dataset {
            dataset_id: "N:dataset:ca906e73-9671-45b7-a25c-9df865777a60",
        };
        assert_eq!(
            ep.path(),
            "/datasets/N:dataset:ca906e73-9671-45b7-a25c-9df865777a60"
        );
    }

    #[test]
    fn list_datasets_has_trailing_slash() {
        assert_eq!(Endpoint::Datasets.path(), "/datasets/");
        assert_eq!(Endpoint::CreateDataset.path(), "/datasets");
    }

    #[test]
    fn upload_paths() {
        let oid = "N:organization:618e8dd9";
        let iid = "24f2fe8f-d4ef-4e13-8cf5-5160cc9fe944";
        assert_eq!(
            Endpoint::UploadPreview {
                organization_id: oid
            }
            .path(),
            "/upload/preview/organizations/N:organization:618e8dd9"
        );
        assert_eq!(
            Endpoint::UploadChunk {
                organization_id: oid,
                import_id: iid
            }
            .path(),
            format!("/upload/chunk/organizations/{oid}/id/{iid}")
        );
        assert_eq!(
            Endpoint::UploadComplete {
                organization_id: oid,
                import_id: iid
            }
            .path(),
            format!("/upload/complete/organizations/{oid}/id/{iid}")
        );
        assert_eq!(
            Endpoint::UploadStatus {
                organization_id: oid,
                import_id: iid
            }
            .path(),
            format!("/upload/status/organizations/{oid}/id/{iid}")
        );
    }

    #[test]
    fn segments_are_escaped() {
        let ep = Endpoint::PackageFile {
            package_id: "a/b",
            file_id: "1 2",
        };
        assert_eq!(ep.path(), "/packages/a%2Fb/files/1%202");
    }

    #[test]
    fn upload_family_uses_bearer() {
        assert_eq!(
            Endpoint::UploadPreview {
                organization_id: "o"
            }
            .token_placement(),
            TokenPlacement::Bearer
        );
        assert_eq!(
            Endpoint::UploadChunk {
                organization_id: "o",
                import_id: "i"
            }
            .token_placement(),
            TokenPlacement::Bearer
        );
        assert_eq!(Endpoint::Datasets.token_placement(), TokenPlacement::Query);
        assert_eq!(
            Endpoint::DatasetPackages { dataset_id: "d" }.token_placement(),
            TokenPlacement::Query
        );
    }
}
