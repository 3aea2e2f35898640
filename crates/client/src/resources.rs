//! Datasets, packages and file downloads.

use std::path::Path;

use blackfynn_protocol::constants::COLLECTION_PACKAGE_TYPE;
use blackfynn_protocol::messages::{CreateDatasetRequest, CreatePackageRequest, PackagesPage, Readme};
use blackfynn_protocol::{Dataset, Endpoint, FileDownload, Package, ProtocolError};
use blackfynn_session::Session;
use reqwest::{Method, StatusCode};
use tracing::{debug, info};

use crate::client::{Client, Expect, check, decode};
use crate::error::Result;

impl Client {
    /// Lists every dataset visible to the session's user.
    pub async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let endpoint = Endpoint::Datasets;
        let (session, _op) = self.acquire(endpoint.name()).await?;
        let resp = self
            .request(Method::GET, &endpoint, &session.token)
            .send()
            .await?;
        decode(check(&endpoint, resp, Expect::Status(StatusCode::OK)).await?).await
    }

    pub async fn get_dataset(&self, dataset_id: &str) -> Result<Dataset> {
        let endpoint = Endpoint::Dataset { dataset_id };
        let (session, _op) = self.acquire(endpoint.name()).await?;
        let resp = self
            .request(Method::GET, &endpoint, &session.token)
            .send()
            .await?;
        decode(check(&endpoint, resp, Expect::Status(StatusCode::OK)).await?).await
    }

    pub async fn create_dataset(&self, name: &str, description: Option<&str>) -> Result<Dataset> {
        let endpoint = Endpoint::CreateDataset;
        let (session, _op) = self.acquire(endpoint.name()).await?;
        let body = CreateDatasetRequest {
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        let resp = self
            .request(Method::POST, &endpoint, &session.token)
            .json(&body)
            .send()
            .await?;
        let dataset: Dataset = decode(check(&endpoint, resp, Expect::Success).await?).await?;
        info!(dataset = %dataset.content.id, name, "dataset created");
        Ok(dataset)
    }

    /// Returns the dataset's readme text.
    pub async fn get_description(&self, dataset_id: &str) -> Result<String> {
        let endpoint = Endpoint::Readme { dataset_id };
        let (session, _op) = self.acquire(endpoint.name()).await?;
        let resp = self
            .request(Method::GET, &endpoint, &session.token)
            .send()
            .await?;
        let readme: Readme = decode(check(&endpoint, resp, Expect::Status(StatusCode::OK)).await?).await?;
        Ok(readme.readme)
    }

    /// Replaces the dataset's readme text.
    pub async fn set_description(&self, dataset_id: &str, readme: &str) -> Result<()> {
        let endpoint = Endpoint::Readme { dataset_id };
        let (session, _op) = self.acquire(endpoint.name()).await?;
        let body = Readme {
            readme: readme.to_string(),
        };
        let resp = self
            .request(Method::PUT, &endpoint, &session.token)
            .json(&body)
            .send()
            .await?;
        check(&endpoint, resp, Expect::Status(StatusCode::OK)).await?;
        debug!(dataset = dataset_id, len = readme.len(), "description updated");
        Ok(())
    }

    /// Creates a collection (folder) in a dataset, optionally nested under
    /// `parent_id`.
    pub async fn create_collection(
        &self,
        name: &str,
        dataset_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Package> {
        let endpoint = Endpoint::Packages;
        let (session, _op) = self.acquire(endpoint.name()).await?;
        let body = CreatePackageRequest {
            name: name.to_string(),
            dataset: dataset_id.to_string(),
            package_type: COLLECTION_PACKAGE_TYPE.to_string(),
            parent: parent_id.map(str::to_string),
        };
        let resp = self
            .request(Method::POST, &endpoint, &session.token)
            .json(&body)
            .send()
            .await?;
        let package: Package =
            decode(check(&endpoint, resp, Expect::Status(StatusCode::CREATED)).await?).await?;
        info!(dataset = dataset_id, collection = %package.content.id, name, "collection created");
        Ok(package)
    }

    /// Lists every package of a dataset, following `cursor` until the server
    /// stops returning one. Pages are concatenated in arrival order.
    pub async fn list_packages(
        &self,
        dataset_id: &str,
        include_source_files: bool,
    ) -> Result<Vec<Package>> {
        let endpoint = Endpoint::DatasetPackages { dataset_id };
        let (session, _op) = self.acquire(endpoint.name()).await?;
        let page_size = self.config().page_size.to_string();

        let mut packages = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;
        loop {
            let mut query = vec![
                ("includeSourceFiles", include_source_files.to_string()),
                ("pageSize", page_size.clone()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let resp = self
                .request(Method::GET, &endpoint, &session.token)
                .query(&query)
                .send()
                .await?;
            let page: PackagesPage =
                decode(check(&endpoint, resp, Expect::Status(StatusCode::OK)).await?).await?;
            let batch = page
                .packages
                .ok_or(ProtocolError::MissingField("packages"))?;

            pages += 1;
            debug!(dataset = dataset_id, page = pages, count = batch.len(), "package page received");
            packages.extend(batch);

            match page.cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(dataset = dataset_id, pages, total = packages.len(), "packages listed");
        Ok(packages)
    }

    /// Fetches file metadata, including a pre-signed download URL.
    pub async fn get_file(&self, package_id: &str, file_id: &str) -> Result<FileDownload> {
        let endpoint = Endpoint::PackageFile {
            package_id,
            file_id,
        };
        let (session, _op) = self.acquire(endpoint.name()).await?;
        self.file_with(&session, &endpoint).await
    }

    /// Downloads a file's bytes through its pre-signed URL.
    pub async fn get_file_content(&self, package_id: &str, file_id: &str) -> Result<Vec<u8>> {
        let endpoint = Endpoint::PackageFile {
            package_id,
            file_id,
        };
        let (session, _op) = self.acquire("get_file_content").await?;
        let file = self.file_with(&session, &endpoint).await?;
        let url = file.url.ok_or(ProtocolError::MissingField("url"))?;
        let resp = self.get_url(&url).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Downloads a file to `dest`, returning the number of bytes written.
    pub async fn download_file(&self, package_id: &str, file_id: &str, dest: &Path) -> Result<u64> {
        let content = self.get_file_content(package_id, file_id).await?;
        tokio::fs::write(dest, &content).await?;
        info!(package = package_id, path = %dest.display(), bytes = content.len(), "file downloaded");
        Ok(content.len() as u64)
    }

    async fn file_with(&self, session: &Session, endpoint: &Endpoint<'_>) -> Result<FileDownload> {
        let resp = self
            .request(Method::GET, endpoint, &session.token)
            .send()
            .await?;
        decode(check(endpoint, resp, Expect::Status(StatusCode::OK)).await?).await
    }
}
