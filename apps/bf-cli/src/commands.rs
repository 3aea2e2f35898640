use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blackfynn_client::{Client, Package, UploadEvent, UploadPhase, UploadRequest};
use clap::{Args, Subcommand};
use tokio::sync::mpsc;

use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum Command {
    /// Stores API credentials in the configuration file.
    Configure(ConfigureArg),
    /// Lists datasets.
    Datasets,
    /// Shows one dataset as JSON.
    Dataset { dataset_id: String },
    /// Creates a dataset.
    CreateDataset {
        name: String,
        #[clap(short, long)]
        description: Option<String>,
    },
    /// Prints a dataset's description, or replaces it with `--set`.
    Readme {
        dataset_id: String,
        #[clap(long)]
        set: Option<String>,
    },
    /// Lists a dataset's packages as a tree.
    Packages {
        dataset_id: String,
        /// Include source file records.
        #[clap(long)]
        source_files: bool,
    },
    /// Creates a collection.
    Mkdir {
        dataset_id: String,
        name: String,
        #[clap(long)]
        parent: Option<String>,
    },
    /// Uploads a file.
    Upload(UploadArg),
    /// Downloads a package file.
    Download {
        package_id: String,
        file_id: String,
        output: PathBuf,
    },
    /// Shows the status of an import.
    Status { import_id: String },
}

#[derive(Args)]
pub struct ConfigureArg {
    #[clap(long)]
    api_key: String,
    #[clap(long)]
    api_secret: String,
}

#[derive(Args)]
pub struct UploadArg {
    dataset_id: String,
    path: PathBuf,
    /// Target collection; the dataset root by default.
    #[clap(long)]
    collection: Option<String>,
    /// Remote file name; the local name by default.
    #[clap(long)]
    name: Option<String>,
}

impl Command {
    pub async fn run(self, settings: CliConfig, config_path: &Path) -> Result<()> {
        let command = match self {
            Command::Configure(arg) => return configure(arg, config_path),
            other => other,
        };

        let client = Client::new(settings.client_config())
            .context("invalid client configuration (run `bf configure` or set BLACKFYNN_API_KEY)")?;
        let result = command.run_with(&client).await;
        client.shutdown();
        result
    }

    async fn run_with(self, client: &Client) -> Result<()> {
        match self {
            // Handled in `run` before a client exists.
            Command::Configure(_) => {}
            Command::Datasets => {
                for dataset in client.list_datasets().await? {
                    println!("{}\t{}", dataset.content.id, dataset.content.name);
                }
            }
            Command::Dataset { dataset_id } => {
                let dataset = client.get_dataset(&dataset_id).await?;
                println!("{}", serde_json::to_string_pretty(&dataset)?);
            }
            Command::CreateDataset { name, description } => {
                let dataset = client.create_dataset(&name, description.as_deref()).await?;
                println!("{}", dataset.content.id);
            }
            Command::Readme { dataset_id, set } => match set {
                Some(text) => client.set_description(&dataset_id, &text).await?,
                None => println!("{}", client.get_description(&dataset_id).await?),
            },
            Command::Packages {
                dataset_id,
                source_files,
            } => {
                let packages = client.list_packages(&dataset_id, source_files).await?;
                for line in tree_lines(&packages) {
                    println!("{line}");
                }
            }
            Command::Mkdir {
                dataset_id,
                name,
                parent,
            } => {
                let collection = client
                    .create_collection(&name, &dataset_id, parent.as_deref())
                    .await?;
                println!("{}", collection.content.id);
            }
            Command::Upload(arg) => upload(client, arg).await?,
            Command::Download {
                package_id,
                file_id,
                output,
            } => {
                let bytes = client.download_file(&package_id, &file_id, &output).await?;
                println!("{bytes} bytes -> {}", output.display());
            }
            Command::Status { import_id } => {
                let status = client.upload_status(&import_id, None).await?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
        }
        Ok(())
    }
}

fn configure(arg: ConfigureArg, config_path: &Path) -> Result<()> {
    let mut stored = CliConfig::load_from(config_path)?;
    stored.api_key = arg.api_key;
    stored.api_secret = arg.api_secret;
    stored.save_to(config_path)?;
    println!("saved {}", config_path.display());
    Ok(())
}

async fn upload(client: &Client, arg: UploadArg) -> Result<()> {
    let mut request = UploadRequest::new(&arg.path, arg.dataset_id);
    if let Some(collection) = arg.collection {
        request = request.with_collection(collection);
    }
    if let Some(name) = arg.name {
        request = request.with_file_name(name);
    }

    let (tx, mut rx) = mpsc::channel(32);
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                UploadEvent::ChunkSent {
                    index,
                    total_chunks,
                    bytes_sent,
                    total_bytes,
                } => eprintln!(
                    "chunk {}/{total_chunks} ({bytes_sent}/{total_bytes} bytes)",
                    index + 1
                ),
                UploadEvent::Phase(UploadPhase::CompleteRequested) => eprintln!("completing..."),
                UploadEvent::Phase(_) => {}
            }
        }
    });

    let result = client.upload(&request, Some(tx)).await;
    let _ = progress.await;
    let report = result?;

    println!(
        "uploaded {} ({} bytes, {} chunks) import {}",
        report.file_name, report.bytes_sent, report.chunks_sent, report.import_id
    );
    for entry in &report.entries {
        if let Some(package) = &entry.package {
            println!("  package {}", package.content.id);
        }
    }
    Ok(())
}

/// Renders packages and their children as an indented tree.
fn tree_lines(packages: &[Package]) -> Vec<String> {
    fn walk(packages: &[Package], depth: usize, out: &mut Vec<String>) {
        for package in packages {
            let kind = package.content.package_type.as_deref().unwrap_or("?");
            out.push(format!(
                "{}{} [{kind}] {}",
                "  ".repeat(depth),
                package.content.name,
                package.content.id
            ));
            walk(&package.children, depth + 1, out);
        }
    }
    let mut out = Vec::new();
    walk(packages, 0, &mut out);
    out
}
