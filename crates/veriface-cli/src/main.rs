use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";

#[derive(Parser)]
#[command(name = "veriface", about = "Veriface face verification CLI")]
struct Cli {
    /// Server base URL (defaults to $VERIFACE_SERVER, then http://127.0.0.1:5000)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon health
    Health,
    /// Detect faces in an image
    Detect {
        /// Path to the image file
        image: PathBuf,
    },
    /// Verify an image against a reference image or an enrolled identity
    Verify {
        /// Path to the probe image
        image: PathBuf,
        /// Path to a reference image
        #[arg(short, long, conflicts_with = "reference_id")]
        reference: Option<PathBuf>,
        /// Name of an enrolled identity to verify against
        #[arg(short = 'i', long)]
        reference_id: Option<String>,
        /// Override the configured distance threshold
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Identify the closest enrolled face
    Recognize {
        /// Path to the image file
        image: PathBuf,
    },
    /// Enroll a face under a name
    Register {
        /// Identity name (e.g. "alice")
        #[arg(short, long)]
        name: String,
        /// Path to the image file
        image: PathBuf,
    },
    /// List enrolled identities
    Identities,
    /// Remove an enrolled identity
    Remove {
        /// Identity name to remove
        name: String,
    },
    /// Record attendance for an enrolled name
    Attend {
        /// Identity name, usually taken from a recognize result
        name: String,
    },
    /// Show the attendance log
    Log {
        /// Show at most this many records
        #[arg(short, long)]
        limit: Option<usize>,
        /// Only records for this identity
        #[arg(short, long)]
        name: Option<String>,
    },
}

struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    fn new(base: String) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.request(self.http.get(format!("{}{path}", self.base))).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.request(self.http.post(format!("{}{path}", self.base)).json(&body))
            .await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        self.request(self.http.delete(format!("{}{path}", self.base)))
            .await
    }

    async fn request(&self, req: reqwest::RequestBuilder) -> Result<Value> {
        let resp = req.send().await.context("request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("failed to read response body")?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));
        if !status.is_success() {
            bail!("server returned {status}: {body}");
        }
        Ok(body)
    }
}

/// Reads an image file and encodes it the way the API expects.
fn image_field(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(BASE64_STANDARD.encode(bytes))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base = cli
        .server
        .or_else(|| std::env::var("VERIFACE_SERVER").ok())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let client = Client::new(base);

    let output = match cli.command {
        Commands::Health => client.get("/api/health").await?,
        Commands::Detect { image } => {
            client
                .post("/api/detect", json!({ "image": image_field(&image)? }))
                .await?
        }
        Commands::Verify {
            image,
            reference,
            reference_id,
            threshold,
        } => {
            let mut body = json!({ "image": image_field(&image)? });
            match (reference, reference_id) {
                (Some(path), None) => {
                    body["reference_image"] = Value::String(image_field(&path)?);
                }
                (None, Some(id)) => {
                    body["reference_id"] = Value::String(id);
                }
                _ => bail!("pass exactly one of --reference or --reference-id"),
            }
            if let Some(threshold) = threshold {
                body["threshold"] = json!(threshold);
            }
            client.post("/api/verify", body).await?
        }
        Commands::Recognize { image } => {
            client
                .post("/api/recognize", json!({ "image": image_field(&image)? }))
                .await?
        }
        Commands::Register { name, image } => {
            client
                .post(
                    "/api/register",
                    json!({ "name": name, "image": image_field(&image)? }),
                )
                .await?
        }
        Commands::Identities => client.get("/api/identities").await?,
        Commands::Remove { name } => client.delete(&format!("/api/identities/{name}")).await?,
        Commands::Attend { name } => {
            client.post("/api/attendance", json!({ "name": name })).await?
        }
        Commands::Log { limit, name } => {
            let mut params = Vec::new();
            if let Some(limit) = limit {
                params.push(format!("limit={limit}"));
            }
            if let Some(name) = name {
                params.push(format!("name={name}"));
            }
            let path = if params.is_empty() {
                "/api/attendance".to_string()
            } else {
                format!("/api/attendance?{}", params.join("&"))
            };
            client.get(&path).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
