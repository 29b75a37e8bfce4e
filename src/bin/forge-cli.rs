use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use forge_proxy::lifecycle::Shutdown;
use forge_proxy::orchestration::{
    resolve_artifact, GenerationOptions, GenerationRequest, PollSettings, ProgressEvent,
    ResolvedArtifact, TaskClient, DEFAULT_MAX_ATTEMPTS,
};

#[derive(Parser)]
#[command(name = "forge-cli")]
#[command(about = "Drive image-to-3D generations through a running forge-proxy", long_about = None)]
struct Cli {
    /// The proxy's API root.
    #[arg(short, long, env = "FORGE_API_URL", default_value = "http://localhost:8080/api")]
    url: String,

    /// Milliseconds between status checks.
    #[arg(long, default_value_t = 2000)]
    interval_ms: u64,

    /// Status checks before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an image and print its file token
    Upload { image: PathBuf },
    /// Upload an image, generate a model and download it
    Generate {
        image: PathBuf,
        #[arg(short, long)]
        prompt: Option<String>,
        /// Convert to this format when generation produced another one
        #[arg(short, long)]
        format: Option<String>,
        #[arg(long)]
        model_version: Option<String>,
        #[arg(long)]
        texture: Option<bool>,
        #[arg(long)]
        pbr: Option<bool>,
        #[arg(long)]
        face_limit: Option<u32>,
        /// Where to write the artifact (defaults to `<task id>.<ext>`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a task's status, or wait for it with --wait
    Status {
        task_id: String,
        #[arg(short, long)]
        wait: bool,
    },
    /// Convert a finished task's model to another format
    Convert {
        task_id: String,
        #[arg(short, long)]
        format: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Fetch a storage URL through the download relay
    Download {
        url: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forge_proxy=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Ctrl+C stops polling without reporting a false success or failure.
    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let client = TaskClient::new(cli.url)
        .with_poll_settings(PollSettings {
            interval: Duration::from_millis(cli.interval_ms),
            max_attempts: cli.max_attempts,
        })
        .with_cancellation(shutdown.token());

    match cli.command {
        Commands::Upload { image } => {
            let data = tokio::fs::read(&image).await?;
            let upload = client.upload(&file_name(&image), data).await?;
            println!("{}", upload.file_token);
        }
        Commands::Generate {
            image,
            prompt,
            format,
            model_version,
            texture,
            pbr,
            face_limit,
            output,
        } => {
            let data = tokio::fs::read(&image).await?;
            let request = GenerationRequest {
                prompt,
                options: GenerationOptions {
                    model_version,
                    texture,
                    pbr,
                    face_limit,
                },
            };
            let outcome = client
                .generate(&file_name(&image), data, &request, format.as_deref(), print_progress)
                .await?;
            eprintln!("generation task: {}", outcome.generation.id);
            if let Some(conversion) = &outcome.conversion {
                eprintln!("conversion task: {}", conversion.id);
            }
            save(&client, &outcome.artifact, output).await?;
        }
        Commands::Status { task_id, wait } => {
            let task = if wait {
                client.wait_for_task(&task_id, print_progress).await?
            } else {
                client.task_status(&task_id).await?
            };
            println!("{}: {}", task.id, task.status);
            if let Some(progress) = task.progress {
                println!("progress: {}%", progress);
            }
            if let Some(result) = &task.result {
                println!("artifact: {}", result.artifact_url);
            }
        }
        Commands::Convert {
            task_id,
            format,
            output,
        } => {
            let conversion_id = client.create_conversion_task(&task_id, &format).await?;
            eprintln!("conversion task: {}", conversion_id);
            let task = client.wait_for_task(&conversion_id, print_progress).await?;
            save(&client, &resolve_artifact(&task)?, output).await?;
        }
        Commands::Download { url, output } => {
            let bytes = client.download_url(&url).await?;
            tokio::fs::write(&output, &bytes).await?;
            println!("{} ({} bytes)", output.display(), bytes.len());
        }
    }

    Ok(())
}

fn print_progress(event: ProgressEvent) {
    match event.progress {
        Some(progress) => eprintln!("[{}] {} {}%", event.task_id, event.status, progress),
        None => eprintln!("[{}] {}", event.task_id, event.status),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string())
}

async fn save(
    client: &TaskClient,
    artifact: &ResolvedArtifact,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = client.download_artifact(artifact).await?;
    let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.{}", artifact.task_id, artifact.extension)));
    tokio::fs::write(&path, &bytes).await?;
    println!("{} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
