use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tunefetch::{
    DeezerCredentials, DeezerDownloader, DownloadManager, DownloadQuality, Pipeline, SongLinkApi,
    TagEmbedder,
};

#[derive(Parser)]
#[command(name = "tunefetch-cli")]
#[command(about = "Resolve a music link, download it and tag it", long_about = None)]
struct Cli {
    /// Link-aggregation API base URL
    #[arg(long, env = "TUNEFETCH_SONGLINK_URL", default_value = "https://api.song.link")]
    songlink_url: String,

    /// Region sent to the link-aggregation API
    #[arg(long, default_value = "US")]
    country: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Quality {
    Mp3_320,
    Mp3_128,
}

impl From<Quality> for DownloadQuality {
    fn from(q: Quality) -> Self {
        match q {
            Quality::Mp3_320 => DownloadQuality::Mp3_320,
            Quality::Mp3_128 => DownloadQuality::Mp3_128,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download a track and write it as "Artist - Title.mp3"
    Fetch {
        /// Link to the track on any supported platform
        url: String,

        /// Deezer ARL cookie (can also be set via DEEZER_ARL env var)
        #[arg(long, env = "DEEZER_ARL", hide_env_values = true)]
        arl: String,

        /// Deezer decryption secret (can also be set via DEEZER_SECRET env var)
        #[arg(long, env = "DEEZER_SECRET", hide_env_values = true)]
        secret: String,

        /// Output directory for downloads
        #[arg(short, long, env = "TUNEFETCH_OUTPUT", default_value = "downloads")]
        output: PathBuf,

        /// Audio quality
        #[arg(short, long, value_enum, default_value_t = Quality::Mp3_128)]
        quality: Quality,
    },
    /// Resolve a link and print the track info as JSON
    Resolve {
        /// Link to the track on any supported platform
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    let mut resolver = SongLinkApi::with_base_url(cli.songlink_url)?;
    resolver.set_country(cli.country);

    match cli.command {
        Commands::Resolve { url } => {
            let info = resolver.resolve(&url, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Fetch {
            url,
            arl,
            secret,
            output,
            quality,
        } => {
            let deezer = DeezerDownloader::new(DeezerCredentials { arl, secret })?
                .with_quality(quality.into());

            let mut downloads = DownloadManager::new();
            downloads.register(deezer);
            for platform in downloads.platforms() {
                info!("Registered downloader for {}", platform);
            }

            let pipeline = Pipeline::new(resolver, downloads, TagEmbedder::new()?);
            let track = pipeline.run(&url, &cancel).await?;

            for warning in &track.warnings {
                warn!("{}", warning);
            }

            tokio::fs::create_dir_all(&output).await?;
            let path = output.join(track.file_name());
            tokio::fs::write(&path, &track.bytes).await?;

            info!("Saved {} from {}", path.display(), track.platform);
            println!("✅ Downloaded: {} - {}", track.artist, track.title);
            println!("   Path: {}", path.display());
        }
    }

    Ok(())
}
