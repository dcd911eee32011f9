use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, ValueEnum};
use soul_observer::{
    models::{Category, Language},
    uploader::{SelectedImage, Uploader},
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Lang {
    Zh,
    En,
}

impl From<Lang> for Language {
    fn from(l: Lang) -> Self {
        match l {
            Lang::Zh => Language::Zh,
            Lang::En => Language::En,
        }
    }
}

/// Submit screenshots and a reflection to the analysis gateway.
#[derive(Debug, Parser)]
#[command(name = "uploader", version)]
struct Args {
    /// Gateway analyze endpoint
    #[arg(long, env = "SOUL_OBSERVER_ENDPOINT", default_value = "http://127.0.0.1:8080/api/analyze")]
    endpoint: String,

    /// Social feed screenshots (up to 4)
    #[arg(long, num_args = 1..)]
    moments: Vec<PathBuf>,

    /// Playlist screenshots (up to 2)
    #[arg(long, num_args = 1..)]
    playlist: Vec<PathBuf>,

    /// Everyday snapshots (up to 2)
    #[arg(long, num_args = 1..)]
    snaps: Vec<PathBuf>,

    /// A recent thought or feeling
    #[arg(long, default_value = "")]
    reflection: String,

    #[arg(long, value_enum, default_value_t = Lang::Zh)]
    language: Lang,

    /// Whole-request timeout in seconds
    #[arg(long, default_value_t = 180)]
    timeout_secs: u64,
}

async fn load(paths: &[PathBuf]) -> anyhow::Result<Vec<SelectedImage>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path).await.with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "image".into());
        images.push(SelectedImage { file_name, bytes: Bytes::from(bytes) });
    }
    Ok(images)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    let mut uploader = Uploader::new(&args.endpoint, Duration::from_secs(args.timeout_secs))?;
    uploader.set_language(args.language.into());
    uploader.set_reflection(&args.reflection);

    for (category, paths) in [(Category::Moments, &args.moments), (Category::Playlist, &args.playlist), (Category::Snaps, &args.snaps)] {
        let dropped = uploader.add_images(category, load(paths).await?);
        if dropped > 0 {
            eprintln!("{}: kept {}, dropped {} over the limit", category.field_name(), category.cap(), dropped);
        }
    }

    match uploader.submit().await {
        Ok(result) => {
            for (key, value) in &result {
                println!("[{key}]\n{}\n", value.as_str().unwrap_or_default());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::debug!("submission failed: {}", e);
            eprintln!("{}", e.user_message(uploader.language()));
            Ok(ExitCode::FAILURE)
        }
    }
}
