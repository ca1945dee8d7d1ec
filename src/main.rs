//! native-ocr - Recognize text in images with the operating system's OCR engine
//!
//! One image is recognized with a direct call; several images are started
//! in the background and collected from completion notifications.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use native_ocr::config::{self, AppConfig};
use native_ocr::{
    CancellationToken, CompletionNotification, OcrError, OcrService, RecognitionResult,
    RequestId,
};

/// native-ocr - On-device text recognition
#[derive(Parser, Debug)]
#[command(name = "native-ocr", version)]
#[command(about = "Recognize text in images with the operating system's OCR engine")]
struct Args {
    /// Image files to recognize (PNG, JPEG, ...)
    images: Vec<PathBuf>,

    /// BCP-47 language hint, e.g. en-US (overrides the config file)
    #[arg(short, long)]
    language: Option<String>,

    /// Use fast recognition instead of accurate
    #[arg(long)]
    fast: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List the languages the platform recognizer supports and exit
    #[arg(long)]
    list_languages: bool,

    /// Write a default configuration file and exit
    #[arg(long)]
    write_default_config: bool,
}

/// Per-image line of JSON output
#[derive(Serialize)]
struct ImageReport<'a> {
    path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a RecognitionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let (config, config_source) = load_or_default_config(args.config.as_deref())?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &config_source {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Using default configuration"),
    }

    if args.write_default_config {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => config::default_config_path()?,
        };
        config::save_config(&AppConfig::default(), &path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let service = OcrService::new();
    service.initialize().context("Failed to initialize OCR engine")?;

    if args.list_languages {
        let languages = service.supported_languages()?;
        println!("{} supports {} languages:", service.engine_name(), languages.len());
        for language in languages {
            println!("  {language}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.images.is_empty() {
        anyhow::bail!("no images given (see --help)");
    }

    let mut options = config.recognition.to_options();
    if let Some(language) = &args.language {
        options = options.with_language(language.as_str());
    }
    if args.fast {
        options = options.fast(true);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling recognition");
                cancel.cancel();
            }
        });
    }

    let failures = if let [path] = args.images.as_slice() {
        let image = read_image(path)?;
        match service.recognize_text(&image, &options, &cancel).await {
            Ok(result) => {
                print_result(path, &result, args.json)?;
                0
            }
            Err(OcrError::Cancelled) => return Ok(ExitCode::from(130)),
            Err(e) => {
                print_error(path, &e.to_string(), args.json)?;
                1
            }
        }
    } else {
        recognize_many(&service, &args.images, options, &cancel, args.json).await?
    };

    if cancel.is_cancelled() {
        return Ok(ExitCode::from(130));
    }
    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Load the given configuration file, or the default one if it exists
fn load_or_default_config(explicit: Option<&Path>) -> Result<(AppConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok((config::load_config(path)?, Some(path.to_path_buf())));
        }
        return Ok((AppConfig::default(), None));
    }

    if let Ok(path) = config::default_config_path() {
        if path.exists() {
            let config = config::load_config(&path)?;
            return Ok((config, Some(path)));
        }
    }
    Ok((AppConfig::default(), None))
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Start every image in the background and report notifications as they land.
/// Returns the number of failed images.
async fn recognize_many(
    service: &OcrService,
    images: &[PathBuf],
    options: native_ocr::RecognitionOptions,
    cancel: &CancellationToken,
    json: bool,
) -> Result<usize> {
    // subscribe before starting so no completion is missed
    let rx = service.subscribe();

    let mut pending: HashMap<RequestId, PathBuf> = HashMap::new();
    for path in images {
        let image = read_image(path)?;
        let id = service.start_recognize_text(image, options.clone(), cancel.clone());
        pending.insert(id, path.clone());
    }

    let expected = pending.len();
    let collector_cancel = cancel.clone();
    let notifications: Vec<CompletionNotification> = tokio::task::spawn_blocking(move || {
        let mut received = Vec::with_capacity(expected);
        while received.len() < expected && !collector_cancel.is_cancelled() {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(notification) => received.push(notification),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        received
    })
    .await?;

    let mut failures = 0;
    for notification in notifications {
        let Some(path) = pending.remove(&notification.request_id) else {
            continue;
        };
        match (&notification.result, &notification.error) {
            (Some(result), _) => print_result(&path, result, json)?,
            (None, error) => {
                failures += 1;
                let message = error.as_deref().unwrap_or("text recognition failed");
                print_error(&path, message, json)?;
            }
        }
    }

    Ok(failures)
}

fn print_result(path: &Path, result: &RecognitionResult, json: bool) -> Result<()> {
    if json {
        let report = ImageReport {
            path,
            result: Some(result),
            error: None,
        };
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    println!("== {}", path.display());
    if !result.success {
        println!("(no text found)");
    }
    for line in &result.lines {
        println!("{line}");
    }
    Ok(())
}

fn print_error(path: &Path, message: &str, json: bool) -> Result<()> {
    if json {
        let report = ImageReport {
            path,
            result: None,
            error: Some(message.to_string()),
        };
        println!("{}", serde_json::to_string(&report)?);
    } else {
        eprintln!("== {}: {}", path.display(), message);
    }
    Ok(())
}
