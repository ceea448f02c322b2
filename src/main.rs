use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tts_studio::integration::ProductionEvent;
use tts_studio::script::{assign_voices, missing_speakers};
use tts_studio::{
    parse_script, HttpBackend, OutputFormat, Producer, StudioConfig, StudioError, TtsBackend,
};

/// Produce a multi-speaker audio file from a `Speaker: line` script
#[derive(Parser, Debug)]
#[command(name = "tts-studio", version, about)]
struct Cli {
    /// Script file, `-` or nothing reads stdin
    script: Option<PathBuf>,

    /// Output file (defaults to production_<run id>.<format>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "TTS_STUDIO_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the TTS backend
    #[arg(long)]
    backend_url: Option<String>,

    /// Backend profile (kokoro, voxcpm, vibevoice, elevenlabs, openai, coqui, generic)
    #[arg(long)]
    profile: Option<String>,

    /// Voice for a speaker, repeatable
    #[arg(long = "voice", value_name = "SPEAKER=VOICE", value_parser = parse_voice)]
    voices: Vec<(String, String)>,

    /// Assign backend voices round-robin to speakers without one
    #[arg(long)]
    auto_voices: bool,

    /// Output format: mp3, wav or ogg
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Base seed for reproducible synthesis
    #[arg(long)]
    seed: Option<u64>,

    /// Peak-normalize every chunk
    #[arg(long)]
    normalize: bool,

    /// Write the segment report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the voices the backend offers and exit
    #[arg(long)]
    list_voices: bool,
}

fn parse_voice(s: &str) -> std::result::Result<(String, String), String> {
    let (speaker, voice) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SPEAKER=VOICE, got '{}'", s))?;
    let (speaker, voice) = (speaker.trim(), voice.trim());
    if speaker.is_empty() || voice.is_empty() {
        return Err(format!("expected SPEAKER=VOICE, got '{}'", s));
    }
    Ok((speaker.to_string(), voice.to_string()))
}

fn read_script(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display())),
        _ => {
            let mut script = String::new();
            std::io::stdin()
                .read_to_string(&mut script)
                .context("Failed to read script from stdin")?;
            Ok(script)
        }
    }
}

async fn fetch_voices(backend: &dyn TtsBackend) -> Result<Vec<String>> {
    backend.list_voices().await.map_err(|e| {
        let err = StudioError::from(e);
        error!("{}", err.user_message());
        err.into()
    })
}

fn log_event(event: ProductionEvent) {
    match event {
        ProductionEvent::Started { run_id, lines } => {
            info!("Production {} started: {} lines", run_id, lines)
        }
        ProductionEvent::LineStarted { order_index, speaker, chunks } => {
            info!("Line {} ({}): {} chunk(s)", order_index + 1, speaker, chunks)
        }
        ProductionEvent::LineFinished { order_index, failed_chunks } if failed_chunks > 0 => {
            warn!("Line {} finished with {} failed chunk(s)", order_index + 1, failed_chunks)
        }
        ProductionEvent::LineFinished { .. } => {}
        ProductionEvent::Stitching => info!("Stitching audio"),
        ProductionEvent::Finished { duration_ms, failed_segments, .. } => info!(
            "Finished: {:.1}s of audio, {} failed line(s)",
            duration_ms as f64 / 1000.0,
            failed_segments
        ),
        ProductionEvent::Failed(reason) => error!("Production failed: {}", reason),
        ProductionEvent::Cancelled => warn!("Production cancelled"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tts_studio=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StudioConfig::load(path)?,
        None => StudioConfig::default(),
    };
    config.apply_env()?;
    if let Some(url) = &cli.backend_url {
        config.backend.url = url.clone();
    }
    if let Some(profile) = &cli.profile {
        config.backend.profile = Some(profile.clone());
    }

    let backend: Arc<dyn TtsBackend> = Arc::new(
        HttpBackend::new(config.backend.url.clone())
            .with_model(config.backend.model.clone())
            .with_timeout(config.production.synthesis.timeout()),
    );

    if cli.list_voices {
        let voices = fetch_voices(backend.as_ref()).await?;
        for voice in voices {
            println!("{}", voice);
        }
        return Ok(());
    }

    let mut production = config.production_config()?;
    if let Some(format) = cli.format {
        production.output_format = format;
    }
    if cli.seed.is_some() {
        production.seed = cli.seed;
    }
    if cli.normalize {
        production.normalize = true;
    }

    let script_text = read_script(cli.script.as_ref())?;
    let script = parse_script(&script_text);
    if script.is_empty() {
        bail!("The script contains no `Speaker: line` lines");
    }

    let mut voice_map = config.voices.clone();
    voice_map.extend(cli.voices.iter().cloned());

    if cli.auto_voices {
        let missing = missing_speakers(&script, &voice_map);
        if !missing.is_empty() {
            let available = fetch_voices(backend.as_ref()).await?;
            for (speaker, voice) in assign_voices(&missing, &available) {
                info!("Assigning voice {} to {}", voice, speaker);
                voice_map.insert(speaker, voice);
            }
        }
    }

    info!(
        "Producing {} lines via {} ({} format)",
        script.len(),
        config.backend.url,
        production.output_format
    );

    let (event_tx, event_rx) = bounded(100);
    let event_logger = thread::spawn(move || {
        for event in event_rx {
            log_event(event);
        }
    });

    let producer = Producer::new(backend, production).with_events(event_tx);

    let handle = producer.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling after the current line");
            handle.cancel();
        }
    });

    let result = producer.produce(&script, &voice_map).await;
    drop(producer);
    let _ = event_logger.join();

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(e) => {
            error!("{}", e.user_message());
            return Err(e.into());
        }
    };

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(artifact.file_name()));
    artifact
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote {} ({} bytes)", output.display(), artifact.audio.len());

    if let Some(report) = &cli.report {
        std::fs::write(report, artifact.report_json()?)
            .with_context(|| format!("Failed to write report {}", report.display()))?;
    }

    if !artifact.is_clean() {
        for segment in artifact.failed_segments() {
            warn!(
                "Line {} ({}) has gaps: {}",
                segment.order_index + 1,
                segment.speaker,
                segment
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voice() {
        assert_eq!(
            parse_voice("Alice=af_bella").unwrap(),
            ("Alice".to_string(), "af_bella".to_string())
        );
        assert!(parse_voice("Alice").is_err());
        assert!(parse_voice("=af_bella").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "tts-studio",
            "script.txt",
            "--voice",
            "A=v1",
            "--voice",
            "B=v2",
            "-f",
            "wav",
        ])
        .unwrap();

        assert_eq!(cli.voices.len(), 2);
        assert_eq!(cli.format, Some(OutputFormat::Wav));
        assert!(Cli::try_parse_from(["tts-studio", "-f", "flac"]).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_backend_error() {
        let backend = HttpBackend::new("http://127.0.0.1:9");
        let err = fetch_voices(&backend).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StudioError>(),
            Some(StudioError::Backend(_))
        ));
    }
}
