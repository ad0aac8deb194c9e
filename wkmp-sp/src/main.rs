//! Sound Player (wkmp-sp) - command-line player
//!
//! Loads one sound from the given candidate sources, plays it (or one of its
//! sprites) and logs every event until playback ends. Output goes through
//! the headless virtual device, with real fetching and decoding, which makes
//! the binary useful for checking that assets load and sprites line up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wkmp_sp::backend::{CodecTable, HttpFetcher, SymphoniaDecoder, VirtualPlatform};
use wkmp_sp::{ContextConfig, EventKind, PlaybackContext, Sound, SoundDescriptor, Sprite};

/// Command-line arguments for wkmp-sp
#[derive(Parser, Debug)]
#[command(name = "wkmp-sp")]
#[command(about = "Sound player: load a sound and play it headless")]
#[command(version)]
struct Args {
    /// Candidate sources in preference order (paths or URLs)
    #[arg(required = true)]
    sources: Vec<String>,

    /// Config file (overrides WKMP_SP_CONFIG and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sprite definition NAME:OFFSET_MS:DURATION_MS (repeatable)
    #[arg(long = "define", value_parser = parse_sprite)]
    sprites: Vec<(String, Sprite)>,

    /// Sprite to play instead of the whole clip
    #[arg(short, long)]
    sprite: Option<String>,

    /// Sound volume [0.0, 1.0]
    #[arg(long, default_value = "1.0")]
    volume: f32,

    /// Fade in over this many milliseconds
    #[arg(long)]
    fade_in: Option<u64>,

    /// Loop and stop after this many iterations
    #[arg(long)]
    loops: Option<u32>,

    /// Force the streaming backend
    #[arg(long)]
    html5: bool,
}

fn parse_sprite(arg: &str) -> std::result::Result<(String, Sprite), String> {
    let parts: Vec<&str> = arg.split(':').collect();
    let [name, offset, duration] = parts.as_slice() else {
        return Err(format!("expected NAME:OFFSET_MS:DURATION_MS, got '{}'", arg));
    };
    let offset: f64 = offset
        .parse()
        .map_err(|e| format!("invalid offset '{}': {}", offset, e))?;
    let duration: f64 = duration
        .parse()
        .map_err(|e| format!("invalid duration '{}': {}", duration, e))?;
    Ok((name.to_string(), Sprite::new(offset, duration)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ContextConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wkmp_sp={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting WKMP Sound Player");

    let device = VirtualPlatform::new();
    let platform = device
        .platform()
        .with_fetcher(Arc::new(HttpFetcher::new()))
        .with_decoder(Arc::new(SymphoniaDecoder::new()))
        .with_codecs(Arc::new(CodecTable::symphonia()));
    let ctx = PlaybackContext::new(platform, config).context("Failed to create playback context")?;
    info!("Playback context ready ({} backend)", ctx.backend());

    let mut descriptor = SoundDescriptor::new(args.sources.clone())
        .volume(args.volume)
        .looping(args.loops.is_some())
        .html5(args.html5);
    for (name, sprite) in &args.sprites {
        descriptor = descriptor.sprite(name, *sprite);
    }
    let sound = Sound::new(&ctx, descriptor).context("Invalid sound")?;
    let mut events = sound.subscribe();

    let voice = match &args.sprite {
        Some(name) => sound.play_sprite(name),
        None => sound.play(),
    };
    let Some(voice) = voice else {
        bail!("Nothing to play");
    };
    if let Some(ms) = args.fade_in {
        sound.fade_voice(0.0, args.volume, Duration::from_millis(ms), voice);
    }

    let mut iterations = 0;
    loop {
        let event = tokio::select! {
            received = events.recv() => received,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping playback");
                sound.stop();
                break;
            }
        };

        let event = match event {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                warn!("Missed {} events", missed);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match (event.kind, event.message.as_deref()) {
            (kind, Some(message)) => info!("{} (voice {:?}): {}", kind, event.voice, message),
            (kind, None) => info!("{} (voice {:?})", kind, event.voice),
        }

        match event.kind {
            EventKind::LoadError => bail!("Sound failed to load"),
            EventKind::PlayError => bail!("Sound failed to play"),
            EventKind::End if event.voice == Some(voice) => {
                iterations += 1;
                if args.loops.map_or(true, |loops| iterations >= loops) {
                    sound.stop();
                    break;
                }
            }
            _ => {}
        }
    }

    sound.unload();
    info!("Playback finished");
    Ok(())
}
