/*
Gesture streaming daemon - landmarks de mano → gestos → WebSocket

Sistema que:
1. Recibe por frame los landmarks de las manos del detector externo (JSON-lines o CSV)
2. Clasifica cada mano (pinch, pinch_zoom, pointer) por distancias entre puntas
3. Resuelve una acción combinada (derecha > izquierda) y aplica throttle
4. Envía el evento JSON al consumidor, reconectando si la conexión cae

Ejemplo con el detector escribiendo en stdout:
    python detector.py | ./target/release/gestolink --url ws://localhost:8884

Reproducir una captura grabada:
    ./target/release/gestolink --input captura.csv --replay-fps 30
*/

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use gestolink::capture::{spawn_reader, FrameSource, JsonLinesSource};
use gestolink::csv_loader::{load_frames_from_csv, ReplaySource};
use gestolink::gesture_classifier::GestureThresholds;
use gestolink::pipeline::{run, StopReason};
use gestolink::session::{SessionConfig, SessionController};
use gestolink::transport::{ResilientLink, RetryPolicy, WsConnector, DEFAULT_ENDPOINT};

#[derive(Parser, Debug)]
#[command(name = "gestolink", about = "Hand gesture events over WebSocket")]
struct Cli {
    /// WebSocket endpoint of the consumer
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    url: String,

    /// Frame input: "-" for stdin (JSON-lines), a .jsonl file or a .csv capture
    #[arg(long, default_value = "-")]
    input: String,

    /// Thumb-index distance below which a pinch is detected
    #[arg(long, default_value_t = 0.06)]
    pinch_threshold: f64,

    /// Ring-pinky distance below which a pinch-zoom is detected
    #[arg(long, default_value_t = 0.1)]
    zoom_threshold: f64,

    /// Base separation between neighbouring fingertips
    #[arg(long, default_value_t = 0.1)]
    base_threshold: f64,

    /// Minimum interval between active gesture events (ms)
    #[arg(long, default_value_t = 50)]
    throttle_ms: u64,

    /// Delay between reconnection attempts (ms)
    #[arg(long, default_value_t = 2000)]
    retry_delay_ms: u64,

    /// Random jitter added to the reconnection delay (ms)
    #[arg(long, default_value_t = 0)]
    retry_jitter_ms: u64,

    /// Give up after N connection attempts (default: retry forever)
    #[arg(long)]
    max_connect_attempts: Option<u32>,

    /// Playback rate for .csv captures
    #[arg(long, default_value_t = 30.0)]
    replay_fps: f64,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            thresholds: GestureThresholds {
                pinch: self.pinch_threshold,
                zoom: self.zoom_threshold,
                base: self.base_threshold,
            },
            throttle_interval: Duration::from_millis(self.throttle_ms),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_millis(self.retry_delay_ms),
            jitter: Duration::from_millis(self.retry_jitter_ms),
            max_attempts: self.max_connect_attempts,
        }
    }
}

fn open_source(cli: &Cli) -> Result<Box<dyn FrameSource>> {
    if cli.input == "-" {
        info!("leyendo frames desde stdin");
        return Ok(Box::new(spawn_reader(std::io::stdin())));
    }

    let path = Path::new(&cli.input);
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        let frames = load_frames_from_csv(path)?;
        let frame_count = frames.len();
        let source = ReplaySource::new(frames, cli.replay_fps)?;
        info!(
            frames = frame_count,
            period = ?source.period(),
            "reproduciendo captura CSV"
        );
        Ok(Box::new(source))
    } else {
        let file = File::open(path).with_context(|| format!("No se pudo abrir {:?}", path))?;
        info!(path = %path.display(), "leyendo frames JSON-lines");
        Ok(Box::new(JsonLinesSource::new(BufReader::new(file))))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gestolink=info".into()),
        )
        .init();

    info!("gestolink v{} iniciando", env!("CARGO_PKG_VERSION"));

    let config = cli.session_config();
    info!(
        pinch = config.thresholds.pinch,
        zoom = config.thresholds.zoom,
        base = config.thresholds.base,
        throttle = ?config.throttle_interval,
        "configuración de gestos"
    );

    let mut source = open_source(&cli)?;
    let mut link = ResilientLink::open(WsConnector::new(cli.url.as_str()), cli.retry_policy())
        .with_context(|| format!("No se pudo conectar a {}", cli.url))?;
    let mut session = SessionController::new(config);

    let (reason, _stats) = run(source.as_mut(), &mut session, &mut link)?;
    match reason {
        StopReason::CaptureEnded => info!("captura terminada"),
        StopReason::Quit => info!("salida solicitada"),
    }

    Ok(())
}
