use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gestolink::action::ActionKind;
use gestolink::capture::{CaptureEvent, FrameSource};
use gestolink::csv_loader::{load_frames_from_csv, ReplaySource};
use gestolink::gesture_classifier::{GestureClassifier, GestureThresholds};
use gestolink::session::{FrameDecision, SessionConfig, SessionController};

/// Reproduce una captura CSV sin red y muestra los eventos que se enviarían
#[derive(Parser, Debug)]
#[command(name = "replay_csv")]
struct ReplayOptions {
    /// CSV con cabecera frame,label,landmark,x,y,z
    csv_path: PathBuf,

    /// Frames por segundo de la captura
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Mostrar también los frames suprimidos
    #[arg(long)]
    show_suppressed: bool,

    /// Mostrar el gesto de cada mano
    #[arg(long)]
    dump_hands: bool,
}

fn main() -> Result<()> {
    let opts = ReplayOptions::parse();
    println!("🎞️  Reproduciendo captura desde {:?}", opts.csv_path);

    let frames = load_frames_from_csv(&opts.csv_path)?;
    println!("ℹ️  {} frames a {} fps\n", frames.len(), opts.fps);

    let config = SessionConfig::default();
    let classifier = GestureClassifier::new(GestureThresholds::default());
    let mut session = SessionController::new(config);
    let mut source = ReplaySource::new(frames, opts.fps)?.paced(false);

    let mut sent: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut suppressed = 0usize;
    let mut frame_idx = 0usize;

    while let Some(event) = source.next_event()? {
        let CaptureEvent::Frame(frame) = event else {
            break;
        };

        if opts.dump_hands {
            for hand in &frame.hands {
                if hand.is_empty() {
                    println!("  [{:>4}] {:<5} → sin puntas", frame_idx, hand.role.as_str());
                    continue;
                }
                println!(
                    "  [{:>4}] {:<5} → {}",
                    frame_idx,
                    hand.role.as_str(),
                    classifier.classify(hand).as_str()
                );
            }
        }

        match session.step(&frame.hands, frame.captured_at) {
            FrameDecision::Send(event) => {
                *sent.entry(event.kind().as_str()).or_insert(0) += 1;
                println!("📤 [{:>4}] {}", frame_idx, event.to_json()?);
            }
            FrameDecision::Suppress { kind, reason } => {
                suppressed += 1;
                if opts.show_suppressed {
                    println!("   [{:>4}] {} suprimido ({:?})", frame_idx, kind.as_str(), reason);
                }
            }
        }
        frame_idx += 1;
    }

    println!("\n📊 Resumen:");
    for kind in ActionKind::ALL {
        let count = sent.get(kind.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {:>6}", kind.as_str(), count);
    }
    println!("  {:<12} {:>6}", "suprimidos", suppressed);

    Ok(())
}
