//! Entrada de frames desde el detector externo.
//!
//! El detector escribe una línea JSON por frame:
//! `{"hands": [{"label": "Right", "landmarks": [[x, y, z], ...]}]}`
//! con los landmarks indexados por id (21 por mano). Una entrada `null` o una
//! lista corta dejan el punto ausente. La línea `{"quit": true}` detiene el bucle.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::types::{HandFrame, HandSnapshot, Handedness, Keypoint};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Frame con las manos detectadas y el instante de captura
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub hands: HandFrame,
    pub captured_at: Instant,
}

impl CapturedFrame {
    pub fn now(hands: HandFrame) -> Self {
        Self {
            hands,
            captured_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Frame(CapturedFrame),
    /// Salida explícita pedida por la capa de visualización
    Quit,
}

/// Fuente de frames. `Ok(None)` indica fin del stream.
pub trait FrameSource {
    fn next_event(&mut self) -> Result<Option<CaptureEvent>, CaptureError>;

    /// Frames perdidos antes de llegar al bucle
    fn dropped_frames(&self) -> u64 {
        0
    }
}

// ── Formato de línea ───────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePoint {
    Triple([f64; 3]),
    Object(Keypoint),
}

impl From<WirePoint> for Keypoint {
    fn from(point: WirePoint) -> Self {
        match point {
            WirePoint::Triple([x, y, z]) => Keypoint::new(x, y, z),
            WirePoint::Object(kp) => kp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireHand {
    label: String,
    #[serde(default)]
    landmarks: Vec<Option<WirePoint>>,
}

#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(default)]
    hands: Vec<WireHand>,
    #[serde(default)]
    quit: bool,
}

/// Convierte una línea en evento. Las líneas vacías devuelven `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<CaptureEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let wire: WireFrame = serde_json::from_str(line)?;
    if wire.quit {
        return Ok(Some(CaptureEvent::Quit));
    }

    let hands = wire
        .hands
        .into_iter()
        .filter_map(|hand| {
            let Some(role) = Handedness::parse(&hand.label) else {
                warn!(label = %hand.label, "etiqueta de mano desconocida, se ignora");
                return None;
            };
            let landmarks: Vec<Option<Keypoint>> = hand
                .landmarks
                .into_iter()
                .map(|point| point.map(Keypoint::from))
                .collect();
            Some(HandSnapshot::from_landmark_list(role, &landmarks))
        })
        .collect();

    Ok(Some(CaptureEvent::Frame(CapturedFrame::now(hands))))
}

// ── Lector síncrono ────────────────────────────────────────

/// Lee JSON-lines de forma síncrona (ficheros grabados)
pub struct JsonLinesSource<R: BufRead> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> FrameSource for JsonLinesSource<R> {
    fn next_event(&mut self) -> Result<Option<CaptureEvent>, CaptureError> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line,
                Err(e) => {
                    warn!(line = self.line_no, error = %e, "línea de captura no es UTF-8, se descarta");
                    continue;
                }
            };

            match parse_line(line) {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => continue,
                Err(e) => {
                    warn!(line = self.line_no, error = %e, "línea de captura inválida, se descarta");
                }
            }
        }
    }
}

// ── Lector en hilo ─────────────────────────────────────────

/// Fuente alimentada por un hilo lector a través de un canal de capacidad 1.
/// Los frames que llegan mientras el bucle está ocupado se descartan.
pub struct ChannelSource {
    rx: Receiver<CaptureEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSource {
    pub fn from_receiver(rx: Receiver<CaptureEvent>) -> Self {
        Self {
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl FrameSource for ChannelSource {
    fn next_event(&mut self) -> Result<Option<CaptureEvent>, CaptureError> {
        Ok(self.rx.recv().ok())
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn forward_events<R: BufRead>(reader: R, tx: Sender<CaptureEvent>, dropped: &AtomicU64) {
    let mut source = JsonLinesSource::new(reader);
    loop {
        match source.next_event() {
            Ok(Some(CaptureEvent::Quit)) => {
                let _ = tx.send(CaptureEvent::Quit);
                return;
            }
            Ok(Some(event)) => match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    trace!("bucle ocupado, frame descartado");
                }
                Err(TrySendError::Disconnected(_)) => return,
            },
            Ok(None) => {
                debug!("fin del stream de captura");
                return;
            }
            Err(e) => {
                warn!(error = %e, "error leyendo la captura");
                return;
            }
        }
    }
}

/// Lanza un hilo que lee JSON-lines de `input` y los entrega al bucle
pub fn spawn_reader<R: Read + Send + 'static>(input: R) -> ChannelSource {
    let (tx, rx) = bounded::<CaptureEvent>(1);
    let source = ChannelSource::from_receiver(rx);
    let dropped = Arc::clone(&source.dropped);

    thread::spawn(move || forward_events(BufReader::new(input), tx, &dropped));

    source
}
