//! Bucle principal: captura → clasificación → resolución → throttle → envío.
//!
//! Todo ocurre en un solo hilo; un envío (incluida la reconexión) bloquea la
//! adquisición del siguiente frame.

use tracing::{debug, error, info};

use crate::capture::{CaptureError, CaptureEvent, FrameSource};
use crate::session::{FrameDecision, SessionController};
use crate::transport::{Connector, ResilientLink};

/// Contadores de una ejecución
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u64,
    pub sent: u64,
    pub suppressed: u64,
    pub dropped: u64,
    /// Frames perdidos por la captura mientras el bucle estaba ocupado
    pub capture_dropped: u64,
    pub reconnects: u64,
}

/// Motivo de fin del bucle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    CaptureEnded,
    Quit,
}

/// Ejecuta el bucle hasta agotar la captura o recibir `Quit`, y cierra el enlace
pub fn run<S, C>(
    source: &mut S,
    session: &mut SessionController,
    link: &mut ResilientLink<C>,
) -> Result<(StopReason, RunStats), CaptureError>
where
    S: FrameSource + ?Sized,
    C: Connector,
{
    let mut stats = RunStats::default();

    let reason = loop {
        let frame = match source.next_event() {
            Ok(Some(CaptureEvent::Frame(frame))) => frame,
            Ok(Some(CaptureEvent::Quit)) => break StopReason::Quit,
            Ok(None) => break StopReason::CaptureEnded,
            Err(e) => {
                link.close();
                return Err(e);
            }
        };
        stats.frames += 1;

        let event = match session.step(&frame.hands, frame.captured_at) {
            FrameDecision::Send(event) => event,
            FrameDecision::Suppress { .. } => {
                stats.suppressed += 1;
                continue;
            }
        };

        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "no se pudo serializar el evento");
                stats.dropped += 1;
                continue;
            }
        };

        if link.send(&payload) {
            stats.sent += 1;
            debug!(payload = %payload, "evento enviado");
        } else {
            stats.dropped += 1;
        }
    };

    stats.reconnects = link.stats().reconnects;
    stats.capture_dropped = source.dropped_frames();
    link.close();

    info!(
        reason = ?reason,
        frames = stats.frames,
        sent = stats.sent,
        suppressed = stats.suppressed,
        dropped = stats.dropped,
        capture_dropped = stats.capture_dropped,
        reconnects = stats.reconnects,
        "bucle de seguimiento terminado"
    );

    Ok((reason, stats))
}
