//! Controlador de sesión: resuelve una acción combinada por frame a partir de
//! las manos detectadas y decide si el evento se transmite.
//!
//! La mano derecha tiene prioridad absoluta. La izquierda solo aporta la pinza,
//! publicada como `left_pinch`, cuando no hay mano derecha en el frame.

use std::time::{Duration, Instant};

use tracing::{info, trace};

use crate::action::{Action, ActionEvent, ActionKind, Anchor};
use crate::gesture_classifier::{Gesture, GestureClassifier, GestureThresholds};
use crate::types::{Fingertip, HandSnapshot, Handedness};

/// Intervalo mínimo entre envíos de acciones activas
pub const THROTTLE_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub thresholds: GestureThresholds,
    pub throttle_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            thresholds: GestureThresholds::default(),
            throttle_interval: THROTTLE_INTERVAL,
        }
    }
}

/// Estado que sobrevive entre frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    /// Último tipo enviado (o intentado)
    pub last_sent_kind: ActionKind,
    /// Momento del último envío de un frame con manos
    pub last_send: Option<Instant>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            last_sent_kind: ActionKind::None,
            last_send: None,
        }
    }
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        self.last_sent_kind == ActionKind::None
    }
}

/// Motivo por el que un frame no se transmite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// `none` repetido: ya se había notificado
    AlreadyIdle,
    /// Dentro de la ventana de throttle
    Throttled,
}

/// Resultado de procesar un frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameDecision {
    Send(ActionEvent),
    Suppress {
        kind: ActionKind,
        reason: SuppressReason,
    },
}

impl FrameDecision {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Send(event) => event.kind(),
            Self::Suppress { kind, .. } => *kind,
        }
    }

    pub fn is_send(&self) -> bool {
        matches!(self, Self::Send(_))
    }
}

/// Acción derivada de la mano derecha. Una mano no clasificable fuerza `none`.
fn right_hand_action(hand: &HandSnapshot, gesture: Gesture) -> Action {
    let anchor_at = |tip| hand.tip(tip).map(Anchor::from).unwrap_or_default();

    match gesture {
        Gesture::Pinch => Action::Pinch(anchor_at(Fingertip::Thumb)),
        Gesture::PinchZoom => Action::PinchZoom {
            anchor: anchor_at(Fingertip::Thumb),
            current_dist: hand
                .tip_distance(Fingertip::Thumb, Fingertip::Index)
                .unwrap_or(0.0),
        },
        Gesture::Pointer => Action::Pointer(anchor_at(Fingertip::Index)),
        Gesture::None => Action::None,
    }
}

/// Resuelve la acción combinada de un frame según la prioridad de roles
pub fn resolve_action(hands: &[HandSnapshot], classifier: &GestureClassifier) -> Action {
    let mut right: Option<Action> = None;
    let mut left: Option<Action> = None;

    for hand in hands {
        let gesture = classifier.classify(hand);
        trace!(role = hand.role.as_str(), gesture = gesture.as_str(), "mano clasificada");

        match hand.role {
            Handedness::Right => right = Some(right_hand_action(hand, gesture)),
            Handedness::Left => {
                if left.is_none() && gesture == Gesture::Pinch {
                    let anchor = hand
                        .tip(Fingertip::Thumb)
                        .map(Anchor::from)
                        .unwrap_or_default();
                    left = Some(Action::LeftPinch(anchor));
                }
            }
        }
    }

    right.or(left).unwrap_or(Action::None)
}

/// Máquina de estados por frame: Idle (`none`) o Active(tipo)
pub struct SessionController {
    classifier: GestureClassifier,
    config: SessionConfig,
    state: SessionState,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            classifier: GestureClassifier::new(config.thresholds),
            config,
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Procesa un frame capturado en `now`. Si devuelve `Send`, el estado ya
    /// registra el intento de envío.
    pub fn step(&mut self, hands: &[HandSnapshot], now: Instant) -> FrameDecision {
        let (decision, state) = step(&self.classifier, &self.config, self.state, hands, now);
        self.state = state;
        decision
    }
}

/// Paso puro: recibe el estado anterior y devuelve la decisión y el nuevo estado
pub fn step(
    classifier: &GestureClassifier,
    config: &SessionConfig,
    mut state: SessionState,
    hands: &[HandSnapshot],
    now: Instant,
) -> (FrameDecision, SessionState) {
    if hands.is_empty() {
        // Perder las manos se notifica de inmediato, una sola vez
        if state.is_idle() {
            return (
                FrameDecision::Suppress {
                    kind: ActionKind::None,
                    reason: SuppressReason::AlreadyIdle,
                },
                state,
            );
        }
        info!(
            previous = state.last_sent_kind.as_str(),
            "--- todos los gestos terminados (sin manos) ---"
        );
        state.last_sent_kind = ActionKind::None;
        return (FrameDecision::Send(ActionEvent::Idle), state);
    }

    let action = resolve_action(hands, classifier);
    let kind = action.kind();

    if kind == ActionKind::None {
        if state.is_idle() {
            return (
                FrameDecision::Suppress {
                    kind,
                    reason: SuppressReason::AlreadyIdle,
                },
                state,
            );
        }
    } else if let Some(last) = state.last_send {
        if now.saturating_duration_since(last) < config.throttle_interval {
            return (
                FrameDecision::Suppress {
                    kind,
                    reason: SuppressReason::Throttled,
                },
                state,
            );
        }
    }

    state.last_send = Some(now);
    state.last_sent_kind = kind;

    let event = ActionEvent::Frame {
        action,
        hands: hands.iter().map(HandSnapshot::to_landmarks).collect(),
    };
    (FrameDecision::Send(event), state)
}
