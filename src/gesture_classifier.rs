use crate::types::{Fingertip, HandSnapshot};

/// Gesto simbólico de una mano
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    /// Sin gesto o mano no clasificable (faltan puntas)
    None,
    Pointer,
    Pinch,
    PinchZoom,
}

impl Gesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pointer => "pointer",
            Self::Pinch => "pinch",
            Self::PinchZoom => "pinch_zoom",
        }
    }
}

/// Umbrales de distancia (coordenadas normalizadas)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureThresholds {
    /// Distancia pulgar-índice por debajo de la cual hay pinza
    pub pinch: f64,
    /// Distancia anular-meñique por debajo de la cual hay pinch-zoom
    pub zoom: f64,
    /// Separación base entre dedos contiguos
    pub base: f64,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            pinch: 0.06,
            zoom: 0.1,
            base: 0.1,
        }
    }
}

/// Clasificador sin estado de una mano
#[derive(Debug, Clone, Copy, Default)]
pub struct GestureClassifier {
    thresholds: GestureThresholds,
}

impl GestureClassifier {
    pub fn new(thresholds: GestureThresholds) -> Self {
        Self { thresholds }
    }

    pub fn classify(&self, hand: &HandSnapshot) -> Gesture {
        let t = &self.thresholds;
        classify(hand, t.pinch, t.zoom, t.base)
    }
}

/// Clasifica una mano por distancias entre puntas. La primera regla que
/// coincide gana: pinza, luego pinch-zoom, y `Pointer` por defecto.
pub fn classify(
    hand: &HandSnapshot,
    pinch_threshold: f64,
    zoom_threshold: f64,
    base_threshold: f64,
) -> Gesture {
    use Fingertip::*;

    let (Some(d_thumb_index), Some(d_index_middle), Some(d_middle_ring), Some(d_ring_pinky)) = (
        hand.tip_distance(Thumb, Index),
        hand.tip_distance(Index, Middle),
        hand.tip_distance(Middle, Ring),
        hand.tip_distance(Ring, Pinky),
    ) else {
        return Gesture::None;
    };

    if d_thumb_index < pinch_threshold && d_index_middle > base_threshold {
        return Gesture::Pinch;
    }

    if d_ring_pinky < zoom_threshold
        && d_index_middle < base_threshold
        && d_middle_ring > base_threshold
    {
        return Gesture::PinchZoom;
    }

    Gesture::Pointer
}
