use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Índices de landmarks de interés (puntas de los dedos, numeración MediaPipe)
pub const TIP_IDS: [u8; 5] = [4, 8, 12, 16, 20];

/// Número de landmarks que produce el detector por mano
pub const LANDMARKS_PER_HAND: usize = 21;

/// Decimales con los que se publican (y clasifican) las coordenadas
pub const COORD_DECIMALS: i32 = 5;

/// Punta de dedo de interés
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fingertip {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Fingertip {
    /// Índice del landmark en la salida del detector
    pub fn landmark_id(self) -> u8 {
        match self {
            Self::Thumb => 4,
            Self::Index => 8,
            Self::Middle => 12,
            Self::Ring => 16,
            Self::Pinky => 20,
        }
    }

    pub fn from_landmark_id(id: u8) -> Option<Self> {
        match id {
            4 => Some(Self::Thumb),
            8 => Some(Self::Index),
            12 => Some(Self::Middle),
            16 => Some(Self::Ring),
            20 => Some(Self::Pinky),
            _ => None,
        }
    }
}

/// Rol de la mano según el detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            l if l.eq_ignore_ascii_case("left") => Some(Self::Left),
            l if l.eq_ignore_ascii_case("right") => Some(Self::Right),
            _ => None,
        }
    }
}

/// Coordenadas normalizadas de un landmark
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Redondea las tres coordenadas a `COORD_DECIMALS` decimales
    pub fn rounded(self) -> Self {
        Self {
            x: round_to(self.x, COORD_DECIMALS),
            y: round_to(self.y, COORD_DECIMALS),
            z: round_to(self.z, COORD_DECIMALS),
        }
    }

    /// Distancia euclídea en el plano (z se ignora)
    pub fn planar_distance(&self, other: &Keypoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Landmarks de interés de una mano, serializados como {"4": {...}, "8": {...}}
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub landmarks: BTreeMap<u8, Keypoint>,
}

/// Instantánea de una mano detectada en un frame
///
/// Solo contiene las puntas de `TIP_IDS` que el detector entregó; un índice
/// ausente nunca se rellena con ceros.
#[derive(Debug, Clone, PartialEq)]
pub struct HandSnapshot {
    pub role: Handedness,
    points: BTreeMap<u8, Keypoint>,
}

impl HandSnapshot {
    /// Construye la instantánea desde pares (índice, punto), descartando los
    /// índices que no son de interés y redondeando las coordenadas
    pub fn new(role: Handedness, points: impl IntoIterator<Item = (u8, Keypoint)>) -> Self {
        let points = points
            .into_iter()
            .filter(|(id, _)| Fingertip::from_landmark_id(*id).is_some())
            .map(|(id, kp)| (id, kp.rounded()))
            .collect();
        Self { role, points }
    }

    /// Construye la instantánea desde la lista completa del detector, indexada
    /// por id de landmark. Una entrada `None` o una lista corta dejan la punta
    /// ausente.
    pub fn from_landmark_list(role: Handedness, landmarks: &[Option<Keypoint>]) -> Self {
        Self::new(
            role,
            TIP_IDS
                .iter()
                .filter_map(|&id| landmarks.get(id as usize).copied().flatten().map(|kp| (id, kp))),
        )
    }

    pub fn tip(&self, tip: Fingertip) -> Option<&Keypoint> {
        self.points.get(&tip.landmark_id())
    }

    /// Distancia plana entre dos puntas; `None` si falta alguna
    pub fn tip_distance(&self, a: Fingertip, b: Fingertip) -> Option<f64> {
        Some(self.tip(a)?.planar_distance(self.tip(b)?))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Copia de los landmarks tal como se publican en el campo `hands`
    pub fn to_landmarks(&self) -> HandLandmarks {
        HandLandmarks {
            landmarks: self.points.clone(),
        }
    }
}

/// Conjunto de manos detectadas en un frame (0, 1 o 2 normalmente)
pub type HandFrame = Vec<HandSnapshot>;
