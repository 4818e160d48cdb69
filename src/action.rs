use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::types::{HandLandmarks, Keypoint};

/// Tipo de acción combinada que se publica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    None,
    Pointer,
    Pinch,
    PinchZoom,
    LeftPinch,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        Self::None,
        Self::Pointer,
        Self::Pinch,
        Self::PinchZoom,
        Self::LeftPinch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pointer => "pointer",
            Self::Pinch => "pinch",
            Self::PinchZoom => "pinch_zoom",
            Self::LeftPinch => "left_pinch",
        }
    }
}

/// Punto de anclaje (x, y) de una acción
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

impl From<&Keypoint> for Anchor {
    fn from(kp: &Keypoint) -> Self {
        Self { x: kp.x, y: kp.y }
    }
}

/// Acción resuelta para un frame con su anclaje
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    None,
    /// Punta del índice
    Pointer(Anchor),
    /// Punta del pulgar
    Pinch(Anchor),
    /// Punta del pulgar y distancia pulgar-índice
    PinchZoom { anchor: Anchor, current_dist: f64 },
    /// Punta del pulgar de la mano izquierda
    LeftPinch(Anchor),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::None => ActionKind::None,
            Self::Pointer(_) => ActionKind::Pointer,
            Self::Pinch(_) => ActionKind::Pinch,
            Self::PinchZoom { .. } => ActionKind::PinchZoom,
            Self::LeftPinch(_) => ActionKind::LeftPinch,
        }
    }

    pub fn anchor(&self) -> Anchor {
        match *self {
            Self::None => Anchor::default(),
            Self::Pointer(a) | Self::Pinch(a) | Self::LeftPinch(a) => a,
            Self::PinchZoom { anchor, .. } => anchor,
        }
    }
}

/// Evento saliente hacia el consumidor
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    /// No hay manos: mensaje mínimo `{"none": {"action": "none"}}`
    Idle,
    /// Hay manos: acción combinada más los landmarks de todas las manos
    Frame {
        action: Action,
        hands: Vec<HandLandmarks>,
    },
}

impl ActionEvent {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Idle => ActionKind::None,
            Self::Frame { action, .. } => action.kind(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Serialize)]
struct IdleBody {
    action: ActionKind,
}

#[derive(Serialize)]
struct FrameBody<'a> {
    action: ActionKind,
    x: f64,
    y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_dist: Option<f64>,
    hands: &'a [HandLandmarks],
}

/// Objeto de una sola clave cuyo nombre repite el campo `action`
impl Serialize for ActionEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let kind = self.kind();
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Idle => map.serialize_entry(kind.as_str(), &IdleBody { action: kind })?,
            Self::Frame { action, hands } => {
                let anchor = action.anchor();
                let current_dist = match action {
                    Action::PinchZoom { current_dist, .. } => Some(*current_dist),
                    _ => None,
                };
                let body = FrameBody {
                    action: kind,
                    x: anchor.x,
                    y: anchor.y,
                    current_dist,
                    hands,
                };
                map.serialize_entry(kind.as_str(), &body)?
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HandSnapshot, Handedness};
    use serde_json::{json, Value};

    fn sample_hands() -> Vec<HandLandmarks> {
        vec![HandSnapshot::new(
            Handedness::Right,
            [(4, Keypoint::new(0.1, 0.2, 0.0)), (8, Keypoint::new(0.3, 0.4, -0.1))],
        )
        .to_landmarks()]
    }

    fn encode(event: &ActionEvent) -> Value {
        serde_json::from_str(&event.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_idle_message_is_minimal() {
        assert_eq!(
            ActionEvent::Idle.to_json().unwrap(),
            r#"{"none":{"action":"none"}}"#
        );
    }

    #[test]
    fn test_pinch_zoom_carries_current_dist() {
        let event = ActionEvent::Frame {
            action: Action::PinchZoom {
                anchor: Anchor { x: 0.1, y: 0.2 },
                current_dist: 0.25,
            },
            hands: sample_hands(),
        };
        let value = encode(&event);
        assert_eq!(value["pinch_zoom"]["action"], "pinch_zoom");
        assert_eq!(value["pinch_zoom"]["current_dist"], json!(0.25));
        assert_eq!(value["pinch_zoom"]["x"], json!(0.1));
    }

    #[test]
    fn test_current_dist_only_for_pinch_zoom() {
        let anchor = Anchor { x: 0.5, y: 0.5 };
        for action in [
            Action::None,
            Action::Pointer(anchor),
            Action::Pinch(anchor),
            Action::LeftPinch(anchor),
        ] {
            let event = ActionEvent::Frame {
                action,
                hands: sample_hands(),
            };
            let value = encode(&event);
            let key = action.kind().as_str();
            let body = value[key].as_object().unwrap();
            assert!(!body.contains_key("current_dist"), "{} no debe llevar current_dist", key);
            assert_eq!(body["action"], key);
            assert!(body.contains_key("hands"));
        }
    }

    #[test]
    fn test_frame_layout() {
        let event = ActionEvent::Frame {
            action: Action::Pointer(Anchor { x: 0.3, y: 0.4 }),
            hands: sample_hands(),
        };
        assert_eq!(
            encode(&event),
            json!({
                "pointer": {
                    "action": "pointer",
                    "x": 0.3,
                    "y": 0.4,
                    "hands": [{
                        "landmarks": {
                            "4": {"x": 0.1, "y": 0.2, "z": 0.0},
                            "8": {"x": 0.3, "y": 0.4, "z": -0.1}
                        }
                    }]
                }
            })
        );
    }

    #[test]
    fn test_none_with_hands_has_zero_anchor() {
        let event = ActionEvent::Frame {
            action: Action::None,
            hands: sample_hands(),
        };
        let value = encode(&event);
        assert_eq!(value["none"]["x"], json!(0.0));
        assert_eq!(value["none"]["y"], json!(0.0));
    }
}
