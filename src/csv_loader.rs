use std::collections::BTreeMap;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, ensure, Context, Result};
use csv::ReaderBuilder;

use crate::capture::{CaptureError, CaptureEvent, CapturedFrame, FrameSource};
use crate::types::{HandFrame, HandSnapshot, Handedness, Keypoint, LANDMARKS_PER_HAND};

/// Máximo de frames consecutivos sin filas (10 min a 30 fps)
pub const MAX_FRAME_GAP: usize = 18_000;

/// Carga una secuencia de frames desde un CSV con cabecera
/// frame,label,landmark,x,y,z ordenado por frame.
///
/// Las manos de un frame se agrupan por etiqueta en orden de aparición. Un
/// índice de frame sin filas se interpreta como frame sin manos.
pub fn load_frames_from_csv(path: impl AsRef<Path>) -> Result<Vec<HandFrame>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut frames: BTreeMap<usize, Vec<(Handedness, Vec<(u8, Keypoint)>)>> = BTreeMap::new();

    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.with_context(|| format!("Fila {} inválida en {:?}", row, path))?;
        if record.len() < 6 {
            bail!("La fila {} no tiene 6 columnas", row);
        }

        let frame: usize = record[0]
            .parse()
            .with_context(|| format!("frame inválido en fila {}", row))?;
        let role = Handedness::parse(&record[1])
            .ok_or_else(|| anyhow!("Etiqueta de mano '{}' inválida en fila {}", &record[1], row))?;
        let landmark: u8 = record[2]
            .parse()
            .with_context(|| format!("landmark inválido en fila {}", row))?;

        if landmark as usize >= LANDMARKS_PER_HAND {
            bail!("Landmark {} fuera de rango (fila {})", landmark, row);
        }

        let x: f64 = record[3].parse().with_context(|| format!("x inválido en fila {}", row))?;
        let y: f64 = record[4].parse().with_context(|| format!("y inválido en fila {}", row))?;
        let z: f64 = record[5].parse().with_context(|| format!("z inválido en fila {}", row))?;

        let hands = frames.entry(frame).or_default();
        let point = (landmark, Keypoint::new(x, y, z));
        match hands.iter_mut().find(|(r, _)| *r == role) {
            Some((_, points)) => points.push(point),
            None => hands.push((role, vec![point])),
        }
    }

    let Some(&max_frame) = frames.keys().next_back() else {
        return Err(anyhow!("El CSV {:?} no contiene datos", path));
    };
    let min_frame = frames.keys().next().copied().unwrap_or_default();
    ensure!(
        min_frame == 0,
        "El CSV debe iniciar en frame=0 (encontrado frame={})",
        min_frame
    );

    let mut prev = min_frame;
    for &frame in frames.keys() {
        ensure!(
            frame - prev <= MAX_FRAME_GAP,
            "Salto de frame {} a {} supera el máximo de {} frames",
            prev,
            frame,
            MAX_FRAME_GAP
        );
        prev = frame;
    }

    let mut result = Vec::with_capacity(max_frame + 1);
    for frame_idx in 0..=max_frame {
        let hands = frames
            .remove(&frame_idx)
            .unwrap_or_default()
            .into_iter()
            .map(|(role, points)| HandSnapshot::new(role, points))
            .collect();
        result.push(hands);
    }

    Ok(result)
}

/// Reproduce frames cargados a un ritmo fijo.
///
/// En modo `paced` duerme entre frames y sella con el reloj real; si no, sella
/// con un reloj virtual (`inicio + i * periodo`) sin esperar.
pub struct ReplaySource {
    frames: std::vec::IntoIter<HandFrame>,
    period: Duration,
    paced: bool,
    start: Instant,
    index: u32,
}

impl ReplaySource {
    pub fn new(frames: Vec<HandFrame>, fps: f64) -> Result<Self> {
        ensure!(fps.is_finite() && fps > 0.0, "fps inválido: {}", fps);
        let period = Duration::try_from_secs_f64(1.0 / fps)
            .with_context(|| format!("fps {} fuera de rango", fps))?;

        Ok(Self {
            frames: frames.into_iter(),
            period,
            paced: true,
            start: Instant::now(),
            index: 0,
        })
    }

    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl FrameSource for ReplaySource {
    fn next_event(&mut self) -> Result<Option<CaptureEvent>, CaptureError> {
        let Some(hands) = self.frames.next() else {
            return Ok(None);
        };

        let due = self
            .period
            .checked_mul(self.index)
            .and_then(|offset| self.start.checked_add(offset));
        self.index = self.index.saturating_add(1);

        let captured_at = match due {
            Some(due) if self.paced => {
                let now = Instant::now();
                if due > now {
                    thread::sleep(due - now);
                }
                Instant::now()
            }
            Some(due) => due,
            // Fuera del rango del reloj
            None => Instant::now(),
        };

        Ok(Some(CaptureEvent::Frame(CapturedFrame { hands, captured_at })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fingertip;
    use std::io::Write;

    fn write_csv(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("gestolink_{}_{}.csv", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_groups_hands_and_fills_gaps() {
        let path = write_csv(
            "groups",
            "frame,label,landmark,x,y,z\n\
             0,Right,4,0.1,0.2,0.0\n\
             0,Right,8,0.3,0.2,0.0\n\
             0,Left,4,0.7,0.7,0.0\n\
             2,Left,20,0.5,0.5,0.0\n",
        );
        let frames = load_frames_from_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), 2);
        assert_eq!(frames[0][0].role, Handedness::Right);
        assert_eq!(frames[0][0].len(), 2);
        assert_eq!(frames[0][1].tip(Fingertip::Thumb).map(|k| k.x), Some(0.7));
        assert!(frames[1].is_empty());
        assert_eq!(frames[2][0].role, Handedness::Left);
    }

    #[test]
    fn test_load_rejects_bad_rows() {
        let path = write_csv("badlabel", "frame,label,landmark,x,y,z\n0,Middle,4,0,0,0\n");
        assert!(load_frames_from_csv(&path).is_err());
        std::fs::remove_file(&path).ok();

        let path = write_csv("badlandmark", "frame,label,landmark,x,y,z\n0,Left,21,0,0,0\n");
        assert!(load_frames_from_csv(&path).is_err());
        std::fs::remove_file(&path).ok();

        let path = write_csv("empty", "frame,label,landmark,x,y,z\n");
        assert!(load_frames_from_csv(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_huge_frame_gap() {
        let far = format!("frame,label,landmark,x,y,z\n0,Right,4,0,0,0\n{},Right,4,0,0,0\n", usize::MAX);
        let path = write_csv("gapmax", &far);
        assert!(load_frames_from_csv(&path).is_err());
        std::fs::remove_file(&path).ok();

        let path = write_csv(
            "gapbig",
            "frame,label,landmark,x,y,z\n0,Right,4,0,0,0\n1000000000000,Right,4,0,0,0\n",
        );
        assert!(load_frames_from_csv(&path).is_err());
        std::fs::remove_file(&path).ok();

        let within = format!(
            "frame,label,landmark,x,y,z\n0,Right,4,0,0,0\n{},Right,4,0,0,0\n",
            MAX_FRAME_GAP
        );
        let path = write_csv("gapok", &within);
        let frames = load_frames_from_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(frames.len(), MAX_FRAME_GAP + 1);
    }

    #[test]
    fn test_replay_rejects_bad_fps() {
        for fps in [0.0, -30.0, f64::NAN, f64::INFINITY, 1e-30] {
            assert!(ReplaySource::new(Vec::new(), fps).is_err(), "fps {}", fps);
        }
        let source = ReplaySource::new(Vec::new(), 30.0).unwrap();
        assert!(source.period() > Duration::from_millis(33));
    }

    #[test]
    fn test_replay_with_huge_period_does_not_overflow() {
        let mut source = ReplaySource::new(vec![Vec::new(), Vec::new(), Vec::new()], 1e-19)
            .unwrap()
            .paced(false);
        let mut count = 0;
        while let Some(CaptureEvent::Frame(_)) = source.next_event().unwrap() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_unpaced_replay_uses_virtual_clock() {
        let mut source = ReplaySource::new(vec![Vec::new(), Vec::new(), Vec::new()], 20.0)
            .unwrap()
            .paced(false);
        let mut stamps = Vec::new();
        while let Some(CaptureEvent::Frame(frame)) = source.next_event().unwrap() {
            stamps.push(frame.captured_at);
        }

        assert_eq!(stamps.len(), 3);
        assert_eq!(stamps[1] - stamps[0], Duration::from_millis(50));
        assert_eq!(stamps[2] - stamps[1], Duration::from_millis(50));
    }
}
