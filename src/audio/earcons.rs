//! Earcons: short non-speech cues, one per event kind.
//!
//! `earcons --init` renders the defaults below as 16-bit mono WAVs so earcon
//! mode works without shipping audio assets.

use std::fmt;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::events::EventKind;

const SAMPLE_RATE: u32 = 22_050;
const AMPLITUDE: f32 = 0.4;
/// Linear fade at each tone edge, avoids clicks.
const FADE_MS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Earcon {
    Yield,
    Decision,
    Error,
    Notification,
}

impl Earcon {
    pub const ALL: [Earcon; 4] = [Self::Yield, Self::Decision, Self::Error, Self::Notification];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Yield => "yield.wav",
            Self::Decision => "decision.wav",
            Self::Error => "error.wav",
            Self::Notification => "notification.wav",
        }
    }

    /// (frequency Hz, duration ms) segments; frequency 0 is silence.
    fn tones(self) -> &'static [(f32, u32)] {
        match self {
            // rising two-note
            Self::Yield => &[(660.0, 120), (880.0, 160)],
            // triple beep
            Self::Decision => &[(880.0, 100), (0.0, 60), (880.0, 100), (0.0, 60), (880.0, 100)],
            // falling two-note
            Self::Error => &[(440.0, 180), (330.0, 240)],
            Self::Notification => &[(660.0, 150)],
        }
    }
}

impl From<EventKind> for Earcon {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::AgentYield => Self::Yield,
            EventKind::DecisionRequired => Self::Decision,
            EventKind::ErrorRetry => Self::Error,
        }
    }
}

impl fmt::Display for Earcon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name().trim_end_matches(".wav"))
    }
}

/// Single sine tone as WAV bytes.
#[cfg(test)]
pub fn tone_wav(frequency: f32, duration_ms: u32) -> Result<Vec<u8>, hound::Error> {
    render(&[(frequency, duration_ms)])
}

fn render(tones: &[(f32, u32)]) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut bytes = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)?;
    for &(frequency, duration_ms) in tones {
        let n = SAMPLE_RATE * duration_ms / 1000;
        let fade = (SAMPLE_RATE * FADE_MS / 1000).min(n / 2).max(1);
        for i in 0..n {
            let sample = if frequency > 0.0 {
                let t = i as f32 / SAMPLE_RATE as f32;
                let envelope = (i.min(n - 1 - i) as f32 / fade as f32).min(1.0);
                (2.0 * std::f32::consts::PI * frequency * t).sin() * AMPLITUDE * envelope
            } else {
                0.0
            };
            // f32 [-1, 1] → i16
            writer.write_sample((sample * 32767.0).clamp(-32768.0, 32767.0) as i16)?;
        }
    }
    writer.finalize()?;
    Ok(bytes)
}

/// Write the default earcons into `dir`, skipping existing files unless `force`.
///
/// Returns the paths that were written.
pub fn write_default_earcons(dir: &Path, force: bool) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for earcon in Earcon::ALL {
        let path = dir.join(earcon.file_name());
        if path.exists() && !force {
            debug!("Keeping existing {}", path.display());
            continue;
        }
        let bytes = render(earcon.tones()).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(&path, bytes)?;
        info!("Wrote earcon {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds_map_to_earcons() {
        assert_eq!(Earcon::from(EventKind::AgentYield).file_name(), "yield.wav");
        assert_eq!(Earcon::from(EventKind::DecisionRequired).file_name(), "decision.wav");
        assert_eq!(Earcon::from(EventKind::ErrorRetry).file_name(), "error.wav");
        assert_eq!(Earcon::Notification.to_string(), "notification");
    }

    #[test]
    fn tone_is_readable_wav_of_expected_length() {
        let bytes = tone_wav(440.0, 100).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.duration(), SAMPLE_RATE / 10);
    }

    #[test]
    fn tones_start_and_end_near_silence() {
        let bytes = tone_wav(440.0, 50).unwrap();
        let samples: Vec<i16> = hound::WavReader::new(Cursor::new(bytes))
            .unwrap()
            .into_samples::<i16>()
            .map(Result::unwrap)
            .collect();
        assert_eq!(samples[0], 0);
        assert!(samples.last().unwrap().abs() < 100);
        assert!(samples.iter().any(|s| s.abs() > 10_000));
    }

    #[test]
    fn init_writes_all_and_respects_existing() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_default_earcons(dir.path(), false).unwrap();
        assert_eq!(written.len(), 4);
        for earcon in Earcon::ALL {
            let path = dir.path().join(earcon.file_name());
            assert!(hound::WavReader::open(&path).is_ok(), "{}", path.display());
        }

        fs::write(dir.path().join("yield.wav"), b"custom").unwrap();
        assert!(write_default_earcons(dir.path(), false).unwrap().is_empty());
        assert_eq!(fs::read(dir.path().join("yield.wav")).unwrap(), b"custom");

        assert_eq!(write_default_earcons(dir.path(), true).unwrap().len(), 4);
    }
}
