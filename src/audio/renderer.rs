//! Audio playback through an external player process.
//!
//! Audio is written to a scratch WAV file and handed to the player as
//! `<player> -v <volume> <file>`. One mutex guards the child process, the
//! scratch file and the volume, so every mutating operation is serialized.

use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use parking_lot::Mutex;
use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::earcons::Earcon;
use crate::config::PlaybackConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long a terminated player gets to exit before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("audio player '{0}' not found (platform prerequisite missing)")]
    PlayerMissing(String),

    #[error("audio player exited with {0}")]
    PlayerFailed(String),

    #[error("playback I/O error: {0}")]
    Io(#[from] io::Error),
}

struct State {
    child: Option<Child>,
    scratch: Option<TempPath>,
    volume: f32,
}

pub struct AudioRenderer {
    player: String,
    earcons_dir: PathBuf,
    state: Mutex<State>,
}

impl AudioRenderer {
    pub fn new(player: impl Into<String>, volume: f32, earcons_dir: impl Into<PathBuf>) -> Self {
        Self {
            player: player.into(),
            earcons_dir: earcons_dir.into(),
            state: Mutex::new(State {
                child: None,
                scratch: None,
                volume: volume.clamp(0.0, 1.0),
            }),
        }
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(&config.player, config.volume, config.earcons_dir())
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume.clamp(0.0, 1.0);
    }

    /// Scratch file currently backing playback, if any.
    #[cfg(test)]
    pub fn scratch_path(&self) -> Option<PathBuf> {
        self.state.lock().scratch.as_deref().map(Path::to_path_buf)
    }

    #[cfg(test)]
    pub fn player_pid(&self) -> Option<u32> {
        self.state.lock().child.as_ref().map(Child::id)
    }

    pub fn is_playing(&self) -> bool {
        let mut state = self.state.lock();
        match state.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Play WAV bytes, replacing whatever is playing.
    ///
    /// Blocking playback waits for the player and cleans up after it; a
    /// non-zero exit is reported as [`PlaybackError::PlayerFailed`].
    pub fn play(&self, audio: &[u8], blocking: bool) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        stop_locked(&mut state);

        let scratch = write_scratch(audio)?;
        let child = self.spawn(&scratch, state.volume)?;
        debug!("Playing {} bytes via {}", audio.len(), self.player);
        state.scratch = Some(scratch);

        if blocking {
            let result = wait_for_exit(child);
            remove_scratch(&mut state);
            result
        } else {
            state.child = Some(child);
            Ok(())
        }
    }

    /// Feed the next chunk of a stream. The scratch file is created on the
    /// first call and overwritten on every call; playback starts if idle.
    pub fn play_streaming(&self, chunk: &[u8]) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();

        let path = match state.scratch.as_deref() {
            Some(path) => path.to_path_buf(),
            None => {
                let scratch = write_scratch(&[])?;
                let path = scratch.to_path_buf();
                state.scratch = Some(scratch);
                path
            }
        };
        fs::write(&path, chunk)?;

        let active = match state.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        if !active {
            state.child = Some(self.spawn(&path, state.volume)?);
        }
        Ok(())
    }

    /// Play the earcon file for `earcon`. Returns `Ok(false)` without touching
    /// playback when the file does not exist.
    pub fn play_earcon(
        &self,
        earcon: impl Into<Earcon>,
        blocking: bool,
    ) -> Result<bool, PlaybackError> {
        let earcon = earcon.into();
        let path = self.earcons_dir.join(earcon.file_name());
        if !path.is_file() {
            debug!("Earcon not found: {}", path.display());
            return Ok(false);
        }

        let mut state = self.state.lock();
        stop_locked(&mut state);
        let child = self.spawn(&path, state.volume)?;
        info!("Playing earcon {earcon}");

        if blocking {
            wait_for_exit(child)?;
        } else {
            state.child = Some(child);
        }
        Ok(true)
    }

    /// Stop playback: terminate, wait up to a second, then kill. Removes the
    /// scratch file. No-op when idle.
    pub fn stop(&self) {
        stop_locked(&mut self.state.lock());
    }

    /// Wait for playback to finish. Returns `true` when idle, `false` if
    /// `timeout` elapsed first.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            {
                let mut state = self.state.lock();
                let finished = match state.child.as_mut() {
                    None => true,
                    Some(child) => !matches!(child.try_wait(), Ok(None)),
                };
                if finished {
                    state.child = None;
                    return true;
                }
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn spawn(&self, path: &Path, volume: f32) -> Result<Child, PlaybackError> {
        Command::new(&self.player)
            .arg("-v")
            .arg(volume.to_string())
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => PlaybackError::PlayerMissing(self.player.clone()),
                _ => PlaybackError::Io(e),
            })
    }
}

/// Joins WAV chunks into one growing WAV for [`AudioRenderer::play_streaming`].
/// Every chunk must share the first chunk's format.
#[derive(Default)]
pub struct StreamBuffer {
    spec: Option<WavSpec>,
    int_samples: Vec<i32>,
    float_samples: Vec<f32>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return the whole stream so far.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>, hound::Error> {
        let reader = WavReader::new(Cursor::new(chunk))?;
        let spec = reader.spec();
        match self.spec {
            Some(existing) if existing != spec => {
                return Err(hound::Error::FormatError("chunk format differs from stream"));
            }
            Some(_) => {}
            None => self.spec = Some(spec),
        }

        match spec.sample_format {
            SampleFormat::Int => {
                for sample in reader.into_samples::<i32>() {
                    self.int_samples.push(sample?);
                }
            }
            SampleFormat::Float => {
                for sample in reader.into_samples::<f32>() {
                    self.float_samples.push(sample?);
                }
            }
        }

        let mut bytes = Vec::new();
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec)?;
        for &sample in &self.int_samples {
            writer.write_sample(sample)?;
        }
        for &sample in &self.float_samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(bytes)
    }
}

impl Drop for AudioRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn write_scratch(audio: &[u8]) -> io::Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("agent-chime-")
        .suffix(".wav")
        .tempfile()?;
    file.write_all(audio)?;
    file.flush()?;
    Ok(file.into_temp_path())
}

fn wait_for_exit(mut child: Child) -> Result<(), PlaybackError> {
    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(PlaybackError::PlayerFailed(status.to_string()))
    }
}

fn stop_locked(state: &mut State) {
    if let Some(mut child) = state.child.take() {
        if matches!(child.try_wait(), Ok(None)) {
            debug!("Stopping player (pid {})", child.id());
            terminate(&mut child);
        }
    }
    remove_scratch(state);
}

fn remove_scratch(state: &mut State) {
    if let Some(scratch) = state.scratch.take() {
        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch file: {e}");
        }
    }
}

fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill")
            .args(["-TERM", &child.id().to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let deadline = Instant::now() + STOP_GRACE;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(_) => break,
            }
        }
        debug!("Player ignored SIGTERM, killing");
    }

    if let Err(e) = child.kill() {
        debug!("Kill failed: {e}");
    }
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::audio::earcons::tone_wav;
    use crate::events::EventKind;

    /// Executable stand-in for the player.
    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn blocking_play_passes_volume_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let args = dir.path().join("args");
        let player = script(dir.path(), "player", &format!("echo \"$@\" > {}", args.display()));
        let renderer = AudioRenderer::new(player, 0.5, dir.path());

        renderer.play(b"RIFF", true).unwrap();

        let recorded = fs::read_to_string(&args).unwrap();
        assert!(recorded.starts_with("-v 0.5 "), "{recorded}");
        assert!(recorded.trim_end().ends_with(".wav"));
        assert!(!renderer.is_playing());
        assert_eq!(renderer.scratch_path(), None);
    }

    #[test]
    fn failing_player_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = AudioRenderer::new(script(dir.path(), "player", "exit 3"), 0.8, dir.path());
        let err = renderer.play(b"RIFF", true).unwrap_err();
        assert!(matches!(err, PlaybackError::PlayerFailed(_)));
    }

    #[test]
    fn missing_player_is_a_prerequisite_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = AudioRenderer::new("definitely-not-an-audio-player", 0.8, dir.path());
        let err = renderer.play(b"RIFF", false).unwrap_err();
        assert!(matches!(err, PlaybackError::PlayerMissing(_)));
        assert_eq!(renderer.scratch_path(), None);
    }

    #[test]
    fn stop_terminates_and_removes_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let player = script(dir.path(), "player", "exec sleep 5");
        let renderer = AudioRenderer::new(player, 0.8, dir.path());

        renderer.play(b"RIFF", false).unwrap();
        assert!(renderer.is_playing());
        let scratch = renderer.scratch_path().unwrap();
        assert!(scratch.exists());

        let started = Instant::now();
        renderer.stop();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!renderer.is_playing());
        assert!(!scratch.exists());

        renderer.stop();
    }

    fn alive(pid: u32) -> bool {
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    #[test]
    fn second_play_replaces_first_and_drop_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let player = script(dir.path(), "player", "exec sleep 5");
        let renderer = AudioRenderer::new(player, 0.8, dir.path());

        renderer.play(b"one", false).unwrap();
        let first_pid = renderer.player_pid().unwrap();
        let first_scratch = renderer.scratch_path().unwrap();

        renderer.play(b"two", false).unwrap();
        let second_pid = renderer.player_pid().unwrap();
        let second_scratch = renderer.scratch_path().unwrap();

        assert_ne!(first_pid, second_pid);
        assert!(!alive(first_pid));
        assert!(alive(second_pid));
        assert!(!first_scratch.exists());
        assert_eq!(fs::read(&second_scratch).unwrap(), b"two");

        drop(renderer);
        assert!(!alive(second_pid));
        assert!(!second_scratch.exists());
    }

    #[test]
    fn wait_reports_timeout_and_completion() {
        let dir = tempfile::tempdir().unwrap();
        let slow = AudioRenderer::new(script(dir.path(), "slow", "exec sleep 5"), 0.8, dir.path());
        slow.play(b"RIFF", false).unwrap();
        assert!(!slow.wait(Some(Duration::from_millis(100))));
        slow.stop();
        assert!(slow.wait(Some(Duration::ZERO)));

        let quick = AudioRenderer::new(script(dir.path(), "quick", "exit 0"), 0.8, dir.path());
        quick.play(b"RIFF", false).unwrap();
        assert!(quick.wait(Some(Duration::from_secs(5))));
        assert!(!quick.is_playing());
    }

    #[test]
    fn streaming_reuses_one_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let player = script(dir.path(), "player", "exec sleep 5");
        let renderer = AudioRenderer::new(player, 0.8, dir.path());

        renderer.play_streaming(b"first").unwrap();
        let scratch = renderer.scratch_path().unwrap();
        renderer.play_streaming(b"second").unwrap();

        assert_eq!(renderer.scratch_path().as_deref(), Some(scratch.as_path()));
        assert_eq!(fs::read(&scratch).unwrap(), b"second");
        assert!(renderer.is_playing());
        renderer.stop();
        assert!(!scratch.exists());
    }

    #[test]
    fn missing_earcon_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let player = script(dir.path(), "player", "exec sleep 5");
        let renderer = AudioRenderer::new(player, 0.8, dir.path());
        renderer.play(b"RIFF", false).unwrap();

        assert!(!renderer.play_earcon(EventKind::ErrorRetry, false).unwrap());
        assert!(renderer.is_playing());
        assert!(renderer.scratch_path().is_some());
        renderer.stop();
    }

    #[test]
    fn earcon_plays_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("decision.wav"), b"RIFF").unwrap();
        let renderer = AudioRenderer::new(script(dir.path(), "player", "exit 0"), 0.8, dir.path());
        assert!(renderer.play_earcon(Earcon::Decision, true).unwrap());
    }

    #[test]
    fn volume_is_clamped() {
        let renderer = AudioRenderer::new("afplay", 1.7, "/nonexistent");
        assert_eq!(renderer.volume(), 1.0);
        renderer.set_volume(-0.2);
        assert_eq!(renderer.volume(), 0.0);
    }

    fn sample_count(wav: &[u8]) -> u32 {
        hound::WavReader::new(Cursor::new(wav)).unwrap().len()
    }

    #[test]
    fn stream_buffer_grows_with_each_chunk() {
        let chunk = tone_wav(440.0, 50).unwrap();
        let per_chunk = sample_count(&chunk);

        let mut stream = StreamBuffer::new();
        assert_eq!(sample_count(&stream.push(&chunk).unwrap()), per_chunk);
        assert_eq!(sample_count(&stream.push(&chunk).unwrap()), 2 * per_chunk);
    }

    #[test]
    fn stream_buffer_rejects_format_change() {
        let mut other = Vec::new();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::new(Cursor::new(&mut other), spec).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.finalize().unwrap();

        let mut stream = StreamBuffer::new();
        stream.push(&tone_wav(440.0, 50).unwrap()).unwrap();
        assert!(stream.push(&other).is_err());
        assert!(stream.push(b"not a wav").is_err());
    }
}
