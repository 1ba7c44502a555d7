//! Session recordings: one JSON object per line, append-only.
//!
//! The server records every incoming frame (detections and misses) so a
//! session can be replayed offline through the same evaluation core.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::landmark::Landmark;

/// One recorded video frame. `landmarks` is None when no pose was detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub timestamp_ms: u64,
    pub landmarks: Option<Vec<Landmark>>,
}

/// JSONL writer with a timestamped file name under the recording directory.
pub struct RecordingWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    frames: u64,
}

impl RecordingWriter {
    pub fn create(dir: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create recording dir {}", dir))?;
        let name = format!(
            "session_{}.jsonl",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = Path::new(dir).join(name);
        let file = File::create(&path)
            .with_context(|| format!("failed to create recording {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            frames: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn write_frame(&mut self, frame: &RecordedFrame) -> Result<()> {
        let line = serde_json::to_string(frame)?;
        writeln!(self.writer, "{}", line)?;
        self.frames += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Read a whole recording into memory. Blank lines are skipped.
pub fn read_recording<P: AsRef<Path>>(path: P) -> Result<Vec<RecordedFrame>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("failed to open recording {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut frames = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: RecordedFrame = serde_json::from_str(&line)
            .with_context(|| format!("bad recording line {} in {}", i + 1, path.display()))?;
        frames.push(frame);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::landmark::{LandmarkFrame, LandmarkIndex};
    use crate::session::{CoachSession, SessionEvent};
    use std::time::{Duration, Instant};

    fn temp_recording_dir(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("posture_coach_rec_{}_{}", tag, std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    fn seated(nose_y: f32) -> Vec<Landmark> {
        let mut frame = LandmarkFrame::default();
        frame.landmarks[LandmarkIndex::Nose as usize] = Landmark::at(0.5, nose_y);
        frame.landmarks[LandmarkIndex::LeftShoulder as usize] = Landmark::at(0.42, 0.40);
        frame.landmarks[LandmarkIndex::RightShoulder as usize] = Landmark::at(0.58, 0.40);
        frame.landmarks[LandmarkIndex::LeftHip as usize] = Landmark::at(0.44, 0.62);
        frame.landmarks[LandmarkIndex::RightHip as usize] = Landmark::at(0.56, 0.62);
        frame.landmarks.to_vec()
    }

    #[test]
    fn test_write_and_read_round_trip() {
        let dir = temp_recording_dir("rt");
        let mut writer = RecordingWriter::create(&dir).unwrap();

        let landmarks = vec![Landmark::new(0.5, 0.4, 0.0, 0.9); LandmarkIndex::COUNT];
        writer
            .write_frame(&RecordedFrame {
                timestamp_ms: 0,
                landmarks: Some(landmarks.clone()),
            })
            .unwrap();
        writer
            .write_frame(&RecordedFrame {
                timestamp_ms: 33,
                landmarks: None,
            })
            .unwrap();
        writer
            .write_frame(&RecordedFrame {
                timestamp_ms: 66,
                landmarks: Some(landmarks),
            })
            .unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.frames(), 3);

        let frames = read_recording(writer.path()).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].timestamp_ms, 0);
        assert!(frames[1].landmarks.is_none());
        assert_eq!(
            frames[2].landmarks.as_ref().unwrap().len(),
            LandmarkIndex::COUNT
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_line_names_line_number() {
        let dir = temp_recording_dir("bad");
        fs::create_dir_all(&dir).unwrap();
        let path = Path::new(&dir).join("broken.jsonl");
        fs::write(
            &path,
            "{\"timestamp_ms\":0,\"landmarks\":null}\nnot json\n",
        )
        .unwrap();

        let err = read_recording(&path).unwrap_err();
        assert!(
            format!("{:#}", err).contains("line 2"),
            "error should name the offending line: {:#}",
            err
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_replayed_slouch_session_notifies() {
        let dir = temp_recording_dir("replay");
        let mut writer = RecordingWriter::create(&dir).unwrap();

        // Five frames of the reference posture, then sixty with the head dropped
        let mut ts = 0u64;
        for _ in 0..5 {
            writer
                .write_frame(&RecordedFrame {
                    timestamp_ms: ts,
                    landmarks: Some(seated(0.30)),
                })
                .unwrap();
            ts += 33;
        }
        for _ in 0..60 {
            writer
                .write_frame(&RecordedFrame {
                    timestamp_ms: ts,
                    landmarks: Some(seated(0.35)),
                })
                .unwrap();
            ts += 33;
        }
        writer.flush().unwrap();

        // Same procedure as session_replay: calibrate on the first detected
        // frame, drive the clock from recorded timestamps
        let frames = read_recording(writer.path()).unwrap();
        let mut session = CoachSession::from_config(&Config::default());
        session.request_calibration();

        let base = frames[0].timestamp_ms;
        let start = Instant::now();
        let mut notifications = 0;
        for recorded in &frames {
            let now = start + Duration::from_millis(recorded.timestamp_ms - base);
            let frame = recorded
                .landmarks
                .as_ref()
                .map(|l| LandmarkFrame::from_slice(l).unwrap());
            let report = session.process_frame(frame.as_ref(), now);
            notifications += report
                .events
                .iter()
                .filter(|e| matches!(e, SessionEvent::Notify(_)))
                .count();
        }
        assert_eq!(notifications, 1, "60 slouched frames fire one notification");

        let _ = fs::remove_dir_all(&dir);
    }
}
