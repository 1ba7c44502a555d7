use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::exercise::{ExerciseEvaluator, ExerciseMode, HoldTracker};
use crate::landmark::LandmarkFrame;
use crate::posture::PostureEvaluator;

/// フレーム単位の判定ステータス。骨格オーバーレイの線色に対応する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostureStatus {
    Good,
    NeedsWork,
    /// 姿勢が検出できなかったフレーム（骨格は描画されない）
    Undetected,
}

impl PostureStatus {
    pub fn stroke_color(&self) -> Option<&'static str> {
        match self {
            PostureStatus::Good => Some("#00FF00"),
            PostureStatus::NeedsWork => Some("#FF0000"),
            PostureStatus::Undetected => None,
        }
    }
}

/// フレーム処理中に発火した離散イベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// キャリブレーション基準を取り直した
    Calibrated,
    /// レップ成立（値は通算レップ数）
    RepCompleted(u32),
    /// 画面通知を出す
    Notify(String),
    /// テキストを読み上げる
    Speak(String),
}

/// 1フレーム分の処理結果
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub status: PostureStatus,
    pub feedback: String,
    pub events: Vec<SessionEvent>,
    pub rep_count: u32,
    pub hold_frames: u32,
}

/// 連続した悪い姿勢フレームのデバウンス
///
/// しきい値に達した時点で発火してカウンタを戻す。良いフレームでもリセット。
/// 未検出フレームは観測しない（カウンタ持ち越し）。
pub struct DebounceTracker {
    count: u32,
    threshold: u32,
}

impl DebounceTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    /// 悪いフレームを1つ観測する。しきい値到達で true を返し、カウンタを0に戻す。
    pub fn record_bad(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.threshold {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn record_good(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// コーチングセッションの全状態
///
/// 状態はすべてこの構造体の中にあり、更新は process_frame の1箇所だけ。
pub struct CoachSession {
    mode: ExerciseMode,
    posture: PostureEvaluator,
    exercise: ExerciseEvaluator,
    hold: HoldTracker,
    debounce: DebounceTracker,
    speech_cooldown: Duration,
    frame_rate: u32,
    last_speech: Option<Instant>,
    calibrate_pending: bool,
}

impl CoachSession {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: ExerciseMode::Posture,
            posture: PostureEvaluator::from_config(&config.posture),
            exercise: ExerciseEvaluator::from_config(&config.exercise),
            hold: HoldTracker::new(config.exercise.hold_frames),
            debounce: DebounceTracker::new(config.timing.debounce_frames),
            speech_cooldown: Duration::from_secs(config.timing.speech_cooldown_secs),
            frame_rate: config.timing.frame_rate,
            last_speech: None,
            calibrate_pending: false,
        }
    }

    pub fn mode(&self) -> ExerciseMode {
        self.mode
    }

    pub fn rep_count(&self) -> u32 {
        self.hold.reps()
    }

    pub fn hold_frames(&self) -> u32 {
        self.hold.hold_frames()
    }

    pub fn is_calibrated(&self) -> bool {
        self.posture.is_calibrated()
    }

    /// 次の検出フレームを基準姿勢として取り込む（ワンショット）。
    /// 未検出フレームでは消費されず、検出フレームまで持ち越される。
    pub fn request_calibration(&mut self) {
        self.calibrate_pending = true;
    }

    /// モード切替。レップとホールドはリセットし、キャリブレーションは保持する。
    pub fn set_mode(&mut self, mode: ExerciseMode) {
        self.mode = mode;
        self.hold.reset();
    }

    /// 1フレーム処理する。セッション状態の更新はここだけ。
    pub fn process_frame(&mut self, frame: Option<&LandmarkFrame>, now: Instant) -> FrameReport {
        let mut events = Vec::new();

        let frame = match frame {
            Some(frame) => frame,
            None => {
                // 未検出: カウンタもキャリブレーション要求も触らない
                return FrameReport {
                    status: PostureStatus::Undetected,
                    feedback: String::new(),
                    events,
                    rep_count: self.hold.reps(),
                    hold_frames: self.hold.hold_frames(),
                };
            }
        };

        if self.calibrate_pending {
            self.posture.calibrate(frame);
            self.calibrate_pending = false;
            events.push(SessionEvent::Calibrated);
        }

        let mode = self.mode;
        let (status, feedback) = match mode {
            ExerciseMode::Posture => self.process_posture(frame, now, &mut events),
            ExerciseMode::PressUp => {
                let verdict = self.exercise.press_up(frame);
                self.apply_hold(mode, verdict, &mut events)
            }
            ExerciseMode::Bridging => {
                let verdict = self.exercise.bridging(frame);
                self.apply_hold(mode, verdict, &mut events)
            }
        };

        FrameReport {
            status,
            feedback,
            events,
            rep_count: self.hold.reps(),
            hold_frames: self.hold.hold_frames(),
        }
    }

    fn process_posture(
        &mut self,
        frame: &LandmarkFrame,
        now: Instant,
        events: &mut Vec<SessionEvent>,
    ) -> (PostureStatus, String) {
        let report = match self.posture.evaluate(frame) {
            Some(report) => report,
            // キャリブレーション前は評価せず静かに通す
            None => return (PostureStatus::Good, String::new()),
        };

        let feedback = report.message();
        if report.is_good() {
            self.debounce.record_good();
            return (PostureStatus::Good, feedback);
        }

        if self.debounce.record_bad() {
            events.push(SessionEvent::Notify("Correct your posture!".to_string()));
            let can_speak = self
                .last_speech
                .map_or(true, |last| now.duration_since(last) >= self.speech_cooldown);
            if can_speak {
                let text = if feedback.is_empty() {
                    "Your posture needs correction. Please sit up straight.".to_string()
                } else {
                    feedback.clone()
                };
                events.push(SessionEvent::Speak(text));
                self.last_speech = Some(now);
            }
        }
        (PostureStatus::NeedsWork, feedback)
    }

    fn apply_hold(
        &mut self,
        mode: ExerciseMode,
        verdict: Option<String>,
        events: &mut Vec<SessionEvent>,
    ) -> (PostureStatus, String) {
        match verdict {
            // 不合格フレームはホールドを触らない（リセットはレップ成立時のみ）
            Some(feedback) => (PostureStatus::NeedsWork, feedback),
            None => {
                if self.hold.record_pass() {
                    events.push(SessionEvent::RepCompleted(self.hold.reps()));
                    if let Some(phrase) = mode.rep_speech() {
                        events.push(SessionEvent::Speak(phrase.to_string()));
                    }
                }
                let seconds = self.hold.hold_frames() / self.frame_rate;
                let label = mode.hold_label().unwrap_or("Hold position");
                (
                    PostureStatus::Good,
                    format!("{}. {} seconds", label, seconds),
                )
            }
        }
    }
}
