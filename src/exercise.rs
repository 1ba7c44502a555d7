use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ExerciseConfig;
use crate::landmark::{LandmarkFrame, LandmarkIndex};

/// セッションの動作モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseMode {
    /// 座り姿勢の監視（キャリブレーション基準との比較）
    Posture,
    /// マッケンジー体操（うつ伏せプレスアップ）
    PressUp,
    /// ブリッジ運動
    Bridging,
}

impl ExerciseMode {
    /// レップ完了時の読み上げフレーズ
    pub fn rep_speech(&self) -> Option<&'static str> {
        match self {
            ExerciseMode::Posture => None,
            ExerciseMode::PressUp => {
                Some("Good rep! Slowly lower down and prepare for next press-up")
            }
            ExerciseMode::Bridging => Some("Good rep! Lower your hips slowly"),
        }
    }

    /// ホールド継続中の表示プレフィックス
    pub fn hold_label(&self) -> Option<&'static str> {
        match self {
            ExerciseMode::Posture => None,
            ExerciseMode::PressUp => Some("Hold position"),
            ExerciseMode::Bridging => Some("Hold bridge"),
        }
    }

    pub fn guide(&self) -> Option<&'static ExerciseGuide> {
        match self {
            ExerciseMode::Posture => None,
            ExerciseMode::PressUp => Some(&PRESS_UP_GUIDE),
            ExerciseMode::Bridging => Some(&BRIDGING_GUIDE),
        }
    }
}

impl Default for ExerciseMode {
    fn default() -> Self {
        ExerciseMode::Posture
    }
}

impl fmt::Display for ExerciseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExerciseMode::Posture => "posture",
            ExerciseMode::PressUp => "press_up",
            ExerciseMode::Bridging => "bridging",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ExerciseMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "posture" => Ok(ExerciseMode::Posture),
            "press_up" | "press-up" | "pressup" | "mckenzie" => Ok(ExerciseMode::PressUp),
            "bridging" | "bridge" => Ok(ExerciseMode::Bridging),
            other => anyhow::bail!("unknown exercise mode: {}", other),
        }
    }
}

/// エクササイズの説明文（UIクライアント向けの静的テキスト）
#[derive(Debug)]
pub struct ExerciseGuide {
    pub title: &'static str,
    pub description: &'static str,
    pub steps: &'static [&'static str],
    pub tips: &'static [&'static str],
}

pub static PRESS_UP_GUIDE: ExerciseGuide = ExerciseGuide {
    title: "McKenzie Press-Up Exercise",
    description: "This exercise helps centralize pain and reduce disc pressure in PIVD, \
promoting disc rehydration and healing.",
    steps: &[
        "Lie face down on a firm surface",
        "Place your hands palm down under your shoulders",
        "Keep your hips and legs relaxed on the ground",
        "Gradually push up with your arms, lifting your upper body",
        "Keep your hips and lower body relaxed on the floor",
        "Hold the position at the top for 3 seconds",
        "Slowly lower back down",
        "Rest for 2 seconds before the next repetition",
    ],
    tips: &[
        "Don't force the movement if it causes pain",
        "Keep your neck in a neutral position",
        "Breathe normally throughout the exercise",
        "Start with 10 repetitions, 3-4 times daily",
        "Stop if you feel increased leg pain or numbness",
    ],
};

pub static BRIDGING_GUIDE: ExerciseGuide = ExerciseGuide {
    title: "Bridging Exercise",
    description: "This exercise strengthens your core, glutes, and lower back muscles.",
    steps: &[
        "Lie on your back on a firm surface",
        "Bend your knees and place feet flat on the floor, hip-width apart",
        "Keep arms at your sides, palms down",
        "Breathe in deeply",
        "As you exhale, slowly lift your hips off the floor",
        "Create a straight line from shoulders to knees",
        "Hold this position for 3 seconds",
        "Slowly lower your hips back to the starting position",
    ],
    tips: &[
        "Keep your core engaged throughout the exercise",
        "Don't arch your lower back",
        "Keep your shoulders firmly on the ground",
        "Perform 8-10 repetitions, 3 times daily",
    ],
};

/// 単一フレームのエクササイズ姿勢チェック
///
/// キャリブレーション不要。閾値はすべて絶対値で、合格なら None を返す。
pub struct ExerciseEvaluator {
    elbow_angle: f32,
    elevation: f32,
    hip_level: f32,
    neck_angle: f32,
    bridge_gap: f32,
    shoulder_level: f32,
}

impl ExerciseEvaluator {
    pub fn from_config(config: &ExerciseConfig) -> Self {
        Self {
            elbow_angle: config.elbow_angle,
            elevation: config.elevation,
            hip_level: config.hip_level,
            neck_angle: config.neck_angle,
            bridge_gap: config.bridge_gap,
            shoulder_level: config.shoulder_level,
        }
    }

    /// プレスアップのフォームチェック
    ///
    /// 肩中点が腰中点より上（yが小さい）なら体勢の前提が崩れているので
    /// 「うつ伏せになれ」だけを返し、以降の検査は行わない。
    pub fn press_up(&self, frame: &LandmarkFrame) -> Option<String> {
        let (sx, sy) = frame.midpoint(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder);
        let (_, hy) = frame.midpoint(LandmarkIndex::LeftHip, LandmarkIndex::RightHip);

        if sy < hy {
            return Some("Lie face down on your stomach".to_string());
        }

        let mut feedback = Vec::new();

        let right_shoulder = frame.get(LandmarkIndex::RightShoulder);
        let right_elbow = frame.get(LandmarkIndex::RightElbow);
        let elbow_angle = (right_elbow.y - right_shoulder.y)
            .atan2(right_elbow.x - right_shoulder.x)
            .abs();
        if elbow_angle > self.elbow_angle {
            feedback.push("Straighten your arms to push up your upper body");
        }

        // 上体の持ち上がり（肩が腰より十分に上 = 十分に負）
        if sy - hy > self.elevation {
            feedback.push("Push up your chest higher");
        }

        let left_hip = frame.get(LandmarkIndex::LeftHip);
        let right_hip = frame.get(LandmarkIndex::RightHip);
        if (left_hip.y - right_hip.y).abs() > self.hip_level {
            feedback.push("Keep your hips flat on the ground");
        }

        let nose = frame.get(LandmarkIndex::Nose);
        let neck_angle = (nose.y - sy).atan2(nose.x - sx).abs();
        if neck_angle > self.neck_angle {
            feedback.push("Keep your neck neutral, look down at the floor");
        }

        join_feedback(feedback)
    }

    /// ブリッジのフォームチェック
    pub fn bridging(&self, frame: &LandmarkFrame) -> Option<String> {
        let mut feedback = Vec::new();

        let (_, shoulder_y) =
            frame.midpoint(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder);
        let (_, hip_y) = frame.midpoint(LandmarkIndex::LeftHip, LandmarkIndex::RightHip);

        if (hip_y - shoulder_y).abs() < self.bridge_gap {
            feedback.push("Lift your hips higher");
        }

        let left_hip = frame.get(LandmarkIndex::LeftHip);
        let right_hip = frame.get(LandmarkIndex::RightHip);
        if (left_hip.y - right_hip.y).abs() > self.hip_level {
            feedback.push("Keep your hips level");
        }

        let left_shoulder = frame.get(LandmarkIndex::LeftShoulder);
        let right_shoulder = frame.get(LandmarkIndex::RightShoulder);
        if (left_shoulder.y - right_shoulder.y).abs() > self.shoulder_level {
            feedback.push("Keep your shoulders stable on the ground");
        }

        join_feedback(feedback)
    }
}

fn join_feedback(feedback: Vec<&str>) -> Option<String> {
    if feedback.is_empty() {
        None
    } else {
        Some(feedback.join(". "))
    }
}

/// ホールド時間とレップ数の積算
///
/// 合格フレームでカウンタが進み、しきい値を超えた時点でレップ成立。
/// 不合格フレームではカウンタを触らない（リセットは成立時のみ）。
pub struct HoldTracker {
    hold_frames: u32,
    reps: u32,
    completion_frames: u32,
}

impl HoldTracker {
    pub fn new(completion_frames: u32) -> Self {
        Self {
            hold_frames: 0,
            reps: 0,
            completion_frames,
        }
    }

    /// 合格フレームを1つ積む。レップが成立したら true。
    pub fn record_pass(&mut self) -> bool {
        self.hold_frames += 1;
        if self.hold_frames > self.completion_frames {
            self.reps += 1;
            self.hold_frames = 0;
            true
        } else {
            false
        }
    }

    pub fn hold_frames(&self) -> u32 {
        self.hold_frames
    }

    pub fn reps(&self) -> u32 {
        self.reps
    }

    /// モード切り替え時に呼ぶ
    pub fn reset(&mut self) {
        self.hold_frames = 0;
        self.reps = 0;
    }
}
