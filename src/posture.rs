use crate::config::PostureConfig;
use crate::landmark::{LandmarkFrame, LandmarkIndex};

/// 姿勢が問題なしのときに返す定型文
pub const GOOD_POSTURE_FEEDBACK: &str = "Great posture! Keep it up!";

/// 1フレーム分の姿勢評価結果
#[derive(Debug, Clone)]
pub struct PostureReport {
    /// 指摘フレーズ（順序は検査順）。空なら良い姿勢。
    pub corrections: Vec<String>,
}

impl PostureReport {
    pub fn is_good(&self) -> bool {
        self.corrections.is_empty()
    }

    /// 表示・読み上げ用の1行テキスト
    pub fn message(&self) -> String {
        if self.corrections.is_empty() {
            GOOD_POSTURE_FEEDBACK.to_string()
        } else {
            self.corrections.join(". ")
        }
    }
}

/// 基準フレームとの比較で座り姿勢を評価する
///
/// キャリブレーションは丸ごと差し替え方式。部分的な更新やマージはしない。
pub struct PostureEvaluator {
    head_y_diff: f32,
    shoulder_level: f32,
    back_angle: f32,
    lean: f32,
    neck_ratio: f32,
    calibration: Option<LandmarkFrame>,
}

impl PostureEvaluator {
    pub fn from_config(config: &PostureConfig) -> Self {
        Self {
            head_y_diff: config.head_y_diff,
            shoulder_level: config.shoulder_level,
            back_angle: config.back_angle,
            lean: config.lean,
            neck_ratio: config.neck_ratio,
            calibration: None,
        }
    }

    /// 現在のフレームを基準姿勢として保存する
    pub fn calibrate(&mut self, frame: &LandmarkFrame) {
        self.calibration = Some(frame.clone());
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// 肩中点→腰中点の角度（ラジアン）
    fn shoulder_hip_angle(frame: &LandmarkFrame) -> f32 {
        let (sx, sy) = frame.midpoint(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder);
        let (hx, hy) = frame.midpoint(LandmarkIndex::LeftHip, LandmarkIndex::RightHip);
        (hy - sy).atan2(hx - sx)
    }

    /// 鼻→肩中点の距離（首の長さの代理量）
    fn neck_length(frame: &LandmarkFrame) -> f32 {
        let nose = frame.get(LandmarkIndex::Nose);
        let (sx, sy) = frame.midpoint(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder);
        (nose.x - sx).hypot(nose.y - sy)
    }

    /// 基準フレームと比較して指摘フレーズを生成する。
    /// 検査は独立で、1フレームに複数の指摘が出ることがある。
    /// キャリブレーション前は None。
    pub fn evaluate(&self, frame: &LandmarkFrame) -> Option<PostureReport> {
        let calibration = self.calibration.as_ref()?;
        let mut corrections = Vec::new();

        // 頭の高さ
        let head_y_diff =
            frame.get(LandmarkIndex::Nose).y - calibration.get(LandmarkIndex::Nose).y;
        if head_y_diff > self.head_y_diff {
            corrections.push("Lift your head slightly".to_string());
        } else if head_y_diff < -self.head_y_diff {
            corrections.push("Lower your head slightly".to_string());
        }

        // 肩の水平: y が大きい側（画面下側）を上げさせる
        let left_shoulder = frame.get(LandmarkIndex::LeftShoulder);
        let right_shoulder = frame.get(LandmarkIndex::RightShoulder);
        if (left_shoulder.y - right_shoulder.y).abs() > self.shoulder_level {
            if left_shoulder.y > right_shoulder.y {
                corrections.push("Level your shoulders by raising your left shoulder".to_string());
            } else {
                corrections.push("Level your shoulders by raising your right shoulder".to_string());
            }
        }

        let current_angle = Self::shoulder_hip_angle(frame);
        let calibration_angle = Self::shoulder_hip_angle(calibration);

        // 背中の角度（絶対偏差）
        if (current_angle - calibration_angle).abs() > self.back_angle {
            if current_angle > calibration_angle {
                corrections.push("Straighten your back by sitting up more".to_string());
            } else {
                corrections.push("Relax your back slightly".to_string());
            }
        }

        // 前後の傾き（方向つき閾値）。検査としては上と独立に扱う。
        if current_angle - calibration_angle > self.lean {
            corrections.push("Sit back slightly, you're leaning too far forward".to_string());
        } else if calibration_angle - current_angle > self.lean {
            corrections.push("Sit up slightly, you're leaning too far backward".to_string());
        }

        // 首のすくみ: 首が基準の95%未満に縮んでいたら肩が上がっている
        if Self::neck_length(frame) < Self::neck_length(calibration) * self.neck_ratio {
            corrections.push("Relax your shoulders and stretch your neck".to_string());
        }

        Some(PostureReport { corrections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::Landmark;

    fn make_frame(
        nose: (f32, f32),
        left_shoulder: (f32, f32),
        right_shoulder: (f32, f32),
        left_hip: (f32, f32),
        right_hip: (f32, f32),
    ) -> LandmarkFrame {
        let mut frame = LandmarkFrame::default();
        frame.landmarks[LandmarkIndex::Nose as usize] = Landmark::at(nose.0, nose.1);
        frame.landmarks[LandmarkIndex::LeftShoulder as usize] =
            Landmark::at(left_shoulder.0, left_shoulder.1);
        frame.landmarks[LandmarkIndex::RightShoulder as usize] =
            Landmark::at(right_shoulder.0, right_shoulder.1);
        frame.landmarks[LandmarkIndex::LeftHip as usize] = Landmark::at(left_hip.0, left_hip.1);
        frame.landmarks[LandmarkIndex::RightHip as usize] = Landmark::at(right_hip.0, right_hip.1);
        frame
    }

    fn seated_frame() -> LandmarkFrame {
        make_frame(
            (0.5, 0.30),                // nose
            (0.42, 0.40), (0.58, 0.40), // shoulders
            (0.44, 0.62), (0.56, 0.62), // hips
        )
    }

    fn calibrated_evaluator() -> PostureEvaluator {
        let mut evaluator = PostureEvaluator::from_config(&PostureConfig::default());
        evaluator.calibrate(&seated_frame());
        evaluator
    }

    #[test]
    fn test_uncalibrated_returns_none() {
        let evaluator = PostureEvaluator::from_config(&PostureConfig::default());
        assert!(evaluator.evaluate(&seated_frame()).is_none());
    }

    #[test]
    fn test_identical_frames_good_posture() {
        let evaluator = calibrated_evaluator();
        let report = evaluator.evaluate(&seated_frame()).unwrap();
        assert!(report.is_good());
        assert_eq!(report.message(), "Great posture! Keep it up!");
    }

    #[test]
    fn test_head_dropped_lift_head_only() {
        // 横を向いた姿勢（鼻が肩中点から横にずれている）。
        // 鼻が下がっても首の長さは95%を割らず、頭の検査だけが反応する。
        let turned = make_frame(
            (0.20, 0.32),
            (0.42, 0.40), (0.58, 0.40),
            (0.44, 0.62), (0.56, 0.62),
        );
        let mut evaluator = PostureEvaluator::from_config(&PostureConfig::default());
        evaluator.calibrate(&turned);

        let mut live = turned.clone();
        live.landmarks[LandmarkIndex::Nose as usize].y += 0.05;

        let report = evaluator.evaluate(&live).unwrap();
        assert_eq!(
            report.corrections,
            vec!["Lift your head slightly".to_string()],
            "only the head check should fire: {:?}",
            report.corrections
        );
    }

    #[test]
    fn test_head_raised_lower_head_only() {
        let evaluator = calibrated_evaluator();
        let mut live = seated_frame();
        live.landmarks[LandmarkIndex::Nose as usize].y -= 0.05;

        let report = evaluator.evaluate(&live).unwrap();
        assert_eq!(
            report.corrections,
            vec!["Lower your head slightly".to_string()]
        );
    }

    #[test]
    fn test_uneven_shoulders_names_left() {
        let evaluator = calibrated_evaluator();
        let mut live = seated_frame();
        // 左肩が右肩より 0.03 低い（yが大きい）
        live.landmarks[LandmarkIndex::LeftShoulder as usize].y += 0.03;

        let report = evaluator.evaluate(&live).unwrap();
        assert_eq!(
            report.message(),
            "Level your shoulders by raising your left shoulder"
        );
    }

    #[test]
    fn test_uneven_shoulders_names_right() {
        let evaluator = calibrated_evaluator();
        let mut live = seated_frame();
        live.landmarks[LandmarkIndex::RightShoulder as usize].y += 0.03;

        let report = evaluator.evaluate(&live).unwrap();
        assert_eq!(
            report.message(),
            "Level your shoulders by raising your right shoulder"
        );
    }

    #[test]
    fn test_lean_forward_fires_back_and_lean() {
        let evaluator = calibrated_evaluator();
        let mut live = seated_frame();
        // 肩を前に出す: 肩中点を腰中点からxでずらすと角度が大きくなる
        live.landmarks[LandmarkIndex::LeftShoulder as usize].x += 0.06;
        live.landmarks[LandmarkIndex::RightShoulder as usize].x += 0.06;

        let report = evaluator.evaluate(&live).unwrap();
        assert_eq!(
            report.message(),
            "Straighten your back by sitting up more. Sit back slightly, you're leaning too far forward"
        );
    }

    #[test]
    fn test_lean_backward_fires_back_and_lean() {
        let evaluator = calibrated_evaluator();
        let mut live = seated_frame();
        live.landmarks[LandmarkIndex::LeftShoulder as usize].x -= 0.06;
        live.landmarks[LandmarkIndex::RightShoulder as usize].x -= 0.06;

        let report = evaluator.evaluate(&live).unwrap();
        assert_eq!(
            report.message(),
            "Relax your back slightly. Sit up slightly, you're leaning too far backward"
        );
    }

    #[test]
    fn test_hunched_neck() {
        let evaluator = calibrated_evaluator();
        let mut live = seated_frame();
        // 首の長さ 0.10 → 0.09 (< 95%)。頭の高さ閾値 (0.03) には届かない。
        live.landmarks[LandmarkIndex::Nose as usize].y += 0.01;

        let report = evaluator.evaluate(&live).unwrap();
        assert_eq!(
            report.corrections,
            vec!["Relax your shoulders and stretch your neck".to_string()]
        );
    }

    #[test]
    fn test_recalibration_replaces_reference() {
        let mut evaluator = PostureEvaluator::from_config(&PostureConfig::default());
        evaluator.calibrate(&seated_frame());

        let mut shifted = seated_frame();
        shifted.landmarks[LandmarkIndex::Nose as usize].y += 0.05;
        // 2回目のキャリブレーションで基準が丸ごと置き換わる
        evaluator.calibrate(&shifted);

        let report = evaluator.evaluate(&shifted).unwrap();
        assert!(report.is_good(), "new reference should match itself");
    }
}
