use glam::DVec3;
use serde::Serialize;

use crate::models::common::{LocomotionClass, horizontal_distance};
use crate::models::traits::IAgent;

/// 人物エージェント
///
/// サイト内を移動する在室者・通行人を表します。
/// `is_visible` は毎 tick 可視判定エンジンから再計算され、
/// `threat_detected_at` は連続した可視区間の開始時刻を保持します。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Person {
    pub id: String,
    pub position: DVec3,
    pub target: DVec3,
    pub locomotion_class: LocomotionClass,
    pub is_threat: bool,
    /// 近くの脅威から逃走中か（tick ごとに導出）
    pub is_panicking: bool,
    pub is_visible: bool,
    /// 現在の可視区間が始まった時刻（見えていない間は None）
    pub threat_detected_at: Option<f64>,
    /// 移動速度（ユニット/秒）
    pub speed: f64,
}

impl Person {
    pub fn new(
        id: String,
        position: DVec3,
        target: DVec3,
        locomotion_class: LocomotionClass,
        speed: f64,
    ) -> Self {
        Self {
            id,
            position,
            target,
            locomotion_class,
            is_threat: false,
            is_panicking: false,
            is_visible: false,
            threat_detected_at: None,
            speed,
        }
    }

    /// 目標地点までの水平距離
    pub fn distance_to_target(&self) -> f64 {
        horizontal_distance(self.position, self.target)
    }

    /// 目標地点に到着したか
    pub fn has_arrived(&self, threshold: f64) -> bool {
        self.distance_to_target() < threshold
    }

    /// 可視区間が始まってからの経過時間
    pub fn detection_dwell(&self, now: f64) -> Option<f64> {
        self.threat_detected_at.map(|t| now - t)
    }

    /// 可視判定結果を反映
    ///
    /// 不可視→可視で区間開始時刻を記録し、可視→不可視で消去します。
    /// 可視が続いている間は時刻を変更しません。
    pub fn apply_visibility(&mut self, visible: bool, now: f64) {
        match (self.is_visible, visible) {
            (false, true) => self.threat_detected_at = Some(now),
            (true, false) => self.threat_detected_at = None,
            _ => {}
        }
        self.is_visible = visible;
    }
}

impl IAgent for Person {
    fn get_id(&self) -> &str {
        &self.id
    }

    fn get_position(&self) -> DVec3 {
        self.position
    }

    fn get_locomotion_class(&self) -> LocomotionClass {
        self.locomotion_class
    }
}
