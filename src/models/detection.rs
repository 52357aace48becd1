use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::{info, warn};

use crate::models::common::LocomotionClass;
use crate::models::person::Person;
use crate::models::traits::IAgent;

/// 検知イベント
///
/// エージェントの可視区間が始まった瞬間を1件として記録します。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionEvent {
    /// エージェントIDと検知時刻から作る一意ID
    pub id: String,
    pub agent_id: String,
    pub locomotion_class: LocomotionClass,
    pub is_threat: bool,
    /// 検知時刻（シミュレーション開始からの経過秒数）
    pub timestamp: f64,
}

impl DetectionEvent {
    fn from_person(person: &Person, timestamp: f64) -> Self {
        Self {
            id: format!("{}@{:.3}", person.get_id(), timestamp),
            agent_id: person.get_id().to_string(),
            locomotion_class: person.get_locomotion_class(),
            is_threat: person.is_threat,
            timestamp,
        }
    }
}

/// 検知ログ統計
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionStats {
    pub total: usize,
    pub threats: usize,
    pub road: usize,
    pub room: usize,
}

/// 検知ロガー
///
/// 各エージェントの `threat_detected_at` を監視し、新しい非 None の値に
/// 変わったときだけイベントを1件、ログの先頭に追加します。
/// ログは追記専用で、記録済みのイベントを変更・削除することはありません。
#[derive(Debug, Clone, Default)]
pub struct DetectionLogger {
    events: VecDeque<DetectionEvent>,
    /// エージェントごとに最後に記録した区間開始時刻
    last_window: HashMap<String, f64>,
}

impl DetectionLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// エージェント一覧を観測し、新しいイベントを返す
    pub fn observe(&mut self, agents: &[Person]) -> Vec<DetectionEvent> {
        let mut emitted = Vec::new();

        for person in agents {
            match person.threat_detected_at {
                Some(started) => {
                    let agent_id = person.get_id();
                    if self.last_window.get(agent_id) == Some(&started) {
                        continue;
                    }
                    self.last_window.insert(agent_id.to_string(), started);

                    let event = DetectionEvent::from_person(person, started);
                    if event.is_threat {
                        warn!(
                            event = %event.id,
                            agent = %event.agent_id,
                            class = %event.locomotion_class,
                            time = started,
                            "脅威を検知"
                        );
                    } else {
                        info!(
                            event = %event.id,
                            agent = %event.agent_id,
                            class = %event.locomotion_class,
                            time = started,
                            "人物を検知"
                        );
                    }
                    self.events.push_front(event.clone());
                    emitted.push(event);
                }
                None => {
                    self.last_window.remove(person.get_id());
                }
            }
        }

        emitted
    }

    /// 新しい順のイベント
    pub fn events(&self) -> impl Iterator<Item = &DetectionEvent> {
        self.events.iter()
    }

    /// 最新N件
    pub fn latest(&self, count: usize) -> Vec<&DetectionEvent> {
        self.events.iter().take(count).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn stats(&self) -> DetectionStats {
        self.events.iter().fold(DetectionStats::default(), |mut stats, event| {
            stats.total += 1;
            if event.is_threat {
                stats.threats += 1;
            }
            match event.locomotion_class {
                LocomotionClass::Road => stats.road += 1,
                LocomotionClass::Room => stats.room += 1,
            }
            stats
        })
    }
}
