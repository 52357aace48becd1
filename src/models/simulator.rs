//! # Simulator モジュール
//!
//! エージェント状態を1 tick 進めます。処理順は固定です。
//!
//! 1. 可視判定結果の反映（可視区間の開始・終了）
//! 2. 到着判定と目標の再選択
//! 3. 脅威割り当てポリシー
//! 4. 操舵と移動（tick 開始時点のスナップショットを基準に全員を評価）

use rand::Rng;
use tracing::{debug, trace, warn};

use crate::models::person::Person;
use crate::models::steering::{desired_direction, resolve_move, seek};
use crate::models::threat::apply_threat_policy;
use crate::models::traits::IOccluder;
use crate::models::waypoints::ValidPoints;
use crate::scenario::{SteeringConfig, ThreatPolicyConfig};

/// 1 tick 分の入力
pub struct StepContext<'a, O: IOccluder + ?Sized> {
    pub occluder: &'a O,
    pub points: &'a ValidPoints,
    pub steering: &'a SteeringConfig,
    pub policy: &'a ThreatPolicyConfig,
    /// 壁探査レイの高さ
    pub probe_height: f64,
    pub now: f64,
    pub dt: f64,
}

/// 1 tick 分の結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceReport {
    pub escalated: Vec<String>,
    pub retargeted: usize,
    pub moved: usize,
    pub held: usize,
}

/// 有効地点からエージェントを生成
///
/// IDは "01", "02", ... の連番。有効地点が空の場合はエージェントを生成しません。
pub fn spawn_agents<R: Rng + ?Sized>(
    count: usize,
    points: &ValidPoints,
    steering: &SteeringConfig,
    rng: &mut R,
) -> Vec<Person> {
    if points.is_empty() {
        if count > 0 {
            warn!("有効地点が無いためエージェントを生成しません");
        }
        return Vec::new();
    }

    let mut agents = Vec::with_capacity(count);
    for index in 1..=count {
        let Some(spawn) = points.choose_any(rng) else {
            break;
        };
        let class = spawn.locomotion_class;
        let target = points.choose(class, rng).unwrap_or(spawn.position);
        let speed = rng.gen_range(steering.speed_min..=steering.speed_max);

        let person = Person::new(format!("{:02}", index), spawn.position, target, class, speed);
        debug!(
            "エージェント生成: {} ({}, 位置: {:.1}, {:.1}, 速度: {:.2})",
            person.id, class, spawn.position.x, spawn.position.z, speed
        );
        agents.push(person);
    }
    agents
}

/// 差し替え後の有効地点にエージェントを合わせる
///
/// - 有効地点が空なら全員を除去
/// - 自分の区分の地点が無いエージェントは除去
/// - 目標が同じ区分の地点でないエージェントは目標を選び直す
///
/// 返り値は (目標を選び直した人数, 除去した人数)。
pub fn reconcile_agents<R: Rng + ?Sized>(
    agents: &mut Vec<Person>,
    points: &ValidPoints,
    rng: &mut R,
) -> (usize, usize) {
    let before = agents.len();
    if points.is_empty() {
        agents.clear();
        return (0, before);
    }

    agents.retain(|person| {
        let keep = points.of_class(person.locomotion_class).next().is_some();
        if !keep {
            debug!("区分 {} の有効地点が無いため除去: {}", person.locomotion_class, person.id);
        }
        keep
    });
    let dropped = before - agents.len();

    let mut retargeted = 0;
    for person in agents.iter_mut() {
        let class = person.locomotion_class;
        if points.of_class(class).any(|p| p.position == person.target) {
            continue;
        }
        if let Some(target) = points.choose(class, rng) {
            trace!("目標再選択: {} -> ({:.1}, {:.1})", person.id, target.x, target.z);
            person.target = target;
            retargeted += 1;
        }
    }

    (retargeted, dropped)
}

/// 可視判定結果をエージェントへ反映
pub fn update_visibility(agents: &mut [Person], visible: &[bool], now: f64) {
    for (person, &flag) in agents.iter_mut().zip(visible) {
        person.apply_visibility(flag, now);
    }
}

/// 可視判定反映後のエージェントを1 tick 進める
pub fn advance_agents<O: IOccluder + ?Sized, R: Rng + ?Sized>(
    agents: &mut [Person],
    ctx: &StepContext<'_, O>,
    rng: &mut R,
) -> AdvanceReport {
    let mut report = AdvanceReport::default();

    for person in agents.iter_mut() {
        if person.has_arrived(ctx.steering.arrival_threshold) {
            if let Some(target) = ctx.points.choose(person.locomotion_class, rng) {
                trace!("目標再選択: {} -> ({:.1}, {:.1})", person.id, target.x, target.z);
                person.target = target;
                report.retargeted += 1;
            }
        }
    }

    report.escalated = apply_threat_policy(agents, ctx.now, ctx.policy, rng);

    let snapshot = agents.to_vec();
    for (person, before) in agents.iter_mut().zip(&snapshot) {
        let (direction, panicking) = if before.is_threat {
            (seek(before), false)
        } else {
            let outcome = desired_direction(before, &snapshot, ctx.steering, ctx.now);
            (outcome.direction, outcome.panicking)
        };

        person.is_panicking = panicking;
        let speed = if panicking {
            person.speed * ctx.steering.panic_speed_factor
        } else {
            person.speed
        };

        let next = direction.and_then(|dir| {
            resolve_move(
                before.position,
                dir,
                speed * ctx.dt,
                ctx.occluder,
                ctx.steering,
                ctx.probe_height,
                !before.is_threat,
            )
        });

        match next {
            Some(position) => {
                person.position = position;
                report.moved += 1;
            }
            None => report.held += 1,
        }
    }

    report
}
