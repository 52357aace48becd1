//! # Steering モジュール
//!
//! 非脅威エージェントの進行方向を決める操舵規則です。
//!
//! 1. 目標地点へ向かう基本方向
//! 2. 近距離の脅威からの逃走（パニック）と、検知済みの中距離の脅威への警戒
//! 3. 近接エージェントとの間隔維持
//!
//! 決まった方向は `resolve_move` で壁回避・領域制限・すり抜け防止を通してから
//! 実際の移動量になります。

use glam::DVec3;

use crate::models::common::{
    blend_direction, horizontal, horizontal_distance, rotate_quarter_turn, safe_normalize,
};
use crate::models::geometry::SurfaceFilter;
use crate::models::person::Person;
use crate::models::traits::IOccluder;
use crate::scenario::SteeringConfig;

/// 操舵の計算結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringOutcome {
    /// 進行方向（None の場合この tick は移動しない）
    pub direction: Option<DVec3>,
    pub panicking: bool,
}

/// 目標地点への水平方向
pub fn seek(agent: &Person) -> Option<DVec3> {
    safe_normalize(horizontal(agent.target - agent.position))
}

/// 非脅威エージェントの進行方向を計算
///
/// `crowd` には自身を含めてよく、同じIDのエージェントは無視されます。
/// 目標地点上に立っていても逃走と間隔維持は評価され、合成結果が
/// 零ベクトルになった場合だけ `direction` が None になります。
pub fn desired_direction(
    agent: &Person,
    crowd: &[Person],
    config: &SteeringConfig,
    now: f64,
) -> SteeringOutcome {
    let heading = seek(agent);
    let mut direction = heading.unwrap_or(DVec3::ZERO);
    let mut panicking = false;

    for threat in crowd.iter().filter(|p| p.is_threat && p.id != agent.id) {
        let distance = horizontal_distance(agent.position, threat.position);
        let Some(flee) = safe_normalize(horizontal(agent.position - threat.position)) else {
            continue;
        };

        let weight = if distance < config.near_radius {
            panicking = true;
            config.near_flee_weight
        } else if distance < config.caution_radius
            && threat
                .detection_dwell(now)
                .is_some_and(|dwell| dwell > config.caution_dwell_s)
        {
            config.caution_max_weight * (1.0 - distance / config.caution_radius)
        } else {
            continue;
        };

        direction = blend_direction(direction, flee, weight).unwrap_or(DVec3::ZERO);
    }

    for other in crowd.iter().filter(|p| p.id != agent.id) {
        let distance = horizontal_distance(agent.position, other.position);
        if distance >= config.separation_radius {
            continue;
        }
        let away = safe_normalize(horizontal(agent.position - other.position))
            .unwrap_or_else(|| coincident_away(agent, other, heading));
        let strength = (1.0 - distance / config.separation_radius).powi(2);
        direction = blend_direction(direction, away, strength).unwrap_or(DVec3::ZERO);
    }

    SteeringOutcome {
        direction: safe_normalize(direction),
        panicking,
    }
}

/// 同じ地点に重なった相手から離れる方向
///
/// 進行方向（無ければ +X）に直交する向きを取り、ID の大小で左右を分けます。
fn coincident_away(agent: &Person, other: &Person, heading: Option<DVec3>) -> DVec3 {
    let side = rotate_quarter_turn(heading.unwrap_or(DVec3::X));
    if agent.id < other.id { side } else { -side }
}

/// 方向と移動距離から次の位置を決める
///
/// - `avoid_walls` が真なら、進行方向の壁を探査し、塞がれていれば90度回して再探査
/// - 領域（±boundary_half_extent）外に出る移動は破棄
/// - 移動距離内に面がある移動（すり抜け）は破棄
///
/// 移動しない場合は None。
pub fn resolve_move<O: IOccluder + ?Sized>(
    position: DVec3,
    direction: DVec3,
    step_length: f64,
    occluder: &O,
    config: &SteeringConfig,
    probe_height: f64,
    avoid_walls: bool,
) -> Option<DVec3> {
    let mut direction = safe_normalize(horizontal(direction))?;
    if !(step_length > 0.0) || !step_length.is_finite() {
        return None;
    }

    let probe_origin = position + DVec3::Y * probe_height;

    let probe = config.wall_probe_distance;
    let walls = SurfaceFilter::WallsOnly;
    if avoid_walls && occluder.is_blocked(probe_origin, direction, probe, walls) {
        direction = rotate_quarter_turn(direction);
        if occluder.is_blocked(probe_origin, direction, probe, walls) {
            return None;
        }
    }

    let next = position + direction * step_length;
    let limit = config.boundary_half_extent;
    if next.x.abs() > limit || next.z.abs() > limit {
        return None;
    }

    if occluder.is_blocked(probe_origin, direction, step_length, walls) {
        return None;
    }

    Some(next)
}
