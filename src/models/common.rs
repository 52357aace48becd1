use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// 壁ボックスの厚さ（ユニット）
pub const WALL_THICKNESS: f64 = 0.1;
/// 床スラブの厚さ（ユニット）
pub const FLOOR_THICKNESS: f64 = 0.1;
/// 長さゼロ判定に使う閾値
pub const EPSILON: f64 = 1e-9;

/// 移動区分
///
/// エージェントが部屋間を移動するか道路上を移動するかを表します。
/// 目標地点は必ず同じ区分の有効地点から選ばれます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocomotionClass {
    /// 道路上を移動する屋外エージェント
    Road,
    /// 地上階の部屋間を移動する屋内エージェント
    Room,
}

impl std::fmt::Display for LocomotionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocomotionClass::Road => write!(f, "road"),
            LocomotionClass::Room => write!(f, "room"),
        }
    }
}

/// 軸平行境界ボックス
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// 中心と寸法からボックスを作成
    pub fn from_center_size(center: DVec3, size: DVec3) -> Self {
        let half = size.abs() * 0.5;
        Self::new(center - half, center + half)
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn contains(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// 点をボックス内に押し込む
    pub fn clamp_point(&self, point: DVec3) -> DVec3 {
        point.clamp(self.min, self.max)
    }

    /// レイとの交差距離を計算（スラブ法）
    ///
    /// `direction` は正規化済みであること。ボックス内部から発射された場合は
    /// 出口面までの距離を返します（両面判定）。交差しない場合は None。
    pub fn ray_intersection(&self, origin: DVec3, direction: DVec3) -> Option<f64> {
        let mut t_near = f64::NEG_INFINITY;
        let mut t_far = f64::INFINITY;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if d.abs() < EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t0 = (lo - o) * inv;
            let mut t1 = (hi - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_near = t_near.max(t0);
            t_far = t_far.min(t1);
            if t_near > t_far {
                return None;
            }
        }

        if t_far < 0.0 {
            return None;
        }

        let t = if t_near >= 0.0 { t_near } else { t_far };
        t.is_finite().then_some(t)
    }
}

/// ベクトルを正規化、長さゼロや非有限値の場合は None
pub fn safe_normalize(v: DVec3) -> Option<DVec3> {
    if !v.is_finite() {
        return None;
    }
    let len = v.length();
    if len < EPSILON {
        None
    } else {
        Some(v / len)
    }
}

/// Y成分を落とした水平ベクトル
pub fn horizontal(v: DVec3) -> DVec3 {
    DVec3::new(v.x, 0.0, v.z)
}

/// XZ平面での距離
pub fn horizontal_distance(a: DVec3, b: DVec3) -> f64 {
    horizontal(a - b).length()
}

/// 方向ベクトルを `toward` 側へ `weight` だけ寄せて正規化
///
/// 合成結果が長さゼロになった場合は None（その tick は移動しない）。
pub fn blend_direction(direction: DVec3, toward: DVec3, weight: f64) -> Option<DVec3> {
    let weight = weight.clamp(0.0, 1.0);
    safe_normalize(direction.lerp(toward, weight))
}

/// 鉛直軸まわりに90度回転
pub fn rotate_quarter_turn(direction: DVec3) -> DVec3 {
    DQuat::from_rotation_y(std::f64::consts::FRAC_PI_2) * direction
}

/// 数学ユーティリティ関数
pub mod math_utils {
    /// 角度を-180度〜180度の範囲に正規化
    pub fn normalize_angle(angle_deg: f64) -> f64 {
        let mut normalized = angle_deg % 360.0;
        if normalized > 180.0 {
            normalized -= 360.0;
        } else if normalized <= -180.0 {
            normalized += 360.0;
        }
        normalized
    }
}
