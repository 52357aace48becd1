use glam::{DQuat, DVec3, EulerRot};
use serde::Serialize;

use crate::models::common::math_utils::normalize_angle;
use crate::models::common::{Aabb, safe_normalize};

/// 近方クリップ距離
pub const NEAR_PLANE: f64 = 0.1;

/// カメラ種別
///
/// タワーカメラはクリップ境界を持たず、部屋カメラは所属する部屋の
/// ワールド境界を持ちます。境界は視錐コーンの描画制限にのみ使われ、
/// 可視判定そのものには関与しません。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CameraKind {
    Tower,
    Room { room_id: String, bounds: Aabb },
}

/// ワールド座標系でのカメラ姿勢
///
/// ヨー0・ピッチ0で +Z 方向を向きます。ヨーは鉛直軸まわり、
/// ピッチは正の値で下向きに傾き、ヨー→ピッチの順で合成されます。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraPose {
    pub id: String,
    pub name: Option<String>,
    pub position: DVec3,
    /// ヨー角（ラジアン）
    pub yaw: f64,
    /// ピッチ角（ラジアン）
    pub pitch: f64,
    /// 垂直視野角（度）
    pub fov_deg: f64,
    pub kind: CameraKind,
}

impl CameraPose {
    pub fn tower(
        id: String,
        name: Option<String>,
        position: DVec3,
        yaw_deg: f64,
        pitch_deg: f64,
        fov_deg: f64,
    ) -> Self {
        Self {
            id,
            name,
            position,
            yaw: normalize_angle(yaw_deg).to_radians(),
            pitch: pitch_deg.to_radians(),
            fov_deg,
            kind: CameraKind::Tower,
        }
    }

    pub fn room(
        id: String,
        name: Option<String>,
        position: DVec3,
        yaw_deg: f64,
        pitch_deg: f64,
        fov_deg: f64,
        room_id: String,
        bounds: Aabb,
    ) -> Self {
        Self {
            id,
            name,
            position,
            yaw: normalize_angle(yaw_deg).to_radians(),
            pitch: pitch_deg.to_radians(),
            fov_deg,
            kind: CameraKind::Room { room_id, bounds },
        }
    }

    fn rotation(&self) -> DQuat {
        DQuat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// 視線方向の単位ベクトル
    pub fn forward(&self) -> DVec3 {
        self.rotation() * DVec3::Z
    }

    /// 画面の横方向
    pub fn side(&self) -> DVec3 {
        self.rotation() * DVec3::X
    }

    /// 画面の上方向
    pub fn up(&self) -> DVec3 {
        self.rotation() * DVec3::Y
    }

    /// 部屋カメラのクリップ境界
    pub fn clip_bounds(&self) -> Option<&Aabb> {
        match &self.kind {
            CameraKind::Tower => None,
            CameraKind::Room { bounds, .. } => Some(bounds),
        }
    }

    /// 点が視錐台の内側にあるか
    pub fn frustum_contains(&self, point: DVec3, far_plane: f64, aspect: f64) -> bool {
        if !point.is_finite() || !self.position.is_finite() {
            return false;
        }

        let rel = point - self.position;
        let depth = rel.dot(self.forward());
        if !(depth > NEAR_PLANE && depth <= far_plane) {
            return false;
        }

        let tan_v = (self.fov_deg.to_radians() * 0.5).tan();
        let tan_h = tan_v * aspect;
        if !tan_v.is_finite() || tan_v <= 0.0 {
            return false;
        }

        rel.dot(self.side()).abs() <= depth * tan_h && rel.dot(self.up()).abs() <= depth * tan_v
    }

    /// 視錐コーンの遠方平面の4隅
    ///
    /// 部屋カメラの場合は各頂点を部屋の境界内に押し込みます。
    pub fn view_cone(&self, far_plane: f64, aspect: f64) -> [DVec3; 4] {
        let tan_v = (self.fov_deg.to_radians() * 0.5).tan();
        let half_h = far_plane * tan_v;
        let half_w = half_h * aspect;
        let center = self.position + self.forward() * far_plane;
        let (side, up) = (self.side(), self.up());

        let mut corners = [
            center + side * half_w + up * half_h,
            center - side * half_w + up * half_h,
            center - side * half_w - up * half_h,
            center + side * half_w - up * half_h,
        ];

        if let Some(bounds) = self.clip_bounds() {
            for corner in &mut corners {
                // 境界へ向かう線分上で最初に境界に当たる点まで縮める
                let clipped = safe_normalize(*corner - self.position)
                    .and_then(|dir| {
                        bounds
                            .ray_intersection(self.position, dir)
                            .map(|t| self.position + dir * t.min(far_plane))
                    })
                    .unwrap_or(*corner);
                *corner = bounds.clamp_point(clipped);
            }
        }

        corners
    }
}
