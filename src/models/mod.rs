// 基本的なデータ型と数学ユーティリティ
pub mod common;

// エージェント・センサー・遮蔽物の基本インターフェース（trait）定義
pub mod traits;

// サイト記述 → ワールドジオメトリ
pub mod geometry;
pub mod camera;

// 可視判定
pub mod visibility;

// エージェントと移動
pub mod person;
pub mod waypoints;
pub mod steering;
pub mod simulator;

// 脅威と検知ログ
pub mod threat;
pub mod detection;

// 便利な re-export
pub use camera::{CameraKind, CameraPose};
pub use common::*;
pub use detection::{DetectionEvent, DetectionLogger, DetectionStats};
pub use geometry::{
    RayHit, RoadSegment, RoomVolume, SceneGeometry, Surface, SurfaceFilter, SurfaceKind,
};
pub use person::Person;
pub use simulator::{AdvanceReport, StepContext};
pub use traits::*;
pub use waypoints::{ValidPoint, ValidPoints};
