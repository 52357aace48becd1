//! # sitewatch
//!
//! サイト（建物・階・部屋・道路）に設置されたカメラの可視範囲と、
//! サイト内を移動する人物エージェントをシミュレーションするライブラリです。

pub mod logging;
pub mod models;
pub mod runner;
pub mod scenario;
pub mod simulation;
