//! KIM1RS - KIM-1 周辺回路エミュレータ
//!
//! MOS KIM-1 のうちCPU以外の部分を提供:
//! - キーパッド/7セグメントLEDのマルチプレクス（6530-U2 ポートA/B）
//! - LED残光タイマー
//! - カセットインターフェース（2トーンの半波長判別と出力）
//! - ビデオRAMとモノクロ描画
//! - RS/STキーによるRESET/NMI制御

pub mod bus;
pub mod cassette;
pub mod config;
pub mod control;
pub mod display;
pub mod keypad;
pub mod kim1;
pub mod savestate;
pub mod tape;
pub mod timer;
pub mod trace_log;
pub mod video;
