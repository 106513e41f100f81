//! セーブステート機能
//!
//! 周辺回路の状態を保存・復元する（CPUの状態は実行エンジン側の責務）

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::display::DIGIT_COUNT;

/// RIOTポートの状態（セーブ用）
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PortState {
    pub port_b: u8,
    pub ddr_a: u8,
    pub ddr_b: u8,
    /// U3のポートレジスタ（PA, DDRA, PB, DDRB）
    pub u3_regs: [u8; 4],
}

/// LED表示の状態（セーブ用）
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DisplayState {
    pub segments: [u8; DIGIT_COUNT],
    pub led_time: [u8; DIGIT_COUNT],
}

/// カセット判別器の状態（セーブ用）
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CassetteState {
    pub high_count: u32,
    pub output: u8,
}

/// メモリの状態（セーブ用）
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MemoryState {
    pub ram: Vec<u8>,           // $0000-$03FF
    pub riot_ram: Vec<u8>,      // $1780-$17FF
    pub expansion_ram: Vec<u8>, // $2000-$3FFF
    pub video_ram: Vec<u8>,     // $4000-$5FFF
    pub flip_screen: bool,
}

/// タイマーの状態（セーブ用）
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TimerState {
    pub cycles: u64,
    pub led_fired: u64,
    pub cassette_fired: u64,
}

/// 完全な周辺回路の状態
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SaveState {
    pub version: u32,           // セーブフォーマットのバージョン
    pub ports: PortState,
    pub display: DisplayState,
    pub cassette: CassetteState,
    pub memory: MemoryState,
    pub timers: TimerState,
}

impl SaveState {
    pub const CURRENT_VERSION: u32 = 1;

    /// JSONファイルに書き出す
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string(self)
            .map_err(|e| format!("Failed to serialize save state: {}", e))?;
        fs::write(&path, json)
            .map_err(|e| format!("Failed to write save state {:?}: {}", path.as_ref(), e))?;
        Ok(())
    }

    /// JSONファイルから読み込む
    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read save state {:?}: {}", path.as_ref(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse save state: {}", e))
    }
}
