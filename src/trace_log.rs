//! KIM-1 周辺トレースログ
//!
//! 原則:
//! 1. 毎サンプルの値ではなく「状態遷移」を記録
//! 2. カテゴリ分離: PORT / TAPE / LED / BUS
//! 3. 出力は `log` クレート経由（env_logger でフィルタ可能）

use std::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    /// トレースカテゴリ
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TraceLevel: u32 {
        /// RIOT U2 ポートA/B アクセス
        const PORT = 0b0001;
        /// カセット入出力（分類結果・レベル変化）
        const TAPE = 0b0010;
        /// LED桁の点灯・消灯
        const LED  = 0b0100;
        /// 未割り当てアドレス・ROM書き込み
        const BUS  = 0b1000;
    }
}

/// グローバルトレースレベル（診断専用、エミュレーション状態には影響しない）
static TRACE_LEVEL: AtomicU32 = AtomicU32::new(0);

/// トレースレベルを設定
pub fn set_trace_level(level: TraceLevel) {
    TRACE_LEVEL.store(level.bits(), Ordering::Relaxed);
}

/// 現在のトレースレベルを取得
pub fn get_trace_level() -> TraceLevel {
    TraceLevel::from_bits_truncate(TRACE_LEVEL.load(Ordering::Relaxed))
}

/// カテゴリが有効かチェック
#[inline]
pub fn is_enabled(flag: TraceLevel) -> bool {
    (TRACE_LEVEL.load(Ordering::Relaxed) & flag.bits()) != 0
}

/// `port+tape` 形式の文字列をパース（未知の名前は無視）
pub fn parse_trace_level(s: &str) -> TraceLevel {
    let mut level = TraceLevel::empty();

    for part in s.to_lowercase().split('+') {
        match part.trim() {
            "none" => {}
            "port" => level |= TraceLevel::PORT,
            "tape" => level |= TraceLevel::TAPE,
            "led" => level |= TraceLevel::LED,
            "bus" => level |= TraceLevel::BUS,
            "all" => level = TraceLevel::all(),
            _ => {}
        }
    }

    level
}

// ============================================================
// ログ出力関数
// ============================================================

/// [PORT] 行/桁セレクトの変化
pub fn log_select_change(from: u8, to: u8) {
    if is_enabled(TraceLevel::PORT) {
        log::info!("[PORT] Select {} -> {}", from, to);
    }
}

/// [PORT] ポートB書き込み
pub fn log_port_b_write(value: u8) {
    if is_enabled(TraceLevel::PORT) {
        log::info!("[PORT] PB <- ${:02X}", value);
    }
}

/// [TAPE] モーター/書き込みビットの変化
pub fn log_tape_motor(write_mode: bool) {
    if is_enabled(TraceLevel::TAPE) {
        if write_mode {
            log::info!("[TAPE] PB5 set: output enabled, input masked");
        } else {
            log::info!("[TAPE] PB5 clear: input enabled");
        }
    }
}

/// [TAPE] トーン分類結果の変化
pub fn log_tone_classified(run_length: u32, bit: bool) {
    if is_enabled(TraceLevel::TAPE) {
        log::info!("[TAPE] Run {} samples -> bit {}", run_length, u8::from(bit));
    }
}

/// [LED] 桁の点灯
pub fn log_digit_lit(digit: usize, segments: u8) {
    if is_enabled(TraceLevel::LED) {
        log::info!("[LED] Digit {} = ${:02X}", digit, segments);
    }
}

/// [LED] 桁の消灯
pub fn log_digit_blanked(digit: usize) {
    if is_enabled(TraceLevel::LED) {
        log::info!("[LED] Digit {} blanked", digit);
    }
}

/// [BUS] 未割り当てアドレスへのアクセス
pub fn log_unmapped(address: u16, value: Option<u8>) {
    if is_enabled(TraceLevel::BUS) {
        match value {
            Some(v) => log::info!("[BUS] Unknown write to ${:04X} = ${:02X}", address, v),
            None => log::info!("[BUS] Unknown read from ${:04X}", address),
        }
    } else {
        log::debug!("unmapped access at ${:04X}", address);
    }
}

/// [BUS] ROM領域への書き込み（無視）
pub fn log_rom_write(address: u16, value: u8) {
    if is_enabled(TraceLevel::BUS) {
        log::info!("[BUS] Ignored ROM write ${:04X} = ${:02X}", address, value);
    }
}
