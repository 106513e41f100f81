//! KIM-1 カセットインターフェース
//!
//! 記録は ~3700Hz（高）と ~2400Hz（低）の2トーン。高トーン9周期、低トーン6周期。
//! 1ビットは高・中・低の3トーン列で、中央が高なら0、低なら1。
//!
//! 実機ではLM565 PLLと311コンパレータが高トーンで1、低トーンで0をPB7に出す。
//! ここでは高速な周期サンプリングで正の半波の長さを数え、短い半波（高トーン）
//! と長い半波（低トーン）を判別して、そのラッチを置き換える。

/// 分類しきい値（サンプル数）: これ未満の正の半波は高トーン
pub const CLASSIFY_THRESHOLD: u32 = 8;

/// 判別結果のビット（311コンパレータ出力のPB7位置）
const COMPARATOR_HIGH: u8 = 0x80;

/// カセット装置との境界
///
/// `time` はエミュレーション時間（秒）。
pub trait CassetteTransport {
    /// 瞬時入力レベル（符号のみ意味を持つ）
    fn input(&mut self, time: f64) -> f64;
    /// 出力レベル（+1.0 / -1.0）
    fn output(&mut self, time: f64, level: f64);
}

/// ポートB書き込み値から出力レベルを求める（PB5が立っていなければNone）
pub fn encode_level(port_b: u8) -> Option<f64> {
    if port_b & 0x20 == 0 {
        return None;
    }
    Some(if port_b & 0x80 != 0 { -1.0 } else { 1.0 })
}

/// トーン判別器
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToneDecoder {
    /// 直近の非正サンプル以降の連続正サンプル数
    pub high_count: u32,
    /// 判別結果（0x80 = ビット1 / 0x00 = ビット0）
    pub output: u8,
}

impl ToneDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.high_count = 0;
        self.output = 0;
    }

    /// 1サンプルを処理
    pub fn sample(&mut self, level: f64) {
        if level > 0.0 {
            self.high_count = self.high_count.saturating_add(1);
            return;
        }

        if self.high_count != 0 {
            let bit = self.high_count < CLASSIFY_THRESHOLD;
            let output = if bit { COMPARATOR_HIGH } else { 0 };
            if output != self.output {
                crate::trace_log::log_tone_classified(self.high_count, bit);
            }
            self.output = output;
            self.high_count = 0;
        }
    }

    /// 判別済みビット（true = 短い半波 = 高トーン）
    pub fn bit(&self) -> bool {
        self.output & COMPARATOR_HIGH != 0
    }

    /// PB7に見える値（判別ビットの反転）
    pub fn pb7(&self) -> u8 {
        self.output ^ COMPARATOR_HIGH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(dec: &mut ToneDecoder, highs: usize) {
        for _ in 0..highs {
            dec.sample(0.5);
        }
        dec.sample(-0.5);
    }

    #[test]
    fn test_short_run_is_one() {
        let mut dec = ToneDecoder::new();
        feed(&mut dec, 7);
        assert!(dec.bit());
        assert_eq!(dec.high_count, 0);
        assert_eq!(dec.pb7(), 0x00);
    }

    #[test]
    fn test_long_run_is_zero() {
        let mut dec = ToneDecoder::new();
        feed(&mut dec, 7);
        feed(&mut dec, 8);
        assert!(!dec.bit());
        assert_eq!(dec.pb7(), 0x80);

        feed(&mut dec, 30);
        assert!(!dec.bit());
    }

    #[test]
    fn test_idle_low_keeps_state() {
        let mut dec = ToneDecoder::new();
        feed(&mut dec, 3);
        let before = dec.clone();
        dec.sample(0.0);
        dec.sample(-1.0);
        assert_eq!(dec, before);
    }

    #[test]
    fn test_zero_is_not_positive() {
        let mut dec = ToneDecoder::new();
        dec.sample(0.0);
        assert_eq!(dec.high_count, 0);
        dec.sample(f64::MIN_POSITIVE);
        assert_eq!(dec.high_count, 1);
    }

    #[test]
    fn test_encode_level() {
        assert_eq!(encode_level(0xA0), Some(-1.0));
        assert_eq!(encode_level(0x20), Some(1.0));
        assert_eq!(encode_level(0x80), None);
        assert_eq!(encode_level(0x00), None);
    }
}
