//! KIM-1 7セグメントLED表示
//!
//! 6桁のLED（左4桁: アドレス、右2桁: データ）は実機ではダイナミック点灯で、
//! ソフトウェアが桁を書き続けないと消える。ここでは桁ごとの残光カウンタで
//! その振る舞いを再現する。

/// LEDの桁数
pub const DIGIT_COUNT: usize = 6;

/// 桁書き込み時に設定される残光カウンタの値
pub const PERSISTENCE_RESET: u8 = 15;

/// 16進数字のセグメントパターン（bit0=a ... bit6=g）
pub const HEX_SEGMENTS: [u8; 16] = [
    0x3F, // 0
    0x06, // 1
    0x5B, // 2
    0x4F, // 3
    0x66, // 4
    0x6D, // 5
    0x7D, // 6
    0x07, // 7
    0x7F, // 8
    0x6F, // 9
    0x77, // A
    0x7C, // b
    0x39, // C
    0x5E, // d
    0x79, // E
    0x71, // F
];

/// セグメントパターンを16進文字に変換（消灯・不明パターンはNone）
pub fn segments_to_char(segments: u8) -> Option<char> {
    HEX_SEGMENTS
        .iter()
        .position(|&p| p == segments & 0x7F)
        .and_then(|i| char::from_digit(i as u32, 16))
        .map(|c| c.to_ascii_uppercase())
}

/// 6桁LEDと残光カウンタ
#[derive(Debug, Clone, Default)]
pub struct LedDisplay {
    /// 各桁の現在のセグメントパターン（0 = 消灯）
    pub segments: [u8; DIGIT_COUNT],
    /// 各桁の残光カウンタ [0, 15]
    pub led_time: [u8; DIGIT_COUNT],
}

impl LedDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// 残光カウンタをクリア（マシンリセット時）
    ///
    /// セグメントはそのまま残り、次のティックで消灯する。
    pub fn reset(&mut self) {
        self.led_time = [0; DIGIT_COUNT];
    }

    /// 桁にパターンを表示し、残光カウンタを満タンにする
    pub fn set_digit(&mut self, digit: usize, segments: u8) {
        if digit >= DIGIT_COUNT {
            return;
        }
        self.segments[digit] = segments & 0x7F;
        self.led_time[digit] = PERSISTENCE_RESET;
        crate::trace_log::log_digit_lit(digit, segments & 0x7F);
    }

    /// 残光ティック: 非ゼロのカウンタを減らし、既に0の桁は消灯
    pub fn tick(&mut self) {
        for i in 0..DIGIT_COUNT {
            if self.led_time[i] > 0 {
                self.led_time[i] -= 1;
            } else if self.segments[i] != 0 {
                self.segments[i] = 0;
                crate::trace_log::log_digit_blanked(i);
            }
        }
    }

    /// 桁のセグメントパターン
    pub fn digit(&self, digit: usize) -> u8 {
        self.segments.get(digit).copied().unwrap_or(0)
    }

    pub fn is_lit(&self, digit: usize) -> bool {
        self.digit(digit) != 0
    }

    /// 表示内容を文字列化（例: "0200 A9"）
    pub fn text(&self) -> String {
        let mut s = String::with_capacity(DIGIT_COUNT + 1);
        for (i, &seg) in self.segments.iter().enumerate() {
            if i == 4 {
                s.push(' ');
            }
            let c = match seg {
                0 => ' ',
                _ => segments_to_char(seg).unwrap_or('?'),
            };
            s.push(c);
        }
        s
    }
}
