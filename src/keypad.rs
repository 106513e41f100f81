//! KIM-1 キーパッド
//!
//! 23キー + SSTスライドスイッチ。PA0-PA6がキーマトリクスの列に、
//! 74145 BCDデコーダの出力0-2が行に接続されている。
//! キーはアクティブLow（押下で0）。

use crate::control::SpecialKeys;

/// キーマトリクスの行数
pub const ROW_COUNT: usize = 3;

/// 全キー解放時の行マスク（bit7は未使用で0）
pub const ROW_RELEASED: u8 = 0x7F;

/// KIM-1のキー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KimKey {
    /// 16進キー 0-F
    Hex(u8),
    /// AD: アドレス入力モード
    Ad,
    /// DA: データ入力モード
    Da,
    /// +: アドレスインクリメント
    Plus,
    /// GO: プログラム実行
    Go,
    /// PC: プログラムカウンタ呼び出し
    Pc,
    /// ST: ストップ（NMI）
    St,
    /// RS: リセット
    Rs,
}

impl KimKey {
    /// キーの (行, ビットマスク)。ST/RSはマトリクス外なのでNone
    pub fn matrix_position(self) -> Option<(usize, u8)> {
        match self {
            KimKey::Hex(n) if n < 0x07 => Some((0, 0x40 >> n)),
            KimKey::Hex(n) if n < 0x0E => Some((1, 0x40 >> (n - 0x07))),
            KimKey::Hex(0x0E) => Some((2, 0x40)),
            KimKey::Hex(0x0F) => Some((2, 0x20)),
            KimKey::Hex(_) => None,
            KimKey::Ad => Some((2, 0x10)),
            KimKey::Da => Some((2, 0x08)),
            KimKey::Plus => Some((2, 0x04)),
            KimKey::Go => Some((2, 0x02)),
            KimKey::Pc => Some((2, 0x01)),
            KimKey::St | KimKey::Rs => None,
        }
    }

    /// ホストの文字からキーを取得
    pub fn from_char(c: char) -> Option<KimKey> {
        match c {
            '-' => Some(KimKey::Ad),
            '=' => Some(KimKey::Da),
            ' ' => Some(KimKey::Plus),
            '\r' | '\n' => Some(KimKey::Go),
            _ => c.to_digit(16).map(|d| KimKey::Hex(d as u8)),
        }
    }
}

/// 1回のポーリングで外部から供給される入力マスク
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowInputs {
    /// 行0-2のキーマスク（7ビット、押下で0）
    pub rows: [u8; ROW_COUNT],
    /// ST/RS/SSのスペシャルマスク
    pub special: SpecialKeys,
}

impl Default for RowInputs {
    fn default() -> Self {
        RowInputs {
            rows: [ROW_RELEASED; ROW_COUNT],
            special: SpecialKeys::released(),
        }
    }
}

/// キーパッドの押下状態
#[derive(Debug, Clone, Default)]
pub struct Keypad {
    inputs: RowInputs,
}

impl Keypad {
    pub fn new() -> Self {
        Self::default()
    }

    /// キーを押す
    pub fn press(&mut self, key: KimKey) {
        self.set_key(key, true);
    }

    /// キーを離す
    pub fn release(&mut self, key: KimKey) {
        self.set_key(key, false);
    }

    /// 全キーを離す（SSスイッチは保持）
    pub fn release_all(&mut self) {
        let run = self.inputs.special.contains(SpecialKeys::SS);
        self.inputs = RowInputs::default();
        self.inputs.special.set(SpecialKeys::SS, run);
    }

    /// SSTスライドスイッチ（true = シングルステップ）
    pub fn set_single_step(&mut self, single_step: bool) {
        self.inputs.special.set(SpecialKeys::SS, !single_step);
    }

    fn set_key(&mut self, key: KimKey, pressed: bool) {
        match key {
            KimKey::St => self.inputs.special.set(SpecialKeys::ST, !pressed),
            KimKey::Rs => self.inputs.special.set(SpecialKeys::RS, !pressed),
            _ => {
                if let Some((row, mask)) = key.matrix_position() {
                    if pressed {
                        self.inputs.rows[row] &= !mask;
                    } else {
                        self.inputs.rows[row] |= mask;
                    }
                }
            }
        }
    }

    /// 現在の入力マスク
    pub fn row_inputs(&self) -> RowInputs {
        self.inputs
    }
}
