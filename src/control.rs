//! RS/STキーによるCPU制御ライン
//!
//! RSはRESET、STはNMIに直結されている。入力が変化したポーリングで
//! 即座にラインを駆動する（デバウンスなし、キューなし）。

bitflags::bitflags! {
    /// スペシャル入力マスク（アクティブLow）
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SpecialKeys: u8 {
        /// sw1: ST（NMI）
        const ST = 0x40;
        /// sw2: RS（RESET）
        const RS = 0x20;
        /// sw3: SS（1 = run, 0 = single step）
        const SS = 0x10;
    }
}

impl SpecialKeys {
    /// 全キー解放、SSはrun
    pub fn released() -> Self {
        SpecialKeys::ST | SpecialKeys::RS | SpecialKeys::SS
    }
}

/// CPUの入力ライン
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLine {
    Reset,
    Nmi,
}

/// ラインの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Assert,
    Clear,
}

/// 実行エンジン側が実装する制御ラインの受け口
pub trait CpuControl {
    fn set_input_line(&mut self, line: InputLine, state: LineState);
}

/// 制御ラインのエッジ検出
#[derive(Debug, Clone)]
pub struct LineControl {
    last: SpecialKeys,
}

impl Default for LineControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LineControl {
    pub fn new() -> Self {
        LineControl {
            last: SpecialKeys::released(),
        }
    }

    /// スペシャルマスクをポーリングし、変化したキーのラインを駆動
    pub fn poll<C: CpuControl + ?Sized>(&mut self, special: SpecialKeys, cpu: &mut C) {
        let changed = self.last ^ special;

        if changed.contains(SpecialKeys::ST) {
            cpu.set_input_line(InputLine::Nmi, line_state(special.contains(SpecialKeys::ST)));
        }
        if changed.contains(SpecialKeys::RS) {
            cpu.set_input_line(InputLine::Reset, line_state(special.contains(SpecialKeys::RS)));
        }

        self.last = special;
    }

    /// SSTスイッチがシングルステップ側か
    pub fn single_step(&self) -> bool {
        !self.last.contains(SpecialKeys::SS)
    }
}

/// 解放（ビット1）でClear、押下でAssert
fn line_state(released: bool) -> LineState {
    if released {
        LineState::Clear
    } else {
        LineState::Assert
    }
}
