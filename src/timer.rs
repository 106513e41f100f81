//! CPUサイクルから周期ティックを導出するタイマー
//!
//! n回目のティックは `n * clock_hz / rate_hz` サイクル目に発火する。
//! 整数演算のみなので長時間動かしても誤差が累積しない。

/// CPUクロック (1 MHz)
pub const CPU_CLOCK_HZ: u64 = 1_000_000;

/// LED残光タイマーの周期 (Hz)
pub const LED_RATE_HZ: u64 = 60;

/// カセット入力サンプリングの周期 (Hz)
pub const CASSETTE_RATE_HZ: u64 = 44100;

/// 周期タイマー
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicTimer {
    clock_hz: u64,
    rate_hz: u64,
    /// 発火済みティック数
    pub fired: u64,
}

impl PeriodicTimer {
    pub fn new(clock_hz: u64, rate_hz: u64) -> Self {
        PeriodicTimer {
            clock_hz: clock_hz.max(1),
            rate_hz: rate_hz.max(1),
            fired: 0,
        }
    }

    /// 次のティックが発火するサイクル
    pub fn next_due(&self) -> u64 {
        let n = (self.fired + 1) as u128;
        (n * self.clock_hz as u128 / self.rate_hz as u128) as u64
    }

    /// `cycles` までに期限が来ていれば1ティック消費してtrue
    pub fn take_due(&mut self, cycles: u64) -> bool {
        if self.next_due() <= cycles {
            self.fired += 1;
            true
        } else {
            false
        }
    }
}
