//! カセットデッキ（WAVテープイメージ）
//!
//! 再生はエミュレーション時間からサンプル位置を求めて瞬時値を返す。
//! 録音は出力レベルをステップ波形としてデッキのサンプルレートで記録する。

use crate::cassette::CassetteTransport;
use std::path::Path;

/// 録音時のデフォルトサンプルレート (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// デッキの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeState {
    Stopped,
    Playing,
    Recording,
}

/// カセットデッキ
#[derive(Debug, Clone)]
pub struct TapeDeck {
    /// モノラルサンプル (-1.0 〜 +1.0)
    samples: Vec<f32>,
    sample_rate: u32,
    state: TapeState,
    /// 再生/録音を開始したエミュレーション時間
    start_time: f64,
    /// 録音中の現在レベル
    record_level: f32,
}

impl Default for TapeDeck {
    fn default() -> Self {
        Self::new()
    }
}

impl TapeDeck {
    /// 空のテープ（停止状態）
    pub fn new() -> Self {
        Self::from_samples(Vec::new(), DEFAULT_SAMPLE_RATE)
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        TapeDeck {
            samples,
            sample_rate: sample_rate.max(1),
            state: TapeState::Stopped,
            start_time: 0.0,
            record_level: 0.0,
        }
    }

    /// WAVファイルを読み込む（先頭チャンネルのみ使用）
    pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let mut reader = hound::WavReader::open(&path)
            .map_err(|e| format!("Failed to open tape {:?}: {}", path.as_ref(), e))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| format!("Failed to read tape samples: {}", e))?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| format!("Failed to read tape samples: {}", e))?
            }
        };

        let samples = interleaved.into_iter().step_by(channels).collect::<Vec<_>>();
        log::info!(
            "Loaded tape {:?}: {} samples at {} Hz ({:.1}s)",
            path.as_ref(),
            samples.len(),
            spec.sample_rate,
            samples.len() as f64 / spec.sample_rate.max(1) as f64
        );
        Ok(Self::from_samples(samples, spec.sample_rate))
    }

    /// 16bitモノラルWAVとして保存
    pub fn save_wav<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| format!("Failed to create tape {:?}: {}", path.as_ref(), e))?;
        for &sample in &self.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * f32::from(i16::MAX)) as i16)
                .map_err(|e| format!("Failed to write tape: {}", e))?;
        }
        writer
            .finalize()
            .map_err(|e| format!("Failed to finalize tape: {}", e))?;
        Ok(())
    }

    /// 指定時刻から再生開始
    pub fn play(&mut self, time: f64) {
        self.state = TapeState::Playing;
        self.start_time = time;
    }

    /// 指定時刻から録音開始（既存の内容は破棄）
    pub fn record(&mut self, time: f64) {
        self.state = TapeState::Recording;
        self.start_time = time;
        self.samples.clear();
        self.record_level = 0.0;
    }

    /// 停止（録音中なら指定時刻まで現在レベルを書き足す）
    pub fn stop(&mut self, time: f64) {
        if self.state == TapeState::Recording {
            self.fill_to(time);
        }
        self.state = TapeState::Stopped;
    }

    pub fn state(&self) -> TapeState {
        self.state
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// テープの長さ（秒）
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// 再生位置が末尾を過ぎたか
    pub fn at_end(&self, time: f64) -> bool {
        self.state != TapeState::Playing || self.position(time) >= self.samples.len()
    }

    fn position(&self, time: f64) -> usize {
        let elapsed = (time - self.start_time).max(0.0);
        (elapsed * self.sample_rate as f64) as usize
    }

    fn fill_to(&mut self, time: f64) {
        let end = self.position(time);
        if end > self.samples.len() {
            self.samples.resize(end, self.record_level);
        }
    }
}

impl CassetteTransport for TapeDeck {
    fn input(&mut self, time: f64) -> f64 {
        match self.state {
            TapeState::Playing => {
                let pos = self.position(time);
                self.samples.get(pos).copied().unwrap_or(0.0) as f64
            }
            _ => 0.0,
        }
    }

    fn output(&mut self, time: f64, level: f64) {
        if self.state != TapeState::Recording {
            return;
        }
        self.fill_to(time);
        self.record_level = level as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_deck_is_silent() {
        let mut deck = TapeDeck::from_samples(vec![1.0; 100], 100);
        assert_eq!(deck.input(0.5), 0.0);
        deck.output(0.5, 1.0);
        assert_eq!(deck.samples().len(), 100);
    }

    #[test]
    fn test_playback_position() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
        let mut deck = TapeDeck::from_samples(samples, 10);
        deck.play(2.0);
        assert_eq!(deck.input(2.0), 0.0);
        assert!((deck.input(2.35) - 0.3).abs() < 1e-6);
        assert!(!deck.at_end(2.9));
        assert!(deck.at_end(3.0));
        assert_eq!(deck.input(5.0), 0.0);
    }

    #[test]
    fn test_record_step_waveform() {
        let mut deck = TapeDeck::from_samples(Vec::new(), 10);
        deck.record(1.0);
        deck.output(1.0, 1.0);
        deck.output(1.3, -1.0);
        deck.stop(1.5);

        assert_eq!(deck.state(), TapeState::Stopped);
        assert_eq!(deck.samples(), &[1.0, 1.0, 1.0, -1.0, -1.0]);
        assert!((deck.duration() - 0.5).abs() < 1e-9);
    }
}
