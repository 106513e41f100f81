//! ビデオRAMとモノクロ表示
//!
//! バスの $4000-$5FFF をそのまま平坦なバッファとして扱う。
//! 描画は1バイト = 横8ピクセル（MSBが左）。

/// 画面サイズ
pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 200;

/// 1ラインあたりのバイト数
pub const BYTES_PER_ROW: usize = SCREEN_WIDTH / 8;

/// ビデオRAMのサイズ（バスウィンドウ全体）
pub const VIDEO_RAM_SIZE: usize = 0x2000;

/// 表示色
pub const PIXEL_ON: u32 = 0xFFFFFF;
pub const PIXEL_OFF: u32 = 0x000000;

/// 描画範囲（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRect {
    pub min_x: usize,
    pub max_x: usize,
    pub min_y: usize,
    pub max_y: usize,
}

impl ClipRect {
    /// 画面全体
    pub fn full() -> Self {
        ClipRect {
            min_x: 0,
            max_x: SCREEN_WIDTH - 1,
            min_y: 0,
            max_y: SCREEN_HEIGHT - 1,
        }
    }
}

/// ビデオRAM
#[derive(Debug, Clone)]
pub struct VideoRam {
    data: Vec<u8>,
    /// 上下反転（false の場合はバッファの末尾行が画面の上端）
    pub flip_screen: bool,
}

impl Default for VideoRam {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoRam {
    pub fn new() -> Self {
        VideoRam {
            data: vec![0; VIDEO_RAM_SIZE],
            flip_screen: false,
        }
    }

    /// オフセット位置に書き込む（範囲外は無視）
    pub fn write(&mut self, offset: usize, value: u8) {
        match self.data.get_mut(offset) {
            Some(byte) => *byte = value,
            None => log::warn!("Video RAM write out of range: {:#06X}", offset),
        }
    }

    /// オフセット位置を読む（範囲外は$FF）
    pub fn read(&self, offset: usize) -> u8 {
        match self.data.get(offset) {
            Some(&byte) => byte,
            None => {
                log::warn!("Video RAM read out of range: {:#06X}", offset);
                0xFF
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// バッファ全体を置き換える（サイズ不一致はエラー）
    pub fn load(&mut self, data: &[u8]) -> Result<(), &'static str> {
        if data.len() != self.data.len() {
            return Err("Video RAM size mismatch");
        }
        self.data.copy_from_slice(data);
        Ok(())
    }

    /// フレームバッファ（SCREEN_WIDTH x SCREEN_HEIGHT）に描画
    pub fn render(&self, framebuffer: &mut [u32], clip: ClipRect) {
        let max_y = clip.max_y.min(SCREEN_HEIGHT - 1);
        let max_x = clip.max_x.min(SCREEN_WIDTH - 1);

        for y in clip.min_y..=max_y {
            let effy = if self.flip_screen {
                y & 0xFF
            } else {
                (SCREEN_HEIGHT - 1 - y) & 0xFF
            };
            let src = effy * BYTES_PER_ROW;
            let dst_row = y * SCREEN_WIDTH;

            for x in (clip.min_x & !7..=max_x).step_by(8) {
                let pix = self.data.get(src + x / 8).copied().unwrap_or(0);
                for bit in 0..8 {
                    let Some(dst) = framebuffer.get_mut(dst_row + x + bit) else {
                        return;
                    };
                    *dst = if pix & (0x80 >> bit) != 0 { PIXEL_ON } else { PIXEL_OFF };
                }
            }
        }
    }
}
