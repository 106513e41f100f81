//! 設定ファイル管理モジュール
//!
//! タイマー周期・表示・ディレクトリ設定をJSON形式で永続化

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::timer::{CASSETTE_RATE_HZ, CPU_CLOCK_HZ, LED_RATE_HZ};

/// 設定ファイルのデフォルトファイル名
const CONFIG_FILENAME: &str = "kim1_config.json";

/// 実行ファイルのディレクトリを取得
pub fn get_exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 相対パスを指定されたベースディレクトリからの絶対パスに解決
pub fn resolve_path_with_base(base: &str, relative: &str) -> PathBuf {
    let path = Path::new(relative);
    if path.is_absolute() {
        path.to_path_buf()
    } else if base.is_empty() {
        get_exe_dir().join(relative)
    } else {
        let base_path = Path::new(base);
        if base_path.is_absolute() {
            base_path.join(relative)
        } else {
            get_exe_dir().join(base).join(relative)
        }
    }
}

/// 設定ファイルのパスを取得
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join(CONFIG_FILENAME)
}

/// エミュレータ設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// ホームディレクトリ（相対パスの基準）
    /// 空の場合は実行ファイルのディレクトリを使用
    #[serde(default)]
    pub kim1_home: String,
    /// CPUクロック (Hz)
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u64,
    /// LED残光タイマー (Hz)
    #[serde(default = "default_led_rate_hz")]
    pub led_rate_hz: u64,
    /// カセットサンプリング (Hz)
    /// 分類しきい値8サンプルはこの値が44100の前提
    #[serde(default = "default_cassette_rate_hz")]
    pub cassette_rate_hz: u64,
    /// 画面の上下反転
    #[serde(default)]
    pub flip_screen: bool,
    /// トレースカテゴリ（例: "port+tape"）
    #[serde(default = "default_trace")]
    pub trace: String,
    /// 最後に使用したテープのパス
    #[serde(default)]
    pub last_tape: Option<String>,
    /// テープイメージディレクトリ
    #[serde(default = "default_tape_dir")]
    pub tape_dir: String,
    /// スクリーンショットディレクトリ
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: String,
    /// セーブデータディレクトリ
    #[serde(default = "default_save_dir")]
    pub save_dir: String,
}

fn default_clock_hz() -> u64 { CPU_CLOCK_HZ }
fn default_led_rate_hz() -> u64 { LED_RATE_HZ }
fn default_cassette_rate_hz() -> u64 { CASSETTE_RATE_HZ }
fn default_trace() -> String { "none".to_string() }
fn default_tape_dir() -> String { "tapes".to_string() }
fn default_screenshot_dir() -> String { "screenshots".to_string() }
fn default_save_dir() -> String { "saves".to_string() }

impl Default for Config {
    fn default() -> Self {
        Config {
            kim1_home: String::new(),
            clock_hz: default_clock_hz(),
            led_rate_hz: default_led_rate_hz(),
            cassette_rate_hz: default_cassette_rate_hz(),
            flip_screen: false,
            trace: default_trace(),
            last_tape: None,
            tape_dir: default_tape_dir(),
            screenshot_dir: default_screenshot_dir(),
            save_dir: default_save_dir(),
        }
    }
}

impl Config {
    /// オプション指定で設定ファイルを読み込む
    /// config_path が指定されていればそれを、なければ実行ファイルディレクトリの
    /// kim1_config.json を使う
    pub fn load_with_options(config_path: Option<&str>) -> (Self, PathBuf) {
        let config_file_path = match config_path {
            Some(path) => PathBuf::from(path),
            None => get_config_path(),
        };
        let config = Self::load_from(&config_file_path);
        (config, config_file_path)
    }

    /// 指定したパスから設定を読み込む
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Failed to parse config {:?}: {}, using defaults", path.as_ref(), e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    /// 指定したパスに設定を保存する
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(path, json)
            .map_err(|e| format!("Failed to write config: {}", e))?;
        Ok(())
    }

    /// 相対パスをkim1_homeからの絶対パスに解決
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        resolve_path_with_base(&self.kim1_home, relative)
    }

    /// テープディレクトリの絶対パスを取得
    pub fn tape_dir_path(&self) -> PathBuf {
        self.resolve_path(&self.tape_dir)
    }

    /// スクリーンショットディレクトリの絶対パスを取得
    pub fn screenshot_dir_path(&self) -> PathBuf {
        self.resolve_path(&self.screenshot_dir)
    }

    /// セーブディレクトリの絶対パスを取得
    pub fn save_dir_path(&self) -> PathBuf {
        self.resolve_path(&self.save_dir)
    }

    /// テープファイル名を解決
    pub fn tape_path(&self, name: &str) -> PathBuf {
        locate_in(self.tape_dir_path(), name)
    }

    /// スクリーンショットファイル名を解決
    pub fn screenshot_path(&self, name: &str) -> PathBuf {
        locate_in(self.screenshot_dir_path(), name)
    }

    /// セーブファイル名を解決
    pub fn save_path(&self, name: &str) -> PathBuf {
        locate_in(self.save_dir_path(), name)
    }
}

/// ファイル名だけのパスはディレクトリの下に置く
/// （区切り文字を含むパスはそのまま）
fn locate_in(dir: PathBuf, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.components().count() > 1 || path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(name)
    }
}
