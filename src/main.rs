//! KIM1RS - KIM-1 peripheral emulator
//!
//! Version 0.1
//!
//! KIM-1 の周辺回路をヘッドレスで動かすフロントエンド。
//!
//! # 機能
//! - WAVテープをトーン判別器に通してPB7の変化を集計
//! - バイト列をKIM-1形式のトーン列としてWAVに録音
//! - ビデオRAMダンプをPNGに描画
//! - セーブステートの読み書き
//!
//! # 使用方法
//! ```text
//! kim1rs --tape program.wav
//! kim1rs --record out.wav --pattern "A9 00 8D"
//! kim1rs --vram screen.bin --screenshot screen.png
//! ```

use kim1rs::bus::MemoryBus;
use kim1rs::config::Config;
use kim1rs::kim1::{Kim1, VIDEO_BASE};
use kim1rs::savestate::SaveState;
use kim1rs::tape::TapeDeck;
use kim1rs::trace_log;
use kim1rs::video::{ClipRect, SCREEN_HEIGHT, SCREEN_WIDTH, VIDEO_RAM_SIZE};

use clap::Parser;
use std::fs;
use std::path::Path;

/// 高トーン（~3700Hz）の半周期（サイクル）と半波数（9周期）
const HIGH_HALF_PERIOD: u64 = 135;
const HIGH_HALF_COUNT: usize = 18;

/// 低トーン（~2400Hz）の半周期（サイクル）と半波数（6周期）
const LOW_HALF_PERIOD: u64 = 208;
const LOW_HALF_COUNT: usize = 12;

/// テープ解析時のポーリング間隔（サイクル）
const POLL_CYCLES: u64 = 10;

/// KIM1RS - KIM-1 peripheral emulator
#[derive(Parser, Debug)]
#[command(name = "kim1rs")]
#[command(author = "KIM1RS Project")]
#[command(version = "0.1.0")]
#[command(about = "KIM1RS - KIM-1 keypad, LED and cassette emulator", long_about = None)]
struct Args {
    /// 設定ファイル（省略時は実行ファイルと同じディレクトリの kim1_config.json）
    #[arg(short, long)]
    config: Option<String>,

    /// 再生して解析するテープ（WAV）
    #[arg(short, long)]
    tape: Option<String>,

    /// 録音先テープ（WAV）
    #[arg(long)]
    record: Option<String>,

    /// 録音するバイト列（16進、空白区切り）
    #[arg(long, default_value = "")]
    pattern: String,

    /// ビデオRAMダンプ（最大8KB）
    #[arg(long)]
    vram: Option<String>,

    /// スクリーンショットの出力先（PNG）
    #[arg(long)]
    screenshot: Option<String>,

    /// 画面を上下反転
    #[arg(long)]
    flip: bool,

    /// トレースカテゴリ: none, port, tape, led, bus, all
    /// 複数指定可: port+tape
    #[arg(long)]
    trace: Option<String>,

    /// 開始前に読み込むセーブステート
    #[arg(long)]
    load_state: Option<String>,

    /// 終了時に書き出すセーブステート
    #[arg(long)]
    save_state: Option<String>,
}

/// スクリーンショットをPNGで保存
fn save_screenshot(filename: &Path, fb: &[u32], width: usize, height: usize) -> Result<(), Box<dyn std::error::Error>> {
    let file = std::fs::File::create(filename)?;
    let w = std::io::BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, width as u32, height as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder.write_header()?;

    let mut rgb_data = Vec::with_capacity(width * height * 3);
    for pixel in fb.iter() {
        rgb_data.push(((pixel >> 16) & 0xFF) as u8);
        rgb_data.push(((pixel >> 8) & 0xFF) as u8);
        rgb_data.push((pixel & 0xFF) as u8);
    }

    writer.write_image_data(&rgb_data)?;
    Ok(())
}

/// 出力先の親ディレクトリを作成（失敗は警告のみ）
fn ensure_parent_dir(path: &Path) {
    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            log::warn!("Failed to create directory {:?}: {}", dir, e);
        }
    }
}

/// "A9 00 8D" 形式のバイト列をパース
fn parse_pattern(s: &str) -> Result<Vec<u8>, String> {
    s.split_whitespace()
        .map(|part| u8::from_str_radix(part, 16).map_err(|e| format!("Bad byte {:?}: {}", part, e)))
        .collect()
}

/// ビデオRAMダンプをバス経由で書き込む
fn load_vram(kim: &mut Kim1<TapeDeck>, path: &str) -> Result<(), String> {
    let data = fs::read(path).map_err(|e| format!("Failed to read video RAM dump {}: {}", path, e))?;
    if data.len() > VIDEO_RAM_SIZE {
        return Err(format!("Video RAM dump is {} bytes, limit is {}", data.len(), VIDEO_RAM_SIZE));
    }
    for (i, &byte) in data.iter().enumerate() {
        kim.write(VIDEO_BASE + i as u16, byte);
    }
    log::info!("Loaded {} bytes of video RAM from {}", data.len(), path);
    Ok(())
}

/// テープ解析の結果
#[derive(Debug)]
struct TapeReport {
    /// 再生時間（秒）
    elapsed: f64,
    /// PB7の変化回数
    edges: u64,
    /// 高トーン判別中だった割合 (%)
    high_tone_percent: f64,
}

/// テープを最後まで再生し、PB7の変化を集計
fn inspect_tape(kim: &mut Kim1<TapeDeck>) -> TapeReport {
    // PB5を落として入力を有効化
    let port_b = kim.port_b & !0x20;
    kim.write_port_b(port_b);
    let time = kim.time();
    kim.cassette.play(time);

    let start_time = time;
    let start_cycles = kim.cycles;
    let mut cycles = kim.cycles;
    let mut last_pb7 = kim.read_port_b() & 0x80;
    let mut edges = 0u64;
    let mut high_tone_cycles = 0u64;

    while !kim.cassette.at_end(kim.time()) {
        cycles += POLL_CYCLES;
        kim.run_timers(cycles);

        let pb7 = kim.read_port_b() & 0x80;
        if pb7 == 0 {
            high_tone_cycles += POLL_CYCLES;
        }
        if pb7 != last_pb7 {
            edges += 1;
            last_pb7 = pb7;
        }
    }

    let polled = (cycles - start_cycles).max(1);
    let report = TapeReport {
        elapsed: kim.time() - start_time,
        edges,
        high_tone_percent: high_tone_cycles as f64 * 100.0 / polled as f64,
    };
    log::info!(
        "Tape played: {:.2}s at {} Hz, {} PB7 edges, high tone {:.1}% of the time",
        report.elapsed,
        kim.cassette.sample_rate(),
        report.edges,
        report.high_tone_percent
    );
    report
}

/// 1トーン分の半波を出力
fn emit_tone(kim: &mut Kim1<TapeDeck>, half_period: u64, halves: usize) {
    for _ in 0..halves {
        let cycles = kim.cycles + half_period;
        kim.run_timers(cycles);
        let toggled = (kim.port_b ^ 0x80) | 0x20;
        kim.write_port_b(toggled);
    }
}

/// バイト列をトーン列として録音（LSBから、1ビット = 高・中・低）
fn record_pattern(kim: &mut Kim1<TapeDeck>, bytes: &[u8]) {
    let time = kim.time();
    kim.cassette.record(time);
    let port_b = kim.port_b | 0x20;
    kim.write_port_b(port_b);

    for &byte in bytes {
        for bit in 0..8 {
            let one = (byte >> bit) & 1 != 0;
            emit_tone(kim, HIGH_HALF_PERIOD, HIGH_HALF_COUNT);
            if one {
                emit_tone(kim, LOW_HALF_PERIOD, LOW_HALF_COUNT);
            } else {
                emit_tone(kim, HIGH_HALF_PERIOD, HIGH_HALF_COUNT);
            }
            emit_tone(kim, LOW_HALF_PERIOD, LOW_HALF_COUNT);
        }
    }

    let time = kim.time();
    kim.cassette.stop(time);
    log::info!("Recorded {} bytes ({:.2}s of tape)", bytes.len(), kim.cassette.duration());
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    // 設定を読み込む
    let (mut config, config_path) = Config::load_with_options(args.config.as_deref());
    log::debug!("Using config {:?}", config_path);
    if args.flip {
        config.flip_screen = true;
    }

    // トレースレベルを設定
    let trace = args.trace.clone().unwrap_or_else(|| config.trace.clone());
    trace_log::set_trace_level(trace_log::parse_trace_level(&trace));

    // バナー表示
    println!("KIM1RS - KIM-1 peripheral emulator v0.1");

    // テープをロード
    let deck = match &args.tape {
        Some(name) => {
            let path = config.tape_path(name);
            match TapeDeck::load_wav(&path) {
                Ok(deck) => {
                    // コマンドラインの上書きは保存しない
                    let mut saved = Config::load_from(&config_path);
                    saved.last_tape = Some(path.to_string_lossy().into_owned());
                    config.last_tape = saved.last_tape.clone();
                    if let Err(e) = saved.save_to(&config_path) {
                        log::warn!("{}", e);
                    }
                    deck
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        None => TapeDeck::new(),
    };

    let mut kim = Kim1::with_config(deck, &config);
    kim.reset();

    if let Some(name) = &args.load_state {
        let path = config.save_path(name);
        let restored = SaveState::read_from(&path)
            .and_then(|state| kim.load_state(&state).map_err(String::from));
        match restored {
            Ok(()) => log::info!("Loaded save state: {:?}", path),
            Err(e) => {
                eprintln!("Failed to load save state: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Some(path) = &args.vram {
        if let Err(e) = load_vram(&mut kim, path) {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    if args.tape.is_some() {
        inspect_tape(&mut kim);
    }

    if let Some(name) = &args.record {
        let bytes = match parse_pattern(&args.pattern) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        };
        record_pattern(&mut kim, &bytes);

        let path = config.tape_path(name);
        ensure_parent_dir(&path);
        match kim.cassette.save_wav(&path) {
            Ok(()) => log::info!("Saved tape: {:?}", path),
            Err(e) => eprintln!("{}", e),
        }
    }

    if let Some(name) = &args.screenshot {
        let path = config.screenshot_path(name);
        ensure_parent_dir(&path);
        let mut fb = vec![0u32; SCREEN_WIDTH * SCREEN_HEIGHT];
        kim.render(&mut fb, ClipRect::full());
        match save_screenshot(&path, &fb, SCREEN_WIDTH, SCREEN_HEIGHT) {
            Ok(()) => log::info!("Saved screenshot: {:?}", path),
            Err(e) => eprintln!("Failed to save screenshot {:?}: {}", path, e),
        }
    }

    log::info!("LED [{}]", kim.display.text());

    if let Some(name) = &args.save_state {
        let path = config.save_path(name);
        ensure_parent_dir(&path);
        match kim.save_state().write_to(&path) {
            Ok(()) => log::info!("Saved state: {:?}", path),
            Err(e) => eprintln!("{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pattern() {
        assert_eq!(parse_pattern("A9 00 8d"), Ok(vec![0xA9, 0x00, 0x8D]));
        assert_eq!(parse_pattern(""), Ok(vec![]));
        assert!(parse_pattern("G1").is_err());
    }

    #[test]
    fn test_ensure_parent_dir_creates_nested() {
        let root = std::env::temp_dir().join(format!("kim1rs_dirs_{}", std::process::id()));
        let file = root.join("a").join("b").join("shot.png");
        ensure_parent_dir(&file);
        assert!(root.join("a").join("b").is_dir());
        // 親のないパスでも何もしない
        ensure_parent_dir(Path::new(""));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_inspect_tape_uses_configured_clock() {
        // 0.5秒分の高トーン
        let mut samples = Vec::new();
        for _ in 0..(44100 / 6 / 2) {
            samples.extend([0.8, 0.8, 0.8, -0.8, -0.8, -0.8]);
        }
        let duration = samples.len() as f64 / 44100.0;
        let config = Config { clock_hz: 2_000_000, ..Config::default() };
        let mut kim = Kim1::with_config(TapeDeck::from_samples(samples, 44100), &config);

        let report = inspect_tape(&mut kim);
        assert!((report.elapsed - duration).abs() < 0.001);
        assert!(report.edges > 0);
        assert!(report.high_tone_percent > 90.0);
    }

    #[test]
    fn test_recorded_pattern_decodes_as_tones() {
        let mut kim = Kim1::new();
        record_pattern(&mut kim, &[0x01]);
        let samples = kim.cassette.samples().to_vec();
        assert!(!samples.is_empty());

        // 録音したテープを再生すると高トーン・低トーンの両方が判別される
        let mut kim = Kim1::with_config(TapeDeck::from_samples(samples, 44100), &Config::default());
        kim.cassette.play(0.0);
        let mut seen_one = false;
        let mut seen_zero = false;
        let mut cycles = 0;
        while !kim.cassette.at_end(kim.time()) {
            cycles += POLL_CYCLES;
            kim.run_timers(cycles);
            if kim.decoder.high_count == 0 {
                if kim.decoder.bit() {
                    seen_one = true;
                } else if cycles > 1000 {
                    seen_zero = true;
                }
            }
        }
        assert!(seen_one);
        assert!(seen_zero);
    }
}
