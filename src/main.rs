use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pose_align::align::{AlignmentCoordinator, Anchor, Key, KeyAction, KeyEvent, TracingDebugSink};
use pose_align::config::Config;
use pose_align::pose::{OnnxPoseLoader, Photo, PoseDetector};

#[derive(Parser, Debug)]
#[command(name = "pose-align", about = "Align an after photo onto a before photo by body pose")]
struct Args {
    /// Before photo
    before: PathBuf,
    /// After photo
    after: PathBuf,
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// Initial anchor (head, shoulders, hips, full)
    #[arg(short, long, default_value_t = Anchor::Full)]
    anchor: Anchor,
}

async fn load_photo(
    detector: &PoseDetector<OnnxPoseLoader>,
    id: &str,
    path: &Path,
) -> Result<Photo> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let (photo, image) = Photo::decode(id, bytes)?;
    match detector.detect(&image).await {
        Ok(landmarks) => {
            println!("{}: 姿勢を検出しました (可視性平均 {:.2})", id, landmarks.average_visibility());
            Ok(photo.with_landmarks(landmarks))
        }
        Err(e) => {
            println!("{}: {}", id, e);
            Ok(photo)
        }
    }
}

fn print_settings(coordinator: &AlignmentCoordinator) {
    let s = coordinator.settings();
    let flags = coordinator.display();
    println!(
        "anchor={} scale={:.3} offset=({:.1}, {:.1}) aligned={} landmarks={} grid={}",
        s.anchor(),
        s.scale(),
        s.offset_x(),
        s.offset_y(),
        coordinator.is_aligned(),
        flags.show_landmarks,
        flags.show_grid,
    );
}

/// "shift+left" のような入力をキーイベントにする
fn parse_key_event(input: &str) -> Option<KeyEvent> {
    let (modifier, key) = match input.strip_prefix("shift+") {
        Some(rest) => (true, rest),
        None => (false, input),
    };
    let event = KeyEvent::new(key.parse::<Key>().ok()?);
    Some(if modifier { event.with_modifier() } else { event })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(&args.config);
    let debounce = Duration::from_millis(config.alignment.debounce_ms);

    let detector = Arc::new(PoseDetector::new(OnnxPoseLoader::new(config.detector.clone())));
    let before = load_photo(&detector, "before", &args.before).await?;
    let after = load_photo(&detector, "after", &args.after).await?;

    let mut coordinator = AlignmentCoordinator::from_config(&config).with_debug_sink(Arc::new(TracingDebugSink));
    coordinator.set_before(before);
    coordinator.set_after(after);
    coordinator.set_anchor(args.anchor);
    let mut updates = coordinator.subscribe();

    println!("=== Pose Align ===");
    println!("コマンド:");
    println!("  up/down/left/right   - オフセット移動 (shift+ で10px)");
    println!("  + / -                - 拡大縮小 (shift+ で0.1)");
    println!("  a                    - 自動位置合わせ");
    println!("  r                    - リセット");
    println!("  l / g                - ランドマーク / グリッド表示切替");
    println!("  anchor <name>        - アンカー変更");
    println!("  s                    - 現在の値");
    println!("  q                    - 終了");
    println!();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();

        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "q" => {
                println!("終了します");
                break;
            }
            "s" => {
                print_settings(&coordinator);
                println!("can_align={}", coordinator.can_align());
                if let Some(overlay) = coordinator.landmark_overlay() {
                    println!("骨格線: before {} 本, after {} 本", overlay.before.len(), overlay.after.len());
                }
            }
            "anchor" if parts.len() == 2 => match parts[1].parse::<Anchor>() {
                Ok(anchor) => {
                    coordinator.set_anchor(anchor);
                    coordinator.request_auto_align();
                    println!("アンカー: {} (自動位置合わせを予約)", anchor);
                }
                Err(e) => println!("{}", e),
            },
            cmd => match parse_key_event(cmd) {
                Some(event) => {
                    updates.borrow_and_update();
                    match coordinator.handle_key(&event) {
                        Some(KeyAction::AutoAlign) => {
                            let changed =
                                tokio::time::timeout(debounce * 10, updates.changed()).await;
                            if changed.is_err() {
                                if let Some(e) = coordinator.last_error() {
                                    println!("{}", e);
                                }
                            }
                        }
                        Some(_) => {}
                        None => println!("不明なコマンド: {}", cmd),
                    }
                    print_settings(&coordinator);
                }
                None => println!("不明なコマンド: {}", cmd),
            },
        }
    }

    coordinator.shutdown();
    detector.close();
    Ok(())
}
