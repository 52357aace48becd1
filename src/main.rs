use std::error::Error;
use std::path::Path;
use std::time::Duration;

use clap::{Arg, ArgAction, Command};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use sitewatch::logging::{LogConfig, LogOutput, init_logging, parse_log_level};
use sitewatch::models::ISensor;
use sitewatch::models::threat::threat_count;
use sitewatch::runner::{ControlCommand, SimulationSnapshot, run_realtime};
use sitewatch::scenario::ScenarioConfig;
use sitewatch::simulation::SimulationEngine;

/// 実行時オプション
struct RunOptions {
    info_only: bool,
    verbose_level: u8,
    realtime: bool,
    camera: Option<String>,
    report: Option<String>,
}

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("sitewatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("サイト監視シミュレーション (Site Watch Simulation)")
        .long_about(
            "カメラ可視範囲と人物エージェントのシミュレーションシステム\n\
             建物・道路・カメラからなるサイトで、どの人物がどのカメラに見えているかを\n\
             時間駆動で追跡し、検知イベントを記録します。",
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定"),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: デバッグ)"),
        )
        .arg(
            Arg::new("realtime")
                .long("realtime")
                .action(ArgAction::SetTrue)
                .conflicts_with("info")
                .help("時間刻みごとに実時間で待機しながら実行"),
        )
        .arg(
            Arg::new("camera")
                .long("camera")
                .value_name("ID")
                .help("表示用に選択するカメラID"),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .value_name("FILE")
                .help("終了時のレポートをYAMLで書き出す"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .default_value("logs")
                .help("ログファイルの出力ディレクトリ"),
        )
        .get_matches();

    println!(
        "サイト監視シミュレーション (Site Watch Simulation) - sitewatch v{}",
        env!("CARGO_PKG_VERSION")
    );
    println!();

    let output = match matches
        .get_one::<String>("log-output")
        .map(|s| s.parse::<LogOutput>())
        .unwrap_or(Ok(LogOutput::Console))
    {
        Ok(output) => output,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    };
    let log_config = LogConfig {
        level: parse_log_level(
            matches
                .get_one::<String>("log-level")
                .map_or("info", String::as_str),
        ),
        output,
        log_dir: matches
            .get_one::<String>("log-dir")
            .cloned()
            .unwrap_or_else(|| "logs".to_string()),
        ..LogConfig::default()
    };
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    };

    let options = RunOptions {
        info_only: matches.get_flag("info"),
        verbose_level: matches.get_count("verbose"),
        realtime: matches.get_flag("realtime"),
        camera: matches.get_one::<String>("camera").cloned(),
        report: matches.get_one::<String>("report").cloned(),
    };
    if options.verbose_level > 0 {
        println!("詳細出力レベル: {}", options.verbose_level);
    }

    if let Some(scenario_path) = matches.get_one::<String>("scenario") {
        match run_scenario(scenario_path, &options) {
            Ok(_) => {
                if options.verbose_level > 0 {
                    println!("シナリオ実行が正常に完了しました。");
                }
            }
            Err(e) => {
                eprintln!("エラー: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        show_default_help();
    }
}

/// シナリオファイルを読み込んで実行
fn run_scenario(scenario_path: &str, options: &RunOptions) -> Result<(), Box<dyn Error>> {
    let scenario = ScenarioConfig::from_file(scenario_path)?;

    if options.verbose_level > 0 {
        println!("シナリオファイル読み込み完了: {}", scenario_path);
    }

    if options.info_only {
        scenario.print_summary();
        return Ok(());
    }

    scenario.print_summary();
    println!();

    let mut engine = SimulationEngine::new(scenario, options.verbose_level);
    engine.initialize()?;
    if options.camera.is_some() {
        engine.select_camera(options.camera.clone());
    }

    let engine = if options.realtime {
        run_paced(engine)?
    } else {
        engine.run();
        engine
    };

    print_results(&engine);

    if let Some(path) = &options.report {
        engine.write_report(path)?;
        println!("レポート: {}", path);
    }

    Ok(())
}

/// 実時間ペースで実行（Ctrl-C で停止）
fn run_paced(engine: SimulationEngine) -> Result<SimulationEngine, Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let tick = Duration::from_secs_f64(engine.config.sim.dt_s);

    let engine = runtime.block_on(async move {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, mut snapshot_rx) = watch::channel(SimulationSnapshot::default());

        let interrupt_tx = command_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("割り込みを受信しました。停止します");
                let _ = interrupt_tx.send(ControlCommand::Stop).await;
            }
        });

        tokio::spawn(async move {
            let mut reported = 0;
            while snapshot_rx.changed().await.is_ok() {
                let snapshot = snapshot_rx.borrow_and_update().clone();
                if snapshot.step_count % 50 == 0 && snapshot.step_count != reported {
                    reported = snapshot.step_count;
                    info!(
                        "時刻: {:.1}秒, 可視: {}人, 直近の検知: {}件",
                        snapshot.time,
                        snapshot.agents.iter().filter(|a| a.is_visible).count(),
                        snapshot.recent_detections.len()
                    );
                }
            }
        });

        let engine = run_realtime(engine, command_rx, snapshot_tx, tick, None).await;
        drop(command_tx);
        engine
    });

    Ok(engine)
}

/// 結果の概要を表示
fn print_results(engine: &SimulationEngine) {
    let stats = engine.detection_log().stats();
    println!();
    println!("=== 実行結果 ===");
    println!("経過時間: {:.1}秒 ({}ステップ)", engine.state.time, engine.state.step_count);
    println!(
        "エージェント: {}人 (脅威: {}人)",
        engine.agents().len(),
        threat_count(engine.agents())
    );
    println!(
        "検知イベント: {}件 (脅威: {}件, 道路: {}件, 室内: {}件)",
        stats.total, stats.threats, stats.road, stats.room
    );
    for event in engine.detection_log().latest(10) {
        println!(
            "  [{:>7.2}秒] {} {} ({}){}",
            event.timestamp,
            event.id,
            event.agent_id,
            event.locomotion_class,
            if event.is_threat { " 脅威" } else { "" }
        );
    }
    if let Some(camera) = engine.active_camera_pose() {
        let position = camera.get_sensor_position();
        let forward = camera.forward();
        println!(
            "選択カメラ: {} (位置: {:.1}, {:.1}, {:.1} / 視線: {:.2}, {:.2}, {:.2})",
            camera.get_sensor_id(),
            position.x,
            position.y,
            position.z,
            forward.x,
            forward.y,
            forward.z
        );
    }
}

/// デフォルトヘルプとシナリオ一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  sitewatch [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>     シナリオファイルを指定して実行");
    println!("  -i, --info                シナリオ情報のみ表示");
    println!("  -v, --verbose             詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --realtime            実時間ペースで実行");
    println!("      --camera <ID>         表示用カメラを選択");
    println!("      --report <FILE>       終了時レポートをYAMLで出力");
    println!("      --log-output <TARGET> ログ出力先 (console, file, both)");
    println!("      --log-level <LEVEL>   ログレベル");
    println!("      --log-dir <DIR>       ログディレクトリ");
    println!("  -h, --help                このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    let dir = Path::new("scenarios");
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            let mut files: Vec<_> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "yaml"))
                .collect();
            files.sort();
            for file in files {
                println!("  {}", file.display());
            }
        }
        Err(_) => println!("  (scenarios ディレクトリが見つかりません)"),
    }
    println!();
    println!("例:");
    println!("  sitewatch -s scenarios/sunset_valley.yaml");
    println!("  sitewatch -s scenarios/sunset_valley.yaml -v --report report.yaml");
    println!("  sitewatch -s scenarios/sunset_valley.yaml --realtime --camera tower-1");
    println!("  sitewatch -s scenarios/line_of_sight.yaml -i");
}
