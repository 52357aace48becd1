//! # Logging モジュール
//!
//! サイト監視シミュレーションのログ管理機能を提供します。
//!
//! tracing-appender による非同期ファイル出力と、コンソール出力を組み合わせます。
//! ファイル出力は JSON 形式で、検知イベントの構造化フィールド（event, agent, class, time）を
//! そのまま後処理できます。
//!
//! ## 設定可能な出力先
//!
//! - `Console`: コンソールのみ
//! - `File`: ファイルのみ（logs/sitewatch.log.YYYY-MM-DD）
//! - `Both`: コンソールとファイルの両方

use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// ログ出力先の設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogOutput {
    /// コンソールのみ
    Console,
    /// ファイルのみ
    File,
    /// コンソールとファイルの両方
    Both,
}

impl LogOutput {
    fn writes_console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn writes_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(format!("無効な出力先: {}. 利用可能: console, file, both", s)),
        }
    }
}

/// ログ設定構造体
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル（環境変数 RUST_LOG が優先）
    pub level: Level,
    pub output: LogOutput,
    /// ログファイルのディレクトリ（File または Both の場合）
    pub log_dir: String,
    /// ログファイル名のプレフィックス
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            log_dir: "logs".to_string(),
            file_prefix: "sitewatch".to_string(),
        }
    }
}

/// ログ初期化エラー
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("ログディレクトリを作成できません {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ログシステムの初期化に失敗: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// ログシステムを初期化
///
/// ファイル出力を行う場合は非同期書き込み用のガードを返します。
/// ガードを破棄すると未書き込みのログが失われるため、呼び出し側は
/// プログラム終了まで保持してください。
///
/// ```no_run
/// use sitewatch::logging::{LogConfig, LogOutput, init_logging};
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     output: LogOutput::Both,
///     ..LogConfig::default()
/// };
///
/// let _guard = init_logging(&config).expect("ログ初期化に失敗");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = config.output.writes_console().then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
    });

    let (file_layer, guard) = if config.output.writes_file() {
        ensure_log_directory(&config.log_dir)?;
        let file_appender = rolling::daily(&config.log_dir, &config.file_prefix);
        let (writer, guard) = non_blocking(file_appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .json();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

/// ログレベルを文字列から解析
///
/// 無効な文字列の場合は警告を出して INFO を返します。
pub fn parse_log_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!("警告: 無効なログレベル '{}'. INFOを使用します", level_str);
            Level::INFO
        }
    }
}

/// ログディレクトリを作成
pub fn ensure_log_directory(log_dir: &str) -> Result<(), LoggingError> {
    if Path::new(log_dir).is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(log_dir).map_err(|source| LoggingError::Directory {
        path: log_dir.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_output_from_str() {
        assert_eq!(LogOutput::from_str("console"), Ok(LogOutput::Console));
        assert_eq!(LogOutput::from_str("FILE"), Ok(LogOutput::File));
        assert_eq!(LogOutput::from_str("all"), Ok(LogOutput::Both));
        assert!(LogOutput::from_str("syslog").is_err());
    }

    #[test]
    fn test_output_targets() {
        assert!(LogOutput::Both.writes_console() && LogOutput::Both.writes_file());
        assert!(!LogOutput::Console.writes_file());
        assert!(!LogOutput::File.writes_console());
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug"), Level::DEBUG);
        assert_eq!(parse_log_level("WARN"), Level::WARN);
        assert_eq!(parse_log_level("invalid"), Level::INFO);
    }

    #[test]
    fn test_ensure_log_directory_creates_nested() {
        let dir = std::env::temp_dir().join(format!("sitewatch-log-test-{}", std::process::id()));
        let nested = dir.join("a/b");
        let nested_str = nested.to_string_lossy().to_string();
        ensure_log_directory(&nested_str).unwrap();
        assert!(nested.is_dir());
        ensure_log_directory(&nested_str).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
