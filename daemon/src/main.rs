//! bwcat: copy a file or stdin to a file or stdout through bandwidth limiters.

use anyhow::Context;
use bwlimit_limiter::{LimiterConfig, ThrottleConfig, TrafficLimiters};
use bwlimit_stream::{AsyncThrottledReader, AsyncThrottledWriter, ThrottledReader, ThrottledWriter};
use bwlimit_utils::{format_bytes, format_duration, format_rate, init_logging, LogFormat};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

#[derive(Parser)]
#[command(name = "bwcat", about = "Throttled copy between files and pipes")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "BWCAT_CONFIG")]
    config: Option<PathBuf>,

    /// Short-term upload (write side) ceiling in bytes per second; 0 = unlimited.
    #[arg(long, env = "BWCAT_UPLOAD_RATE")]
    upload_rate: Option<i64>,

    /// Long-term upload average in bytes per second; 0 = disabled.
    #[arg(long, env = "BWCAT_UPLOAD_AVERAGE")]
    upload_average: Option<i64>,

    /// Short-term download (read side) ceiling in bytes per second; 0 = unlimited.
    #[arg(long, env = "BWCAT_DOWNLOAD_RATE")]
    download_rate: Option<i64>,

    /// Long-term download average in bytes per second; 0 = disabled.
    #[arg(long, env = "BWCAT_DOWNLOAD_AVERAGE")]
    download_average: Option<i64>,

    /// Draw reads and writes from one budget sized by the upload settings.
    #[arg(long, env = "BWCAT_SHARE_BUDGET")]
    share_budget: bool,

    /// Log format: "human" or "json".
    #[arg(long, env = "BWCAT_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "BWCAT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Copy INPUT to OUTPUT ("-" for stdin / stdout).
    Copy {
        #[arg(default_value = "-")]
        input: String,

        #[arg(default_value = "-")]
        output: String,

        /// Use blocking streams on a dedicated thread instead of async I/O.
        #[arg(long)]
        blocking: bool,

        /// Print both limiters' counters as JSON on stderr when done.
        #[arg(long)]
        stats_json: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn merge(cli: &Cli, base: ThrottleConfig) -> ThrottleConfig {
    ThrottleConfig {
        upload: LimiterConfig {
            short_term_bytes_per_sec: cli
                .upload_rate
                .unwrap_or(base.upload.short_term_bytes_per_sec),
            average_bytes_per_sec: cli
                .upload_average
                .unwrap_or(base.upload.average_bytes_per_sec),
        },
        download: LimiterConfig {
            short_term_bytes_per_sec: cli
                .download_rate
                .unwrap_or(base.download.short_term_bytes_per_sec),
            average_bytes_per_sec: cli
                .download_average
                .unwrap_or(base.download.average_bytes_per_sec),
        },
        share_budget: cli.share_budget || base.share_budget,
        log_format: cli.log_format.clone().unwrap_or(base.log_format),
        log_level: cli.log_level.clone().unwrap_or(base.log_level),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ThrottleConfig> {
    let base = match cli.config {
        Some(ref path) => ThrottleConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ThrottleConfig::default(),
    };
    let config = merge(cli, base);
    config.validate().context("invalid rate settings")?;
    Ok(config)
}

async fn open_input(input: &str) -> anyhow::Result<Box<dyn AsyncRead + Unpin + Send>> {
    if input == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("opening {input}"))?;
    Ok(Box::new(file))
}

async fn open_output(output: &str) -> anyhow::Result<Box<dyn AsyncWrite + Unpin + Send>> {
    if output == "-" {
        return Ok(Box::new(tokio::io::stdout()));
    }
    let file = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("creating {output}"))?;
    Ok(Box::new(file))
}

async fn copy_async(limiters: &TrafficLimiters, input: &str, output: &str) -> anyhow::Result<u64> {
    let mut reader =
        AsyncThrottledReader::with_limiter(open_input(input).await?, false, limiters.received.clone());
    let mut writer =
        AsyncThrottledWriter::with_limiter(open_output(output).await?, false, limiters.sent.clone());
    let copied = tokio::io::copy(&mut reader, &mut writer)
        .await
        .context("copy failed")?;
    writer.flush().await.context("flushing output")?;
    Ok(copied)
}

fn copy_blocking(limiters: &TrafficLimiters, input: &str, output: &str) -> anyhow::Result<u64> {
    use std::io::{Read, Write};

    let source: Box<dyn Read> = if input == "-" {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(std::fs::File::open(input).with_context(|| format!("opening {input}"))?)
    };
    let sink: Box<dyn Write> = if output == "-" {
        Box::new(std::io::stdout().lock())
    } else {
        Box::new(std::fs::File::create(output).with_context(|| format!("creating {output}"))?)
    };

    let mut reader = ThrottledReader::with_limiter(source, false, limiters.received.clone());
    let mut writer = ThrottledWriter::with_limiter(sink, false, limiters.sent.clone());
    let copied = std::io::copy(&mut reader, &mut writer).context("copy failed")?;
    writer.flush().context("flushing output")?;
    Ok(copied)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let log_format: LogFormat = config
        .log_format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    init_logging(log_format, &config.log_level);

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string());
        }
        Command::Copy {
            input,
            output,
            blocking,
            stats_json,
        } => {
            let limiters = TrafficLimiters::from_config(&config);
            tracing::info!(
                "bwcat {} -> {} (upload {}, download {}{})",
                input,
                output,
                format_rate(config.upload.short_term_bytes_per_sec),
                format_rate(config.download.short_term_bytes_per_sec),
                if limiters.is_shared() { ", shared budget" } else { "" },
            );

            let started = Instant::now();
            let copied = if blocking {
                let limiters = limiters.clone();
                tokio::task::spawn_blocking(move || copy_blocking(&limiters, &input, &output))
                    .await
                    .context("copy thread panicked")??
            } else {
                copy_async(&limiters, &input, &output).await?
            };
            let elapsed = started.elapsed();

            let copied_bytes = i64::try_from(copied).unwrap_or(i64::MAX);
            let secs = elapsed.as_secs_f64().max(0.001);
            tracing::info!(
                "copied {} in {} ({})",
                format_bytes(copied_bytes),
                format_duration(elapsed),
                format_rate((copied as f64 / secs) as i64),
            );

            if stats_json {
                let stats = serde_json::json!({
                    "copied_bytes": copied,
                    "elapsed_ms": elapsed.as_millis() as u64,
                    "sent": limiters.sent.stats(),
                    "received": limiters.received.stats(),
                });
                eprintln!("{}", serde_json::to_string_pretty(&stats)?);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn flags_override_file_settings() {
        let cli = parse(&["bwcat", "--upload-rate", "5000", "--log-level", "debug", "config"]);
        let base = ThrottleConfig {
            upload: LimiterConfig::new(1_000, 500),
            download: LimiterConfig::new(2_000, 0),
            ..ThrottleConfig::default()
        };

        let merged = merge(&cli, base);
        assert_eq!(merged.upload, LimiterConfig::new(5_000, 500));
        assert_eq!(merged.download, LimiterConfig::new(2_000, 0));
        assert_eq!(merged.log_level, "debug");
        assert_eq!(merged.log_format, "human");
    }

    #[test]
    fn share_budget_from_either_source() {
        let cli = parse(&["bwcat", "config"]);
        let base = ThrottleConfig {
            share_budget: true,
            ..ThrottleConfig::default()
        };
        assert!(merge(&cli, base).share_budget);

        let cli = parse(&["bwcat", "--share-budget", "config"]);
        assert!(merge(&cli, ThrottleConfig::default()).share_budget);
    }

    #[test]
    fn copy_defaults_to_stdio() {
        let cli = parse(&["bwcat", "copy"]);
        match cli.command {
            Command::Copy {
                input,
                output,
                blocking,
                stats_json,
            } => {
                assert_eq!(input, "-");
                assert_eq!(output, "-");
                assert!(!blocking);
                assert!(!stats_json);
            }
            Command::Config => panic!("expected copy"),
        }
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let cli = parse(&["bwcat", "--download-average", "500", "config"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn blocking_copy_moves_every_byte() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        std::fs::write(&input, vec![9u8; 4_096]).unwrap();

        let limiters = TrafficLimiters::from_config(&ThrottleConfig::default());
        let copied = copy_blocking(
            &limiters,
            input.to_str().unwrap(),
            output.to_str().unwrap(),
        )
        .unwrap();

        assert_eq!(copied, 4_096);
        assert_eq!(std::fs::read(&output).unwrap().len(), 4_096);
    }

    #[tokio::test]
    async fn async_copy_charges_both_limiters() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        std::fs::write(&input, vec![1u8; 2_000]).unwrap();

        let config = ThrottleConfig {
            upload: LimiterConfig::new(1_000_000, 0),
            download: LimiterConfig::new(1_000_000, 0),
            ..ThrottleConfig::default()
        };
        let limiters = TrafficLimiters::from_config(&config);
        let copied = copy_async(&limiters, input.to_str().unwrap(), output.to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(copied, 2_000);
        assert_eq!(std::fs::read(&output).unwrap().len(), 2_000);
        assert_eq!(limiters.sent.stats().total_used, 2_000);
        assert_eq!(limiters.received.stats().total_used, 2_000);
    }
}
