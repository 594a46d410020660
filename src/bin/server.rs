//! UCP 서버 (수신자)
//!
//! 파티션마다 `SERVER_BASE_PORT + index`에서 METADATA를 기다리고,
//! 송신측으로 역방향 TCP 연결을 맺어 ACK/NACK/FIN을 보낸다.
//! 모든 파티션을 받으면 METADATA의 대상 이름으로 병합한다.
//!
//! 사용법:
//!   cargo run --release --bin ucp-server -- [OPTIONS]

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ucp::stats::format_duration;
use ucp::{receive_file, Config};

const USAGE: &str = r#"UCP Server - 분할 UDP 파일 수신

사용법:
  ucp-server [OPTIONS]

옵션:
  -p, --parts <N>          받을 파티션 수 (기본: 10, 송신측과 같아야 함)
  -o, --output-dir <DIR>   저장 디렉터리 (기본: .)
      --keep-parts         병합 후 파티션 파일 보존
  -h, --help               이 도움말 출력

환경 변수:
  RUST_LOG                 로그 필터 (기본: info)
"#;

fn parse_args() -> Result<Config, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--parts" | "-p" => {
                let value = args.get(i + 1).ok_or("--parts 값 필요")?;
                config.partitions = value
                    .parse()
                    .map_err(|_| format!("--parts: 유효하지 않은 값 {:?}", value))?;
                i += 1;
            }
            "--output-dir" | "-o" => {
                let value = args.get(i + 1).ok_or("--output-dir 값 필요")?;
                config.output_dir = PathBuf::from(value);
                i += 1;
            }
            "--keep-parts" => config.keep_partitions = true,
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 인자: {}", other)),
        }
        i += 1;
    }

    Ok(config)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    info!("UCP Server starting...");
    info!("Partitions: {}", config.partitions);
    info!("Output directory: {}", config.output_dir.display());

    let summary = match receive_file(&config) {
        Ok(summary) => summary,
        Err(e) => {
            error!("수신 실패: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for report in &summary.reports {
        info!(
            "파티션 {}: {} bytes, {} 세그먼트, NACK {}, {}",
            report.index,
            report.part_size,
            report.segments,
            report.nacks_sent,
            format_duration(report.elapsed)
        );
    }

    match &summary.output {
        Some(output) if summary.is_complete() => {
            info!("저장 완료: {} ({} bytes)", output.display(), summary.bytes);
            ExitCode::SUCCESS
        }
        _ => {
            for (index, e) in &summary.failures {
                warn!("파티션 {} 실패: {}", index, e);
            }
            error!("파일이 불완전함: 파티션 파일을 남겨 둠");
            ExitCode::FAILURE
        }
    }
}
