//! UCP 클라이언트 (송신자)
//!
//! 파일을 N개 파티션으로 나눠 파티션마다 UDP 흐름 하나로 병렬 송신한다.
//! 수신측은 파티션마다 TCP로 역방향 연결해 ACK/NACK/FIN을 보낸다.
//!
//! 사용법:
//!   cargo run --release --bin ucp-client -- <source_path> <remote_ip>:<remote_filename> [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin ucp-client -- ./data.bin 192.168.1.100:data.bin
//!   cargo run --release --bin ucp-client -- ./data.bin 127.0.0.1:copy.bin --parts 3 --drop-rate 0.1

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ucp::{send_file, Config};

const USAGE: &str = r#"UCP Client - 분할 UDP 파일 송신

사용법:
  ucp-client <source_path> <remote_ip>:<remote_filename> [OPTIONS]

옵션:
  -p, --parts <N>           파티션(흐름) 수 (기본: 10)
  -s, --segment-size <B>    DATA 패킷 페이로드 크기 (기본: 9166)
  -d, --drop-rate <P>       인위적 UDP 손실률 0.0~1.0 (테스트용)
      --seed <N>            손실 RNG 시드
  -h, --help                이 도움말 출력

환경 변수:
  RUST_LOG                  로그 필터 (기본: info)
"#;

/// 클라이언트 인자
struct ClientArgs {
    source: PathBuf,
    remote_ip: IpAddr,
    remote_name: String,
    config: Config,
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{} 값 필요", flag))?;
    value
        .parse()
        .map_err(|_| format!("{}: 유효하지 않은 값 {:?}", flag, value))
}

fn parse_args() -> Result<ClientArgs, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--parts" | "-p" => {
                config.partitions = parse_value(&args[i], args.get(i + 1))?;
                i += 1;
            }
            "--segment-size" | "-s" => {
                config.segment_size = parse_value(&args[i], args.get(i + 1))?;
                i += 1;
            }
            "--drop-rate" | "-d" => {
                config.drop_rate = parse_value(&args[i], args.get(i + 1))?;
                i += 1;
            }
            "--seed" => {
                config.loss_seed = Some(parse_value(&args[i], args.get(i + 1))?);
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other if other.starts_with('-') => return Err(format!("알 수 없는 옵션: {}", other)),
            other => positional.push(other.to_owned()),
        }
        i += 1;
    }

    let [source, remote] = <[String; 2]>::try_from(positional)
        .map_err(|_| "<source_path> <remote_ip>:<remote_filename> 필요".to_owned())?;

    let (ip, name) = remote
        .split_once(':')
        .ok_or_else(|| format!("<remote_ip>:<remote_filename> 형식이 아님: {}", remote))?;
    let remote_ip = ip
        .parse()
        .map_err(|_| format!("유효하지 않은 IP: {}", ip))?;

    Ok(ClientArgs {
        source: PathBuf::from(source),
        remote_ip,
        remote_name: name.to_owned(),
        config,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    info!("UCP Client starting...");
    info!("Partitions: {}", args.config.partitions);
    info!("Segment size: {} bytes", args.config.segment_size);
    if args.config.drop_rate > 0.0 {
        info!("Synthetic drop rate: {:.1}%", args.config.drop_rate * 100.0);
    }

    let report = match send_file(&args.config, &args.source, args.remote_ip, &args.remote_name) {
        Ok(report) => report,
        Err(e) => {
            error!("송신 실패: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("{}", report.stats().summary());

    if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        for (index, e) in &report.failures {
            warn!("파티션 {} 실패: {}", index, e);
        }
        error!(
            "{}/{} 파티션 실패: 수신측 파일은 불완전함",
            report.failures.len(),
            report.failures.len() + report.flows.len()
        );
        ExitCode::FAILURE
    }
}
