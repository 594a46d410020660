use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::thread;

use ucp::{receive_file, send_file, Config};

fn write_source(dir: &Path, len: usize) -> std::path::PathBuf {
    let path = dir.join("source.bin");
    let data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
    fs::write(&path, data).unwrap();
    path
}

fn run_transfer(config: Config, source_len: usize, destination: &str) -> (Vec<u8>, Vec<u8>, u64) {
    let source_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let source = write_source(source_dir.path(), source_len);

    let receiver_config = Config {
        output_dir: output_dir.path().to_path_buf(),
        ..config.clone()
    };
    let receiving = thread::spawn(move || receive_file(&receiver_config));

    let report = send_file(
        &config,
        &source,
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        destination,
    )
    .unwrap();
    assert!(report.is_complete(), "sender failures: {:?}", report.failures);
    assert_eq!(report.stats().total_bytes, source_len as u64);

    let summary = receiving.join().unwrap().unwrap();
    assert!(summary.is_complete(), "receiver failures: {:?}", summary.failures);
    assert_eq!(summary.bytes, source_len as u64);

    let output = summary.output.unwrap();
    assert_eq!(output, output_dir.path().join(destination));

    let nacks: u64 = summary.reports.iter().map(|r| r.nacks_sent).sum();
    (fs::read(&source).unwrap(), fs::read(&output).unwrap(), nacks)
}

#[test]
fn three_partitions_with_synthetic_loss() {
    let config = Config {
        partitions: 3,
        segment_size: 64,
        server_base_port: 16342,
        drop_rate: 0.1,
        loss_seed: Some(7),
        ..Config::loopback()
    };

    let (source, received, nacks) = run_transfer(config, 9000, "copy.bin");
    assert_eq!(received, source);
    assert!(nacks > 0);
}

#[test]
fn lossless_default_segments() {
    let config = Config {
        partitions: 4,
        server_base_port: 16442,
        ..Config::loopback()
    };

    let (source, received, _) = run_transfer(config, 100_000, "big.bin");
    assert_eq!(received, source);
}

#[test]
fn partitions_smaller_than_count() {
    // 2바이트를 3개로 나누면 앞의 두 파티션은 비어 있다
    let config = Config {
        partitions: 3,
        server_base_port: 16542,
        ..Config::loopback()
    };

    let (source, received, nacks) = run_transfer(config, 2, "tiny.bin");
    assert_eq!(received, source);
    assert_eq!(nacks, 0);
}
