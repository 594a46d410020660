use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ucp::Sequencer;

/// 손실률 `loss`로 빠진 seq_no를 마지막에 다시 넣는 수신 순서
fn arrival_order(count: u32, loss: f64) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(1);
    let (mut first_pass, mut retransmits) = (Vec::new(), Vec::new());
    for seq_no in 0..count {
        if rng.gen_bool(loss) {
            retransmits.push(seq_no);
        } else {
            first_pass.push(seq_no);
        }
    }
    first_pass.extend(retransmits);
    first_pass
}

fn bench_add_and_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequencer");

    for loss in [0.0, 0.01, 0.1] {
        let order = arrival_order(10_000, loss);
        let last = order.iter().copied().max().unwrap_or_default();

        group.bench_with_input(BenchmarkId::new("add_scan", loss), &order, |b, order| {
            b.iter(|| {
                let mut sequencer = Sequencer::new();
                let mut nacks = 0usize;
                for (i, &seq_no) in order.iter().enumerate() {
                    sequencer.add(seq_no, seq_no == last);
                    if i % 64 == 0 {
                        nacks += sequencer.missing_segments().count();
                    }
                }
                assert!(sequencer.is_complete());
                black_box(nacks)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add_and_scan);
criterion_main!(benches);
