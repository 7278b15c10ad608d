use criterion::{criterion_group, criterion_main, Criterion};
use ledger_core::{mine::seal_parallel, pow::proof_of_work, Block, Transaction};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn template() -> Block {
    let mut rng = StdRng::seed_from_u64(42);
    let txs: Vec<Transaction> = (0..10)
        .map(|i| Transaction::new(format!("alice-{i}"), "Escrow", rng.gen_range(1..100)))
        .collect();
    Block::new(1, txs, 1_700_000_000_000, "0")
}

fn bench_pow(c: &mut Criterion) {
    let block = template();

    c.bench_function("proof_of_work_difficulty_3", |b| {
        b.iter(|| {
            let mut candidate = block.clone();
            proof_of_work(&mut candidate, 3)
        });
    });

    c.bench_function("seal_parallel_difficulty_3", |b| {
        b.iter(|| seal_parallel(block.clone(), 3));
    });
}

criterion_group!(benches, bench_pow);
criterion_main!(benches);
