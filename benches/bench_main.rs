use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kv::storage::lsm::{LsmEngine, Options};
use kv::storage::Engine;
use rand::Rng;
use tempfile::tempdir;

fn random_value(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

fn bench_block_codec(c: &mut Criterion) {
    use kv::storage::lsm::block::Block;

    let mut group = c.benchmark_group("block_codec");
    for entries in [8usize, 64, 256] {
        group.throughput(Throughput::Elements(entries as u64));

        group.bench_with_input(BenchmarkId::new("encode", entries), &entries, |b, &n| {
            b.iter(|| {
                let mut block = Block::new();
                for i in 0..n {
                    block.push(format!("k{i:06}").as_bytes(), b"value").unwrap();
                }
                black_box(block.encode())
            });
        });

        let mut block = Block::new();
        for i in 0..entries {
            block.push(format!("k{i:06}").as_bytes(), b"value").unwrap();
        }
        let encoded = block.encode();
        group.bench_with_input(BenchmarkId::new("decode", entries), &encoded, |b, bytes| {
            b.iter(|| black_box(Block::decode(bytes).unwrap()));
        });
    }
    group.finish();
}

fn bench_lsm_put_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("lsm_engine");

    group.bench_function("put_1kb_value", |b| {
        let dir = tempdir().unwrap();
        let engine = LsmEngine::open(dir.path(), Options::default()).unwrap();
        let value = random_value(1024);
        let mut i = 0u64;
        b.iter(|| {
            engine.set(format!("k{i:012}").as_bytes(), value.clone()).unwrap();
            i += 1;
        });
    });

    group.bench_function("get_hit", |b| {
        let dir = tempdir().unwrap();
        let engine = LsmEngine::open(dir.path(), Options::default()).unwrap();
        for i in 0..1000u64 {
            engine.set(format!("k{i:012}").as_bytes(), random_value(128)).unwrap();
        }
        b.iter(|| black_box(engine.get(b"k000000000500").unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_block_codec, bench_lsm_put_get);
criterion_main!(benches);
