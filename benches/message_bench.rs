//! Criterion benchmark untuk MessageStore dan native codec
//!
//! Run dengan: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flatmsg::{MessageStore, TypeCode};

fn names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("field_{}", i)).collect()
}

fn filled(count: usize) -> MessageStore {
    let mut msg = MessageStore::new(u32::from_be_bytes(*b"BNCH"));
    for (i, name) in names(count).iter().enumerate() {
        msg.add_value(name, i as i64).unwrap();
        msg.add_string(&format!("s_{}", name), name).unwrap();
    }
    msg
}

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(1));

    // Add ke field yang sudah ada (append item)
    group.bench_function("add_fixed", |b| {
        let mut msg = MessageStore::new(0);
        let mut i = 0i32;
        b.iter(|| {
            if i % 1024 == 0 {
                msg.make_empty();
            }
            msg.add_value("value", black_box(i)).unwrap();
            i = i.wrapping_add(1);
        });
    });

    group.bench_function("add_variable", |b| {
        let mut msg = MessageStore::new(0);
        let mut i = 0usize;
        b.iter(|| {
            if i % 1024 == 0 {
                msg.make_empty();
            }
            msg.add_string("text", black_box("variable sized item")).unwrap();
            i += 1;
        });
    });

    // Lookup lewat hash chain
    group.bench_function("find", |b| {
        let msg = filled(32);
        let keys = names(32);
        let mut i = 0usize;
        b.iter(|| {
            let value = msg.find_value::<i64>(&keys[i % keys.len()], 0).unwrap();
            i += 1;
            black_box(value)
        });
    });

    // Remove + add di tengah arena (memindahkan semua field di belakangnya)
    group.bench_function("remove_readd", |b| {
        let mut msg = filled(32);
        b.iter(|| {
            msg.remove_name(black_box("field_0")).unwrap();
            msg.add_value("field_0", 0i64).unwrap();
        });
    });

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for field_count in [4usize, 32, 256].iter() {
        let msg = filled(*field_count);
        let bytes = msg.flatten().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_function(format!("flatten_{}", field_count), |b| {
            let mut out = vec![0u8; msg.flattened_size()];
            b.iter(|| {
                msg.flatten_to_slice(black_box(&mut out)).unwrap();
            });
        });

        group.bench_function(format!("unflatten_{}", field_count), |b| {
            b.iter(|| {
                let back = MessageStore::unflatten(black_box(&bytes)).unwrap();
                black_box(back.count_names(TypeCode::ANY))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_store, bench_codec);
criterion_main!(benches);
