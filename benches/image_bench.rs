use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flatfs::image::{scan, CommitOptions, Image};
use flatfs::ops;
use flatfs::Record;
use std::io::Cursor;

fn sample_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| Record::new(&format!("file_{i}.bin"), vec![i as u8; 512]).unwrap())
        .collect()
}

fn committed_image(records: &[Record]) -> Cursor<Vec<u8>> {
    let mut img = Image::new(Cursor::new(vec![0xFFu8; 2 * 1024 * 1024]));
    img.commit(records, &CommitOptions::default()).unwrap();
    img.into_inner()
}

fn bench_scan(c: &mut Criterion) {
    let mut dev = committed_image(&sample_records(1000));
    c.bench_function("scan_1000_records", |b| b.iter(|| scan(black_box(&mut dev)).unwrap()));
}

fn bench_commit(c: &mut Criterion) {
    let records = sample_records(1000);
    let mut img = Image::new(Cursor::new(vec![0xFFu8; 2 * 1024 * 1024]));
    c.bench_function("commit_1000_records", |b| {
        b.iter(|| img.commit(black_box(&records), &CommitOptions::default()).unwrap())
    });
}

fn bench_verify(c: &mut Criterion) {
    let mut records = sample_records(1000);
    c.bench_function("verify_1000_records", |b| {
        b.iter(|| ops::verify(black_box(&mut records), false))
    });
}

criterion_group!(benches, bench_scan, bench_commit, bench_verify);
criterion_main!(benches);
