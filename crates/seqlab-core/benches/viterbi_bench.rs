use criterion::{black_box, criterion_group, criterion_main, Criterion};
use seqlab_core::ViterbiDecoder;

fn scores(rows: usize, cols: usize) -> Vec<Vec<f32>> {
    (0..rows)
        .map(|r| (0..cols).map(|c| ((r * 31 + c * 17) % 13) as f32 * 0.1 - 0.6).collect())
        .collect()
}

fn bench_viterbi_decode(c: &mut Criterion) {
    let num_tags = 17;
    let decoder = ViterbiDecoder::new(num_tags);
    let transitions = scores(num_tags, num_tags);
    let short = scores(16, num_tags);
    let long = scores(256, num_tags);

    c.bench_function("viterbi_decode_16", |b| {
        b.iter(|| decoder.decode(black_box(&short), black_box(&transitions)).unwrap());
    });

    c.bench_function("viterbi_decode_256", |b| {
        b.iter(|| decoder.decode(black_box(&long), black_box(&transitions)).unwrap());
    });
}

criterion_group!(benches, bench_viterbi_decode);
criterion_main!(benches);
