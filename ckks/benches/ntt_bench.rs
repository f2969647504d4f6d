use ckks::{Modulus, NttOperator, NttPrimeGenerator};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_ntt(c: &mut Criterion) {
	for log_n in [12usize, 14] {
		let n = 1 << log_n;
		let mut gen = NttPrimeGenerator::new(55, 2 * n as u64).unwrap();
		let q = Modulus::new(gen.next_alternating().unwrap()).unwrap();
		let op = NttOperator::new(q, n).unwrap();
		let mut a: Vec<u64> = (0..n as u64).map(|i| i * 0x9e3779b9 % q.value()).collect();
		c.bench_function(&format!("ntt_forward_n{n}"), |b| {
			b.iter(|| op.forward(&mut a))
		});
	}
}

criterion_group!(benches, bench_ntt);
criterion_main!(benches);
