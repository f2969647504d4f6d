use ckks::{CkksParametersBuilder, Encoder};
use ckks_bootstrap::{
	DftFormat, DftMatrix, DftMatrixLiteral, DftType, Mod1Parameters, Mod1ParametersLiteral,
};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_dft_planner(c: &mut Criterion) {
	let params = CkksParametersBuilder::new()
		.set_log_n(10)
		.set_log_q(vec![55, 50, 50, 50, 50, 50, 50, 50, 50, 50])
		.set_log_p(vec![61])
		.set_log_default_scale(50)
		.build()
		.unwrap();
	let encoder = Encoder::new(&params);
	let literal = DftMatrixLiteral {
		dft_type: DftType::HomomorphicDecode,
		log_slots: params.log_max_slots(),
		format: DftFormat::RepackImagAsReal,
		level_q: 9,
		level_p: 0,
		levels: vec![3, 3, 3],
		log_bsgs_ratio: 1,
		scaling: None,
		bit_reversed: true,
	};
	c.bench_function("dft_planner_n1024", |b| {
		b.iter(|| DftMatrix::new(&params, &encoder, &literal).unwrap())
	});
}

fn bench_mod1_builder(c: &mut Criterion) {
	let params = CkksParametersBuilder::new()
		.set_log_n(10)
		.set_log_q(vec![55, 60])
		.set_log_default_scale(45)
		.build()
		.unwrap();
	let literal = Mod1ParametersLiteral::default();
	c.bench_function("mod1_builder_deg30", |b| {
		b.iter(|| Mod1Parameters::new(&params, &literal, 1).unwrap())
	});
}

criterion_group!(benches, bench_dft_planner, bench_mod1_builder);
criterion_main!(benches);
