use criterion::{criterion_group, criterion_main, Criterion};
use smolyak::{GlobalGrid, GlobalGridOptions, SparseGridRule, TensorSelection};

fn build_grid(depth: i32) -> GlobalGrid
{
    let ndim = 3;
    let mut grid = GlobalGrid::make(ndim, GlobalGridOptions
    {
        num_outputs: 1,
        depth,
        selection: TensorSelection::Level,
        rule: SparseGridRule::ClenshawCurtis,
        ..Default::default()
    }).unwrap();
    let x = grid.needed_points();
    let values: Vec<f64> = x.chunks_exact(ndim).map(|p| (p[0] + 0.5 * p[1] - 0.25 * p[2]).exp()).collect();
    grid.load_needed_points(&values).unwrap();
    grid
}

fn construction(c: &mut Criterion)
{
    c.bench_function("make_depth6", |b| b.iter(|| build_grid(6)));
}

fn evaluation(c: &mut Criterion)
{
    let grid = build_grid(6);
    let query: Vec<f64> = (0..300).map(|i| ((i * 7919) % 1000) as f64 / 500.0 - 1.0).collect();
    c.bench_function("evaluate_batch_100", |b| b.iter(|| grid.evaluate_batch(&query).unwrap()));
}

fn quadrature(c: &mut Criterion)
{
    let grid = build_grid(7);
    c.bench_function("quadrature_weights_depth7", |b| b.iter(|| grid.quadrature_weights()));
}

criterion_group!(benches, construction, evaluation, quadrature);
criterion_main!(benches);
