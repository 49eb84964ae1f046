use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use resotrack_core::{FitMethod, FitterCfg, SignalFitter, Sweep, TimeSeriesDenoiser};

// Synthetic attenuation sweep: Gaussian dip with additive white noise
fn synth_sweep(n: usize, center: f64, noise_db: f64, seed: u64) -> Sweep {
    // tiny PRNG
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    };
    let step = 100.0 / n as f64;
    let freqs: Vec<f64> = (0..n).map(|i| 70.0 + step * i as f64).collect();
    let values = freqs
        .iter()
        .map(|f| {
            let dip = -5.0 * (-(f - center).powi(2) / (2.0 * 0.25)).exp();
            dip + (next() * 2.0 - 1.0) * noise_db
        })
        .collect();
    Sweep::new(freqs, values)
}

fn configure(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    // Allow quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p resotrack_core --bench fitter
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(10));
        }
    } else {
        g.sample_size(20);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
}

pub fn bench_fit(c: &mut Criterion) {
    let mut g = c.benchmark_group("signal_fit");
    configure(&mut g);
    let sweep = synth_sweep(10_000, 120.0, 0.02, 0xC0FFEE);

    for method in [FitMethod::Quadratic, FitMethod::Spline] {
        let fitter = SignalFitter::new(FitterCfg {
            method,
            ..FitterCfg::default()
        });
        g.bench_function(format!("{method:?}"), |b| {
            b.iter(|| black_box(fitter.fit(black_box(&sweep))));
        });
    }
    g.finish();
}

pub fn bench_denoise(c: &mut Criterion) {
    let mut g = c.benchmark_group("time_series_denoise");
    configure(&mut g);
    let series: Vec<(f64, f64)> = (0..2_000)
        .map(|i| {
            let t = f64::from(i) / 12.0;
            (t, 120.0 - 0.01 * t + if i % 97 == 0 { 3.0 } else { 0.0 })
        })
        .collect();
    let denoiser = TimeSeriesDenoiser::new();
    g.bench_function("len_2000", |b| {
        b.iter_batched(
            || series.clone(),
            |s| black_box(denoiser.denoise(black_box(&s))),
            BatchSize::SmallInput,
        );
    });
    g.finish();
}

criterion_group!(fitter, bench_fit, bench_denoise);
criterion_main!(fitter);
