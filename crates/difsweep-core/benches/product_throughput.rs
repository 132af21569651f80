use criterion::{black_box, criterion_group, criterion_main, Criterion};
use difsweep_core::{parse_float, parse_int, AttrSpec, AttrTable, ConfigSource, ParamValue};

#[allow(dead_code)]
#[derive(Debug, Default)]
struct Opts {
    thresh: f64,
    min_pix: i64,
    pix_tol: f64,
}

fn set_thresh(opts: &mut Opts, value: &ParamValue) {
    opts.thresh = value.expect_float();
}

fn set_min_pix(opts: &mut Opts, value: &ParamValue) {
    opts.min_pix = value.expect_int();
}

fn set_pix_tol(opts: &mut Opts, value: &ParamValue) {
    opts.pix_tol = value.expect_float();
}

fn make_table() -> AttrTable<Opts> {
    let cfg = ConfigSource::parse(
        "spots:\n  thresh: \"1 2 3 4 5 6 7 8\"\n  min_pix: \"1 2 3 4\"\n  pix_tol: \"0.5 1.0 1.5 2.0 2.5 3.0\"\n",
    )
    .expect("config");
    let specs = [
        AttrSpec {
            name: "thresh",
            parse: parse_float,
            set: set_thresh,
        },
        AttrSpec {
            name: "min_pix",
            parse: parse_int,
            set: set_min_pix,
        },
        AttrSpec {
            name: "pix_tol",
            parse: parse_float,
            set: set_pix_tol,
        },
    ];
    AttrTable::from_config(&cfg, "spots", &specs).expect("table")
}

fn bench_product(c: &mut Criterion) {
    let table = make_table();
    c.bench_function("grid_product_enumerate", |b| {
        b.iter(|| {
            let mut cells = 0usize;
            for combo in table.product() {
                cells += combo.len();
            }
            black_box(cells)
        })
    });
    c.bench_function("grid_product_bind", |b| {
        b.iter(|| {
            let mut opts = Opts::default();
            for combo in table.product() {
                table.bind(&mut opts, &combo);
            }
            black_box(opts.thresh)
        })
    });
}

criterion_group!(benches, bench_product);
criterion_main!(benches);
