use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use icer_io::plugins::{ArrayMode, NdArray};
use icer_io::{
    deice, ice, register_builtin, Archive, BuiltinModes, DirArchive, MemoryArchive, OpenMode,
    Value, ZipArchive,
};
use tempfile::TempDir;

fn create_array(len: usize) -> Value {
    let data: Vec<f64> = (0..len).map(|i| (i % 1024) as f64 * 0.25).collect();
    NdArray::vector(data).into()
}

fn modes(array: ArrayMode) -> BuiltinModes {
    BuiltinModes {
        array: Some(array),
        ..BuiltinModes::default()
    }
}

/// ice + deice of one array per mode, in memory
fn bench_array_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_modes");
    let len = 100_000;
    let value = create_array(len);
    group.throughput(Throughput::Bytes((len * 8) as u64));

    for mode in [ArrayMode::Json, ArrayMode::Txt, ArrayMode::Bin, ArrayMode::Zst] {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &value, |b, value| {
            b.iter(|| {
                let mut archive = MemoryArchive::new();
                register_builtin(archive.handlers_mut(), &modes(mode));
                ice(&archive, None, [("x", value.clone())]).unwrap();
                black_box(deice(&archive, None, None).unwrap())
            })
        });
    }

    group.finish();
}

/// Writing and reading back a small archive on each container kind
fn bench_containers(c: &mut Criterion) {
    let mut group = c.benchmark_group("containers");
    let value = create_array(10_000);

    group.bench_function("directory", |b| {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bench.ice");
        b.iter(|| {
            let mut archive = DirArchive::open(&path, OpenMode::Write).unwrap();
            register_builtin(archive.handlers_mut(), &BuiltinModes::default());
            ice(&archive, None, [("x", value.clone())]).unwrap();
            black_box(deice(&archive, None, None).unwrap())
        })
    });

    group.bench_function("zip", |b| {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bench.ice.zip");
        b.iter(|| {
            let mut archive = ZipArchive::open(&path, OpenMode::Write).unwrap();
            register_builtin(archive.handlers_mut(), &BuiltinModes::default());
            ice(&archive, None, [("x", value.clone())]).unwrap();
            archive.close().unwrap();

            let mut archive = ZipArchive::open(&path, OpenMode::Read).unwrap();
            register_builtin(archive.handlers_mut(), &BuiltinModes::default());
            let values = deice(&archive, None, None).unwrap();
            archive.close().unwrap();
            black_box(values)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_array_modes, bench_containers);
criterion_main!(benches);
