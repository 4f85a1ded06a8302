// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `understory_managed`.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::rc::Rc;
use std::sync::Once;

use understory_managed::{
    BindingContext, ChangingArgs, DependencyObject, ErasedValue, ObjectId, ObjectRef, Property,
    PropertyMetadataBuilder,
};

struct Elem {
    id: ObjectId,
}

impl DependencyObject for Elem {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

fn elem() -> Rc<Elem> {
    Rc::new(Elem {
        id: ObjectId::next(),
    })
}

type Cx = BindingContext;

fn bench_managed(c: &mut Criterion) {
    static PRINT_SIZES: Once = Once::new();
    PRINT_SIZES.call_once(|| {
        eprintln!(
            "sizes: ErasedValue={} ObjectRef<Elem>={}",
            size_of::<ErasedValue>(),
            size_of::<ObjectRef<Elem>>(),
        );
    });

    let parent: Property<Cx, Option<ObjectRef<Elem>>, Elem> = Property::register(
        "Parent",
        PropertyMetadataBuilder::new(None).parent_reference().build(),
    );
    let width: Property<Cx, f64, Elem> =
        Property::register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
    let clamped: Property<Cx, f64, Elem> = Property::register_with(
        "Clamped",
        PropertyMetadataBuilder::new(0.0_f64).build(),
        |_: &Elem, args: &mut ChangingArgs<f64>| {
            let value = args.new_value().clamp(0.0, 100.0);
            args.set_mutated_value(value);
        },
    );
    let font_size: Property<Cx, f64, Elem> = Property::register(
        "FontSize",
        PropertyMetadataBuilder::new(12.0_f64).inherits(true).build(),
    );

    // A small inheritance chain: 0 <- 1 <- ... <- N-1
    let chain_len: usize = 16;
    let nodes: Vec<Rc<Elem>> = (0..chain_len).map(|_| elem()).collect();
    for pair in nodes.windows(2) {
        parent.set_value(&pair[1], Some(ObjectRef::from(&pair[0])));
    }
    font_size.set_value(&nodes[0], 16.0);
    let leaf = &nodes[chain_len - 1];

    let mut group = c.benchmark_group("managed/resolve");

    group.bench_function("default", |b| {
        let element = elem();
        b.iter(|| black_box(width.get_value(&element)));
    });

    group.bench_function("local", |b| {
        let element = elem();
        width.set_value(&element, 100.0);
        b.iter(|| black_box(width.get_value(&element)));
    });

    group.bench_function(BenchmarkId::new("inherited", chain_len), |b| {
        b.iter(|| black_box(font_size.get_value(leaf)));
    });

    group.bench_function("bound", |b| {
        let source = elem();
        let target = elem();
        width.set_value(&source, 42.0);
        let _binding = width.bind(&target, width.of(&source).one_way());
        b.iter(|| black_box(width.get_value(&target)));
    });

    group.finish();

    let mut group = c.benchmark_group("managed/set");

    group.bench_function("local/no_callback", |b| {
        let element = elem();
        let mut value = 0.0;
        b.iter(|| {
            value += 1.0;
            black_box(width.set_value(&element, value))
        });
    });

    group.bench_function("local/with_callback", |b| {
        let element = elem();
        let mut value = 0.0;
        b.iter(|| {
            value = (value + 1.0) % 100.0;
            black_box(clamped.set_value(&element, value))
        });
    });

    group.bench_function("local/with_handler", |b| {
        let element = elem();
        width.add_handler(&element, |change| {
            black_box(change.new_value);
        });
        let mut value = 0.0;
        b.iter(|| {
            value += 1.0;
            black_box(width.set_value(&element, value))
        });
    });

    group.bench_function(BenchmarkId::new("inherited_root", chain_len), |b| {
        let mut value = 16.0;
        b.iter(|| {
            value += 1.0;
            black_box(font_size.set_value(&nodes[0], value))
        });
    });

    group.bench_function("bound_source", |b| {
        let source = elem();
        let target = elem();
        let _binding = width.bind(&target, width.of(&source).one_way());
        let mut value = 0.0;
        b.iter(|| {
            value += 1.0;
            black_box(width.set_value(&source, value))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_managed);
criterion_main!(benches);
