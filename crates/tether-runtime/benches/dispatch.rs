//! Dispatch path benchmarks
//!
//! Measures the per-emission cost of the bridge:
//! - Marshaler lookup and decode
//! - Handler name normalization
//! - Full dispatch to a typed callback
//! - Registration under copy-on-write

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::rc::Rc;
use std::sync::Arc;
use tether_runtime::native::sim::SimSystem;
use tether_runtime::native::{BoxedValue, TypeTag};
use tether_runtime::signal::{normalize, DispatchOptions, MethodTable, SignalDispatcher};
use tether_runtime::{MarshalContext, MarshalRegistry, NameStyle, SystemRef, Value};

fn setup() -> (Rc<SimSystem>, SystemRef, Arc<MarshalRegistry>) {
    let sim = Rc::new(SimSystem::new());
    let system: SystemRef = sim.clone();
    (sim, system, Arc::new(MarshalRegistry::with_defaults()))
}

// ============================================================================
// Decode Benchmarks
// ============================================================================

fn bench_decode_fundamentals(c: &mut Criterion) {
    let (_sim, system, registry) = setup();
    let ctx = MarshalContext::new(&system);
    let params = [
        BoxedValue::boolean(true),
        BoxedValue::int(42),
        BoxedValue::double(1.5),
        BoxedValue::string("activate"),
    ];

    c.bench_function("decode_fundamentals_4", |b| {
        b.iter(|| registry.decode_all(black_box(&params), &ctx))
    });
}

fn bench_decode_object(c: &mut Criterion) {
    let (sim, system, registry) = setup();
    let button_type = sim.register_type("GtkButton", TypeTag::OBJECT);
    registry.register_object(button_type);
    let button = sim.create_object(button_type);
    let ctx = MarshalContext::new(&system);
    let boxed = BoxedValue::pointer(button_type, button);

    c.bench_function("decode_object_borrowed", |b| {
        b.iter(|| registry.decode(black_box(&boxed), &ctx))
    });
}

// ============================================================================
// Naming Benchmarks
// ============================================================================

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for name in ["clicked", "on_main_window_delete_event", "notify::visible-child-name"] {
        group.bench_with_input(BenchmarkId::from_parameter(name), name, |b, name| {
            b.iter(|| normalize(black_box(name), NameStyle::Segments))
        });
    }
    group.finish();
}

// ============================================================================
// Dispatch Benchmarks
// ============================================================================

fn bench_dispatch_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_search_depth");
    for depth in [1usize, 8, 32] {
        let (sim, system, registry) = setup();
        let container = sim.create_container();
        let dispatcher = SignalDispatcher::with_registry(
            &system,
            registry,
            DispatchOptions {
                warn_unhandled: false,
                ..DispatchOptions::default()
            },
        );
        let filler = (1..depth).map(|i| MethodTable::new(format!("Filler{}", i)).method("Unused", || {}));
        dispatcher.register_callback_set(&container, filler);
        dispatcher.register_callback_set(
            &container,
            [MethodTable::new("Target").method("OnValueChanged", |v: f64| {
                black_box(v);
            })],
        );
        let params = [BoxedValue::double(0.25)];

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| dispatcher.dispatch(&container, black_box("on_value_changed"), &params))
        });
    }
    group.finish();
}

fn bench_emit_through_connection(c: &mut Criterion) {
    let (sim, system, registry) = setup();
    let container = sim.create_container();
    let toggle = sim.create_object(TypeTag::OBJECT);
    sim.declare_connection(container, toggle, "toggled", "on_toggle_toggled");
    let dispatcher = SignalDispatcher::with_registry(&system, registry, DispatchOptions::default());
    dispatcher.register_callback_set(
        &container,
        [MethodTable::new("Handlers").method("OnToggleToggled", |active: bool| {
            black_box(active);
        })],
    );
    let _ = dispatcher.connect_all(&container);
    let params = [BoxedValue::boolean(true)];

    c.bench_function("emit_toggled", |b| {
        b.iter(|| sim.emit(toggle, "toggled", black_box(&params)))
    });
}

// ============================================================================
// Registration Benchmarks
// ============================================================================

fn bench_register_copy_on_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_copy_on_write");
    for size in [16usize, 256] {
        let registry = MarshalRegistry::with_defaults();
        for i in 0..size {
            registry.register_fn(TypeTag(0x10_0000 + i * 4), |_, _| Ok(Value::Null));
        }
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| registry.register_fn(TypeTag(0x20_0000), |_, _| Ok(Value::Null)))
        });
    }
    group.finish();
}

criterion_group!(decode, bench_decode_fundamentals, bench_decode_object);
criterion_group!(naming, bench_normalize);
criterion_group!(dispatch, bench_dispatch_depth, bench_emit_through_connection);
criterion_group!(registration, bench_register_copy_on_write);
criterion_main!(decode, naming, dispatch, registration);
