use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Aggregate, CustomerId, Money, Order, OrderLine, UnitOfWork};
use outbox::InMemoryOutboxStore;

fn new_order() -> Order {
    Order::create(CustomerId::new(), vec![
        OrderLine::new("SKU-BENCH", "Benchmark Widget", 2, Money::from_cents(1000)),
    ])
    .unwrap()
}

fn bench_guarded_transition(c: &mut Criterion) {
    c.bench_function("domain/confirm_transition", |b| {
        b.iter(|| {
            let mut order = new_order();
            order.confirm("PAY-BENCH").unwrap();
            assert_eq!(order.pending_events().len(), 2);
        });
    });
}

fn bench_invalid_transition(c: &mut Criterion) {
    let order = new_order();
    c.bench_function("domain/rejected_transition", |b| {
        b.iter(|| {
            let mut order = order.clone();
            assert!(order.deliver().is_err());
        });
    });
}

fn bench_full_commit_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/create_confirm_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryOutboxStore::new();
                let mut order = new_order();
                order.confirm("PAY-BENCH").unwrap();

                let mut uow = UnitOfWork::new(&store);
                uow.register(&mut order);
                let receipt = uow.save_changes().await.unwrap();
                assert_eq!(receipt.events_enqueued, 2);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_guarded_transition,
    bench_invalid_transition,
    bench_full_commit_cycle
);
criterion_main!(benches);
