//! Integration tests for subscription fan-out.
//!
//! These tests drive the store, router, scheduler and service together through the
//! library API, without a socket in between.

use crossbeam_channel::Receiver;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use stock_common::{Request, ServerMessage, Status, Symbol};
use stock_server::model::price_record::next_price;
use stock_server::model::price_store::PriceStore;
use stock_server::model::refresh_scheduler::{RefreshMode, RefreshScheduler};
use stock_server::model::router::SubscriptionRouter;
use stock_server::model::stock_service::StockService;

struct Harness {
    service: StockService,
    scheduler: RefreshScheduler,
}

fn harness() -> Harness {
    let store = Arc::new(PriceStore::new());
    let router = Arc::new(SubscriptionRouter::new(Arc::clone(&store), 64));
    let scheduler = RefreshScheduler::new(
        store,
        Arc::clone(&router),
        Duration::from_secs(60),
        RefreshMode::Synthetic,
    );
    Harness {
        service: StockService::new(router),
        scheduler,
    }
}

fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).unwrap()
}

fn drain(rx: &Receiver<ServerMessage>) -> Vec<ServerMessage> {
    rx.try_iter().collect()
}

fn updates_for(messages: &[ServerMessage], wanted: &Symbol) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ServerMessage::ReceiveStockUpdate { symbol, .. } if symbol == wanted))
        .count()
}

#[test]
fn test_subscribe_unknown_symbol_announces_once_to_everyone() {
    let h = harness();
    let router = h.service.router();
    let (c1, rx1) = router.register().unwrap();
    let (c2, rx2) = router.register().unwrap();
    let (_c3, rx3) = router.register().unwrap();
    let goog = symbol("goog");

    h.service.handle(c1, Request::Subscribe { symbol: goog.clone() });
    h.service.handle(c2, Request::Subscribe { symbol: goog.clone() });

    assert!(h.service.store().list_symbols().contains(&goog));
    let announcement = ServerMessage::NewStockAdded { symbol: goog };
    for rx in [&rx1, &rx2, &rx3] {
        let announced = drain(rx)
            .into_iter()
            .filter(|m| *m == announcement)
            .count();
        assert_eq!(announced, 1);
    }
}

#[test]
fn test_tick_reaches_exactly_the_group() {
    let h = harness();
    let router = h.service.router();
    let (c1, rx1) = router.register().unwrap();
    let (c2, rx2) = router.register().unwrap();
    let (aapl, msft) = (symbol("AAPL"), symbol("MSFT"));
    router.subscribe(c1, &aapl).unwrap();
    router.subscribe(c2, &msft).unwrap();
    drain(&rx1);
    drain(&rx2);

    assert_eq!(h.scheduler.run_once(), 2);

    let got1 = drain(&rx1);
    let got2 = drain(&rx2);
    assert_eq!(updates_for(&got1, &aapl), 1);
    assert_eq!(updates_for(&got1, &msft), 0);
    assert_eq!(updates_for(&got2, &msft), 1);
    assert_eq!(updates_for(&got2, &aapl), 0);
}

#[test]
fn test_unsubscribe_stops_updates_but_keeps_price() {
    let h = harness();
    let router = h.service.router();
    let (c1, rx1) = router.register().unwrap();
    let nflx = symbol("NFLX");
    h.service.subscribe(c1, &nflx).unwrap();
    h.scheduler.run_once();
    drain(&rx1);

    h.service.unsubscribe(c1, &nflx).unwrap();
    let before = h.service.store().get(&nflx).unwrap().price;
    h.scheduler.run_once();

    assert_eq!(updates_for(&drain(&rx1), &nflx), 0);
    assert!(h.service.store().list_symbols().contains(&nflx));
    let after = h.service.store().get(&nflx).unwrap().price;
    assert!(after >= Decimal::ZERO);
    assert!((after - before).abs() <= dec!(2.50));
}

#[test]
fn test_disconnected_connection_is_never_referenced_again() {
    let h = harness();
    let router = h.service.router();
    let (c1, rx1) = router.register().unwrap();
    let (c2, rx2) = router.register().unwrap();
    let (aapl, amzn) = (symbol("AAPL"), symbol("AMZN"));
    for s in [&aapl, &amzn] {
        router.subscribe(c1, s).unwrap();
    }
    router.subscribe(c2, &aapl).unwrap();

    router.on_disconnect(c1).unwrap();
    drain(&rx2);
    h.scheduler.run_once();

    assert!(router.subscribers(&aapl).unwrap().iter().all(|c| *c != c1));
    assert!(router.subscribers(&amzn).unwrap().is_empty());
    assert!(router.symbols_of(c1).unwrap().is_empty());
    assert!(router.is_consistent().unwrap());
    assert_eq!(updates_for(&drain(&rx2), &aapl), 1);

    drain(&rx1);
    assert!(rx1.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_add_stock_conflict_keeps_first_price() {
    let h = harness();
    let (c1, _rx) = h.service.router().register().unwrap();
    let aapl = symbol("AAPL");

    let first = h.service.handle(c1, Request::AddStock { symbol: aapl.clone() });
    assert_eq!(first, ServerMessage::ok(Status::Created));
    let price = h.service.get_price(&aapl).unwrap().price;

    let second = h.service.handle(c1, Request::AddStock { symbol: aapl.clone() });
    assert!(matches!(second, ServerMessage::Reply { status: Status::Conflict, .. }));
    assert_eq!(h.service.get_price(&aapl).unwrap().price, price);
}

#[test]
fn test_update_stock_rejects_negative_and_accepts_positive() {
    let h = harness();
    let (c1, _rx) = h.service.router().register().unwrap();
    let tsla = symbol("TSLA");
    h.service.add_stock(&tsla).unwrap();
    let before = h.service.get_price(&tsla).unwrap().price;

    let rejected = h.service.handle(
        c1,
        Request::UpdateStock {
            symbol: tsla.clone(),
            price: dec!(-5),
        },
    );
    assert!(matches!(rejected, ServerMessage::Reply { status: Status::BadRequest, .. }));
    assert_eq!(h.service.get_price(&tsla).unwrap().price, before);

    h.service.update_stock(&tsla, dec!(710)).unwrap();
    assert_eq!(h.service.get_price(&tsla).unwrap().price, dec!(710));
}

#[test]
fn test_repeated_ticks_never_go_negative() {
    let mut price = dec!(0.50);
    for _ in 0..10_000 {
        price = next_price(price);
        assert!(price >= Decimal::ZERO);
    }

    let h = harness();
    let penny = symbol("PNY");
    h.service.add_stock(&penny).unwrap();
    h.service.update_stock(&penny, dec!(0.01)).unwrap();
    for _ in 0..500 {
        h.scheduler.run_once();
        assert!(h.service.store().get(&penny).unwrap().price >= Decimal::ZERO);
    }
}
