// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Deadlock detection tests using parking_lot's built-in deadlock detector.
//!
//! The engine's lock discipline is: transaction mutex first, then a
//! device's state lock; the registry never takes transaction locks. These
//! tests hammer the real engine from many threads while a watcher checks
//! the lock graph for cycles.

use parking_lot::deadlock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use time::macros::date;
use time::OffsetDateTime;
use trailpass_rs::{
    AlertQueue, BookingOrchestrator, DeviceAssignment, DeviceRegistry, IdentificationType,
    NewBooking, PaymentNotification, PaymentReconciler, PriceTable, ReconcilerConfig,
    SandboxGateway, TicketCategory, TicketDraft, TransactionId, TransactionStatus,
    TransactionStore, UserId,
};

struct TestEngine {
    registry: Arc<DeviceRegistry>,
    booking: Arc<BookingOrchestrator>,
    reconciler: Arc<PaymentReconciler>,
    assignment: Arc<DeviceAssignment>,
}

fn engine_with_devices(count: usize) -> TestEngine {
    let store = Arc::new(TransactionStore::new());
    let registry = Arc::new(DeviceRegistry::new());
    let alerts = Arc::new(AlertQueue::new());
    for n in 1..=count {
        registry.register(&format!("T{n:03}")).unwrap();
    }
    let pricing = Arc::new(PriceTable::new());
    pricing.set(TicketCategory::Domestic, dec!(100000));

    let assignment = Arc::new(DeviceAssignment::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&alerts),
    ));
    let booking = Arc::new(BookingOrchestrator::new(
        Arc::clone(&store),
        pricing,
        Arc::clone(&assignment),
    ));
    let reconciler = Arc::new(PaymentReconciler::new(
        store,
        Arc::clone(&registry),
        Arc::new(SandboxGateway),
        alerts,
        ReconcilerConfig::default(),
    ));
    TestEngine {
        registry,
        booking,
        reconciler,
        assignment,
    }
}

fn settlement(id: TransactionId, gateway_ref: &str, amount: Decimal) -> PaymentNotification {
    PaymentNotification {
        order_id: id.order_ref(),
        transaction_id: gateway_ref.into(),
        transaction_status: "settlement".into(),
        gross_amount: amount.to_string(),
        transaction_time: OffsetDateTime::now_utc(),
    }
}

async fn pending_booking(engine: &TestEngine) -> TransactionId {
    let view = engine
        .booking
        .create_transaction(NewBooking {
            user_id: UserId::new(),
            start_date: date!(2026 - 08 - 10),
            end_date: date!(2026 - 08 - 12),
            tickets: vec![TicketDraft {
                hiker_name: "Ayu Lestari".into(),
                category: TicketCategory::Domestic,
                identification_type: IdentificationType::Nik,
                identification_number: "3507112209900001".into(),
                address: "Malang".into(),
                phone_number: "081234567890".into(),
            }],
        })
        .unwrap();
    engine.reconciler.create_payment_link(view.id).await.unwrap();
    view.id
}

/// Spawns a watcher that flags any deadlock the detector finds while the
/// closure's worker threads run.
fn with_deadlock_watch(workers: impl FnOnce()) {
    let stop = Arc::new(AtomicBool::new(false));
    let found = Arc::new(AtomicBool::new(false));

    let watcher = {
        let stop = Arc::clone(&stop);
        let found = Arc::clone(&found);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(50));
                if !deadlock::check_deadlock().is_empty() {
                    found.store(true, Ordering::Relaxed);
                    return;
                }
            }
        })
    };

    workers();

    stop.store(true, Ordering::Relaxed);
    watcher.join().unwrap();
    assert!(!found.load(Ordering::Relaxed), "deadlock detected");
}

#[tokio::test(flavor = "multi_thread")]
async fn mixed_workload_has_no_lock_cycles() {
    let engine = engine_with_devices(8);

    // 24 bookings all waiting for payment; more than the pool can hold.
    let mut ids = Vec::new();
    for _ in 0..24 {
        ids.push(pending_booking(&engine).await);
    }
    let ids = Arc::new(ids);

    let engine = Arc::new(engine);
    with_deadlock_watch(|| {
        let mut handles = Vec::new();

        // Webhook deliveries, two threads racing over the same ids.
        for t in 0..2 {
            let engine = Arc::clone(&engine);
            let ids = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                for (i, id) in ids.iter().enumerate() {
                    let _ = engine
                        .reconciler
                        .handle_webhook(&settlement(*id, &format!("mid-{t}-{i}"), dec!(100000)));
                }
            }));
        }

        // Staff completing and cancelling whatever has activated.
        {
            let engine = Arc::clone(&engine);
            let ids = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                for id in ids.iter() {
                    let _ = engine.booking.update_status(*id, TransactionStatus::Completed);
                }
            }));
        }
        {
            let engine = Arc::clone(&engine);
            let ids = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                for id in ids.iter().rev() {
                    let _ = engine.booking.cancel(*id);
                }
            }));
        }

        // Staff corrections racing the settlements and completions.
        {
            let engine = Arc::clone(&engine);
            let ids = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                for id in ids.iter() {
                    let _ = engine.assignment.reassign(*id, "T001");
                }
            }));
        }

        // Readers walking the pool and the bookings.
        {
            let engine = Arc::clone(&engine);
            let ids = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                for id in ids.iter() {
                    let _ = engine.booking.get(*id);
                    let _ = engine.registry.list();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    });

    // Whatever interleaving happened, the invariants hold: every active
    // booking holds exactly one device and every held device points back
    // at an active booking.
    let mut held = 0;
    for id in ids.iter() {
        let view = engine.booking.get(*id).unwrap();
        match view.status {
            TransactionStatus::Active => {
                let serial = view.device_serial.expect("active booking without device");
                assert_eq!(engine.registry.holder_of(&serial), Some(*id));
                held += 1;
            }
            _ => assert_eq!(view.device_serial, None),
        }
    }
    assert_eq!(engine.registry.len() - engine.registry.available_count(), held);
}

#[tokio::test(flavor = "multi_thread")]
async fn contended_single_device_has_no_lock_cycles() {
    let engine = engine_with_devices(1);
    let mut ids = Vec::new();
    for _ in 0..8 {
        ids.push(pending_booking(&engine).await);
    }
    let ids = Arc::new(ids);
    let engine = Arc::new(engine);

    with_deadlock_watch(|| {
        let mut handles = Vec::new();
        for t in 0..4 {
            let engine = Arc::clone(&engine);
            let ids = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                for (i, id) in ids.iter().enumerate() {
                    let _ = engine
                        .reconciler
                        .handle_webhook(&settlement(*id, &format!("mid-{t}-{i}"), dec!(100000)));
                    let _ = engine.booking.update_status(*id, TransactionStatus::Completed);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    });

    // The single device must have ended up either free or held by exactly
    // one still-active booking.
    let active: Vec<_> = ids
        .iter()
        .filter(|id| engine.booking.get(**id).unwrap().status == TransactionStatus::Active)
        .collect();
    assert!(active.len() <= 1);
    assert_eq!(
        engine.registry.available_count() == 1,
        active.is_empty(),
    );
}
