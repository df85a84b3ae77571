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

//! Property-based tests for the reconciliation engine.
//!
//! These verify invariants that must hold for any sequence of gateway
//! deliveries and staff actions: totals are price-snapshot sums, webhook
//! application is idempotent per gateway reference, and statuses only
//! ever move along the transition table.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::{Arc, OnceLock};
use time::macros::date;
use time::OffsetDateTime;
use tokio::runtime::Runtime;
use trailpass_rs::{
    AlertQueue, BookingOrchestrator, DeviceAssignment, DeviceRegistry, IdentificationType,
    NewBooking, PaymentNotification, PaymentReconciler, PriceTable, ReconcilerConfig,
    SandboxGateway, TicketCategory, TicketDraft, TransactionId, TransactionStatus,
    TransactionStore, UserId,
};

fn rt() -> &'static Runtime {
    static RT: OnceLock<Runtime> = OnceLock::new();
    RT.get_or_init(|| Runtime::new().expect("tokio runtime"))
}

struct TestEngine {
    booking: BookingOrchestrator,
    reconciler: PaymentReconciler,
}

fn engine(domestic: Decimal, international: Decimal, devices: usize) -> TestEngine {
    let store = Arc::new(TransactionStore::new());
    let registry = Arc::new(DeviceRegistry::new());
    let alerts = Arc::new(AlertQueue::new());
    for n in 1..=devices {
        registry.register(&format!("T{n:03}")).unwrap();
    }
    let pricing = Arc::new(PriceTable::new());
    pricing.set(TicketCategory::Domestic, domestic);
    pricing.set(TicketCategory::International, international);

    let assignment = Arc::new(DeviceAssignment::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&alerts),
    ));
    let booking = BookingOrchestrator::new(Arc::clone(&store), pricing, assignment);
    let reconciler = PaymentReconciler::new(
        store,
        registry,
        Arc::new(SandboxGateway),
        alerts,
        ReconcilerConfig::default(),
    );
    TestEngine {
        booking,
        reconciler,
    }
}

fn draft(category: TicketCategory) -> TicketDraft {
    TicketDraft {
        hiker_name: "Ayu Lestari".into(),
        category,
        identification_type: IdentificationType::Nik,
        identification_number: "3507112209900001".into(),
        address: "Malang".into(),
        phone_number: "081234567890".into(),
    }
}

fn create(engine: &TestEngine, domestic: usize, international: usize) -> TransactionId {
    let tickets = std::iter::repeat_with(|| draft(TicketCategory::Domestic))
        .take(domestic)
        .chain(std::iter::repeat_with(|| draft(TicketCategory::International)).take(international))
        .collect();
    engine
        .booking
        .create_transaction(NewBooking {
            user_id: UserId::new(),
            start_date: date!(2026 - 08 - 10),
            end_date: date!(2026 - 08 - 12),
            tickets,
        })
        .unwrap()
        .id
}

fn notification(
    id: TransactionId,
    gateway_ref: &str,
    status: &str,
    amount: Decimal,
) -> PaymentNotification {
    PaymentNotification {
        order_id: id.order_ref(),
        transaction_id: gateway_ref.into(),
        transaction_status: status.into(),
        gross_amount: amount.to_string(),
        transaction_time: OffsetDateTime::now_utc(),
    }
}

/// One externally-triggered action against a single transaction.
#[derive(Debug, Clone)]
enum Op {
    Link,
    Settle,
    Fail,
    Pending,
    Cancel,
    Complete,
    Retry,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Link),
        Just(Op::Settle),
        Just(Op::Fail),
        Just(Op::Pending),
        Just(Op::Cancel),
        Just(Op::Complete),
        Just(Op::Retry),
    ]
}

/// Generate a positive price (1 to 1,000,000 whole units).
fn arb_price() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000i64).prop_map(Decimal::from)
}

/// The edges of the status transition table.
fn is_table_edge(from: TransactionStatus, to: TransactionStatus) -> bool {
    use TransactionStatus::*;
    matches!(
        (from, to),
        (Created, PendingPayment)
            | (PendingPayment, Active)
            | (PendingPayment, Cancelled)
            | (Active, Completed)
            | (Created, Cancelled)
            | (Active, Cancelled)
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// The transaction total is always the sum of the snapshotted unit
    /// prices, whatever the category mix.
    #[test]
    fn total_is_sum_of_snapshots(
        domestic_count in 0usize..6,
        international_count in 0usize..6,
        domestic_price in arb_price(),
        international_price in arb_price(),
    ) {
        prop_assume!(domestic_count + international_count > 0);
        let engine = engine(domestic_price, international_price, 0);
        let id = create(&engine, domestic_count, international_count);

        let view = engine.booking.get(id).unwrap();
        let expected = domestic_price * Decimal::from(domestic_count as i64)
            + international_price * Decimal::from(international_count as i64);
        prop_assert_eq!(view.total_amount, expected);
        prop_assert_eq!(
            view.tickets.iter().map(|t| t.unit_price).sum::<Decimal>(),
            expected
        );
    }

    /// Delivering the same notification N > 1 times ends in the same
    /// state as delivering it once.
    #[test]
    fn webhook_application_is_idempotent(
        replays in 2usize..6,
        settle in prop::bool::ANY,
    ) {
        let status = if settle { "settlement" } else { "expire" };

        let once = engine(Decimal::from(50_000), Decimal::from(75_000), 2);
        let many = engine(Decimal::from(50_000), Decimal::from(75_000), 2);

        let id_once = create(&once, 1, 0);
        let id_many = create(&many, 1, 0);
        rt().block_on(once.reconciler.create_payment_link(id_once)).unwrap();
        rt().block_on(many.reconciler.create_payment_link(id_many)).unwrap();

        let amount = once.booking.get(id_once).unwrap().total_amount;
        once.reconciler
            .handle_webhook(&notification(id_once, "mid-1", status, amount))
            .unwrap();
        for _ in 0..replays {
            many.reconciler
                .handle_webhook(&notification(id_many, "mid-1", status, amount))
                .unwrap();
        }

        let a = once.booking.get(id_once).unwrap();
        let b = many.booking.get(id_many).unwrap();
        prop_assert_eq!(a.status, b.status);
        prop_assert_eq!(a.device_serial.is_some(), b.device_serial.is_some());
    }

    /// Whatever sequence of actions arrives, the status only ever moves
    /// along edges of the transition table, and a rejected action leaves
    /// the status unchanged.
    #[test]
    fn status_only_moves_along_table_edges(ops in prop::collection::vec(arb_op(), 1..25)) {
        let engine = engine(Decimal::from(50_000), Decimal::from(75_000), 4);
        let id = create(&engine, 1, 0);
        let amount = engine.booking.get(id).unwrap().total_amount;

        let mut previous = engine.booking.get(id).unwrap().status;
        for (i, op) in ops.iter().enumerate() {
            let gateway_ref = format!("mid-{i}");
            let result: Result<(), trailpass_rs::BookingError> = match op {
                Op::Link => rt()
                    .block_on(engine.reconciler.create_payment_link(id))
                    .map(|_| ()),
                Op::Settle => engine
                    .reconciler
                    .handle_webhook(&notification(id, &gateway_ref, "settlement", amount))
                    .map(|_| ()),
                Op::Fail => engine
                    .reconciler
                    .handle_webhook(&notification(id, &gateway_ref, "deny", amount))
                    .map(|_| ()),
                Op::Pending => engine
                    .reconciler
                    .handle_webhook(&notification(id, &gateway_ref, "pending", amount))
                    .map(|_| ()),
                Op::Cancel => engine.booking.cancel(id).map(|_| ()),
                Op::Complete => engine
                    .booking
                    .update_status(id, TransactionStatus::Completed)
                    .map(|_| ()),
                Op::Retry => engine.reconciler.retry_activation(id).map(|_| ()),
            };

            let view = engine.booking.get(id).unwrap();
            let current = view.status;
            if result.is_err() {
                prop_assert_eq!(current, previous, "failed op {:?} changed status", op);
            }
            prop_assert!(
                current == previous || is_table_edge(previous, current),
                "illegal transition {} -> {} via {:?}",
                previous,
                current,
                op
            );
            // The device invariant holds at every step.
            prop_assert_eq!(
                current == TransactionStatus::Active,
                view.device_serial.is_some()
            );
            previous = current;
        }
    }

    /// Terminal states absorb every further delivery without change.
    #[test]
    fn terminal_states_are_absorbing(ops in prop::collection::vec(arb_op(), 1..15)) {
        let engine = engine(Decimal::from(50_000), Decimal::from(75_000), 2);
        let id = create(&engine, 1, 0);
        engine.booking.cancel(id).unwrap();

        for (i, op) in ops.iter().enumerate() {
            let gateway_ref = format!("late-{i}");
            let amount = Decimal::from(50_000);
            match op {
                Op::Link => {
                    let _ = rt().block_on(engine.reconciler.create_payment_link(id));
                }
                Op::Settle => {
                    let _ = engine
                        .reconciler
                        .handle_webhook(&notification(id, &gateway_ref, "settlement", amount));
                }
                Op::Fail => {
                    let _ = engine
                        .reconciler
                        .handle_webhook(&notification(id, &gateway_ref, "cancel", amount));
                }
                Op::Pending => {
                    let _ = engine
                        .reconciler
                        .handle_webhook(&notification(id, &gateway_ref, "pending", amount));
                }
                Op::Cancel => {
                    let _ = engine.booking.cancel(id);
                }
                Op::Complete => {
                    let _ = engine.booking.update_status(id, TransactionStatus::Completed);
                }
                Op::Retry => {
                    let _ = engine.reconciler.retry_activation(id);
                }
            }
            prop_assert_eq!(
                engine.booking.get(id).unwrap().status,
                TransactionStatus::Cancelled
            );
        }
    }
}
