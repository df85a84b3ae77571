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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use trailpass_rs::{
    AlertQueue, DeviceRegistry, IdentificationType, PaymentNotification, PaymentReconciler,
    ReconcilerConfig, SandboxGateway, Ticket, TicketCategory, Transaction, TransactionId,
    TransactionStore, UserId,
};
use uuid::Uuid;

/// Reconciliation replay - dry-run a gateway notification export
///
/// Seeds a tracker-device pool, loads a booking snapshot from a CSV file,
/// replays a gateway notification export against it, and writes the
/// reconciled transaction states to stdout.
#[derive(Parser, Debug)]
#[command(name = "trailpass-rs")]
#[command(about = "Replays gateway notifications against a booking snapshot", long_about = None)]
struct Args {
    /// Path to the bookings CSV
    ///
    /// Expected format: order_id,user_id,start_date,end_date,category,hikers,unit_price
    #[arg(value_name = "BOOKINGS")]
    bookings: PathBuf,

    /// Path to the gateway notification export CSV
    ///
    /// Expected format: order_id,transaction_id,transaction_status,gross_amount,transaction_time
    #[arg(value_name = "NOTIFICATIONS")]
    notifications: PathBuf,

    /// Number of tracker devices to seed (serials T001, T002, ...)
    #[arg(long, default_value_t = 32)]
    devices: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let bookings = match File::open(&args.bookings) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.bookings.display(), e);
            process::exit(1);
        }
    };
    let notifications = match File::open(&args.notifications) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.notifications.display(), e);
            process::exit(1);
        }
    };

    let engine = ReplayEngine::new(args.devices);
    if let Err(e) = engine.load_bookings(BufReader::new(bookings)).await {
        eprintln!("Error loading bookings: {}", e);
        process::exit(1);
    }
    if let Err(e) = engine.replay_notifications(BufReader::new(notifications)) {
        eprintln!("Error replaying notifications: {}", e);
        process::exit(1);
    }
    if let Err(e) = engine.write_states(std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
    for alert in engine.alerts.drain() {
        eprintln!("operator attention required: {:?}", alert);
    }
}

/// Raw CSV record for one booking.
///
/// Fields: `order_id, user_id, start_date, end_date, category, hikers, unit_price`
#[derive(Debug, Deserialize)]
struct BookingRecord {
    order_id: String,
    user_id: String,
    start_date: String,
    end_date: String,
    category: String,
    hikers: u32,
    unit_price: Decimal,
}

impl BookingRecord {
    /// Converts the record to a transaction in CREATED.
    ///
    /// Returns `None` for rows with unparseable ids, dates, or category.
    fn into_transaction(self) -> Option<Transaction> {
        let format = format_description!("[year]-[month]-[day]");
        let id = TransactionId::from_order_ref(&self.order_id)?;
        let user_id = UserId(Uuid::parse_str(self.user_id.trim()).ok()?);
        let start_date = Date::parse(self.start_date.trim(), &format).ok()?;
        let end_date = Date::parse(self.end_date.trim(), &format).ok()?;
        let category = match self.category.trim().to_ascii_lowercase().as_str() {
            "domestic" | "wni" => TicketCategory::Domestic,
            "international" | "wna" => TicketCategory::International,
            _ => return None,
        };
        if self.hikers == 0 {
            return None;
        }

        let tickets = (1..=self.hikers)
            .map(|n| Ticket {
                hiker_name: format!("hiker-{n}"),
                category,
                identification_type: IdentificationType::Nik,
                identification_number: "0000000000000000".into(),
                address: "unknown".into(),
                phone_number: "unknown".into(),
                unit_price: self.unit_price,
            })
            .collect();

        Some(Transaction::with_id(id, user_id, start_date, end_date, tickets))
    }
}

/// Raw CSV record for one gateway notification.
///
/// Fields: `order_id, transaction_id, transaction_status, gross_amount, transaction_time`
#[derive(Debug, Deserialize)]
struct NotificationRecord {
    order_id: String,
    transaction_id: String,
    transaction_status: String,
    gross_amount: String,
    transaction_time: String,
}

impl NotificationRecord {
    fn into_notification(self) -> Option<PaymentNotification> {
        let transaction_time =
            OffsetDateTime::parse(self.transaction_time.trim(), &Rfc3339).ok()?;
        Some(PaymentNotification {
            order_id: self.order_id,
            transaction_id: self.transaction_id,
            transaction_status: self.transaction_status,
            gross_amount: self.gross_amount,
            transaction_time,
        })
    }
}

/// Output row: one reconciled transaction state.
#[derive(Debug, Serialize)]
struct StateRecord {
    id: String,
    user: String,
    status: String,
    device: Option<String>,
    total: Decimal,
}

struct ReplayEngine {
    store: Arc<TransactionStore>,
    alerts: Arc<AlertQueue>,
    reconciler: PaymentReconciler,
}

impl ReplayEngine {
    fn new(devices: usize) -> Self {
        let store = Arc::new(TransactionStore::new());
        let registry = Arc::new(DeviceRegistry::new());
        let alerts = Arc::new(AlertQueue::new());
        for n in 1..=devices {
            // Seeded serials are sequential, so registration cannot clash.
            if let Err(e) = registry.register(&format!("T{n:03}")) {
                eprintln!("Skipping device seed {n}: {e}");
            }
        }
        let reconciler = PaymentReconciler::new(
            Arc::clone(&store),
            registry,
            Arc::new(SandboxGateway),
            Arc::clone(&alerts),
            ReconcilerConfig::default(),
        );
        Self {
            store,
            alerts,
            reconciler,
        }
    }

    /// Loads bookings and walks each to PENDING_PAYMENT via a sandbox
    /// payment link, mirroring the state they had when the notification
    /// export was taken. Malformed rows are skipped.
    async fn load_bookings<R: Read>(&self, reader: R) -> Result<(), csv::Error> {
        let mut rdr = ReaderBuilder::new()
            .trim(Trim::All)
            .has_headers(true)
            .from_reader(reader);

        for result in rdr.deserialize::<BookingRecord>() {
            match result {
                Ok(record) => {
                    let Some(transaction) = record.into_transaction() else {
                        eprintln!("Skipping invalid booking record");
                        continue;
                    };
                    let id = transaction.id();
                    if let Err(e) = self.store.insert(transaction) {
                        eprintln!("Skipping booking {}: {}", id, e);
                        continue;
                    }
                    if let Err(e) = self.reconciler.create_payment_link(id).await {
                        eprintln!("Skipping booking {}: {}", id, e);
                    }
                }
                Err(e) => {
                    eprintln!("Skipping malformed booking row: {}", e);
                    continue;
                }
            }
        }
        Ok(())
    }

    /// Replays the notification export in file order. Reconciliation
    /// errors are reported and do not stop the replay.
    fn replay_notifications<R: Read>(&self, reader: R) -> Result<(), csv::Error> {
        let mut rdr = ReaderBuilder::new()
            .trim(Trim::All)
            .has_headers(true)
            .from_reader(reader);

        for result in rdr.deserialize::<NotificationRecord>() {
            match result {
                Ok(record) => {
                    let Some(notification) = record.into_notification() else {
                        eprintln!("Skipping invalid notification record");
                        continue;
                    };
                    if let Err(e) = self.reconciler.handle_webhook(&notification) {
                        eprintln!(
                            "Notification for order {} not applied: {}",
                            notification.order_id, e
                        );
                    }
                }
                Err(e) => {
                    eprintln!("Skipping malformed notification row: {}", e);
                    continue;
                }
            }
        }
        Ok(())
    }

    /// Writes the reconciled transaction states as CSV, sorted by id.
    fn write_states<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = Writer::from_writer(writer);

        let mut views: Vec<_> = self.store.all().iter().map(|t| t.view()).collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));

        for view in views {
            wtr.serialize(StateRecord {
                id: view.id.to_string(),
                user: view.user_id.to_string(),
                status: view.status.to_string(),
                device: view.device_serial,
                total: view.total_amount,
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}
