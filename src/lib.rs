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

//! # Trailpass
//!
//! A hiking-permit booking engine. A customer books a date-bounded
//! transaction covering one or more tickets, pays through an external
//! payment gateway, and is handed a physical tracker device at the entry
//! gate. This crate is the reconciliation core that keeps the three
//! consistent: the transaction lifecycle, the gateway's asynchronous and
//! retrying webhook notifications, and the exclusive assignment of a
//! finite device pool.
//!
//! ## Core Components
//!
//! - [`BookingOrchestrator`]: creates transactions with priced ticket
//!   snapshots and exposes reads and staff status changes
//! - [`PaymentReconciler`]: requests payment links and applies webhook
//!   notifications effectively-once
//! - [`DeviceRegistry`] / [`DeviceAssignment`]: the tracker pool and its
//!   exclusive binding to active transactions
//! - [`TransactionStore`]: shared transaction records, serialized per
//!   transaction
//! - [`BookingError`]: the error taxonomy shared by all components
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use rust_decimal_macros::dec;
//! use time::macros::date;
//! use trailpass_rs::{
//!     AlertQueue, BookingOrchestrator, DeviceAssignment, DeviceRegistry, IdentificationType,
//!     NewBooking, PriceTable, TicketCategory, TicketDraft, TransactionStore, UserId,
//! };
//!
//! let store = Arc::new(TransactionStore::new());
//! let registry = Arc::new(DeviceRegistry::new());
//! let alerts = Arc::new(AlertQueue::new());
//! let pricing = Arc::new(PriceTable::new());
//! pricing.set(TicketCategory::Domestic, dec!(50000));
//!
//! let assignment = Arc::new(DeviceAssignment::new(
//!     store.clone(),
//!     registry.clone(),
//!     alerts.clone(),
//! ));
//! let booking = BookingOrchestrator::new(store, pricing, assignment);
//!
//! let view = booking
//!     .create_transaction(NewBooking {
//!         user_id: UserId::new(),
//!         start_date: date!(2026 - 08 - 10),
//!         end_date: date!(2026 - 08 - 12),
//!         tickets: vec![TicketDraft {
//!             hiker_name: "Ayu Lestari".into(),
//!             category: TicketCategory::Domestic,
//!             identification_type: IdentificationType::Nik,
//!             identification_number: "3507112209900001".into(),
//!             address: "Jl. Semeru 17, Malang".into(),
//!             phone_number: "081234567890".into(),
//!         }],
//!     })
//!     .unwrap();
//! assert_eq!(view.total_amount, dec!(50000));
//! ```
//!
//! ## Thread Safety
//!
//! Webhook deliveries and staff actions for the same transaction
//! serialize on that transaction's mutex; operations on different
//! transactions proceed independently. Device claims are per-device
//! compare-and-swap style, so a pool of size k never has more than k
//! devices in use.

pub mod alerts;
mod assignment;
mod base;
pub mod booking;
mod device;
pub mod error;
mod gateway;
mod pricing;
mod reconciler;
mod store;
mod ticket;
mod transaction;

pub use alerts::{AlertQueue, OpsAlert};
pub use assignment::DeviceAssignment;
pub use base::{TransactionId, UserId};
pub use booking::{BookingOrchestrator, NewBooking, Page, TransactionFilter};
pub use device::{DeviceRegistry, DeviceStatus, DeviceView, TrackerDevice};
pub use error::BookingError;
pub use gateway::{GatewayStatus, PaymentGateway, PaymentNotification, SandboxGateway};
pub use pricing::{PriceTable, PricingService};
pub use reconciler::{PaymentReconciler, ReconcilerConfig, WebhookOutcome};
pub use store::TransactionStore;
pub use ticket::{IdentificationType, Ticket, TicketCategory, TicketDraft};
pub use transaction::{Transaction, TransactionStatus, TransactionView};
