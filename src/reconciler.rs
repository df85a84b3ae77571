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

//! Payment reconciliation.
//!
//! Translates gateway notifications into transaction state transitions.
//! The gateway delivers at least once and possibly out of order, so the
//! handler keys every transition on the gateway transaction reference:
//! a reference that already drove a transition is acknowledged and never
//! re-applied, and the reference is recorded under the same transaction
//! lock as the status change.
//!
//! # Processing a notification
//!
//! | Condition | Result |
//! |-----------|--------|
//! | Unknown status / unparseable amount | `Validation` error |
//! | Malformed order reference | `Validation` error |
//! | Unknown order reference | `NotFound` error |
//! | Reference already applied | `Duplicate` ack |
//! | Gross amount ≠ stored total | `FraudSuspected`, state unchanged |
//! | Transaction already terminal | `AlreadySettled` ack |
//! | settlement/capture/success | PENDING_PAYMENT → ACTIVE + device |
//! | expire/cancel/deny | PENDING_PAYMENT → CANCELLED |
//! | pending | `Ignored` ack, nothing recorded |

use crate::alerts::{AlertQueue, OpsAlert};
use crate::assignment::bind_device;
use crate::base::TransactionId;
use crate::device::DeviceRegistry;
use crate::error::BookingError;
use crate::gateway::{PaymentGateway, PaymentNotification};
use crate::store::TransactionStore;
use crate::transaction::{TransactionData, TransactionStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Reconciler tuning.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on the outbound payment-link call.
    pub link_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            link_timeout: Duration::from_secs(10),
        }
    }
}

/// Gateway-facing acknowledgment for a processed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// A state transition was applied.
    Applied { status: TransactionStatus },
    /// The reference (or the whole order) was already applied; no-op.
    Duplicate,
    /// The transaction is already terminal; acknowledged, no transition.
    AlreadySettled,
    /// No transition is defined for the reported status; acknowledged.
    Ignored,
}

/// Reconciles gateway payment state with transaction state.
pub struct PaymentReconciler {
    store: Arc<TransactionStore>,
    registry: Arc<DeviceRegistry>,
    gateway: Arc<dyn PaymentGateway>,
    alerts: Arc<AlertQueue>,
    config: ReconcilerConfig,
}

impl PaymentReconciler {
    pub fn new(
        store: Arc<TransactionStore>,
        registry: Arc<DeviceRegistry>,
        gateway: Arc<dyn PaymentGateway>,
        alerts: Arc<AlertQueue>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            gateway,
            alerts,
            config,
        }
    }

    /// Requests a payment link from the gateway and moves the transaction
    /// CREATED → PENDING_PAYMENT.
    ///
    /// The transaction lock is not held across the gateway call; on any
    /// failure, including timeout, the transaction stays in CREATED so a
    /// retry is safe.
    pub async fn create_payment_link(&self, id: TransactionId) -> Result<String, BookingError> {
        let txn = self.store.expect(id)?;
        let (order_ref, amount) = {
            let data = txn.lock();
            data.ensure_can_request_link()?;
            (id.order_ref(), data.total_amount())
        };

        let url = match timeout(
            self.config.link_timeout,
            self.gateway.create_link(&order_ref, amount),
        )
        .await
        {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                warn!(%id, error = %e, "payment link creation failed");
                return Err(e);
            }
            Err(_) => {
                warn!(%id, timeout = ?self.config.link_timeout, "payment link creation timed out");
                return Err(BookingError::Gateway(format!(
                    "link creation timed out after {:?}",
                    self.config.link_timeout
                )));
            }
        };

        // A cancel may have slipped in while the call was in flight; the
        // guard inside mark_pending rejects it and the state is unchanged.
        let mut data = txn.lock();
        data.mark_pending(order_ref, url.clone())?;
        info!(%id, "transaction awaiting payment");
        Ok(url)
    }

    /// Applies one gateway notification. Safe to call concurrently and
    /// repeatedly for the same event.
    ///
    /// # Errors
    ///
    /// `Validation`/`NotFound` mark a payload the gateway should not have
    /// sent. `FraudSuspected` and `NoDeviceAvailable` report conditions an
    /// operator must look at; in both cases the transaction is unchanged
    /// (still PENDING_PAYMENT) and the reference stays unrecorded, so a
    /// redelivery can finish the job once the condition clears.
    pub fn handle_webhook(
        &self,
        notification: &PaymentNotification,
    ) -> Result<WebhookOutcome, BookingError> {
        let status = notification.status().ok_or_else(|| {
            BookingError::Validation(format!(
                "unknown gateway status '{}'",
                notification.transaction_status
            ))
        })?;
        let reported = notification.amount().ok_or_else(|| {
            BookingError::Validation(format!(
                "unparseable gross amount '{}'",
                notification.gross_amount
            ))
        })?;
        let txn = self.store.resolve_order_ref(&notification.order_id)?;
        let id = txn.id();

        let mut data = txn.lock();

        // At-least-once delivery: a reference that already drove a
        // transition is acknowledged without being re-applied.
        if data.is_applied(&notification.transaction_id) {
            info!(%id, gateway_ref = %notification.transaction_id, "duplicate notification");
            return Ok(WebhookOutcome::Duplicate);
        }

        // Fail safe on amount mismatch: no auto-cancel, no auto-activate.
        if reported != data.total_amount() {
            warn!(
                %id,
                %reported,
                expected = %data.total_amount(),
                "gross amount mismatch"
            );
            return Err(BookingError::FraudSuspected {
                expected: data.total_amount(),
                reported,
            });
        }

        // Settled transactions acknowledge everything so the gateway
        // stops retrying; nothing is ever re-applied.
        if data.status().is_terminal() {
            info!(%id, status = %data.status(), "notification for settled transaction");
            return Ok(WebhookOutcome::AlreadySettled);
        }

        if status.is_success() {
            self.apply_success(&mut data, id, notification)
        } else if status.is_failure() {
            self.apply_failure(&mut data, id, notification)
        } else {
            // "pending" reports no settlement; nothing to apply yet. The
            // reference is left unrecorded because the eventual settlement
            // may reuse it.
            Ok(WebhookOutcome::Ignored)
        }
    }

    fn apply_success(
        &self,
        data: &mut TransactionData,
        id: TransactionId,
        notification: &PaymentNotification,
    ) -> Result<WebhookOutcome, BookingError> {
        match data.status() {
            TransactionStatus::Active => {
                // Same order, fresh gateway reference: duplicate-order
                // replay, acknowledged without a transition.
                info!(%id, gateway_ref = %notification.transaction_id, "order already active");
                Ok(WebhookOutcome::Duplicate)
            }
            TransactionStatus::PendingPayment => {
                match bind_device(&self.registry, data, id) {
                    Ok(serial) => {
                        data.record_applied(&notification.transaction_id);
                        info!(%id, serial, "payment captured; transaction active");
                        Ok(WebhookOutcome::Applied {
                            status: TransactionStatus::Active,
                        })
                    }
                    Err(BookingError::NoDeviceAvailable) => {
                        // Money captured but entry cannot be granted. The
                        // reference stays unrecorded so a redelivery or
                        // retry_activation can complete the activation.
                        error!(%id, "device pool exhausted after capture");
                        self.alerts.push(OpsAlert::DevicePoolExhausted {
                            transaction_id: id,
                        });
                        Err(BookingError::NoDeviceAvailable)
                    }
                    Err(e) => Err(e),
                }
            }
            other => Err(BookingError::InvalidTransition {
                from: other,
                event: "settle",
            }),
        }
    }

    fn apply_failure(
        &self,
        data: &mut TransactionData,
        id: TransactionId,
        notification: &PaymentNotification,
    ) -> Result<WebhookOutcome, BookingError> {
        match data.status() {
            TransactionStatus::PendingPayment => {
                let released = data.cancel()?;
                debug_assert!(released.is_none(), "pending transaction held a device");
                data.record_applied(&notification.transaction_id);
                info!(
                    %id,
                    status = %notification.transaction_status,
                    "payment failed; transaction cancelled"
                );
                Ok(WebhookOutcome::Applied {
                    status: TransactionStatus::Cancelled,
                })
            }
            TransactionStatus::Active => {
                // Captured money is never rolled back on a stray
                // expire/deny; the condition is left for an operator.
                warn!(
                    %id,
                    status = %notification.transaction_status,
                    "failure notification for active transaction ignored"
                );
                Ok(WebhookOutcome::Ignored)
            }
            other => Err(BookingError::InvalidTransition {
                from: other,
                event: "expire",
            }),
        }
    }

    /// Operator retry after a pool-exhausted activation: the payment is
    /// captured and the transaction still sits in PENDING_PAYMENT.
    pub fn retry_activation(&self, id: TransactionId) -> Result<String, BookingError> {
        let txn = self.store.expect(id)?;
        let mut data = txn.lock();
        let serial = bind_device(&self.registry, &mut data, id)?;
        info!(%id, serial, "activation retried");
        Ok(serial)
    }
}
