//! REST API demo for the booking engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /transactions` - Create a booking with ticket drafts
//! - `GET /transactions` - Paginated listing (`page`, `size`, `status`)
//! - `GET /transactions/{id}` - Get a booking by id
//! - `POST /transactions/{id}/cancel` - Explicit cancellation
//! - `PATCH /transactions/{id}/status` - Staff status change
//! - `POST /payments/{id}/create-payment-link` - Request a payment URL
//! - `POST /payments/{id}/retry-activation` - Operator retry after pool exhaustion
//! - `POST /payments/notification` - Gateway webhook
//! - `POST /tracker-devices` - Register a device
//! - `GET /tracker-devices` - List the pool
//!
//! ## Example Usage
//!
//! ```bash
//! # Create a booking
//! curl -X POST http://localhost:3000/transactions \
//!   -H "Content-Type: application/json" \
//!   -d '{"user_id": "c0a80101-0000-4000-8000-000000000001",
//!        "start_date": "2026-08-10", "end_date": "2026-08-12",
//!        "tickets": [{"hiker_name": "Ayu Lestari", "category": "domestic",
//!                     "identification_type": "nik",
//!                     "identification_number": "3507112209900001",
//!                     "address": "Malang", "phone_number": "081234567890"}]}'
//!
//! # Simulate the gateway webhook
//! curl -X POST http://localhost:3000/payments/notification \
//!   -H "Content-Type: application/json" \
//!   -d '{"order_id": "<transaction id>", "transaction_id": "mid-1",
//!        "transaction_status": "settlement", "gross_amount": "50000",
//!        "transaction_time": "2026-08-04T10:00:00Z"}'
//! ```

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use trailpass_rs::{
    AlertQueue, BookingError, BookingOrchestrator, DeviceAssignment, DeviceRegistry, DeviceView,
    NewBooking, Page, PaymentNotification, PaymentReconciler, PriceTable, ReconcilerConfig,
    SandboxGateway, TicketCategory, TransactionFilter, TransactionId, TransactionStatus,
    TransactionStore, TransactionView, WebhookOutcome,
};
use uuid::Uuid;

// === Application State ===

/// Shared application state wiring the engine components.
#[derive(Clone)]
pub struct AppState {
    booking: Arc<BookingOrchestrator>,
    reconciler: Arc<PaymentReconciler>,
    registry: Arc<DeviceRegistry>,
}

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: TransactionStatus,
}

#[derive(Debug, Deserialize)]
pub struct DeviceRequest {
    pub serial_number: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<usize>,
    pub size: Option<usize>,
    pub status: Option<TransactionStatus>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub payment_url: String,
}

/// Acknowledgment body for the webhook endpoint.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Error Handling ===

/// Wrapper converting `BookingError` into HTTP responses.
pub struct AppError(BookingError);

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            BookingError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            BookingError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            BookingError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            BookingError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            BookingError::NoDeviceAvailable => (StatusCode::CONFLICT, "NO_DEVICE_AVAILABLE"),
            BookingError::FraudSuspected { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "AMOUNT_MISMATCH")
            }
            BookingError::PricingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PRICING_UNAVAILABLE")
            }
            BookingError::Gateway(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /transactions - Create a booking.
async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<NewBooking>,
) -> Result<(StatusCode, Json<TransactionView>), AppError> {
    let view = state.booking.create_transaction(request)?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /transactions - Paginated, filtered listing.
async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<TransactionView>>, AppError> {
    let filter = TransactionFilter {
        user_id: params.user_id.map(trailpass_rs::UserId),
        status: params.status,
    };
    let page = state
        .booking
        .list(filter, params.page.unwrap_or(1), params.size.unwrap_or(20))?;
    Ok(Json(page))
}

/// GET /transactions/{id} - Get a booking by id.
async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionView>, AppError> {
    Ok(Json(state.booking.get(TransactionId(id))?))
}

/// POST /transactions/{id}/cancel - Explicit cancellation.
async fn cancel_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionView>, AppError> {
    Ok(Json(state.booking.cancel(TransactionId(id))?))
}

/// PATCH /transactions/{id}/status - Staff status change.
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<TransactionView>, AppError> {
    Ok(Json(
        state.booking.update_status(TransactionId(id), request.status)?,
    ))
}

/// POST /payments/{id}/create-payment-link - Request a payment URL.
async fn create_payment_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LinkResponse>, AppError> {
    let payment_url = state.reconciler.create_payment_link(TransactionId(id)).await?;
    Ok(Json(LinkResponse { payment_url }))
}

/// POST /payments/{id}/retry-activation - Operator retry.
async fn retry_activation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionView>, AppError> {
    state.reconciler.retry_activation(TransactionId(id))?;
    Ok(Json(state.booking.get(TransactionId(id))?))
}

/// POST /payments/notification - Gateway webhook.
///
/// The gateway retries on anything but a success response, so only a
/// malformed payload or an unknown order reference answers with an error
/// status. Every other condition is acknowledged with 200 after being
/// logged; the reconciler has already left the transaction untouched.
async fn webhook_notification(
    State(state): State<AppState>,
    Json(notification): Json<PaymentNotification>,
) -> Response {
    match state.reconciler.handle_webhook(&notification) {
        Ok(outcome) => (
            StatusCode::OK,
            Json(WebhookAck {
                status: "ok",
                outcome,
            }),
        )
            .into_response(),
        Err(e @ (BookingError::Validation(_) | BookingError::NotFound(_))) => {
            AppError(e).into_response()
        }
        Err(e) => {
            tracing::error!(order_id = %notification.order_id, error = %e, "webhook recorded without transition");
            (
                StatusCode::OK,
                Json(WebhookAck {
                    status: "ok",
                    outcome: WebhookOutcome::Ignored,
                }),
            )
                .into_response()
        }
    }
}

/// POST /tracker-devices - Register a device.
async fn register_device(
    State(state): State<AppState>,
    Json(request): Json<DeviceRequest>,
) -> Result<StatusCode, AppError> {
    state.registry.register(&request.serial_number)?;
    Ok(StatusCode::CREATED)
}

/// GET /tracker-devices - List the pool with holders.
async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceView>> {
    Json(state.registry.list())
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/transactions", post(create_transaction).get(list_transactions))
        .route("/transactions/{id}", get(get_transaction))
        .route("/transactions/{id}/cancel", post(cancel_transaction))
        .route("/transactions/{id}/status", patch(update_status))
        .route("/payments/{id}/create-payment-link", post(create_payment_link))
        .route("/payments/{id}/retry-activation", post(retry_activation))
        .route("/payments/notification", post(webhook_notification))
        .route("/tracker-devices", post(register_device).get(list_devices))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let store = Arc::new(TransactionStore::new());
    let registry = Arc::new(DeviceRegistry::new());
    let alerts = Arc::new(AlertQueue::new());
    let pricing = Arc::new(PriceTable::new());
    pricing.set(TicketCategory::Domestic, dec!(50000));
    pricing.set(TicketCategory::International, dec!(150000));
    for n in 1..=8 {
        let _ = registry.register(&format!("T{n:03}"));
    }

    let assignment = Arc::new(DeviceAssignment::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&alerts),
    ));
    let booking = Arc::new(BookingOrchestrator::new(
        Arc::clone(&store),
        pricing,
        assignment,
    ));
    let reconciler = Arc::new(PaymentReconciler::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::new(SandboxGateway),
        Arc::clone(&alerts),
        ReconcilerConfig::default(),
    ));

    let state = AppState {
        booking,
        reconciler,
        registry,
    };
    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Trailpass API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST  /transactions                       - Create a booking");
    println!("  GET   /transactions                       - List bookings");
    println!("  GET   /transactions/:id                   - Get a booking");
    println!("  POST  /transactions/:id/cancel            - Cancel a booking");
    println!("  PATCH /transactions/:id/status            - Staff status change");
    println!("  POST  /payments/:id/create-payment-link   - Request a payment URL");
    println!("  POST  /payments/:id/retry-activation      - Retry device binding");
    println!("  POST  /payments/notification              - Gateway webhook");
    println!("  POST  /tracker-devices                    - Register a device");
    println!("  GET   /tracker-devices                    - List devices");

    axum::serve(listener, app).await.unwrap();
}
