use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use ose_common::MinorUnits;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------      TenantId        --------------------------------------------------------
/// The owner scope of every record in the engine. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TenantId(pub String);

impl Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for TenantId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       OrderId        --------------------------------------------------------
/// Opaque unique order identifier. Minted by [`crate::helpers::new_order_id`] at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     AccessClaims     --------------------------------------------------------
/// The identity and tenant claims yielded by an already-validated session token.
///
/// Token validation happens outside the engine; these claims are all the engine ever consumes. Every read and write
/// is checked against the tenant claim through [`crate::helpers::access::ensure_tenant_access`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub actor: String,
    pub tenant_id: TenantId,
}

impl AccessClaims {
    pub fn new<S: Into<String>, T: Into<TenantId>>(actor: S, tenant_id: T) -> Self {
        Self { actor: actor.into(), tenant_id: tenant_id.into() }
    }
}

//--------------------------------------     OrderStatus      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order has been created but not yet acknowledged by staff.
    Pending,
    /// Staff have acknowledged the order.
    Confirmed,
    /// The kitchen is working on the order.
    Preparing,
    /// The order is ready for hand-over.
    Ready,
    /// The order is done. Terminal.
    Completed,
    /// The order was cancelled. Terminal. Rows are never deleted; cancellation is the soft delete.
    Cancelled,
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "Pending"),
            OrderStatus::Confirmed => write!(f, "Confirmed"),
            OrderStatus::Preparing => write!(f, "Preparing"),
            OrderStatus::Ready => write!(f, "Ready"),
            OrderStatus::Completed => write!(f, "Completed"),
            OrderStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Preparing" => Ok(Self::Preparing),
            "Ready" => Ok(Self::Ready),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// The order status state machine, as a pure transition table.
    ///
    /// | From \ To | Confirmed | Preparing | Ready | Completed | Cancelled |
    /// |-----------|-----------|-----------|-------|-----------|-----------|
    /// | Pending   | ok        | no        | no    | no        | ok        |
    /// | Confirmed | no        | ok        | no    | no        | ok        |
    /// | Preparing | no        | no        | ok    | no        | ok        |
    /// | Ready     | no        | no        | no    | ok        | ok        |
    /// | Completed | no        | no        | no    | no        | no        |
    /// | Cancelled | no        | no        | no    | no        | no        |
    ///
    /// Only the next forward step is admitted; `Cancelled` is reachable from any non-terminal state. A transition to
    /// the current status is rejected (a no-op write would still bump the version).
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Confirmed) => true,
            (Confirmed, Preparing) => true,
            (Preparing, Ready) => true,
            (Ready, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            (_, _) => false,
        }
    }
}

//--------------------------------------      LineItem        --------------------------------------------------------
/// One entry in an order: a catalog item reference, a quantity and the per-item modifications.
///
/// The engine never interprets the catalog item id or the modifications; pricing lives behind
/// [`crate::traits::PriceResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub catalog_item_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub modifications: Vec<String>,
}

impl LineItem {
    pub fn new<S: Into<String>>(catalog_item_id: S, quantity: i64) -> Self {
        Self { catalog_item_id: catalog_item_id.into(), quantity, modifications: Vec::new() }
    }

    pub fn with_modifications(mut self, modifications: Vec<String>) -> Self {
        self.modifications = modifications;
        self
    }
}

//--------------------------------------     WriteOrigin      --------------------------------------------------------
/// Marks whether a write came in live, or was replayed from a client's offline queue after reconnection.
/// The marker flows into the audit payload for downstream auditing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteOrigin {
    #[default]
    Direct,
    OfflineReplay,
}

impl Display for WriteOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteOrigin::Direct => write!(f, "direct"),
            WriteOrigin::OfflineReplay => write!(f, "offline-replay"),
        }
    }
}

//--------------------------------------        Order         --------------------------------------------------------
/// The aggregate root. `version` increases by exactly 1 on every committed mutation; writers race on the version
/// check, never on a held lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub tenant_id: TenantId,
    /// Human-readable sequence number, unique per tenant.
    pub seq_no: i64,
    pub status: OrderStatus,
    pub version: i64,
    pub total_price: MinorUnits,
    pub line_items: Vec<LineItem>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder       --------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub tenant_id: TenantId,
    /// The staff member or client identity submitting the order.
    pub actor: String,
    pub line_items: Vec<LineItem>,
    /// The client-declared total. Validated against the server-side recomputation before anything is persisted.
    pub declared_total: MinorUnits,
    pub metadata: serde_json::Value,
    pub origin: WriteOrigin,
}

impl NewOrder {
    pub fn new<T: Into<TenantId>, S: Into<String>>(
        tenant_id: T,
        actor: S,
        line_items: Vec<LineItem>,
        declared_total: MinorUnits,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor: actor.into(),
            line_items,
            declared_total,
            metadata: serde_json::json!({}),
            origin: WriteOrigin::Direct,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_origin(mut self, origin: WriteOrigin) -> Self {
        self.origin = origin;
        self
    }
}

//--------------------------------------     OrderChange      --------------------------------------------------------
/// The mutable, non-status fields of an order. Only fields that are `Some` are written.
#[derive(Debug, Clone, Default)]
pub struct OrderChange {
    pub line_items: Option<Vec<LineItem>>,
    pub total_price: Option<MinorUnits>,
    pub metadata: Option<serde_json::Value>,
}

impl OrderChange {
    pub fn is_empty(&self) -> bool {
        self.line_items.is_none() && self.total_price.is_none() && self.metadata.is_none()
    }
}

//--------------------------------------    AuditEventType    --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum AuditEventType {
    StatusChange,
    OrderChange,
    PaymentAttempt,
    PaymentResult,
}

impl Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditEventType::StatusChange => write!(f, "StatusChange"),
            AuditEventType::OrderChange => write!(f, "OrderChange"),
            AuditEventType::PaymentAttempt => write!(f, "PaymentAttempt"),
            AuditEventType::PaymentResult => write!(f, "PaymentResult"),
        }
    }
}

//--------------------------------------      AuditEntry      --------------------------------------------------------
/// One append-only audit record. Written in the same transaction as the order mutation it describes; the
/// `audit_log` table carries triggers that abort any UPDATE or DELETE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub order_id: OrderId,
    pub tenant_id: TenantId,
    pub event_type: AuditEventType,
    pub actor: String,
    /// The order version this entry accompanies. Entries for one order are totally ordered by this field.
    pub order_version: i64,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    NewAuditEntry     --------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub event_type: AuditEventType,
    pub actor: String,
    pub payload: serde_json::Value,
}

impl NewAuditEntry {
    pub fn status_change<S: Into<String>>(actor: S, payload: serde_json::Value) -> Self {
        Self { event_type: AuditEventType::StatusChange, actor: actor.into(), payload }
    }

    pub fn order_change<S: Into<String>>(actor: S, payload: serde_json::Value) -> Self {
        Self { event_type: AuditEventType::OrderChange, actor: actor.into(), payload }
    }

    pub fn payment_attempt<S: Into<String>>(actor: S, payload: serde_json::Value) -> Self {
        Self { event_type: AuditEventType::PaymentAttempt, actor: actor.into(), payload }
    }

    pub fn payment_result<S: Into<String>>(actor: S, payload: serde_json::Value) -> Self {
        Self { event_type: AuditEventType::PaymentResult, actor: actor.into(), payload }
    }
}

//-------------------------------------- PaymentOutcomeStatus -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentOutcomeStatus {
    Initiated,
    Processing,
    Success,
    Failed,
    Refunded,
}

impl Display for PaymentOutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentOutcomeStatus::Initiated => write!(f, "Initiated"),
            PaymentOutcomeStatus::Processing => write!(f, "Processing"),
            PaymentOutcomeStatus::Success => write!(f, "Success"),
            PaymentOutcomeStatus::Failed => write!(f, "Failed"),
            PaymentOutcomeStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl PaymentOutcomeStatus {
    /// Terminal outcomes are never overwritten; a retried attempt with the same idempotency key returns the stored
    /// record as-is.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentOutcomeStatus::Success | PaymentOutcomeStatus::Failed | PaymentOutcomeStatus::Refunded)
    }
}

//-------------------------------------- PaymentAuditRecord   -------------------------------------------------------
/// The monetary specialization of the audit trail, keyed by the caller-supplied idempotency key.
///
/// The row's `outcome` and `provider_txn_id` advance in place as the attempt progresses; rows are never deleted.
/// Every advance also appends an immutable [`AuditEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAuditRecord {
    pub id: i64,
    pub order_id: OrderId,
    pub tenant_id: TenantId,
    pub idempotency_key: String,
    pub method: String,
    pub provider_txn_id: Option<String>,
    pub amount: MinorUnits,
    pub outcome: PaymentOutcomeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//-------------------------------------- NewPaymentAttempt    -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentAttempt {
    pub order_id: OrderId,
    pub tenant_id: TenantId,
    pub idempotency_key: String,
    pub method: String,
    pub amount: MinorUnits,
}

impl NewPaymentAttempt {
    pub fn new<K: Into<String>, M: Into<String>>(
        order: &Order,
        idempotency_key: K,
        method: M,
        amount: MinorUnits,
    ) -> Self {
        Self {
            order_id: order.order_id.clone(),
            tenant_id: order.tenant_id.clone(),
            idempotency_key: idempotency_key.into(),
            method: method.into(),
            amount,
        }
    }
}

//--------------------------------------    WebhookStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum WebhookStatus {
    Pending,
    Success,
    /// Retries exhausted. The event is kept for manual reconciliation, never silently dropped.
    Failed,
}

impl Display for WebhookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookStatus::Pending => write!(f, "Pending"),
            WebhookStatus::Success => write!(f, "Success"),
            WebhookStatus::Failed => write!(f, "Failed"),
        }
    }
}

//--------------------------------------     WebhookEvent     --------------------------------------------------------
/// One inbound payment-provider callback. The provider-assigned `event_id` is the deduplication key; the same id
/// processed any number of times produces exactly one application-visible effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: i64,
    pub event_id: String,
    pub tenant_id: TenantId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: WebhookStatus,
    pub attempts: i64,
    /// Unix milliseconds. The worker only picks the event up once this instant has passed.
    pub next_attempt_at: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   NewWebhookEvent    --------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub event_id: String,
    pub tenant_id: TenantId,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl NewWebhookEvent {
    pub fn new<E: Into<String>, T: Into<TenantId>, K: Into<String>>(
        event_id: E,
        tenant_id: T,
        event_type: K,
        payload: serde_json::Value,
    ) -> Self {
        Self { event_id: event_id.into(), tenant_id: tenant_id.into(), event_type: event_type.into(), payload }
    }
}

//-------------------------------------- PaymentOutcomePayload ------------------------------------------------------
/// The parsed body of a payment-provider callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcomePayload {
    pub order_id: OrderId,
    pub idempotency_key: String,
    pub provider_txn_id: String,
    pub success: bool,
    pub amount: MinorUnits,
}
