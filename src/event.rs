//! Audit trail entries recorded on every deal mutation.
//!
//! Domain events use adjacently tagged serde (`"type"` + `"data"`) so the
//! persisted log stays readable and forward compatible.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::command::DealCommand;
use crate::deal::DealPayload;
use crate::handover::HandoverCredential;

/// The role responsible for an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    /// The seller who owns the deal.
    #[default]
    Dealer,
    /// The counterparty paying for the item.
    Buyer,
    /// Platform staff at the pickup centre.
    Agent,
}

impl Actor {
    /// Return the display label for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dealer => "Dealer",
            Self::Buyer => "Buyer",
            Self::Agent => "Agent",
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain events produced by the deal state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DealEvent {
    /// The draft was created. Carries everything needed to rebuild the deal.
    Created {
        deal_id: String,
        terms: DealPayload,
        credential: HandoverCredential,
    },
    /// A quotation number was assigned.
    QuotationGenerated { quotation_no: String },
    /// The deal was sent to the buyer.
    SentToBuyer,
    /// The buyer accepted the quotation.
    ConfirmedByBuyer,
    /// Payment cleared and funds are held in escrow.
    PaymentSucceeded { invoice_no: String, order_id: String },
    /// Payment failed; the deal awaits another attempt.
    PaymentFailed,
    /// The item is ready for handover.
    MarkedReady,
    /// The handover credential was verified by an agent.
    HandoverConfirmed,
    /// Escrow was released to the dealer.
    Released,
    /// Held funds were returned to the buyer.
    Refunded,
    /// The deal was cancelled.
    Cancelled,
    /// The deal lapsed.
    Expired,
}

impl DealEvent {
    /// Human-readable description used in timelines.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Created { .. } => "Deal created",
            Self::QuotationGenerated { .. } => "Quotation generated",
            Self::SentToBuyer => "Sent to buyer",
            Self::ConfirmedByBuyer => "Buyer confirmed",
            Self::PaymentSucceeded { .. } => "Payment successful",
            Self::PaymentFailed => "Payment failed",
            Self::MarkedReady => "Item ready for handover",
            Self::HandoverConfirmed => "Handover confirmed",
            Self::Released => "Escrow released",
            Self::Refunded => "Refunded",
            Self::Cancelled => "Cancelled",
            Self::Expired => "Expired",
        }
    }

    /// The command that produces this event.
    ///
    /// `None` for [`DealEvent::Created`], which only
    /// [`Deal::draft`](crate::Deal::draft) records.
    pub fn command(&self) -> Option<DealCommand> {
        let command = match self {
            Self::Created { .. } => return None,
            Self::QuotationGenerated { .. } => DealCommand::GenerateQuotation,
            Self::SentToBuyer => DealCommand::SendToBuyer,
            Self::ConfirmedByBuyer => DealCommand::ConfirmByBuyer,
            Self::PaymentSucceeded { .. } => DealCommand::PaySuccess,
            Self::PaymentFailed => DealCommand::PayFail,
            Self::MarkedReady => DealCommand::MarkReady,
            Self::HandoverConfirmed => DealCommand::ConfirmHandover,
            Self::Released => DealCommand::MarkReleased,
            Self::Refunded => DealCommand::Refund,
            Self::Cancelled => DealCommand::Cancel,
            Self::Expired => DealCommand::Expire,
        };
        Some(command)
    }
}

/// One entry of a deal's append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// When the event was recorded.
    pub at: Timestamp,
    /// Who caused it.
    pub actor: Actor,
    /// What happened.
    pub event: DealEvent,
    /// Correlation ID from the command context, if provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl RecordedEvent {
    /// Record `event` at `at` on behalf of `actor`.
    pub fn new(at: Timestamp, actor: Actor, event: DealEvent) -> Self {
        Self {
            at,
            actor,
            event,
            correlation_id: None,
        }
    }

    /// Attach a correlation ID.
    pub fn with_correlation_id(mut self, id: Option<String>) -> Self {
        self.correlation_id = id;
        self
    }

    /// Shorthand for `self.event.action()`.
    pub fn action(&self) -> &'static str {
        self.event.action()
    }
}
