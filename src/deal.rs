//! Deal aggregate -- one negotiated sale tracked through escrow.
//!
//! The event log is the source of truth. Every other field is a cache
//! derived by folding [`RecordedEvent`]s through [`Deal::apply`], which is
//! why [`Deal::replay`] can rebuild a deal from its log alone.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::command::{CommandContext, DealCommand};
use crate::error::{DealError, ValidationError};
use crate::event::{Actor, DealEvent, RecordedEvent};
use crate::handover::{HandoverCredential, VerificationState};
use crate::status::{self, DealStatus, TransitionPolicy};

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Buyer contact details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub name: String,
    pub phone: String,
    pub email: String,
}

/// A pickup centre where the handover takes place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupCenter {
    pub id: String,
    pub name: String,
    pub address: String,
}

/// How the item reaches the buyer.
///
/// Collection at a centre always names the centre.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "pickup_center", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Handover {
    /// Collected by the buyer at a pickup centre.
    Centre(PickupCenter),
    /// Shipped to the buyer.
    #[default]
    Delivery,
}

impl Handover {
    /// The pickup centre, when collection happens at one.
    pub fn pickup_center(&self) -> Option<&PickupCenter> {
        match self {
            Self::Centre(center) => Some(center),
            Self::Delivery => None,
        }
    }
}

/// Everything the dealer supplies when creating a draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealPayload {
    pub title: String,
    pub quantity: u32,
    /// Price per unit in the minor currency unit.
    pub unit_price: u64,
    pub buyer: Buyer,
    pub handover: Handover,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub images: Vec<String>,
}

impl DealPayload {
    /// Check the required commercial fields.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, checking title,
    /// quantity, total, buyer contact, images and pickup centre in that
    /// order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.quantity == 0 {
            return Err(ValidationError::ZeroQuantity);
        }
        if u64::from(self.quantity)
            .checked_mul(self.unit_price)
            .is_none()
        {
            return Err(ValidationError::TotalOverflow);
        }
        for (field, value) in [
            ("name", &self.buyer.name),
            ("phone", &self.buyer.phone),
            ("email", &self.buyer.email),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingBuyerField { field });
            }
        }
        if self.images.iter().all(|img| img.trim().is_empty()) {
            return Err(ValidationError::NoImages);
        }
        if let Handover::Centre(center) = &self.handover
            && (center.id.trim().is_empty() || center.name.trim().is_empty())
        {
            return Err(ValidationError::EmptyPickupCenter);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

fn id_suffix(deal_id: &str) -> &str {
    deal_id.strip_prefix("DL-").unwrap_or(deal_id)
}

/// Quotation number for `deal_id`.
pub fn quotation_number(deal_id: &str) -> String {
    format!("QUO-{}", id_suffix(deal_id))
}

/// Invoice number for `deal_id`.
pub fn invoice_number(deal_id: &str) -> String {
    format!("INV-{}", id_suffix(deal_id))
}

/// Order id for `deal_id`.
pub fn order_number(deal_id: &str) -> String {
    format!("ORD-{}", id_suffix(deal_id))
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A deal and its full audit trail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: u64,
    pub buyer: Buyer,
    pub handover: Handover,
    pub notes: Option<String>,
    pub images: Vec<String>,
    pub status: DealStatus,
    pub credential: HandoverCredential,
    pub quotation_no: Option<String>,
    pub invoice_no: Option<String>,
    pub order_id: Option<String>,
    pub events: Vec<RecordedEvent>,
}

impl Deal {
    /// Build a new draft from a validated payload.
    ///
    /// The handover credential is derived from `deal_id` and `otp` here and
    /// never again.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the payload is incomplete. No deal is
    /// constructed in that case.
    pub fn draft(
        deal_id: String,
        payload: DealPayload,
        otp: String,
        at: Timestamp,
        ctx: &CommandContext,
    ) -> Result<Self, ValidationError> {
        payload.validate()?;
        let credential = HandoverCredential::new(&deal_id, otp);
        let seed = RecordedEvent::new(
            at,
            ctx.actor.unwrap_or(Actor::Dealer),
            DealEvent::Created {
                deal_id,
                terms: payload,
                credential,
            },
        )
        .with_correlation_id(ctx.correlation_id.clone());
        Ok(Self::default().apply(&seed))
    }

    /// Quantity times unit price. Never stored.
    pub fn total(&self) -> u64 {
        u64::from(self.quantity).saturating_mul(self.unit_price)
    }

    /// Timestamp of the seed event.
    pub fn created_at(&self) -> Timestamp {
        self.events.first().map(|e| e.at).unwrap_or_default()
    }

    /// Timestamp of the most recent event.
    pub fn updated_at(&self) -> Timestamp {
        self.events.last().map(|e| e.at).unwrap_or_default()
    }

    /// The pickup centre, when the handover happens at one.
    pub fn pickup_center(&self) -> Option<&PickupCenter> {
        self.handover.pickup_center()
    }

    /// Whether an agent has confirmed the handover.
    pub fn verification(&self) -> VerificationState {
        if self
            .events
            .iter()
            .any(|e| matches!(e.event, DealEvent::HandoverConfirmed))
        {
            VerificationState::Verified
        } else {
            VerificationState::Unverified
        }
    }

    /// Decide which events `command` produces against the current state.
    ///
    /// Returns `Ok(vec![])` when the command is a no-op: a quotation that
    /// already exists, or (under [`TransitionPolicy::Recorded`]) an exit
    /// from a terminal status.
    ///
    /// # Errors
    ///
    /// Under [`TransitionPolicy::Guarded`]:
    /// * [`DealError::InvalidTransition`] -- the command is not legal from
    ///   the current status.
    /// * [`DealError::HandoverNotVerified`] -- release was requested before
    ///   an agent confirmed the handover.
    pub fn handle(
        &self,
        command: DealCommand,
        policy: TransitionPolicy,
    ) -> Result<Vec<DealEvent>, DealError> {
        if command == DealCommand::GenerateQuotation && self.quotation_no.is_some() {
            return Ok(vec![]);
        }
        if policy == TransitionPolicy::Recorded && !status::is_allowed(policy, command, self.status)
        {
            return Ok(vec![]);
        }
        self.guard(command, policy)?;

        let event = match command {
            DealCommand::GenerateQuotation => DealEvent::QuotationGenerated {
                quotation_no: quotation_number(&self.id),
            },
            DealCommand::SendToBuyer => DealEvent::SentToBuyer,
            DealCommand::ConfirmByBuyer => DealEvent::ConfirmedByBuyer,
            DealCommand::PaySuccess => DealEvent::PaymentSucceeded {
                invoice_no: self
                    .invoice_no
                    .clone()
                    .unwrap_or_else(|| invoice_number(&self.id)),
                order_id: self
                    .order_id
                    .clone()
                    .unwrap_or_else(|| order_number(&self.id)),
            },
            DealCommand::PayFail => DealEvent::PaymentFailed,
            DealCommand::MarkReady => DealEvent::MarkedReady,
            DealCommand::ConfirmHandover => DealEvent::HandoverConfirmed,
            DealCommand::MarkReleased => DealEvent::Released,
            DealCommand::Refund => DealEvent::Refunded,
            DealCommand::Cancel => DealEvent::Cancelled,
            DealCommand::Expire => DealEvent::Expired,
        };
        Ok(vec![event])
    }

    /// Check an event produced outside [`handle`](Deal::handle) before it
    /// is folded in.
    ///
    /// The event passes the same checks as the command that produces it.
    ///
    /// # Errors
    ///
    /// * [`DealError::AlreadyCreated`] -- `event` is a `Created` event.
    /// * [`DealError::InvalidTransition`] -- the producing command is not
    ///   legal from the current status under `policy`.
    /// * [`DealError::HandoverNotVerified`] -- a guarded release before the
    ///   handover was confirmed.
    pub fn admit(&self, event: &DealEvent, policy: TransitionPolicy) -> Result<(), DealError> {
        let command = event.command().ok_or(DealError::AlreadyCreated)?;
        self.guard(command, policy)
    }

    fn guard(&self, command: DealCommand, policy: TransitionPolicy) -> Result<(), DealError> {
        if !status::is_allowed(policy, command, self.status) {
            return Err(DealError::InvalidTransition {
                from: self.status,
                command,
            });
        }
        if policy == TransitionPolicy::Guarded
            && command == DealCommand::MarkReleased
            && self.verification() == VerificationState::Unverified
        {
            return Err(DealError::HandoverNotVerified);
        }
        Ok(())
    }

    /// Fold one recorded event into the deal and append it to the log.
    pub fn apply(mut self, recorded: &RecordedEvent) -> Self {
        match &recorded.event {
            DealEvent::Created {
                deal_id,
                terms,
                credential,
            } => {
                self.id = deal_id.clone();
                self.title = terms.title.clone();
                self.quantity = terms.quantity;
                self.unit_price = terms.unit_price;
                self.buyer = terms.buyer.clone();
                self.handover = terms.handover.clone();
                self.notes = terms.notes.clone();
                self.images = terms.images.clone();
                self.credential = credential.clone();
                self.status = DealStatus::Draft;
            }
            DealEvent::QuotationGenerated { quotation_no } => {
                self.quotation_no.get_or_insert_with(|| quotation_no.clone());
            }
            DealEvent::SentToBuyer | DealEvent::PaymentFailed => {
                self.status = DealStatus::Sent;
            }
            DealEvent::ConfirmedByBuyer => self.status = DealStatus::Paid,
            DealEvent::PaymentSucceeded {
                invoice_no,
                order_id,
            } => {
                // Identifiers are assigned once and never replaced.
                self.invoice_no.get_or_insert_with(|| invoice_no.clone());
                self.order_id.get_or_insert_with(|| order_id.clone());
                self.status = DealStatus::EscrowHeld;
            }
            DealEvent::MarkedReady | DealEvent::HandoverConfirmed => {
                self.status = DealStatus::Ready;
            }
            DealEvent::Released => self.status = DealStatus::Released,
            DealEvent::Refunded => self.status = DealStatus::Refunded,
            DealEvent::Cancelled => self.status = DealStatus::Cancelled,
            DealEvent::Expired => self.status = DealStatus::Expired,
        }
        self.events.push(recorded.clone());
        self
    }

    /// Rebuild a deal from its log.
    ///
    /// Returns `None` unless the log starts with exactly one `Created`
    /// event.
    pub fn replay(events: &[RecordedEvent]) -> Option<Self> {
        let (first, rest) = events.split_first()?;
        if !matches!(first.event, DealEvent::Created { .. }) {
            return None;
        }
        if rest
            .iter()
            .any(|e| matches!(e.event, DealEvent::Created { .. }))
        {
            return None;
        }
        Some(events.iter().fold(Self::default(), Self::apply))
    }

    /// Verify the cached fields against the log.
    ///
    /// # Errors
    ///
    /// Returns a description of the first inconsistency found.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.events.windows(2).any(|w| match w {
            [a, b] => b.at < a.at,
            _ => false,
        }) {
            return Err("event log is not ordered by timestamp".into());
        }
        let replayed = Self::replay(&self.events)
            .ok_or_else(|| "event log does not start with a single Created event".to_string())?;
        if replayed != *self {
            return Err("cached fields disagree with the event log".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
