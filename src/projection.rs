//! Read-only documents derived from deals.
//!
//! Nothing here is stored: [`project`] and [`InvoiceIndex::compute`] are
//! pure functions of the deals they are given, so the documents can never
//! drift from the underlying state.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::deal::{Buyer, Deal, PickupCenter};
use crate::event::{Actor, DealEvent};
use crate::status::DealStatus;

/// Which commercial document a projection represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    /// Before payment: an offer.
    Quotation,
    /// After payment: a bill with an invoice number.
    Invoice,
}

/// Everything the buyer presents at the pickup centre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupPayload {
    pub order_id: String,
    pub center: PickupCenter,
    pub otp: String,
    pub qr_payload: String,
}

/// One line of the rendered audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: Timestamp,
    pub actor: Actor,
    pub action: String,
    /// `"{actor} — {action}"`.
    pub label: String,
}

/// A quotation or invoice for one deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceView {
    pub kind: DocumentKind,
    pub deal_id: String,
    pub quotation_no: Option<String>,
    pub invoice_no: Option<String>,
    pub order_id: Option<String>,
    pub title: String,
    pub quantity: u32,
    pub unit_price: u64,
    pub total: u64,
    pub buyer: Buyer,
    pub status: DealStatus,
    /// Present only once the deal has an order id and a pickup centre.
    pub pickup: Option<PickupPayload>,
    pub timeline: Vec<TimelineEntry>,
}

impl InvoiceView {
    /// Whether both the invoice number and the order id are assigned.
    pub fn is_invoiceable(&self) -> bool {
        self.invoice_no.is_some() && self.order_id.is_some()
    }
}

/// Render the quotation or invoice for `deal`.
///
/// The total is recomputed from quantity and unit price, and the timeline
/// is exactly the deal's event log in order.
pub fn project(deal: &Deal) -> InvoiceView {
    let kind = if deal.invoice_no.is_some() {
        DocumentKind::Invoice
    } else {
        DocumentKind::Quotation
    };

    let pickup = match (&deal.order_id, deal.pickup_center()) {
        (Some(order_id), Some(center)) => Some(PickupPayload {
            order_id: order_id.clone(),
            center: center.clone(),
            otp: deal.credential.otp.clone(),
            qr_payload: deal.credential.qr_payload.clone(),
        }),
        _ => None,
    };

    let timeline = deal
        .events
        .iter()
        .map(|e| TimelineEntry {
            at: e.at,
            actor: e.actor,
            action: e.action().to_string(),
            label: format!("{} — {}", e.actor, e.action()),
        })
        .collect();

    InvoiceView {
        kind,
        deal_id: deal.id.clone(),
        quotation_no: deal.quotation_no.clone(),
        invoice_no: deal.invoice_no.clone(),
        order_id: deal.order_id.clone(),
        title: deal.title.clone(),
        quantity: deal.quantity,
        unit_price: deal.unit_price,
        total: deal.total(),
        buyer: deal.buyer.clone(),
        status: deal.status,
        pickup,
        timeline,
    }
}

/// Summary row for one invoiced deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub deal_id: String,
    pub invoice_no: String,
    pub order_id: String,
    pub title: String,
    pub buyer_name: String,
    pub total: u64,
    pub status: DealStatus,
    pub issued_at: Timestamp,
}

/// Every invoiced deal with the sum of their totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIndex {
    pub records: Vec<InvoiceRecord>,
    /// Sum of `records[..].total`, saturating at `u64::MAX`.
    pub total_value: u64,
}

impl InvoiceIndex {
    /// Build the index from `deals`, keeping their order.
    ///
    /// Deals lacking an invoice number or an order id are skipped.
    pub fn compute(deals: &[Deal]) -> Self {
        let records: Vec<InvoiceRecord> = deals
            .iter()
            .filter_map(|deal| {
                let (Some(invoice_no), Some(order_id)) = (&deal.invoice_no, &deal.order_id)
                else {
                    return None;
                };
                Some(InvoiceRecord {
                    deal_id: deal.id.clone(),
                    invoice_no: invoice_no.clone(),
                    order_id: order_id.clone(),
                    title: deal.title.clone(),
                    buyer_name: deal.buyer.name.clone(),
                    total: deal.total(),
                    status: deal.status,
                    issued_at: issued_at(deal),
                })
            })
            .collect();

        let total_value = records
            .iter()
            .fold(0u64, |sum, r| sum.saturating_add(r.total));

        Self {
            records,
            total_value,
        }
    }

    /// Number of invoiced deals.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no deal has been invoiced.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Timestamp of the first successful payment.
fn issued_at(deal: &Deal) -> Timestamp {
    deal.events
        .iter()
        .find(|e| matches!(e.event, DealEvent::PaymentSucceeded { .. }))
        .map(|e| e.at)
        .unwrap_or_else(|| deal.updated_at())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::DealCommand;
    use crate::deal::Handover;
    use crate::deal::test_fixtures::{draft_mouse, hub_akwa, step};
    use crate::status::TransitionPolicy;

    const G: TransitionPolicy = TransitionPolicy::Guarded;

    fn paid_mouse() -> Deal {
        let d = step(draft_mouse(), DealCommand::GenerateQuotation, G, 2_000).expect("quote");
        let d = step(d, DealCommand::SendToBuyer, G, 3_000).expect("send");
        step(d, DealCommand::PaySuccess, G, 4_000).expect("pay")
    }

    #[test]
    fn draft_projects_as_quotation() {
        let view = project(&draft_mouse());
        assert_eq!(view.kind, DocumentKind::Quotation);
        assert_eq!(view.total, 25_000);
        assert_eq!(view.quotation_no, None);
        assert!(!view.is_invoiceable());
        assert!(view.pickup.is_none());
        assert_eq!(view.timeline.len(), 1);
        assert_eq!(view.timeline[0].label, "Dealer — Deal created");
    }

    #[test]
    fn paid_deal_projects_as_invoice_with_pickup() {
        let view = project(&paid_mouse());
        assert_eq!(view.kind, DocumentKind::Invoice);
        assert!(view.is_invoiceable());
        assert_eq!(view.invoice_no.as_deref(), Some("INV-00000001"));

        let pickup = view.pickup.expect("centre deal has a pickup payload");
        assert_eq!(pickup.order_id, "ORD-00000001");
        assert_eq!(pickup.center, hub_akwa());
        assert_eq!(pickup.otp, "123456");
        assert_eq!(pickup.qr_payload, "DL-00000001:123456");
    }

    #[test]
    fn delivery_deal_has_no_pickup_payload() {
        let mut deal = paid_mouse();
        deal.handover = Handover::Delivery;
        let view = project(&deal);
        assert!(view.is_invoiceable());
        assert!(view.pickup.is_none());
    }

    #[test]
    fn timeline_mirrors_event_log() {
        let deal = paid_mouse();
        let view = project(&deal);
        assert_eq!(view.timeline.len(), deal.events.len());
        let labels: Vec<&str> = view.timeline.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Dealer — Deal created",
                "Dealer — Quotation generated",
                "Dealer — Sent to buyer",
                "Buyer — Payment successful",
            ]
        );
        assert_eq!(view.timeline[3].at, Timestamp(4_000));
    }

    #[test]
    fn index_skips_uninvoiced_and_sums_totals() {
        let mut second = paid_mouse();
        second.id = "DL-00000002".into();
        second.invoice_no = Some("INV-00000002".into());
        second.quantity = 1;

        let index = InvoiceIndex::compute(&[draft_mouse(), paid_mouse(), second]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.records[0].invoice_no, "INV-00000001");
        assert_eq!(index.records[0].issued_at, Timestamp(4_000));
        assert_eq!(index.records[1].deal_id, "DL-00000002");
        assert_eq!(index.total_value, 25_000 + 12_500);
    }

    #[test]
    fn empty_index() {
        let index = InvoiceIndex::compute(&[]);
        assert!(index.is_empty());
        assert_eq!(index.total_value, 0);
    }
}
