//! Demo deals recreated by [`DealRepository::reset_demo`](crate::DealRepository::reset_demo).

use serde::{Deserialize, Serialize};

use crate::command::DealCommand;
use crate::deal::{Buyer, DealPayload, Handover, PickupCenter};

/// A payload plus the commands that bring it to its demo status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedDeal {
    pub payload: DealPayload,
    pub steps: Vec<DealCommand>,
}

fn hub(id: &str, name: &str, address: &str) -> Handover {
    Handover::Centre(PickupCenter {
        id: id.into(),
        name: name.into(),
        address: address.into(),
    })
}

fn buyer(name: &str, phone: &str, email: &str) -> Buyer {
    Buyer {
        name: name.into(),
        phone: phone.into(),
        email: email.into(),
    }
}

/// The standard demo data set: one deal per interesting stage.
///
/// Every step sequence is legal under the guarded policy.
pub fn demo_seed() -> Vec<SeedDeal> {
    vec![
        SeedDeal {
            payload: DealPayload {
                title: "Wireless mouse".into(),
                quantity: 2,
                unit_price: 12_500,
                buyer: buyer("Amina Njoya", "+237 650 000 111", "amina@example.com"),
                handover: hub("hub-akwa", "Akwa Pickup Hub", "12 Rue Joss, Douala"),
                notes: Some("Black, boxed".into()),
                images: vec!["mouse-front.jpg".into(), "mouse-box.jpg".into()],
            },
            steps: vec![],
        },
        SeedDeal {
            payload: DealPayload {
                title: "Used road bike".into(),
                quantity: 1,
                unit_price: 180_000,
                buyer: buyer("Paul Ekane", "+237 677 123 456", "paul.ekane@example.com"),
                handover: hub("hub-bastos", "Bastos Pickup Hub", "Avenue Rosa Parks, Yaounde"),
                notes: None,
                images: vec!["bike.jpg".into()],
            },
            steps: vec![DealCommand::GenerateQuotation, DealCommand::SendToBuyer],
        },
        SeedDeal {
            payload: DealPayload {
                title: "Smartphone 128GB".into(),
                quantity: 1,
                unit_price: 95_000,
                buyer: buyer("Grace Mbah", "+237 699 222 333", "grace.mbah@example.com"),
                handover: hub("hub-akwa", "Akwa Pickup Hub", "12 Rue Joss, Douala"),
                notes: Some("Screen protector included".into()),
                images: vec!["phone.jpg".into()],
            },
            steps: vec![
                DealCommand::GenerateQuotation,
                DealCommand::SendToBuyer,
                DealCommand::ConfirmByBuyer,
                DealCommand::PaySuccess,
            ],
        },
        SeedDeal {
            payload: DealPayload {
                title: "Office chair".into(),
                quantity: 4,
                unit_price: 35_000,
                buyer: buyer("Serge Tchoua", "+237 655 444 555", "serge@example.com"),
                handover: Handover::Delivery,
                notes: None,
                images: vec!["chair.jpg".into()],
            },
            steps: vec![
                DealCommand::GenerateQuotation,
                DealCommand::SendToBuyer,
                DealCommand::PaySuccess,
                DealCommand::MarkReady,
                DealCommand::ConfirmHandover,
                DealCommand::MarkReleased,
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::command::CommandContext;
    use crate::deal::Deal;
    use crate::deal::test_fixtures::step;
    use crate::status::{DealStatus, TransitionPolicy};

    #[test]
    fn seed_payloads_are_valid_and_steps_legal() {
        let expected = [
            DealStatus::Draft,
            DealStatus::Sent,
            DealStatus::EscrowHeld,
            DealStatus::Released,
        ];
        for (i, (seed, status)) in demo_seed().into_iter().zip(expected).enumerate() {
            let mut deal = Deal::draft(
                format!("DL-{:08X}", i + 1),
                seed.payload,
                "100000".into(),
                Timestamp(0),
                &CommandContext::default(),
            )
            .expect("seed payload should validate");
            for command in seed.steps {
                deal = step(deal, command, TransitionPolicy::Guarded, 1)
                    .expect("seed step should be legal");
            }
            assert_eq!(deal.status, status);
        }
    }
}
