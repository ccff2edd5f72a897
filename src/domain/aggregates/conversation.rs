//! Conversation Aggregate: per-order, per-product buyer/seller messaging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Actor;
use crate::domain::aggregates::order::{Order, OrderItem};
use crate::domain::events::{ConversationEvent, DomainEvent};

pub const MAX_MESSAGE_LEN: usize = 5_000;

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub text: Option<String>,
    pub attachment_path: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Only the order's buyer may open a channel, and only about a product
    /// that is a line of that order. The seller is that line's seller.
    pub fn open(order: &Order, items: &[OrderItem], product_id: Uuid, requester_id: Uuid) -> Result<Self, ConversationError> {
        if !order.is_buyer(requester_id) {
            return Err(ConversationError::NotOrderBuyer);
        }
        let item = items
            .iter()
            .find(|i| i.order_id == order.id && i.product_id == product_id)
            .ok_or(ConversationError::ProductNotInOrder)?;
        Ok(Self {
            id: Uuid::now_v7(),
            order_id: order.id,
            product_id,
            buyer_id: order.buyer_id,
            seller_id: item.seller_id,
            created_at: Utc::now(),
        })
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        user_id == self.buyer_id || user_id == self.seller_id
    }

    /// Hard gate for reading or writing; staff are allowed in.
    pub fn authorize(&self, actor: &Actor) -> Result<(), ConversationError> {
        if actor.is_staff() || self.is_participant(actor.user_id()) {
            Ok(())
        } else {
            Err(ConversationError::NotParticipant)
        }
    }

    fn counterparty_of(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.buyer_id {
            Some(self.seller_id)
        } else if user_id == self.seller_id {
            Some(self.buyer_id)
        } else {
            None
        }
    }

    /// Everything `compose` checks, minus the stored attachment path. Run it
    /// before an attachment is written anywhere. Returns the trimmed text.
    pub fn check_draft(&self, actor: &Actor, text: Option<String>, has_attachment: bool) -> Result<Option<String>, ConversationError> {
        self.authorize(actor)?;
        let text = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        if text.is_none() && !has_attachment {
            return Err(ConversationError::EmptyMessage);
        }
        if text.as_ref().is_some_and(|t| t.chars().count() > MAX_MESSAGE_LEN) {
            return Err(ConversationError::MessageTooLong);
        }
        Ok(text)
    }

    pub fn compose(&self, actor: &Actor, text: Option<String>, attachment_path: Option<String>) -> Result<Message, ConversationError> {
        let text = self.check_draft(actor, text, attachment_path.is_some())?;
        Ok(Message {
            id: Uuid::now_v7(),
            conversation_id: self.id,
            sender_id: actor.user_id(),
            text,
            attachment_path,
            is_read: false,
            created_at: Utc::now(),
        })
    }

    /// Notifies the other side; staff messages reach the buyer.
    pub fn sent_event(&self, message: &Message, product_name: &str) -> DomainEvent {
        let recipient_id = self.counterparty_of(message.sender_id).unwrap_or(self.buyer_id);
        ConversationEvent::MessageSent {
            conversation_id: self.id,
            product_name: product_name.to_string(),
            sender_id: message.sender_id,
            recipient_id,
        }
        .into()
    }
}

/// Ids of the messages a reader has not seen yet: unread and sent by someone else.
pub fn unread_for(messages: &[Message], reader_id: Uuid) -> Vec<Uuid> {
    messages
        .iter()
        .filter(|m| !m.is_read && m.sender_id != reader_id)
        .map(|m| m.id)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("only the buyer of this order can start a conversation")]
    NotOrderBuyer,
    #[error("product is not part of this order")]
    ProductNotInOrder,
    #[error("You are not a participant in this conversation")]
    NotParticipant,
    #[error("message needs text or an attachment")]
    EmptyMessage,
    #[error("message text is too long")]
    MessageTooLong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::catalog::tests::product_with;
    use crate::domain::aggregates::order::{OrderLine, PlacedOrder};
    use std::collections::HashMap;

    fn placed(seller: Uuid, buyer: Uuid) -> (PlacedOrder, Uuid) {
        let p = product_with(seller, None, &[(Some(10), None)]);
        let product_id = p.id;
        let line = OrderLine { product_id, variant_id: None, quantity: 1 };
        let placed = Order::place(buyer, "addr", &[line], &HashMap::from([(p.id, p)])).unwrap();
        (placed, product_id)
    }

    #[test]
    fn test_open_is_gated_on_buyer_and_line_item() {
        let seller = Uuid::now_v7();
        let buyer = Uuid::now_v7();
        let (placed, product_id) = placed(seller, buyer);

        let c = Conversation::open(&placed.order, &placed.items, product_id, buyer).unwrap();
        assert_eq!(c.seller_id, seller);
        assert_eq!(c.buyer_id, buyer);

        assert_eq!(
            Conversation::open(&placed.order, &placed.items, product_id, seller).unwrap_err(),
            ConversationError::NotOrderBuyer
        );
        assert_eq!(
            Conversation::open(&placed.order, &placed.items, Uuid::now_v7(), buyer).unwrap_err(),
            ConversationError::ProductNotInOrder
        );
    }

    #[test]
    fn test_outsider_is_rejected() {
        let seller = Uuid::now_v7();
        let buyer = Uuid::now_v7();
        let (placed, product_id) = placed(seller, buyer);
        let c = Conversation::open(&placed.order, &placed.items, product_id, buyer).unwrap();

        let outsider = Actor::Buyer(Uuid::now_v7());
        assert_eq!(c.authorize(&outsider), Err(ConversationError::NotParticipant));
        assert_eq!(c.compose(&outsider, Some("hi".into()), None).unwrap_err(), ConversationError::NotParticipant);
        assert!(c.authorize(&Actor::Staff(Uuid::now_v7())).is_ok());
        assert!(c.authorize(&Actor::Seller(seller)).is_ok());
    }

    #[test]
    fn test_compose_and_notify_counterparty() {
        let seller = Uuid::now_v7();
        let buyer = Uuid::now_v7();
        let (placed, product_id) = placed(seller, buyer);
        let c = Conversation::open(&placed.order, &placed.items, product_id, buyer).unwrap();

        assert_eq!(c.compose(&Actor::Buyer(buyer), Some("  ".into()), None).unwrap_err(), ConversationError::EmptyMessage);
        let m = c.compose(&Actor::Buyer(buyer), Some(" When will it ship? ".into()), None).unwrap();
        assert_eq!(m.text.as_deref(), Some("When will it ship?"));
        assert!(!m.is_read);

        match c.sent_event(&m, "Buffer") {
            DomainEvent::Conversation(ConversationEvent::MessageSent { recipient_id, .. }) => assert_eq!(recipient_id, seller),
            other => panic!("unexpected event {other:?}"),
        }
        let attachment_only = c.compose(&Actor::Seller(seller), None, Some("chat/coa.pdf".into())).unwrap();
        assert_eq!(attachment_only.sender_id, seller);
    }

    #[test]
    fn test_draft_is_checked_without_a_stored_file() {
        let seller = Uuid::now_v7();
        let buyer = Uuid::now_v7();
        let (placed, product_id) = placed(seller, buyer);
        let c = Conversation::open(&placed.order, &placed.items, product_id, buyer).unwrap();

        let too_long = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert_eq!(c.check_draft(&Actor::Buyer(buyer), Some(too_long), true), Err(ConversationError::MessageTooLong));
        assert_eq!(c.check_draft(&Actor::Buyer(Uuid::now_v7()), None, true), Err(ConversationError::NotParticipant));
        assert_eq!(c.check_draft(&Actor::Seller(seller), Some(" ".into()), false), Err(ConversationError::EmptyMessage));
        assert_eq!(c.check_draft(&Actor::Seller(seller), Some(" ".into()), true), Ok(None));
        assert_eq!(c.check_draft(&Actor::Buyer(buyer), Some(" ok ".into()), false), Ok(Some("ok".into())));
    }

    #[test]
    fn test_unread_excludes_own_messages() {
        let seller = Uuid::now_v7();
        let buyer = Uuid::now_v7();
        let (placed, product_id) = placed(seller, buyer);
        let c = Conversation::open(&placed.order, &placed.items, product_id, buyer).unwrap();
        let mut from_buyer = c.compose(&Actor::Buyer(buyer), Some("a".into()), None).unwrap();
        let from_seller = c.compose(&Actor::Seller(seller), Some("b".into()), None).unwrap();
        assert_eq!(unread_for(&[from_buyer.clone(), from_seller.clone()], buyer), vec![from_seller.id]);
        from_buyer.is_read = true;
        assert!(unread_for(&[from_buyer], seller).is_empty());
    }
}
