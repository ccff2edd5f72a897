//! Domain events
//!
//! Aggregates record what happened; the notification dispatcher turns these
//! into in-app notifications and outbound mail after the transaction commits.

use uuid::Uuid;

use crate::domain::aggregates::order::OrderStatus;
use crate::domain::value_objects::{Money, Otp};

#[derive(Clone, Debug)]
pub enum DomainEvent {
    Order(OrderEvent),
    Quotation(QuotationEvent),
    Conversation(ConversationEvent),
    Seller(SellerEvent),
    Account(AccountEvent),
}

#[derive(Clone, Debug)]
pub enum OrderEvent {
    Placed { order_id: Uuid, buyer_id: Uuid, seller_ids: Vec<Uuid>, total: Money },
    StatusChanged { order_id: Uuid, buyer_id: Uuid, seller_ids: Vec<Uuid>, status: OrderStatus },
    DeliveryOtpIssued { order_id: Uuid, buyer_id: Uuid, otp: Otp },
    Completed { order_id: Uuid, buyer_id: Uuid, seller_ids: Vec<Uuid> },
}

#[derive(Clone, Debug)]
pub enum QuotationEvent {
    Requested { request_id: Uuid, product_name: String, buyer_id: Uuid, seller_id: Uuid, quantity: i32 },
    Uploaded { request_id: Uuid, product_name: String, buyer_id: Uuid, is_invoice: bool },
}

#[derive(Clone, Debug)]
pub enum ConversationEvent {
    MessageSent { conversation_id: Uuid, product_name: String, sender_id: Uuid, recipient_id: Uuid },
}

#[derive(Clone, Debug)]
pub enum SellerEvent {
    /// Carries the temporary credential out of storage; the profile row no
    /// longer holds it once this event exists.
    Approved { seller_id: Uuid, temp_credential: Option<String> },
    /// The account is gone by the time this is dispatched, so the contact
    /// details travel with the event.
    Rejected { email: String, name: String },
}

#[derive(Clone, Debug)]
pub enum AccountEvent {
    /// Sent to an address that has no account yet.
    SignupOtpIssued { email: String, name: String, otp: Otp },
    SellerRegistered { seller_id: Uuid, company_name: String },
}

impl From<OrderEvent> for DomainEvent {
    fn from(e: OrderEvent) -> Self { DomainEvent::Order(e) }
}

impl From<QuotationEvent> for DomainEvent {
    fn from(e: QuotationEvent) -> Self { DomainEvent::Quotation(e) }
}

impl From<ConversationEvent> for DomainEvent {
    fn from(e: ConversationEvent) -> Self { DomainEvent::Conversation(e) }
}

impl From<SellerEvent> for DomainEvent {
    fn from(e: SellerEvent) -> Self { DomainEvent::Seller(e) }
}

impl From<AccountEvent> for DomainEvent {
    fn from(e: AccountEvent) -> Self { DomainEvent::Account(e) }
}
