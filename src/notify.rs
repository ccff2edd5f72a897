//! Notification fan-out.
//!
//! Domain events become in-app notification rows and outbound mail once the
//! request's transaction has committed. Nothing here can fail a request:
//! delivery problems are logged and dropped.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::domain::aggregates::account::SIGNUP_OTP_TTL_MINUTES;
use crate::domain::events::{AccountEvent, ConversationEvent, DomainEvent, OrderEvent, QuotationEvent, SellerEvent};

pub const MAIL_SUBJECT: &str = "mail.outbound";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("mail transport: {0}")]
    Transport(String),
    #[error("could not encode mail: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no contact for user {0}")]
    UnknownUser(Uuid),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    User(Uuid),
    /// Someone whose account no longer exists.
    Address { email: String, name: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mail {
    pub subject: String,
    pub body: String,
}

/// What one recipient gets for one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatch {
    pub recipient: Recipient,
    pub notification: Option<String>,
    pub mail: Option<Mail>,
}

impl Dispatch {
    fn user(user_id: Uuid, notification: impl Into<String>) -> Self {
        Self { recipient: Recipient::User(user_id), notification: Some(notification.into()), mail: None }
    }

    fn with_mail(mut self, subject: impl Into<String>, body: impl Into<String>) -> Self {
        self.mail = Some(Mail { subject: subject.into(), body: body.into() });
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

fn short(id: Uuid) -> String { id.simple().to_string()[..8].to_uppercase() }

/// Maps an event to everyone who must hear about it.
pub fn fan_out(event: &DomainEvent) -> Vec<Dispatch> {
    match event {
        DomainEvent::Order(OrderEvent::Placed { order_id, buyer_id, seller_ids, total }) => {
            let order = short(*order_id);
            let mut out = vec![Dispatch::user(*buyer_id, format!("Your order {order} has been placed. Total {total}."))
                .with_mail(format!("Order {order} placed"), format!("Thank you for your order {order}. Total payable: {total}."))];
            out.extend(seller_ids.iter().map(|s| {
                Dispatch::user(*s, format!("New order {order} received."))
                    .with_mail("New order received", format!("You have received a new order {order}. Log in to process it."))
            }));
            out
        }
        DomainEvent::Order(OrderEvent::StatusChanged { order_id, buyer_id, seller_ids, status }) => {
            let order = short(*order_id);
            let text = format!("Order {order} is now {status}.");
            std::iter::once(*buyer_id)
                .chain(seller_ids.iter().copied())
                .map(|u| Dispatch::user(u, text.clone()).with_mail(format!("Order {order} {status}"), text.clone()))
                .collect()
        }
        DomainEvent::Order(OrderEvent::DeliveryOtpIssued { order_id, buyer_id, otp }) => {
            let order = short(*order_id);
            vec![Dispatch::user(
                *buyer_id,
                format!("Order {order} has been delivered. Share the code sent to your email with the seller to confirm."),
            )
            .with_mail(
                "Your Linkzur delivery OTP",
                format!(
                    "Your order {order} has been delivered.\n\nDelivery confirmation code: {}\n\nShare this code with the seller only after you have received your items.",
                    otp.as_str()
                ),
            )]
        }
        DomainEvent::Order(OrderEvent::Completed { order_id, buyer_id, seller_ids }) => {
            let order = short(*order_id);
            let mut out = vec![Dispatch::user(*buyer_id, format!("Order {order} is complete. Thank you for confirming delivery."))
                .with_mail(format!("Order {order} completed"), format!("Delivery of order {order} has been confirmed."))];
            out.extend(seller_ids.iter().map(|s| Dispatch::user(*s, format!("Delivery of order {order} was confirmed by the buyer."))));
            out
        }
        DomainEvent::Quotation(QuotationEvent::Requested { product_name, seller_id, quantity, .. }) => {
            let text = format!("A buyer requested a quotation for {quantity} x {product_name}.");
            vec![Dispatch::user(*seller_id, text.clone()).with_mail("New quotation request", text)]
        }
        DomainEvent::Quotation(QuotationEvent::Uploaded { product_name, buyer_id, is_invoice, .. }) => {
            let kind = if *is_invoice { "An invoice" } else { "A quotation" };
            let text = format!("{kind} has been uploaded for {product_name}.");
            vec![Dispatch::user(*buyer_id, text.clone()).with_mail(format!("Quotation for {product_name}"), text)]
        }
        DomainEvent::Conversation(ConversationEvent::MessageSent { product_name, recipient_id, .. }) => {
            vec![Dispatch::user(*recipient_id, format!("New message about {product_name}."))]
        }
        DomainEvent::Seller(SellerEvent::Approved { seller_id, temp_credential }) => {
            let mut body = String::from("Congratulations! Your Linkzur seller account has been approved.\n\n");
            if let Some(credential) = temp_credential {
                body.push_str(&format!(
                    "Log in with your registered email and this temporary password: {credential}\n\nPlease change your password immediately."
                ));
            }
            vec![Dispatch::user(*seller_id, "Your seller account has been approved.")
                .with_mail("Your Seller Account Has Been Approved", body)]
        }
        DomainEvent::Seller(SellerEvent::Rejected { email, name }) => vec![Dispatch {
            recipient: Recipient::Address { email: email.clone(), name: name.clone() },
            notification: None,
            mail: Some(Mail {
                subject: "Your Seller Registration Was Rejected".into(),
                body: "We are sorry, but your seller registration was not approved.".into(),
            }),
        }],
        DomainEvent::Account(AccountEvent::SignupOtpIssued { email, name, otp }) => vec![Dispatch {
            recipient: Recipient::Address { email: email.clone(), name: name.clone() },
            notification: None,
            mail: Some(Mail {
                subject: "Your Linkzur OTP Verification Code".into(),
                body: format!(
                    "Hello {name},\n\nYour OTP for Linkzur verification is: {}\nThis code will expire in {SIGNUP_OTP_TTL_MINUTES} minutes.\n\nIf you didn't request this, please ignore this email.",
                    otp.as_str()
                ),
            }),
        }],
        DomainEvent::Account(AccountEvent::SellerRegistered { seller_id, company_name }) => {
            vec![Dispatch::user(*seller_id, "Your seller registration is pending review.").with_mail(
                "Seller registration received",
                format!("Thank you for registering {company_name} on Linkzur. We will email you once your account has been reviewed."),
            )]
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), NotifyError>;
}

/// Publishes mail as JSON for the mail worker.
pub struct NatsMailer {
    client: async_nats::Client,
}

impl NatsMailer {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl Mailer for NatsMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(&email)?;
        self.client
            .publish(MAIL_SUBJECT.to_string(), payload.into())
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))
    }
}

/// Used when no broker is configured. Bodies may carry codes, so only the
/// envelope is logged.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), NotifyError> {
        info!(to = %email.to, subject = %email.subject, "mail not sent, no transport configured");
        Ok(())
    }
}

#[derive(Clone)]
pub struct Notifier {
    db: PgPool,
    mailer: Arc<dyn Mailer>,
    from: String,
}

impl Notifier {
    pub fn new(db: PgPool, mailer: Arc<dyn Mailer>, from: impl Into<String>) -> Self {
        Self { db, mailer, from: from.into() }
    }

    pub async fn dispatch(&self, events: Vec<DomainEvent>) {
        for event in &events {
            for dispatch in fan_out(event) {
                if let Err(e) = self.deliver(&dispatch).await {
                    warn!(error = %e, recipient = ?dispatch.recipient, "notification delivery failed");
                }
            }
        }
    }

    async fn deliver(&self, dispatch: &Dispatch) -> Result<(), NotifyError> {
        let to = match &dispatch.recipient {
            Recipient::User(user_id) => {
                if let Some(message) = &dispatch.notification {
                    let mut conn = self.db.acquire().await?;
                    db::notifications::insert(&mut conn, *user_id, message).await?;
                }
                if dispatch.mail.is_none() {
                    return Ok(());
                }
                db::users::contact(&self.db, *user_id).await?.ok_or(NotifyError::UnknownUser(*user_id))?.email
            }
            Recipient::Address { email, .. } => email.clone(),
        };
        if let Some(mail) = &dispatch.mail {
            self.mailer
                .send(OutboundEmail { from: self.from.clone(), to, subject: mail.subject.clone(), body: mail.body.clone() })
                .await?;
        }
        Ok(())
    }
}
