//! Aggregates module
pub mod account;
pub mod catalog;
pub mod cart;
pub mod order;
pub mod invoice;
pub mod quotation;
pub mod conversation;
pub mod review;
pub mod seller;

pub use account::{BuyerProfile, PendingSignup, Profile, ProfileUpdate, SellerApplication, SignupCheck, User};
pub use catalog::{CatalogError, HistoryRefs, Product, ProductCategory, ProductDraft, ProductVariant, RawProduct, VariantDraft, VariantSync};
pub use cart::{Cart, CartAddition, CartError, CartItem, WishlistItem};
pub use order::{Order, OrderError, OrderItem, OrderLine, OrderStatus, OrderView, OtpCheck, PlacedOrder, StatusUpdate};
pub use invoice::{Invoice, InvoiceDocument, InvoiceStatus};
pub use quotation::{Quotation, QuotationError, QuotationRequest};
pub use conversation::{Conversation, ConversationError, Message};
pub use review::{RatingSummary, Review, ReviewError};
pub use seller::{SellerError, SellerProfile};
