//! Domain models for the marketplace.
//!
//! These are the validated shapes handed between repositories, services and
//! route handlers. Rows decode straight into them because the core types
//! validate themselves on decode.

pub mod analytics;
pub mod order;
pub mod product;
pub mod session;
pub mod shop;
pub mod transaction;
pub mod user;

pub use analytics::{AnalyticsScope, DailyRevenue, SalesSummary, TopProduct};
pub use order::{Order, OrderDetail, OrderItem, OrderLine, OrderListing};
pub use product::{Product, ProductInput};
pub use session::{CurrentUser, keys as session_keys};
pub use shop::{Shop, ShopInput, ShopListing};
pub use transaction::{PaymentOutcome, Transaction, TransactionListing};
pub use user::User;
