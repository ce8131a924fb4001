//! Core types for Shop Next Door.

pub mod email;
pub mod id;
pub mod money;
pub mod phone;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Money, MoneyError};
pub use phone::{PhoneNumber, PhoneNumberError};
pub use status::*;
