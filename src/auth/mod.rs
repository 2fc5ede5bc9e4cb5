pub mod accounts;
pub mod session;

pub use accounts::{Accounts, AuthError};
