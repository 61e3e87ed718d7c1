pub mod order;
pub mod refund;
pub mod user;
