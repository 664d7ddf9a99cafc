pub mod account;
pub mod cycle;
pub mod payment;
pub mod roster;
