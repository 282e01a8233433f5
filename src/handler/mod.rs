pub mod admin;
pub mod referral;
pub mod webhook;
