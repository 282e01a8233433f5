pub mod referraldtos;

pub use referraldtos::*;
