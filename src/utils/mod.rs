pub mod currency;
pub mod phone;
pub mod slug;
pub mod token;
