pub mod customermodel;
pub mod eventmodel;
pub mod referralmodel;
