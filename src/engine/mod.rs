pub mod confirmation;
pub mod expiry;
