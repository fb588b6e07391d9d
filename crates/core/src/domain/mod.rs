pub mod customer;
pub mod fields;
