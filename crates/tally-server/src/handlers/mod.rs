pub mod status;
pub mod transfers;
